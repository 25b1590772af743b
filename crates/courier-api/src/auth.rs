use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use courier_gateway::DeliveryEngine;
use courier_types::api::Claims;
use courier_types::{CourierError, UserId};

/// Name of the cookie the browser client keeps its token in.
pub const TOKEN_COOKIE: &str = "token";

const TOKEN_TTL_HOURS: i64 = 24;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub engine: DeliveryEngine,
    pub jwt_secret: String,
}

pub fn create_token(secret: &str, user_id: UserId) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate signature and expiry. Returns the user id the token was issued to.
pub fn validate_token(secret: &str, token: &str) -> Result<UserId, CourierError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .map_err(|e| CourierError::Forbidden(format!("Invalid token: {}", e)))
}

/// Token from `Authorization: Bearer`, the `token` cookie, or a `token=`
/// query parameter, in that order. Browsers cannot set headers on a
/// WebSocket upgrade, hence the query fallback.
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }

    if let Some(cookie) = CookieJar::from_headers(headers).get(TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }

    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// The Auth Provider gate: no token is 401, a bad token is 403, and a valid
/// token for a user the directory no longer has is 401.
pub async fn authenticate(
    state: &AppStateInner,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<UserId, CourierError> {
    let token = extract_token(headers, query)
        .ok_or_else(|| CourierError::Unauthenticated("No token".into()))?;

    let user_id = validate_token(&state.jwt_secret, &token)?;

    if state.engine.directory().user(user_id).await?.is_none() {
        return Err(CourierError::Unauthenticated("User not found".into()));
    }

    Ok(user_id)
}
