use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use tracing::debug;

use courier_types::CourierError;
use courier_types::api::{AvatarRequest, HealthResponse, ProfileResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// `GET /users`: everyone else, most recent conversation first.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let contacts = state.engine.directory().contacts(me).await?;
    Ok(Json(contacts))
}

/// `GET /me`: the caller's own profile.
pub async fn me(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .engine
        .directory()
        .user(me)
        .await?
        .ok_or(CourierError::LookupMiss(me))?;
    Ok(Json(ProfileResponse::from(user)))
}

/// `PUT /me/avatar`: repoint the caller's profile image. Uploading the file
/// is someone else's job; only the reference is stored here.
pub async fn set_avatar(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    payload: Result<Json<AvatarRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let url = match req.profile_image_url {
        Some(url) if url.trim().is_empty() => return Err(ApiError::bad_request("Empty image URL")),
        other => other,
    };

    let user = state
        .engine
        .directory()
        .set_profile_image(me, url)
        .await?
        .ok_or(CourierError::LookupMiss(me))?;
    debug!("user {} avatar now {:?}", me, user.profile_image_url);
    Ok(Json(ProfileResponse::from(user)))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        online: state.engine.presence().online_count().await,
    })
}
