use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use courier_types::UserId;

use crate::auth::{AppState, authenticate};
use crate::error::ApiError;

/// The authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = authenticate(&state, req.headers(), req.uri().query()).await?;
    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
