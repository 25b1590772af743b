pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// HTTP routes consumed by the chat client. Everything but `/health` sits
/// behind the auth gate.
pub fn routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/{with_user_id}", get(messages::get_messages))
        .route("/users", get(users::list_users))
        .route("/me", get(users::me))
        .route("/me/avatar", put(users::set_avatar))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(users::health))
        .merge(protected)
        .with_state(state)
}
