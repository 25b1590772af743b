use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use courier_types::api::{MessageCreatedResponse, MessageResponse, SendMessageRequest};
use courier_types::{CourierError, UserId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;

const UNKNOWN_SENDER: &str = "Unknown";

/// `GET /messages/{withUserId}`: the caller's conversation with one user,
/// oldest first, text decrypted.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(with_user_id): Path<String>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let other: UserId = with_user_id
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    let messages = state.engine.store().history(me, other).await?;

    // At most two distinct senders in a conversation
    let mut names: HashMap<UserId, String> = HashMap::new();
    for id in [me, other] {
        let name = state
            .engine
            .directory()
            .display_name(id)
            .await?
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        names.insert(id, name);
    }

    let body: Vec<MessageResponse> = messages
        .into_iter()
        .map(|msg| {
            let sender_name = names
                .get(&msg.from)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
            MessageResponse::from_message(msg, sender_name)
        })
        .collect();

    Ok(Json(body))
}

/// `POST /messages`: persist a message from the caller. Stored only; live
/// delivery happens over the realtime channel.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let (to, text) = match (req.to, req.message) {
        (Some(to), Some(text)) if !text.trim().is_empty() => (to, text),
        _ => return Err(ApiError::bad_request("Missing fields")),
    };

    let directory = state.engine.directory();
    let sender_name = directory
        .display_name(me)
        .await?
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    if directory.user(to).await?.is_none() {
        return Err(CourierError::Validation(format!("Unknown recipient {}", to)).into());
    }

    let message = state.engine.store().create(me, to, &text).await?;
    debug!("stored message {} {} -> {} via HTTP", message.id, me, to);

    Ok((
        StatusCode::CREATED,
        Json(MessageCreatedResponse {
            message: "Message sent".to_string(),
            data: MessageResponse::from_message(message, sender_name),
        }),
    ))
}
