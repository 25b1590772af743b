use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageId, User, UserId};

// -- JWT Claims --

/// Identity token claims, shared by the HTTP auth gate and the WebSocket
/// upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: usize,
}

// -- Messages --

/// Body of `POST /messages`. Fields are optional so a missing one maps to
/// 400 rather than an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub to: Option<UserId>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    /// Decrypted text, `null` when the payload is unreadable.
    pub message: Option<String>,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    pub delivered: bool,
    pub read: bool,
}

impl MessageResponse {
    pub fn from_message(msg: Message, sender_name: String) -> Self {
        Self {
            id: msg.id,
            from: msg.from,
            to: msg.to,
            message: msg.text,
            sender_name,
            timestamp: msg.created_at,
            delivered: msg.delivered,
            read: msg.read,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageCreatedResponse {
    pub message: String,
    pub data: MessageResponse,
}

// -- Directory --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub profile_image_url: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub profile_image_url: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            profile_image_url: user.profile_image_url,
        }
    }
}

/// Body of `PUT /me/avatar`. `null` clears the reference.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarRequest {
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub online: usize,
}
