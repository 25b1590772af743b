use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable integer identity assigned by the user directory.
pub type UserId = i64;

pub type MessageId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A direct message with its text already decrypted.
///
/// `text` is `None` when the stored payload could not be decrypted; callers
/// keep going with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    pub read: bool,
}
