/// Database row types; these map directly to SQLite rows.
/// Distinct from courier-types models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    /// Encrypted payload, `ivBase64:cipherBase64`.
    pub text: String,
    /// RFC 3339 UTC with fixed-width fraction, so it sorts as text.
    pub created_at: String,
    pub delivered: bool,
    pub read: bool,
}

/// A directory entry plus the time of the latest message exchanged with the
/// viewer's counterparty.
#[derive(Debug, Clone)]
pub struct ContactRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub profile_image_url: Option<String>,
    pub last_message_time: Option<String>,
}
