use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use tracing::{error, warn};

use courier_crypto::MessageCipher;
use courier_db::Database;
use courier_db::models::MessageRow;
use courier_types::models::Message;
use courier_types::{CourierError, MessageId, UserId};

/// Run blocking SQLite work off the async runtime.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, CourierError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            CourierError::persistence(e)
        })?
        .map_err(|e| {
            error!("store error: {:#}", e);
            CourierError::persistence(e)
        })
}

/// Durable record of every message and its delivered/read flags.
///
/// Text is encrypted on the way in and decrypted on the way out; a row whose
/// payload cannot be decrypted comes back with `text: None` instead of
/// failing the whole read.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    cipher: MessageCipher,
}

impl MessageStore {
    pub fn new(db: Arc<Database>, cipher: MessageCipher) -> Self {
        Self { db, cipher }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub async fn create(&self, sender: UserId, recipient: UserId, text: &str) -> Result<Message, CourierError> {
        let payload = self.cipher.seal(text).map_err(CourierError::persistence)?;
        // stored with microsecond precision; keep the returned value identical
        let now = Utc::now().trunc_subsecs(6);
        let created_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        let id = run_blocking(&self.db, move |db| {
            db.insert_message(sender, recipient, &payload, &created_at)
        })
        .await?;

        Ok(Message {
            id,
            from: sender,
            to: recipient,
            text: Some(text.to_string()),
            created_at: now,
            delivered: false,
            read: false,
        })
    }

    pub async fn get(&self, id: MessageId) -> Result<Option<Message>, CourierError> {
        let row = run_blocking(&self.db, move |db| db.get_message(id)).await?;
        Ok(row.map(|r| self.decode(r)))
    }

    /// Idempotent. Returns true if this call flipped the flag.
    pub async fn mark_delivered(&self, id: MessageId) -> Result<bool, CourierError> {
        run_blocking(&self.db, move |db| db.mark_delivered(id)).await
    }

    /// Flip all unread `sender -> recipient` messages to read. Returns how many changed.
    pub async fn mark_read(&self, sender: UserId, recipient: UserId) -> Result<usize, CourierError> {
        run_blocking(&self.db, move |db| db.mark_read(sender, recipient)).await
    }

    pub async fn unread_count(&self, from: UserId, to: UserId) -> Result<i64, CourierError> {
        run_blocking(&self.db, move |db| db.unread_count(from, to)).await
    }

    /// Undelivered messages for `recipient`, in send order.
    pub async fn pending_for_recipient(&self, recipient: UserId) -> Result<Vec<Message>, CourierError> {
        let rows = run_blocking(&self.db, move |db| db.pending_for_recipient(recipient)).await?;
        Ok(rows.into_iter().map(|r| self.decode(r)).collect())
    }

    /// Both directions of a conversation, oldest first.
    pub async fn history(&self, user_a: UserId, user_b: UserId) -> Result<Vec<Message>, CourierError> {
        let rows = run_blocking(&self.db, move |db| db.history(user_a, user_b)).await?;
        Ok(rows.into_iter().map(|r| self.decode(r)).collect())
    }

    fn decode(&self, row: MessageRow) -> Message {
        let text = self.cipher.open(Some(&row.text));
        if text.is_none() {
            warn!("Message {} has an undecryptable payload", row.id);
        }

        Message {
            id: row.id,
            from: row.from_id,
            to: row.to_id,
            text,
            created_at: parse_timestamp(&row.created_at, row.id),
            delivered: row.delivered,
            read: row.read,
        }
    }
}

pub(crate) fn parse_timestamp(raw: &str, id: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat as UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row {}: {}", raw, id, e);
            DateTime::default()
        })
}
