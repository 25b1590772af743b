use crate::Database;
use crate::models::{ContactRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str = "id, from_id, to_id, text, created_at, delivered, read";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        profile_image_url: Option<&str>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (first_name, last_name, email, profile_image_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![first_name, last_name, email, profile_image_url],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn list_user_ids(&self) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    /// The only user field the messaging core may change.
    pub fn set_profile_image(&self, id: i64, url: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET profile_image_url = ?1 WHERE id = ?2",
                rusqlite::params![url, id],
            )?;
            Ok(n > 0)
        })
    }

    /// Every user except `viewer_id`, most recent conversation with the viewer
    /// first, users the viewer never talked to last.
    pub fn list_contacts(&self, viewer_id: i64) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.first_name, u.last_name, u.profile_image_url, MAX(m.created_at) AS last_time
                 FROM users u
                 LEFT JOIN messages m
                   ON (m.from_id = u.id AND m.to_id = ?1) OR (m.from_id = ?1 AND m.to_id = u.id)
                 WHERE u.id != ?1
                 GROUP BY u.id
                 ORDER BY MAX(m.created_at) IS NULL, MAX(m.created_at) DESC, u.id",
            )?;

            let rows = stmt
                .query_map([viewer_id], |row| {
                    Ok(ContactRow {
                        id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        profile_image_url: row.get(3)?,
                        last_message_time: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Insert an undelivered, unread message. Returns the new id.
    pub fn insert_message(&self, from_id: i64, to_id: i64, text: &str, created_at: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (from_id, to_id, text, created_at, delivered, read)
                 VALUES (?1, ?2, ?3, ?4, 0, 0)",
                rusqlite::params![from_id, to_id, text, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
                [id],
                message_from_row,
            )
            .optional()
        })
    }

    /// Returns true if this call flipped the flag.
    pub fn mark_delivered(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET delivered = 1 WHERE id = ?1 AND delivered = 0",
                [id],
            )?;
            Ok(n > 0)
        })
    }

    /// Flip every unread `from_id -> to_id` message to read. Returns rows changed.
    pub fn mark_read(&self, from_id: i64, to_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET read = 1 WHERE from_id = ?1 AND to_id = ?2 AND read = 0",
                [from_id, to_id],
            )?;
            Ok(n)
        })
    }

    pub fn unread_count(&self, from_id: i64, to_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE from_id = ?1 AND to_id = ?2 AND read = 0",
                [from_id, to_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Undelivered messages for `to_id` from any sender, in insertion order.
    pub fn pending_for_recipient(&self, to_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE to_id = ?1 AND delivered = 0 ORDER BY id",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([to_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Both directions of one conversation, oldest first.
    pub fn history(&self, user_a: i64, user_b: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)
                 ORDER BY created_at ASC, id ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_a, user_b], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, email, profile_image_url FROM users WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
                profile_image_url: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
        delivered: row.get(5)?,
        read: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
