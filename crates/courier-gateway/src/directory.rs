use std::sync::Arc;

use courier_db::Database;
use courier_db::models::UserRow;
use courier_types::api::ContactResponse;
use courier_types::models::User;
use courier_types::{CourierError, UserId};

use crate::store::{parse_timestamp, run_blocking};

/// Read access to user identities owned by the external directory.
#[derive(Clone)]
pub struct Directory {
    db: Arc<Database>,
}

impl Directory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn user(&self, id: UserId) -> Result<Option<User>, CourierError> {
        let row = run_blocking(&self.db, move |db| db.get_user_by_id(id)).await?;
        Ok(row.map(user_from_row))
    }

    /// `"{first} {last}"`, or `None` if the user is gone.
    pub async fn display_name(&self, id: UserId) -> Result<Option<String>, CourierError> {
        Ok(self.user(id).await?.map(|u| u.display_name()))
    }

    pub async fn user_ids(&self) -> Result<Vec<UserId>, CourierError> {
        run_blocking(&self.db, |db| db.list_user_ids()).await
    }

    /// Point the user's avatar at `url`, or clear it. The image itself lives
    /// elsewhere. Returns the updated user, `None` if the id is unknown.
    pub async fn set_profile_image(&self, id: UserId, url: Option<String>) -> Result<Option<User>, CourierError> {
        let updated = run_blocking(&self.db, move |db| db.set_profile_image(id, url.as_deref())).await?;
        if !updated {
            return Ok(None);
        }
        self.user(id).await
    }

    pub async fn contacts(&self, viewer: UserId) -> Result<Vec<ContactResponse>, CourierError> {
        let rows = run_blocking(&self.db, move |db| db.list_contacts(viewer)).await?;
        Ok(rows
            .into_iter()
            .map(|r| ContactResponse {
                id: r.id,
                first_name: r.first_name,
                last_name: r.last_name,
                profile_image_url: r.profile_image_url,
                last_message_time: r.last_message_time.as_deref().map(|t| parse_timestamp(t, r.id)),
            })
            .collect())
    }
}

fn user_from_row(row: UserRow) -> User {
    User {
        id: row.id,
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        profile_image_url: row.profile_image_url,
    }
}
