use std::sync::Arc;

use courier_crypto::MessageCipher;
use courier_crypto::keys::generate_key;
use courier_db::Database;
use courier_types::UserId;
use courier_types::events::ServerEvent;
use tokio::sync::mpsc;

use crate::{DeliveryEngine, Directory, MessageStore, PresenceRegistry};

/// In-memory engine with three users: Ann (1), Bob (2), Cat (3).
pub(crate) struct Fixture {
    pub db: Arc<Database>,
    pub store: MessageStore,
    pub directory: Directory,
    pub presence: PresenceRegistry,
    pub engine: DeliveryEngine,
    pub ann: UserId,
    pub bob: UserId,
    pub cat: UserId,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = db.create_user("Ann", "Lee", "ann@example.com", None).unwrap();
        let bob = db.create_user("Bob", "Ray", "bob@example.com", None).unwrap();
        let cat = db.create_user("Cat", "Poe", "cat@example.com", None).unwrap();

        let store = MessageStore::new(db.clone(), MessageCipher::new(generate_key()));
        let directory = Directory::new(db.clone());
        let presence = PresenceRegistry::new();
        let engine = DeliveryEngine::new(store.clone(), directory.clone(), presence.clone());

        Self { db, store, directory, presence, engine, ann, bob, cat }
    }

    /// Remove a user row even though messages still reference it.
    pub fn delete_user(&self, id: UserId) {
        self.db
            .with_conn(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
                conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            })
            .unwrap();
    }
}

/// Everything currently queued on a connection's receiver.
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
