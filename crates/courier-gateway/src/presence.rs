use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use courier_types::UserId;

use crate::transport::ConnectionHandle;

/// Which connection, if any, each user is reachable on.
///
/// At most one entry per user: the last `user-online` wins. Lives as long as
/// the server that created it; nothing is persisted.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional overwrite. Returns the orphaned handle, which is left open.
    pub async fn set_online(&self, user_id: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.inner.write().await.insert(user_id, handle)
    }

    pub async fn connection_for(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    /// Remove the entry only if it still points at `handle`, so a late
    /// disconnect from a stale connection cannot evict a newer one.
    pub async fn clear_if_matches(&self, user_id: UserId, handle: &ConnectionHandle) -> bool {
        let mut entries = self.inner.write().await;
        match entries.get(&user_id) {
            Some(current) if current == handle => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_disconnect_keeps_newer_entry() {
        let presence = PresenceRegistry::new();
        let (h1, _rx1) = ConnectionHandle::channel();
        let (h2, _rx2) = ConnectionHandle::channel();

        assert!(presence.set_online(7, h1.clone()).await.is_none());
        let replaced = presence.set_online(7, h2.clone()).await;
        assert_eq!(replaced, Some(h1.clone()));

        assert!(!presence.clear_if_matches(7, &h1).await);
        assert_eq!(presence.connection_for(7).await, Some(h2.clone()));

        assert!(presence.clear_if_matches(7, &h2).await);
        assert_eq!(presence.connection_for(7).await, None);
        assert_eq!(presence.online_count().await, 0);
    }

    #[tokio::test]
    async fn clear_other_user_is_noop() {
        let presence = PresenceRegistry::new();
        let (h1, _rx1) = ConnectionHandle::channel();
        presence.set_online(1, h1.clone()).await;

        assert!(!presence.clear_if_matches(2, &h1).await);
        assert_eq!(presence.online_count().await, 1);
    }
}
