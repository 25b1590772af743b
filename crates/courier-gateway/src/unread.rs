use tracing::{debug, warn};

use courier_types::events::ServerEvent;
use courier_types::{CourierError, UserId};

use crate::directory::Directory;
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;
use crate::transport::ConnectionHandle;

/// Derives per-peer unread counts from the store and pushes them as badges.
///
/// Nothing is cached; every push reflects a fresh count. A full
/// [`recompute`](Self::recompute) scans every known user, which is fine for a
/// small directory and the first thing to replace if it grows.
#[derive(Clone)]
pub struct UnreadAggregator {
    store: MessageStore,
    directory: Directory,
    presence: PresenceRegistry,
}

impl UnreadAggregator {
    pub fn new(store: MessageStore, directory: Directory, presence: PresenceRegistry) -> Self {
        Self { store, directory, presence }
    }

    /// Push `{peerId, count}` for every other user to `target`, if online.
    /// Returns the number of counts pushed. A failed count is skipped.
    pub async fn recompute(&self, target: UserId) -> Result<usize, CourierError> {
        let Some(handle) = self.presence.connection_for(target).await else {
            debug!("recompute for {}: offline, nothing to push", target);
            return Ok(0);
        };

        let peers = self.directory.user_ids().await?;
        let mut pushed = 0;

        for peer in peers.into_iter().filter(|&p| p != target) {
            let count = match self.store.unread_count(peer, target).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("unread count {} -> {} failed: {}", peer, target, e);
                    continue;
                }
            };

            if handle.push(ServerEvent::UnreadCount { peer_id: peer, count }).is_err() {
                debug!("recompute for {}: connection closed mid-scan", target);
                break;
            }
            pushed += 1;
        }

        Ok(pushed)
    }

    /// Fresh count of unread `from -> to`, pushed to `to` if online.
    pub async fn recompute_pair(&self, from: UserId, to: UserId) -> Result<i64, CourierError> {
        let count = self.store.unread_count(from, to).await?;
        if let Some(handle) = self.presence.connection_for(to).await {
            let _ = handle.push(ServerEvent::UnreadCount { peer_id: from, count });
        }
        Ok(count)
    }

    /// On-demand count for one pair, answered only on the requester's own
    /// connection.
    pub async fn single_count(
        &self,
        from: UserId,
        to: UserId,
        requester: &ConnectionHandle,
    ) -> Result<i64, CourierError> {
        let count = self.store.unread_count(from, to).await?;
        let _ = requester.push(ServerEvent::UnreadCount { peer_id: from, count });
        Ok(count)
    }
}
