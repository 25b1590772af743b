use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use courier_types::events::ServerEvent;
use courier_types::models::Message;
use courier_types::{CourierError, UserId};

use crate::directory::Directory;
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;
use crate::transport::ConnectionHandle;
use crate::unread::UnreadAggregator;

/// Sender name used when the directory no longer knows the sender.
const UNKNOWN_SENDER: &str = "Unknown";

/// Lifecycle of one message on its way to the recipient.
///
/// Persisted as the `delivered` flag; `Delivered*` states map to `true`.
/// Delivered states are terminal: a later push attempt never moves a message
/// back to undelivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Persisted, no push attempted yet
    Created,
    /// Persisted, waiting for the recipient to come online
    Queued,
    /// Pushed to the recipient's live connection at send time
    LiveDelivered,
    /// Pushed while replaying the queue on reconnect
    DeliveredOnReconnect,
}

impl DeliveryState {
    /// Apply the result of one push attempt.
    pub fn on_push(self, accepted: bool) -> Self {
        match (self, accepted) {
            (Self::Created, true) => Self::LiveDelivered,
            (Self::Created, false) => Self::Queued,
            (Self::Queued, true) => Self::DeliveredOnReconnect,
            (Self::Queued, false) => Self::Queued,
            (delivered, _) => delivered,
        }
    }

    pub fn is_delivered(self) -> bool {
        matches!(self, Self::LiveDelivered | Self::DeliveredOnReconnect)
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    pub state: DeliveryState,
}

/// What one reconnect replay did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Pushed and marked delivered
    pub delivered: usize,
    /// Sender missing from the directory; left queued
    pub skipped: usize,
    /// Lookup or store failure; left queued. When the connection closes
    /// mid-replay, the message that failed and every one after it.
    pub failed: usize,
}

/// One async lock per recipient, serializing live pushes against replays.
#[derive(Clone, Default)]
struct RecipientLocks(Arc<Mutex<HashMap<UserId, Arc<Mutex<()>>>>>);

impl RecipientLocks {
    async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = self.0.lock().await.entry(user_id).or_default().clone();
        lock.lock_owned().await
    }
}

/// Decides per send whether a message goes out live or waits, and replays
/// the queue when a user comes back.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: MessageStore,
    directory: Directory,
    presence: PresenceRegistry,
    unread: UnreadAggregator,
    locks: RecipientLocks,
}

impl DeliveryEngine {
    pub fn new(store: MessageStore, directory: Directory, presence: PresenceRegistry) -> Self {
        let unread = UnreadAggregator::new(store.clone(), directory.clone(), presence.clone());
        Self { store, directory, presence, unread, locks: RecipientLocks::default() }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn unread(&self) -> &UnreadAggregator {
        &self.unread
    }

    /// Persist, then push live if the recipient is online.
    ///
    /// A persistence failure returns before anything is pushed. A push failure
    /// is indistinguishable from "offline": the message stays queued.
    pub async fn send(&self, sender: UserId, recipient: UserId, text: &str) -> Result<SendOutcome, CourierError> {
        let message = self.store.create(sender, recipient, text).await?;
        let outcome = self.deliver_live(message).await;
        debug!("message {} {} -> {}: {:?}", outcome.message.id, sender, recipient, outcome.state);

        self.recompute(recipient).await;
        if outcome.state.is_delivered() {
            if let Err(e) = self.unread.recompute_pair(sender, recipient).await {
                warn!("unread snapshot {} -> {} failed: {}", sender, recipient, e);
            }
        }

        Ok(outcome)
    }

    /// Push a freshly stored message to its recipient's live connection.
    ///
    /// Runs under the recipient's delivery lock, the same one a replay holds,
    /// so a message stored just before the recipient reconnects is pushed by
    /// exactly one of the two paths.
    async fn deliver_live(&self, mut message: Message) -> SendOutcome {
        let state = DeliveryState::Created;
        let Some(handle) = self.presence.connection_for(message.to).await else {
            return SendOutcome { message, state: state.on_push(false) };
        };

        let _guard = self.locks.acquire(message.to).await;
        match self.store.get(message.id).await {
            Ok(Some(stored)) if stored.delivered => {
                debug!("message {} already replayed, skipping live push", message.id);
                message.delivered = true;
                return SendOutcome { message, state: DeliveryState::Queued.on_push(true) };
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("message {} vanished before live push", message.id);
                return SendOutcome { message, state: state.on_push(false) };
            }
            Err(e) => {
                warn!("message {} left queued, flag check failed: {}", message.id, e);
                return SendOutcome { message, state: state.on_push(false) };
            }
        }

        let sender_name = self.sender_name(message.from).await;
        let accepted = handle
            .push(ServerEvent::NewMessage {
                text: message.text.clone(),
                from: message.from,
                sender_name,
            })
            .is_ok();
        let state = state.on_push(accepted);

        if state.is_delivered() {
            match self.store.mark_delivered(message.id).await {
                Ok(_) => message.delivered = true,
                Err(e) => error!("message {} pushed but not marked delivered: {}", message.id, e),
            }
        }

        SendOutcome { message, state }
    }

    /// Register `handle` as the user's connection and replay everything still
    /// queued for them, in send order. One bad message never stops the rest.
    pub async fn reconnect(&self, user_id: UserId, handle: ConnectionHandle) -> Result<ReplayReport, CourierError> {
        if let Some(old) = self.presence.set_online(user_id, handle.clone()).await {
            if old != handle {
                info!("user {} reconnected; connection {} orphaned", user_id, old.id());
            }
        }

        let report = {
            let _guard = self.locks.acquire(user_id).await;
            self.replay(user_id, &handle).await?
        };

        if report != ReplayReport::default() {
            info!(
                "replayed queue for {}: {} delivered, {} skipped, {} failed",
                user_id, report.delivered, report.skipped, report.failed
            );
        }

        self.recompute(user_id).await;
        Ok(report)
    }

    async fn replay(&self, user_id: UserId, handle: &ConnectionHandle) -> Result<ReplayReport, CourierError> {
        let pending = self.store.pending_for_recipient(user_id).await?;
        let total = pending.len();
        let mut report = ReplayReport::default();

        for (i, message) in pending.into_iter().enumerate() {
            let sender_name = match self.directory.display_name(message.from).await {
                Ok(Some(name)) => name,
                Ok(None) => {
                    debug!("replay {}: sender {} not in directory, skipping", message.id, message.from);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("replay {}: sender lookup failed: {}", message.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let accepted = handle
                .push(ServerEvent::NewMessage {
                    text: message.text,
                    from: message.from,
                    sender_name,
                })
                .is_ok();

            if !DeliveryState::Queued.on_push(accepted).is_delivered() {
                debug!("replay for {} stopped: connection closed", user_id);
                report.failed += total - i;
                break;
            }

            match self.store.mark_delivered(message.id).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    error!("replay {}: pushed but not marked delivered: {}", message.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// `to` has read everything `from` sent them. Pushes the cleared badge to `to`.
    pub async fn mark_read(&self, from: UserId, to: UserId) -> Result<usize, CourierError> {
        let changed = self.store.mark_read(from, to).await?;
        if let Err(e) = self.unread.recompute_pair(from, to).await {
            warn!("unread recompute {} -> {} failed: {}", from, to, e);
        }
        Ok(changed)
    }

    /// Drop presence for this connection. Leaves a newer connection alone.
    pub async fn disconnect(&self, user_id: UserId, handle: &ConnectionHandle) -> bool {
        self.presence.clear_if_matches(user_id, handle).await
    }

    async fn sender_name(&self, sender: UserId) -> String {
        match self.directory.display_name(sender).await {
            Ok(Some(name)) => name,
            Ok(None) => UNKNOWN_SENDER.to_string(),
            Err(e) => {
                warn!("sender {} lookup failed: {}", sender, e);
                UNKNOWN_SENDER.to_string()
            }
        }
    }

    async fn recompute(&self, target: UserId) {
        if let Err(e) = self.unread.recompute(target).await {
            warn!("unread recompute for {} failed: {}", target, e);
        }
    }
}
