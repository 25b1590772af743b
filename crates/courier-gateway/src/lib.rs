//! Delivery and unread-count engine behind the realtime gateway.
//!
//! Control flow for one client:
//! connect → `user-online` registers presence → queued messages are replayed
//! → unread counts are pushed. Sends persist first, then push live if the
//! recipient is online. Reads flip flags in the store and push the fresh
//! count. Counts are always re-derived from the store.

pub mod connection;
pub mod delivery;
pub mod directory;
pub mod presence;
pub mod store;
pub mod transport;
pub mod unread;

pub use delivery::{DeliveryEngine, DeliveryState, ReplayReport, SendOutcome};
pub use directory::Directory;
pub use presence::PresenceRegistry;
pub use store::MessageStore;
pub use transport::{ConnectionHandle, EventSink, PushError};
pub use unread::UnreadAggregator;

#[cfg(test)]
pub(crate) mod testutil;
