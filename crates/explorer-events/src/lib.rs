//! explorer-events crate
//!
//! Persisted contract-event subscriptions: each subscription owns one log
//! watch, decodes what it receives against known ABIs, and records matches
//! in a bounded event log.

pub mod decoder;
pub mod event_log;
pub mod notifier;
pub mod storage;
pub mod subscriptions;

pub use decoder::{AbiRegistry, DecodedArg, DecodedEvent, LogDecoder, RawDecoder};
pub use event_log::{EventLog, StoredEvent};
pub use notifier::{LogNotifier, Notifier, SilentNotifier};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use subscriptions::{
    EventSettings, Subscription, SubscriptionManager, SubscriptionOptions, SubscriptionUpdate,
};
