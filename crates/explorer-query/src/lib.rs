//! explorer-query crate
//!
//! Configuration, the keyed query client, and the [`Explorer`] context that
//! wires chain access, caches, head polling and subscriptions together.

pub mod config;
pub mod context;
pub mod query;

pub use config::ExplorerConfig;
pub use context::Explorer;
pub use query::{QueryClient, QueryKey, QueryPolicy};
