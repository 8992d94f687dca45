//! Bounded, newest-first log of events received by subscriptions.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use explorer_data::Log;
use serde::{Deserialize, Serialize};

use crate::decoder::DecodedEvent;

/// Default maximum number of stored events.
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// A raw or decoded log as delivered to a subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: String,
    pub subscription_id: String,
    pub contract_name: Option<String>,
    pub received_at: DateTime<Utc>,
    pub log: Log,
    /// `None` when no known ABI matched the log.
    pub decoded: Option<DecodedEvent>,
}

impl StoredEvent {
    pub fn new(
        subscription_id: &str,
        contract_name: Option<String>,
        received_at: DateTime<Utc>,
        log: Log,
        decoded: Option<DecodedEvent>,
    ) -> Self {
        let tx = log
            .transaction_hash
            .map(|hash| hash.to_string())
            .unwrap_or_else(|| "pending".to_string());
        let index = log.log_index.unwrap_or_default();
        Self {
            id: format!("{subscription_id}:{tx}:{index}"),
            subscription_id: subscription_id.to_string(),
            contract_name,
            received_at,
            log,
            decoded,
        }
    }

    /// Decoded event name, if decoding succeeded.
    pub fn event_name(&self) -> Option<&str> {
        self.decoded.as_ref().map(|event| event.name.as_str())
    }
}

/// Ring buffer of [`StoredEvent`]s, newest first. Overflow drops the oldest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: VecDeque<StoredEvent>,
}

impl EventLog {
    /// Records a batch that arrived together. The batch's own order is
    /// preserved; the whole batch lands ahead of older events.
    pub fn record(&mut self, batch: Vec<StoredEvent>, capacity: usize) {
        for event in batch.into_iter().rev() {
            self.events.push_front(event);
        }
        self.events.truncate(capacity);
    }

    pub fn truncate(&mut self, capacity: usize) {
        self.events.truncate(capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
