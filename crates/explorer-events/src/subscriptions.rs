//! Named, persisted log-watch subscriptions.
//!
//! A subscription is `enabled` exactly when it owns one live log watch.
//! Records, the event log, settings and pinned ids are persisted through
//! [`Storage`] as whole tables.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use explorer_data::watch::watch_events;
use explorer_data::{ChainReader, Log, LogFilter, WatchHandle};
use eyre::{eyre, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::decoder::LogDecoder;
use crate::event_log::{EventLog, StoredEvent, DEFAULT_MAX_EVENTS};
use crate::notifier::Notifier;
use crate::storage::{
    load_table, save_table, Storage, EVENTS_KEY, PINNED_KEY, SETTINGS_KEY, SUBSCRIPTIONS_KEY,
};

const LISTENER_CAPACITY: usize = 256;

/// Persisted subscription record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    /// Contract to watch; every contract when `None`.
    pub address: Option<Address>,
    /// Case-insensitive decoded event name filter.
    pub event_name: Option<String>,
    pub enabled: bool,
    pub notify_on_event: bool,
    pub contract_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub event_count: u64,
}

impl Subscription {
    /// True when a decoded-or-raw log passes this subscription's name filter.
    ///
    /// Without a filter everything passes, including undecodable logs.
    pub fn accepts(&self, event_name: Option<&str>) -> bool {
        match (&self.event_name, event_name) {
            (None, _) => true,
            (Some(wanted), Some(name)) => wanted.eq_ignore_ascii_case(name),
            (Some(_), None) => false,
        }
    }
}

/// Input to [`SubscriptionManager::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// `0x`-prefixed contract address.
    pub address: Option<String>,
    pub event_name: Option<String>,
    pub enabled: bool,
    pub notify_on_event: bool,
    pub contract_name: Option<String>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            address: None,
            event_name: None,
            enabled: true,
            notify_on_event: false,
            contract_name: None,
        }
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub event_name: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub notify_on_event: Option<bool>,
    pub contract_name: Option<Option<String>>,
}

/// User settings for the event subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSettings {
    pub notifications_enabled: bool,
    pub max_events: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

type SubscriptionTable = BTreeMap<String, Subscription>;

/// Owns every subscription's watch and the persisted event state.
pub struct SubscriptionManager<R> {
    reader: Arc<R>,
    storage: Arc<dyn Storage>,
    decoder: Arc<dyn LogDecoder>,
    notifier: Arc<dyn Notifier>,
    polling_interval: Duration,
    watches: DashMap<String, WatchHandle>,
    // Serializes read-merge-write cycles on the persisted tables.
    tables: Mutex<()>,
    listeners: broadcast::Sender<StoredEvent>,
    next_id: AtomicU64,
    this: Weak<Self>,
}

impl<R: ChainReader> SubscriptionManager<R> {
    pub fn new(
        reader: Arc<R>,
        storage: Arc<dyn Storage>,
        decoder: Arc<dyn LogDecoder>,
        notifier: Arc<dyn Notifier>,
        polling_interval: Duration,
    ) -> Arc<Self> {
        let (listeners, _) = broadcast::channel(LISTENER_CAPACITY);
        Arc::new_cyclic(|this| Self {
            reader,
            storage,
            decoder,
            notifier,
            polling_interval,
            watches: DashMap::new(),
            tables: Mutex::new(()),
            listeners,
            next_id: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Creates and persists a subscription, starting its watch when enabled.
    ///
    /// # Errors
    /// Returns error if the address is malformed or storage fails.
    #[tracing::instrument(skip_all, fields(address = ?options.address, event = ?options.event_name))]
    pub fn subscribe(&self, options: SubscriptionOptions) -> Result<Subscription> {
        let address = options
            .address
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<Address>()
                    .map_err(|e| eyre!("malformed contract address {raw:?}: {e}"))
            })
            .transpose()?;

        let created_at = Utc::now();
        let subscription = Subscription {
            id: format!(
                "sub_{}_{}",
                created_at.timestamp_millis(),
                self.next_id.fetch_add(1, Ordering::Relaxed)
            ),
            address,
            event_name: options.event_name.filter(|name| !name.trim().is_empty()),
            enabled: options.enabled,
            notify_on_event: options.notify_on_event,
            contract_name: options.contract_name,
            created_at,
            last_event_at: None,
            event_count: 0,
        };

        {
            let _guard = self.tables.lock();
            let mut table: SubscriptionTable = load_table(&*self.storage, SUBSCRIPTIONS_KEY)?;
            table.insert(subscription.id.clone(), subscription.clone());
            save_table(&*self.storage, SUBSCRIPTIONS_KEY, &table)?;

            if subscription.enabled {
                self.start_watch(&subscription);
            }
        }
        tracing::info!(subscription_id = %subscription.id, "subscription created");

        Ok(subscription)
    }

    /// Merges `update` into a subscription. Returns `None` for unknown ids.
    ///
    /// Only a change of `enabled` starts or stops the live watch. The watch
    /// transition happens under the table lock, so it cannot interleave with
    /// a concurrent delete.
    pub fn update_subscription(
        &self,
        id: &str,
        update: SubscriptionUpdate,
    ) -> Result<Option<Subscription>> {
        let _guard = self.tables.lock();
        let mut table: SubscriptionTable = load_table(&*self.storage, SUBSCRIPTIONS_KEY)?;
        let Some(subscription) = table.get_mut(id) else {
            return Ok(None);
        };

        let before = subscription.enabled;
        if let Some(event_name) = update.event_name {
            subscription.event_name = event_name;
        }
        if let Some(enabled) = update.enabled {
            subscription.enabled = enabled;
        }
        if let Some(notify) = update.notify_on_event {
            subscription.notify_on_event = notify;
        }
        if let Some(contract_name) = update.contract_name {
            subscription.contract_name = contract_name;
        }
        let after = subscription.clone();
        save_table(&*self.storage, SUBSCRIPTIONS_KEY, &table)?;

        match (before, after.enabled) {
            (false, true) => self.start_watch(&after),
            (true, false) => self.stop_watch(id),
            _ => {}
        }

        Ok(Some(after))
    }

    /// Stops the watch, then removes the record. Returns false for unknown ids.
    pub fn delete_subscription(&self, id: &str) -> Result<bool> {
        let _guard = self.tables.lock();
        self.stop_watch(id);

        let mut table: SubscriptionTable = load_table(&*self.storage, SUBSCRIPTIONS_KEY)?;
        let removed = table.remove(id).is_some();
        if removed {
            save_table(&*self.storage, SUBSCRIPTIONS_KEY, &table)?;
            tracing::info!(subscription_id = id, "subscription deleted");
        }
        Ok(removed)
    }

    pub fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        let mut table: SubscriptionTable = load_table(&*self.storage, SUBSCRIPTIONS_KEY)?;
        Ok(table.remove(id))
    }

    /// All subscriptions, oldest first.
    pub fn get_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let table: SubscriptionTable = load_table(&*self.storage, SUBSCRIPTIONS_KEY)?;
        let mut subscriptions: Vec<Subscription> = table.into_values().collect();
        subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(subscriptions)
    }

    /// Starts watches for every enabled subscription (resume). Returns how many run.
    ///
    /// Watches that are already running keep going, along with their log cursor.
    pub fn start_all(&self) -> Result<usize> {
        let _guard = self.tables.lock();
        let subscriptions = self.get_all_subscriptions()?;
        for subscription in subscriptions.iter().filter(|s| s.enabled) {
            if !self.is_watching(&subscription.id) {
                self.start_watch(subscription);
            }
        }
        Ok(self.active_watch_count())
    }

    /// Stops every live watch (pause). Records keep their `enabled` flag.
    pub fn stop_all(&self) {
        let ids: Vec<String> = self.watches.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.stop_watch(&id);
        }
    }

    pub fn active_watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.watches.contains_key(id)
    }

    /// Receiver for every event delivered to any subscription.
    pub fn listen(&self) -> broadcast::Receiver<StoredEvent> {
        self.listeners.subscribe()
    }

    /// Decodes, filters, records and fans out a batch of logs for one subscription.
    ///
    /// Returns the number of events delivered. A batch with no matching logs,
    /// or one for a subscription that no longer exists, changes nothing.
    pub fn handle_logs(&self, subscription_id: &str, logs: Vec<Log>) -> Result<usize> {
        let _guard = self.tables.lock();
        let mut table: SubscriptionTable = load_table(&*self.storage, SUBSCRIPTIONS_KEY)?;
        let Some(subscription) = table.get_mut(subscription_id) else {
            tracing::debug!(subscription_id, "logs for removed subscription dropped");
            return Ok(0);
        };

        let received_at = Utc::now();
        let events: Vec<StoredEvent> = logs
            .into_iter()
            .filter_map(|log| {
                let decoded = self.decoder.decode(&log);
                if !subscription.accepts(decoded.as_ref().map(|event| event.name.as_str())) {
                    return None;
                }
                let contract_name = subscription
                    .contract_name
                    .clone()
                    .or_else(|| self.decoder.contract_name(&log.address));
                Some(StoredEvent::new(
                    subscription_id,
                    contract_name,
                    received_at,
                    log,
                    decoded,
                ))
            })
            .collect();

        if events.is_empty() {
            return Ok(0);
        }

        subscription.last_event_at = Some(received_at);
        subscription.event_count += events.len() as u64;
        let subscription = subscription.clone();
        save_table(&*self.storage, SUBSCRIPTIONS_KEY, &table)?;

        let settings: EventSettings = load_table(&*self.storage, SETTINGS_KEY)?;
        let mut log: EventLog = load_table(&*self.storage, EVENTS_KEY)?;
        log.record(events.clone(), settings.max_events);
        save_table(&*self.storage, EVENTS_KEY, &log)?;

        for event in &events {
            // No receivers is fine.
            let _ = self.listeners.send(event.clone());
        }

        if subscription.notify_on_event && settings.notifications_enabled {
            let source = subscription
                .contract_name
                .clone()
                .or_else(|| subscription.address.map(|a| a.to_string()))
                .unwrap_or_else(|| "any contract".to_string());
            let name = events[0].event_name().unwrap_or("log");
            let body = if events.len() == 1 {
                format!("{name} from {source}")
            } else {
                format!("{name} and {} more from {source}", events.len() - 1)
            };
            self.notifier.notify("New contract event", &body);
        }

        tracing::debug!(subscription_id, delivered = events.len(), "events delivered");
        Ok(events.len())
    }

    /// Stored events, newest first.
    pub fn events(&self) -> Result<Vec<StoredEvent>> {
        let log: EventLog = load_table(&*self.storage, EVENTS_KEY)?;
        Ok(log.iter().cloned().collect())
    }

    pub fn events_for(&self, subscription_id: &str) -> Result<Vec<StoredEvent>> {
        let log: EventLog = load_table(&*self.storage, EVENTS_KEY)?;
        Ok(log
            .iter()
            .filter(|event| event.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    pub fn clear_events(&self) -> Result<()> {
        let _guard = self.tables.lock();
        save_table(&*self.storage, EVENTS_KEY, &EventLog::default())
    }

    pub fn pin_event(&self, event_id: &str) -> Result<()> {
        let _guard = self.tables.lock();
        let mut pinned: BTreeSet<String> = load_table(&*self.storage, PINNED_KEY)?;
        if pinned.insert(event_id.to_string()) {
            save_table(&*self.storage, PINNED_KEY, &pinned)?;
        }
        Ok(())
    }

    pub fn unpin_event(&self, event_id: &str) -> Result<()> {
        let _guard = self.tables.lock();
        let mut pinned: BTreeSet<String> = load_table(&*self.storage, PINNED_KEY)?;
        if pinned.remove(event_id) {
            save_table(&*self.storage, PINNED_KEY, &pinned)?;
        }
        Ok(())
    }

    /// Pinned events still present in the log, newest first.
    pub fn pinned_events(&self) -> Result<Vec<StoredEvent>> {
        let pinned: BTreeSet<String> = load_table(&*self.storage, PINNED_KEY)?;
        Ok(self
            .events()?
            .into_iter()
            .filter(|event| pinned.contains(&event.id))
            .collect())
    }

    pub fn settings(&self) -> Result<EventSettings> {
        load_table(&*self.storage, SETTINGS_KEY)
    }

    /// Persists new settings, trimming the event log if `max_events` shrank.
    pub fn update_settings(&self, settings: EventSettings) -> Result<()> {
        let _guard = self.tables.lock();
        save_table(&*self.storage, SETTINGS_KEY, &settings)?;

        let mut log: EventLog = load_table(&*self.storage, EVENTS_KEY)?;
        if log.len() > settings.max_events {
            log.truncate(settings.max_events);
            save_table(&*self.storage, EVENTS_KEY, &log)?;
        }
        Ok(())
    }

    /// Replaces any existing watch for this subscription with a fresh one.
    fn start_watch(&self, subscription: &Subscription) {
        self.stop_watch(&subscription.id);

        let filter = LogFilter {
            address: subscription.address,
            ..LogFilter::default()
        };
        let manager = self.this.clone();
        let id = subscription.id.clone();
        let error_id = subscription.id.clone();

        let handle = watch_events(
            Arc::clone(&self.reader),
            filter,
            self.polling_interval,
            move |logs| {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                if let Err(e) = manager.handle_logs(&id, logs) {
                    tracing::warn!(subscription_id = %id, error = %e, "failed to handle logs");
                }
            },
            move |e| {
                tracing::warn!(subscription_id = %error_id, error = %e, "log watch poll failed");
            },
        );

        self.watches.insert(subscription.id.clone(), handle);
        tracing::debug!(subscription_id = %subscription.id, "watch started");
    }

    fn stop_watch(&self, id: &str) {
        if let Some((_, handle)) = self.watches.remove(id) {
            handle.stop();
            tracing::debug!(subscription_id = id, "watch stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(event_name: Option<&str>) -> Subscription {
        Subscription {
            id: "sub_1".to_string(),
            address: None,
            event_name: event_name.map(str::to_string),
            enabled: true,
            notify_on_event: false,
            contract_name: None,
            created_at: Utc::now(),
            last_event_at: None,
            event_count: 0,
        }
    }

    #[test]
    fn name_filter_is_case_insensitive_exact() {
        let sub = subscription(Some("transfer"));
        assert!(sub.accepts(Some("Transfer")));
        assert!(!sub.accepts(Some("TransferBatch")));
        assert!(!sub.accepts(Some("Approval")));
        assert!(!sub.accepts(None));
    }

    #[test]
    fn no_filter_accepts_undecoded() {
        let sub = subscription(None);
        assert!(sub.accepts(Some("Approval")));
        assert!(sub.accepts(None));
    }
}
