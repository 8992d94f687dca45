//! Polling watches over a [`ChainReader`]: new chain heads and new logs.
//!
//! Each watch runs as one tokio task on a fixed interval. Errors are reported
//! to the caller's callback and the next tick simply tries again; there is no
//! backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chain::{ChainReader, LogFilter};
use crate::types::Log;

/// Default polling interval for watches.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(1000);

/// Disposer for a running watch. Stopping is idempotent; dropping stops too.
#[derive(Debug)]
pub struct WatchHandle {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self {
            task: Mutex::new(Some(task)),
        }
    }

    /// Runs `future` as a background task owned by the returned handle.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::new(tokio::spawn(future))
    }

    /// Stops the watch. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// True while the polling task is alive.
    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Polls `eth_blockNumber`, calling `on_number` only when the head changes.
///
/// The first poll happens immediately to establish the initial value.
pub fn watch_block_number<R, F, E>(
    reader: Arc<R>,
    polling_interval: Duration,
    on_number: F,
    on_error: E,
) -> WatchHandle
where
    R: ChainReader,
    F: Fn(u64) + Send + Sync + 'static,
    E: Fn(eyre::Report) + Send + Sync + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen: Option<u64> = None;

        loop {
            ticker.tick().await;
            match reader.get_block_number().await {
                Ok(number) if last_seen != Some(number) => {
                    last_seen = Some(number);
                    on_number(number);
                }
                Ok(_) => {}
                Err(e) => on_error(e),
            }
        }
    });

    WatchHandle::new(task)
}

/// Polls for logs matching `filter`'s address/topic in blocks mined after
/// the watch starts, delivering each non-empty batch to `on_logs`.
///
/// The block range of `filter` is ignored; the watch tracks its own cursor.
pub fn watch_events<R, F, E>(
    reader: Arc<R>,
    filter: LogFilter,
    polling_interval: Duration,
    on_logs: F,
    on_error: E,
) -> WatchHandle
where
    R: ChainReader,
    F: Fn(Vec<Log>) + Send + Sync + 'static,
    E: Fn(eyre::Report) + Send + Sync + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_from: Option<u64> = None;

        loop {
            ticker.tick().await;

            let head = match reader.get_block_number().await {
                Ok(head) => head,
                Err(e) => {
                    on_error(e);
                    continue;
                }
            };

            let Some(from) = next_from else {
                next_from = Some(head.saturating_add(1));
                continue;
            };
            if head < from {
                continue;
            }

            let range = LogFilter {
                from_block: from,
                to_block: head,
                ..filter.clone()
            };
            match reader.get_logs(&range).await {
                Ok(logs) => {
                    next_from = Some(head.saturating_add(1));
                    if !logs.is_empty() {
                        on_logs(logs);
                    }
                }
                // Cursor stays put so the same range is retried next tick.
                Err(e) => on_error(e),
            }
        }
    });

    WatchHandle::new(task)
}
