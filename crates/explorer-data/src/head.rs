//! Shared chain-head tracking.
//!
//! One [`HeadPoller`] owns at most one `eth_blockNumber` polling loop. Any
//! number of consumers subscribe to it; they all observe the same values and
//! are woken only when the head actually changes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::chain::ChainReader;
use crate::watch::{watch_block_number, WatchHandle};

/// Shared `eth_blockNumber` poller.
///
/// The loop starts lazily on the first [`HeadPoller::subscribe`] and keeps
/// running until [`HeadPoller::stop`]. Every [`HeadWatch`] it hands out
/// reads from the same channel.
///
/// # Example
/// ```no_run
/// # use std::{sync::Arc, time::Duration};
/// # use explorer_data::{HeadPoller, RpcChainReader};
/// # async fn example() -> eyre::Result<()> {
/// let reader = Arc::new(RpcChainReader::connect("http://127.0.0.1:8545").await?);
/// let poller = HeadPoller::new(reader, Duration::from_secs(2));
/// let mut heads = poller.subscribe();
/// while let Some(head) = heads.next().await {
///     println!("new head {head}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct HeadPoller<R> {
    reader: Arc<R>,
    polling_interval: Duration,
    sender: Arc<watch::Sender<Option<u64>>>,
    handle: Mutex<Option<WatchHandle>>,
}

impl<R: ChainReader> HeadPoller<R> {
    /// Creates an idle poller. Nothing is polled until the first subscriber.
    ///
    /// # Arguments
    /// * `reader` - Chain access used for `eth_blockNumber`
    /// * `polling_interval` - Delay between polls
    pub fn new(reader: Arc<R>, polling_interval: Duration) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            reader,
            polling_interval,
            sender: Arc::new(sender),
            handle: Mutex::new(None),
        }
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Subscribes to head changes, starting the shared loop if it is not running.
    pub fn subscribe(&self) -> HeadWatch {
        self.ensure_running();
        HeadWatch {
            receiver: self.sender.subscribe(),
            last_returned: None,
        }
    }

    /// Last head observed by the loop, if any.
    pub fn latest(&self) -> Option<u64> {
        *self.sender.borrow()
    }

    /// True while the shared loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(WatchHandle::is_active)
    }

    fn ensure_running(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(WatchHandle::is_active) {
            return;
        }

        let sender = Arc::clone(&self.sender);
        let watch = watch_block_number(
            Arc::clone(&self.reader),
            self.polling_interval,
            move |number| {
                sender.send_if_modified(|current| {
                    if *current == Some(number) {
                        false
                    } else {
                        *current = Some(number);
                        true
                    }
                });
            },
            |e| tracing::warn!(error = %e, "head poll failed"),
        );
        tracing::debug!(interval_ms = self.polling_interval.as_millis() as u64, "head poller started");
        *handle = Some(watch);
    }

    /// Stops the shared loop. Idempotent; a later `subscribe` restarts it.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.stop();
            tracing::debug!("head poller stopped");
        }
    }
}

/// Receiving side of a [`HeadPoller`] subscription.
#[derive(Clone, Debug)]
pub struct HeadWatch {
    receiver: watch::Receiver<Option<u64>>,
    last_returned: Option<u64>,
}

impl HeadWatch {
    /// Waits for the next head value not yet returned by this watch.
    ///
    /// The first call returns the current head as soon as one is known.
    /// Returns `None` once the poller has been dropped.
    pub async fn next(&mut self) -> Option<u64> {
        loop {
            let current = *self.receiver.borrow_and_update();
            if current.is_some() && current != self.last_returned {
                self.last_returned = current;
                return current;
            }
            self.receiver.changed().await.ok()?;
        }
    }

    /// Latest value without waiting.
    pub fn current(&self) -> Option<u64> {
        *self.receiver.borrow()
    }
}
