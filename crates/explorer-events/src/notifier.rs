//! Notification side effect for subscriptions with `notify_on_event`.

/// Delivers a short user-facing notification.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Drops every notification. Used in non-interactive contexts.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _body: &str) {}
}

/// Emits notifications as `info` log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(target: "explorer::notify", title, body, "event notification");
    }
}
