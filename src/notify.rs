//! # Notifier
//!
//! Human-readable lifecycle events. Implementations must never fail the
//! run; anything that goes wrong delivering a notification is the
//! implementation's problem to log and swallow.

use async_trait::async_trait;

use crate::cache::Entry;

/// Sink for human-readable lifecycle events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn key_issued(&self, entry: &Entry, key_id: &str);
    async fn key_disabled(&self, entry: &Entry, key_id: &str);
    async fn key_deleted(&self, entry: &Entry, key_id: &str);
    async fn error(&self, entry: &Entry, message: &str);
}

/// Production default: structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn key_issued(&self, entry: &Entry, key_id: &str) {
        tracing::info!(
            principal = entry.principal(),
            key_id,
            "issued new credential"
        );
    }

    async fn key_disabled(&self, entry: &Entry, key_id: &str) {
        tracing::info!(principal = entry.principal(), key_id, "disabled credential");
    }

    async fn key_deleted(&self, entry: &Entry, key_id: &str) {
        tracing::info!(principal = entry.principal(), key_id, "deleted credential");
    }

    async fn error(&self, entry: &Entry, message: &str) {
        tracing::error!(principal = entry.principal(), "{}", message);
    }
}

/// Silent notifier for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn key_issued(&self, _entry: &Entry, _key_id: &str) {}
    async fn key_disabled(&self, _entry: &Entry, _key_id: &str) {}
    async fn key_deleted(&self, _entry: &Entry, _key_id: &str) {}
    async fn error(&self, _entry: &Entry, _message: &str) {}
}
