//! Azure usage metrics.
//!
//! Microsoft Graph exposes no per-credential last-used signal for
//! application password credentials, so the answer is always absent. The
//! engine treats absent as "assume not in use", which matches the only
//! guarantee Azure gives: a removed secret stops working immediately, and
//! the disable-after window is the operator's grace period.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::keyops::Key;

/// Constant-absent usage source for Azure service principals.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureUsageMetrics;

impl AzureUsageMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub(super) async fn last_auth_time(&self, key: &Key) -> Result<Option<DateTime<Utc>>> {
        debug!(
            "no usage-metrics source for client secret {}; reporting no activity",
            key
        );
        Ok(None)
    }
}
