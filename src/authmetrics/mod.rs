//! # Usage metrics
//!
//! Last-authentication lookup for a credential. Absent is a first-class
//! answer, not an error: a provider that reports no activity in its
//! observable window means "assume not in use", and the rotation engine
//! treats absent as safe to disable.

mod azure;
mod gcp;

pub use azure::AzureUsageMetrics;
pub use gcp::GcpUsageMetrics;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::identity::IdentityKind;
use crate::keyops::Key;

/// Last-authentication source for credentials.
#[async_trait]
pub trait UsageMetrics: Send + Sync {
    /// When the key last authenticated, or None when the provider has no
    /// activity on record.
    async fn last_auth_time(&self, key: &Key) -> Result<Option<DateTime<Utc>>>;
}

/// Production dispatcher over the per-cloud sources.
pub struct CloudUsageMetrics {
    gcp: Arc<GcpUsageMetrics>,
    azure: Arc<AzureUsageMetrics>,
}

impl std::fmt::Debug for CloudUsageMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudUsageMetrics").finish_non_exhaustive()
    }
}

impl CloudUsageMetrics {
    #[must_use]
    pub fn new(gcp: Arc<GcpUsageMetrics>, azure: Arc<AzureUsageMetrics>) -> Self {
        Self { gcp, azure }
    }
}

#[async_trait]
impl UsageMetrics for CloudUsageMetrics {
    async fn last_auth_time(&self, key: &Key) -> Result<Option<DateTime<Utc>>> {
        match key.kind {
            IdentityKind::GcpServiceAccount => self.gcp.last_auth_time(key).await,
            IdentityKind::AzureServicePrincipal => self.azure.last_auth_time(key).await,
        }
    }
}
