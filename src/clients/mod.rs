//! # Collaborator clients
//!
//! Typed facades over the external APIs the core depends on. Each facade is
//! a narrow trait (so the core tests against in-memory fakes) plus one
//! production implementation speaking reqwest or kube.
//!
//! - `cluster` - cluster control plane (secrets + declaration listing)
//! - `gcp` / `azure` - OAuth token sources
//! - `vault` - Vault KV writes
//! - `secretmanager` - Google Secret Manager
//! - `github` - GitHub Actions repository secrets
//! - `error` - shared API error classification

pub mod azure;
pub mod cluster;
pub mod error;
pub mod gcp;
pub mod github;
pub mod secretmanager;
pub mod vault;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use cluster::{ClusterClient, KubeClusterClient};
pub use github::{GitHubClient, RepoSecretWriter};
pub use secretmanager::{GsmClient, SecretManagerApi};
pub use vault::{VaultClient, VaultWriter};

/// Stand-in for any sink whose credentials were not configured. Declarations
/// that never request the sink cost nothing; ones that do get a pointed
/// error instead of a connection failure.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredSink {
    missing: &'static str,
}

impl UnconfiguredSink {
    #[must_use]
    pub fn new(missing: &'static str) -> Self {
        Self { missing }
    }

    fn refuse(&self, what: &str) -> anyhow::Error {
        anyhow::anyhow!("{what} requested, but {} is not configured", self.missing)
    }
}

#[async_trait]
impl VaultWriter for UnconfiguredSink {
    async fn write_secret(&self, path: &str, _data: &BTreeMap<String, String>) -> Result<()> {
        Err(self.refuse(&format!("vault replication to {path}")))
    }
}

#[async_trait]
impl RepoSecretWriter for UnconfiguredSink {
    async fn put_secret(&self, org: &str, repo: &str, name: &str, _value: &[u8]) -> Result<()> {
        Err(self.refuse(&format!("github replication to {org}/{repo}/{name}")))
    }
}
