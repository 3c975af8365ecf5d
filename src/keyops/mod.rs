//! # Key operations
//!
//! Create, disable, and delete credentials at the cloud providers. The
//! rotation engine sees one [`KeyOps`] contract over a tagged [`Key`];
//! dispatch to the per-cloud REST facades happens behind it.
//!
//! All provider round-trips retry rate-limited responses internally (see
//! [`crate::retry`]); every other error class surfaces immediately.

mod azure;
mod gcp;

pub use azure::AzureKeyClient;
pub use gcp::GcpKeyClient;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::identity::{Identity, IdentityKind};

/// Provider-side handle for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub kind: IdentityKind,
    pub scope: String,
    pub principal: String,
    pub id: String,
}

impl Key {
    #[must_use]
    pub fn for_identity(identity: &Identity, id: &str) -> Self {
        Self {
            kind: identity.kind(),
            scope: identity.scope().to_string(),
            principal: identity.principal().to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.principal, self.id)
    }
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub struct NewKey {
    pub key: Key,
    /// Serialized credential exactly as the provider returned it; the only
    /// form the core subsequently stores.
    pub serialized_value: String,
}

/// Credential lifecycle operations at the cloud provider.
#[async_trait]
pub trait KeyOps: Send + Sync {
    /// Issue a fresh credential for the identity.
    async fn create(&self, identity: &Identity) -> Result<NewKey>;

    /// Disable the key at the provider. Idempotent on already-disabled.
    async fn ensure_disabled(&self, key: &Key) -> Result<()>;

    /// Delete the key only if the provider reports it currently disabled.
    /// Idempotent on already-deleted.
    async fn delete_if_disabled(&self, key: &Key) -> Result<()>;
}

/// Production dispatcher over the per-cloud clients.
pub struct CloudKeyOps {
    gcp: Arc<GcpKeyClient>,
    azure: Arc<AzureKeyClient>,
}

impl std::fmt::Debug for CloudKeyOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudKeyOps").finish_non_exhaustive()
    }
}

impl CloudKeyOps {
    #[must_use]
    pub fn new(gcp: Arc<GcpKeyClient>, azure: Arc<AzureKeyClient>) -> Self {
        Self { gcp, azure }
    }
}

#[async_trait]
impl KeyOps for CloudKeyOps {
    async fn create(&self, identity: &Identity) -> Result<NewKey> {
        match identity {
            Identity::GcpServiceAccount { email, project } => {
                self.gcp.create_key(project, email).await
            }
            Identity::AzureServicePrincipal {
                application_id,
                tenant_id,
            } => self.azure.create_secret(tenant_id, application_id).await,
        }
    }

    async fn ensure_disabled(&self, key: &Key) -> Result<()> {
        match key.kind {
            IdentityKind::GcpServiceAccount => self.gcp.ensure_disabled(key).await,
            IdentityKind::AzureServicePrincipal => self.azure.ensure_disabled(key).await,
        }
    }

    async fn delete_if_disabled(&self, key: &Key) -> Result<()> {
        match key.kind {
            IdentityKind::GcpServiceAccount => self.gcp.delete_if_disabled(key).await,
            IdentityKind::AzureServicePrincipal => self.azure.delete_if_disabled(key).await,
        }
    }
}
