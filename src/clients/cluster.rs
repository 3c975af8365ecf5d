//! Cluster API facade.
//!
//! The one collaborator every core component shares: listing and mutating
//! cluster secrets (cache backing, replication targets) and listing the two
//! declaration kinds. The trait keeps the core testable against an in-memory
//! cluster; the production implementation is a thin layer over `kube::Api`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;

use crate::crd::{AzureClientSecret, GcpSaKey};

/// Field manager name for server-side apply.
const FIELD_MANAGER: &str = "yale";

/// Typed facade over the cluster control plane.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Secrets in one namespace matching a label selector.
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>>;

    /// Every secret in the cluster. Used once per run by the sink
    /// replicator's memoized existence check.
    async fn list_all_secrets(&self) -> Result<Vec<Secret>>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Server-side apply: create the secret or take ownership of the fields
    /// in `secret`, leaving fields set by other managers alone.
    async fn apply_secret(&self, secret: Secret) -> Result<()>;

    /// Delete a secret; deleting one that is already gone is not an error.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list_gcp_sa_keys(&self) -> Result<Vec<GcpSaKey>>;

    async fn list_azure_client_secrets(&self) -> Result<Vec<AzureClientSecret>>;
}

/// Production implementation over a shared `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        let params = ListParams::default().labels(label_selector);
        let list = self
            .secrets(namespace)
            .list(&params)
            .await
            .with_context(|| format!("listing secrets in {namespace}"))?;
        Ok(list.items)
    }

    async fn list_all_secrets(&self) -> Result<Vec<Secret>> {
        let api: Api<Secret> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("listing secrets across the cluster")?;
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.secrets(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("getting secret {namespace}/{name}"))
    }

    async fn apply_secret(&self, secret: Secret) -> Result<()> {
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();

        // An apply patch must carry apiVersion/kind; the typed Secret
        // serializes without them.
        let mut patch = serde_json::to_value(&secret)
            .with_context(|| format!("serializing secret {namespace}/{name}"))?;
        patch["apiVersion"] = serde_json::json!("v1");
        patch["kind"] = serde_json::json!("Secret");

        let patch_params = PatchParams::apply(FIELD_MANAGER).force();
        self.secrets(&namespace)
            .patch(&name, &patch_params, &Patch::Apply(patch))
            .await
            .with_context(|| format!("applying secret {namespace}/{name}"))?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting secret {namespace}/{name}")),
        }
    }

    async fn list_gcp_sa_keys(&self) -> Result<Vec<GcpSaKey>> {
        let api: Api<GcpSaKey> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("listing GcpSaKey declarations")?;
        Ok(list.items)
    }

    async fn list_azure_client_secrets(&self) -> Result<Vec<AzureClientSecret>> {
        let api: Api<AzureClientSecret> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("listing AzureClientSecret declarations")?;
        Ok(list.items)
    }
}
