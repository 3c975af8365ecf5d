//! Cache store: persistence for entries inside the cluster itself.
//!
//! Each entry is backed by one opaque cluster secret in the configured cache
//! namespace, named `yale-cache-<principal>` and labeled so listing can
//! select on the label alone. A save replaces the full body of the backing
//! secret; the secret is the single source of truth between runs.

use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::entry::Entry;
use crate::clients::ClusterClient;
use crate::constants::{
    CACHE_LABEL_KEY, CACHE_SECRET_FIELD, CACHE_SECRET_PREFIX,
};
use crate::identity::Identity;

static ILLEGAL_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9.-]").expect("static regex"));

/// Name of the backing secret for a principal. Cluster secret names only
/// admit `[a-z0-9.-]`; anything else maps to `-`.
#[must_use]
pub fn backing_secret_name(principal: &str) -> String {
    let lowercase = principal.to_lowercase();
    let sanitized = ILLEGAL_NAME_CHARS.replace_all(&lowercase, "-");
    format!("{CACHE_SECRET_PREFIX}{sanitized}")
}

fn cache_label_selector() -> String {
    format!("{CACHE_LABEL_KEY}=true")
}

/// Persists one [`Entry`] per identity in the cluster's native secret store.
pub struct CacheStore {
    cluster: Arc<dyn ClusterClient>,
    namespace: String,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>, namespace: String) -> Self {
        Self { cluster, namespace }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// All entries with the cache label in the configured namespace.
    ///
    /// A malformed backing secret fails the whole listing: silently skipping
    /// one would look like a retired identity and eventually leak its keys.
    pub async fn list(&self) -> Result<Vec<Entry>> {
        let secrets = self
            .cluster
            .list_secrets(&self.namespace, &cache_label_selector())
            .await?;

        let mut entries = Vec::with_capacity(secrets.len());
        for secret in secrets {
            let name = secret.metadata.name.clone().unwrap_or_default();
            let entry = decode_entry(&secret)
                .with_context(|| format!("malformed cache secret {}/{name}", self.namespace))?;
            let expected = backing_secret_name(entry.principal());
            if name != expected {
                bail!(
                    "cache secret {}/{name} holds entry for {} (expected secret name {expected})",
                    self.namespace,
                    entry.principal()
                );
            }
            entries.push(entry);
        }
        debug!("listed {} cache entries", entries.len());
        Ok(entries)
    }

    /// Existing entry for the identity, or a freshly persisted empty one.
    pub async fn get_or_create(&self, identity: &Identity) -> Result<Entry> {
        let name = backing_secret_name(identity.principal());
        if let Some(secret) = self.cluster.get_secret(&self.namespace, &name).await? {
            return decode_entry(&secret)
                .with_context(|| format!("malformed cache secret {}/{name}", self.namespace));
        }

        info!("creating cache entry for {}", identity);
        let entry = Entry::new(identity.clone());
        let secret = backing_secret(&self.namespace, &name, &entry)?;
        self.cluster.apply_secret(secret).await?;
        Ok(entry)
    }

    /// Write the entry back to its backing secret, replacing the full body.
    ///
    /// Fails when the backing secret no longer exists: only `get_or_create`
    /// may bring one into being, so a missing secret means the caller broke
    /// the entry lifecycle. (Apply would happily resurrect it, hence the
    /// existence probe first.)
    pub async fn save(&self, entry: &Entry) -> Result<()> {
        let name = backing_secret_name(entry.principal());
        if self.cluster.get_secret(&self.namespace, &name).await?.is_none() {
            bail!(
                "cache secret {}/{name} for {} no longer exists; refusing to recreate it on save",
                self.namespace,
                entry.principal()
            );
        }

        let secret = backing_secret(&self.namespace, &name, entry)?;
        self.cluster.apply_secret(secret).await
    }

    /// Delete the entry's backing secret. Used only on retirement.
    pub async fn delete(&self, entry: &Entry) -> Result<()> {
        let name = backing_secret_name(entry.principal());
        info!("retiring cache entry for {}", entry.principal());
        self.cluster.delete_secret(&self.namespace, &name).await
    }
}

fn decode_entry(secret: &Secret) -> Result<Entry> {
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(CACHE_SECRET_FIELD))
        .context("missing 'value' field")?;
    serde_json::from_slice(&data.0).context("unparseable entry JSON")
}

fn backing_secret(namespace: &str, name: &str, entry: &Entry) -> Result<Secret> {
    let serialized = serde_json::to_vec(entry)
        .with_context(|| format!("serializing cache entry for {}", entry.principal()))?;
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret.metadata.labels = Some(BTreeMap::from([(
        CACHE_LABEL_KEY.to_string(),
        "true".to_string(),
    )]));
    secret.type_ = Some("Opaque".to_string());
    secret.data = Some(BTreeMap::from([(
        CACHE_SECRET_FIELD.to_string(),
        ByteString(serialized),
    )]));
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_secret_name_sanitizes() {
        assert_eq!(
            backing_secret_name("sa1@p.iam.gserviceaccount.com"),
            "yale-cache-sa1-p.iam.gserviceaccount.com"
        );
        assert_eq!(
            backing_secret_name("11111111-2222-3333-4444-555555555555"),
            "yale-cache-11111111-2222-3333-4444-555555555555"
        );
    }

    #[test]
    fn test_backing_secret_name_lowercases() {
        assert_eq!(backing_secret_name("SA_1@P.COM"), "yale-cache-sa-1-p.com");
    }

    #[test]
    fn test_label_selector_shape() {
        assert_eq!(cache_label_selector(), "yale.terra.bio/cache-entry=true");
    }
}
