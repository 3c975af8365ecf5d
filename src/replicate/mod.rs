//! # Sink replicator
//!
//! Fans the current credential out to every sink every declaration names,
//! skipping work that matches a prior successful sync. The sync-needed
//! signal couples two things: a fingerprint over the declaration spec and
//! the current key id (so a spec edit or a rotation forces a resync), and
//! the existence of the target cluster secret (so a manual delete heals on
//! the next run even when the fingerprint still matches).
//!
//! One instance lives for one run: the cluster-wide secret listing backing
//! the existence check is memoized under a mutex for the run's duration.

mod cluster_secret;
mod format;
mod github;
mod secret_manager;
mod vault;

pub use format::{extract_pem, scalar_value, vault_payload, wrapped_scalar_payload};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheStore, Entry};
use crate::clients::{ClusterClient, RepoSecretWriter, SecretManagerApi, VaultWriter};
use crate::crd::SinkKind;
use crate::resourcemap::Declaration;

/// Sync-status value for a declaration spec + current key pair:
/// `<sha256-hex-of-spec>:<keyID>`.
#[must_use]
pub fn fingerprint(spec_json: &str, key_id: &str) -> String {
    let digest = Sha256::digest(spec_json.as_bytes());
    let mut rendered = String::with_capacity(digest.len() * 2 + key_id.len() + 1);
    for byte in digest {
        let _ = write!(rendered, "{byte:02x}");
    }
    rendered.push(':');
    rendered.push_str(key_id);
    rendered
}

/// Replicates current credentials to declared sinks, tracking per-declaration
/// sync state in the cache entry.
pub struct Replicator {
    cluster: Arc<dyn ClusterClient>,
    cache: Arc<CacheStore>,
    vault: Arc<dyn VaultWriter>,
    secret_manager: Arc<dyn SecretManagerApi>,
    repo_secrets: Arc<dyn RepoSecretWriter>,
    known_secrets: Mutex<Option<HashSet<(String, String)>>>,
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator").finish_non_exhaustive()
    }
}

impl Replicator {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        cache: Arc<CacheStore>,
        vault: Arc<dyn VaultWriter>,
        secret_manager: Arc<dyn SecretManagerApi>,
        repo_secrets: Arc<dyn RepoSecretWriter>,
    ) -> Self {
        Self {
            cluster,
            cache,
            vault,
            secret_manager,
            repo_secrets,
            known_secrets: Mutex::new(None),
        }
    }

    /// Ensure the entry's current credential is present at every sink of
    /// every declaration, then prune sync records for declarations that no
    /// longer exist. Persists the entry whenever its sync status changed,
    /// including before surfacing a sink failure.
    pub async fn sync_if_needed(
        &self,
        entry: &mut Entry,
        declarations: &[Declaration],
    ) -> Result<()> {
        let mut changed = false;

        if !entry.current_key.is_empty() {
            for declaration in declarations {
                match self.sync_declaration(entry, declaration).await {
                    Ok(true) => changed = true,
                    Ok(false) => {}
                    Err(err) => {
                        // Record the declarations that did land before
                        // surfacing; their sinks are current and must not be
                        // replayed next run.
                        if changed {
                            let _ = self.cache.save(entry).await;
                        }
                        return Err(err);
                    }
                }
            }
        }

        // Sync records for declarations not seen in this call belong to
        // deleted declarations; without pruning, churny environments grow
        // the entry past the backing secret's size ceiling.
        let declared: HashSet<String> = declarations
            .iter()
            .map(Declaration::qualified_name)
            .collect();
        let before = entry.sync_status.len();
        entry.sync_status.retain(|name, _| declared.contains(name));
        if entry.sync_status.len() != before {
            debug!(
                "pruned {} stale sync records for {}",
                before - entry.sync_status.len(),
                entry.principal()
            );
            changed = true;
        }

        if changed {
            self.cache.save(entry).await?;
        }
        Ok(())
    }

    /// Sync one declaration if needed. Returns whether anything was written.
    async fn sync_declaration(
        &self,
        entry: &mut Entry,
        declaration: &Declaration,
    ) -> Result<bool> {
        let qualified_name = declaration.qualified_name();
        let desired = fingerprint(&declaration.spec_json, &entry.current_key.id);

        let secret_present = self
            .target_secret_exists(&declaration.namespace, &declaration.secret.name)
            .await?;
        if secret_present && entry.sync_status.get(&qualified_name) == Some(&desired) {
            debug!("sync of {} already current, skipping", qualified_name);
            return Ok(false);
        }

        info!(
            "syncing {} for declaration {}",
            entry.principal(),
            qualified_name
        );
        cluster_secret::sync(self.cluster.as_ref(), declaration, entry)
            .await
            .with_context(|| format!("syncing cluster secret for {qualified_name}"))?;

        for target in &declaration.replications {
            match target.kind {
                SinkKind::Vault => vault::sync(self.vault.as_ref(), target, entry).await,
                SinkKind::SecretManager => {
                    secret_manager::sync(self.secret_manager.as_ref(), target, entry).await
                }
                SinkKind::Github => github::sync(self.repo_secrets.as_ref(), target, entry).await,
            }
            .with_context(|| {
                format!(
                    "replicating {} to {} sink {}",
                    entry.principal(),
                    target.kind.as_str(),
                    target.address
                )
            })?;
        }

        entry.sync_status.insert(qualified_name, desired);
        Ok(true)
    }

    /// Existence check against a cluster-wide listing taken once per run.
    async fn target_secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut known = self.known_secrets.lock().await;
        if known.is_none() {
            let listed = self
                .cluster
                .list_all_secrets()
                .await
                .context("listing cluster secrets for sync checks")?;
            *known = Some(
                listed
                    .into_iter()
                    .filter_map(|secret| {
                        Some((secret.metadata.namespace?, secret.metadata.name?))
                    })
                    .collect(),
            );
        }
        Ok(known
            .as_ref()
            .is_some_and(|set| set.contains(&(namespace.to_string(), name.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::fingerprint;

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint("{\"a\":1}", "key-123");
        let (digest, key) = fp.split_once(':').unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, "key-123");
    }

    #[test]
    fn test_fingerprint_tracks_spec_and_key() {
        let base = fingerprint("{}", "k1");
        assert_eq!(base, fingerprint("{}", "k1"));
        assert_ne!(base, fingerprint("{\"changed\":true}", "k1"));
        assert_ne!(base, fingerprint("{}", "k2"));
    }
}
