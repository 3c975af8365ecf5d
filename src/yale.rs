//! # Top-level run wiring
//!
//! [`Yale`] owns the collaborator facades and exposes the single `run`
//! entry point: build bundles, drive the rotation engine, report the
//! aggregated result. One call processes every declared identity exactly
//! once; scheduling repeated runs is the deployment's job.

use anyhow::Result;
use std::sync::Arc;

use crate::authmetrics::UsageMetrics;
use crate::cache::CacheStore;
use crate::clients::{ClusterClient, RepoSecretWriter, SecretManagerApi, VaultWriter};
use crate::config::Config;
use crate::keyops::KeyOps;
use crate::notify::Notifier;
use crate::replicate::Replicator;
use crate::resourcemap::Mapper;
use crate::rotate::Rotator;

/// The collaborator facades one run needs.
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterClient>,
    pub keyops: Arc<dyn KeyOps>,
    pub metrics: Arc<dyn UsageMetrics>,
    pub vault: Arc<dyn VaultWriter>,
    pub secret_manager: Arc<dyn SecretManagerApi>,
    pub repo_secrets: Arc<dyn RepoSecretWriter>,
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// The operator core.
#[derive(Debug)]
pub struct Yale {
    config: Config,
    collaborators: Collaborators,
}

impl Yale {
    #[must_use]
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// One run to completion. Healthy identities are processed even when
    /// others fail; the returned error aggregates every per-identity
    /// failure.
    pub async fn run(&self) -> Result<()> {
        let cache = Arc::new(CacheStore::new(
            Arc::clone(&self.collaborators.cluster),
            self.config.cache_namespace.clone(),
        ));

        let mapper = Mapper::new(Arc::clone(&self.collaborators.cluster), Arc::clone(&cache));
        let bundles = mapper.build().await?;

        // The replicator is per-run state: its memoized cluster-secret
        // listing must not outlive the run.
        let replicator = Replicator::new(
            Arc::clone(&self.collaborators.cluster),
            Arc::clone(&cache),
            Arc::clone(&self.collaborators.vault),
            Arc::clone(&self.collaborators.secret_manager),
            Arc::clone(&self.collaborators.repo_secrets),
        );
        let rotator = Rotator::new(
            cache,
            Arc::clone(&self.collaborators.keyops),
            Arc::clone(&self.collaborators.metrics),
            replicator,
            Arc::clone(&self.collaborators.notifier),
            self.config.error_notify_interval(),
        );

        rotator.run(bundles).await.map_err(Into::into)
    }
}
