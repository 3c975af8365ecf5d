//! # Rotation engine
//!
//! Drives every bundle through the credential lifecycle:
//! issue -> rotate -> replicate -> disable -> delete -> retire.
//!
//! A key id moves through five positions inside an entry (absent, current,
//! rotated, disabled, absent again) and never backwards. Every state change
//! is written through to the cache before the engine moves on, so an
//! interrupted run resumes exactly where it stopped.
//!
//! Per-bundle failures never abort the run: the engine finishes the healthy
//! bundles and returns one aggregated error naming every identity that
//! failed.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::authmetrics::UsageMetrics;
use crate::cache::{CacheStore, Entry};
use crate::cutoff::Cutoffs;
use crate::keyops::{Key, KeyOps};
use crate::notify::Notifier;
use crate::replicate::Replicator;
use crate::resourcemap::{Bundle, Declaration};

/// Aggregated per-identity failures from one run.
#[derive(Debug)]
pub struct RunFailures {
    failures: Vec<(String, String)>,
}

impl std::error::Error for RunFailures {}

impl RunFailures {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for RunFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} identities failed:", self.failures.len())?;
        for (principal, message) in &self.failures {
            writeln!(f, "  {principal}: {message}")?;
        }
        Ok(())
    }
}

/// The per-bundle state machine plus run-level error aggregation.
pub struct Rotator {
    cache: Arc<CacheStore>,
    keyops: Arc<dyn KeyOps>,
    metrics: Arc<dyn UsageMetrics>,
    replicator: Replicator,
    notifier: Arc<dyn Notifier>,
    error_notify_interval: chrono::Duration,
}

impl fmt::Debug for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotator").finish_non_exhaustive()
    }
}

impl Rotator {
    #[must_use]
    pub fn new(
        cache: Arc<CacheStore>,
        keyops: Arc<dyn KeyOps>,
        metrics: Arc<dyn UsageMetrics>,
        replicator: Replicator,
        notifier: Arc<dyn Notifier>,
        error_notify_interval: chrono::Duration,
    ) -> Self {
        Self {
            cache,
            keyops,
            metrics,
            replicator,
            notifier,
            error_notify_interval,
        }
    }

    /// Process every bundle, returning the aggregated failures (if any) once
    /// all of them have had their turn.
    pub async fn run(&self, mut bundles: Vec<Bundle>) -> Result<(), RunFailures> {
        let total = bundles.len();
        let mut failures = Vec::new();

        for bundle in &mut bundles {
            let principal = bundle.entry.principal().to_string();
            match self.process_bundle(bundle).await {
                Ok(()) => {
                    let retired = bundle.declarations.is_empty() && bundle.entry.is_empty();
                    if !retired && bundle.entry.last_error.is_some() {
                        bundle.entry.clear_error();
                        if let Err(e) = self.cache.save(&bundle.entry).await {
                            warn!("clearing last error for {}: {:#}", principal, e);
                        }
                    }
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!("bundle for {} failed: {}", principal, message);
                    self.record_failure(&mut bundle.entry, &message).await;
                    failures.push((principal, message));
                }
            }
        }

        info!(
            "run complete: {} bundles processed, {} failed",
            total,
            failures.len()
        );
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunFailures { failures })
        }
    }

    async fn process_bundle(&self, bundle: &mut Bundle) -> Result<()> {
        let cutoffs =
            Cutoffs::from_declarations(bundle.entry.principal(), &bundle.declarations);

        self.issue_or_rotate(&mut bundle.entry, &bundle.declarations, &cutoffs)
            .await?;
        self.replicator
            .sync_if_needed(&mut bundle.entry, &bundle.declarations)
            .await?;
        self.disable_old_keys(&mut bundle.entry, &cutoffs).await?;
        self.delete_old_keys(&mut bundle.entry, &cutoffs).await?;
        self.retire_if_empty(bundle).await
    }

    /// Step 2 of the lifecycle: age out the current key, then make sure an
    /// identity with declarations has one.
    async fn issue_or_rotate(
        &self,
        entry: &mut Entry,
        declarations: &[Declaration],
        cutoffs: &Cutoffs,
    ) -> Result<()> {
        let mut mutated = false;
        let now = Utc::now();

        if !entry.current_key.is_empty() && cutoffs.should_rotate(entry.current_key.created_at) {
            info!(
                "rotating key {} for {} (issued {})",
                entry.current_key.id,
                entry.principal(),
                entry.current_key.created_at
            );
            entry.rotate_current(now);
            mutated = true;
        }

        let mut issued: Option<String> = None;
        if entry.current_key.is_empty() && !declarations.is_empty() {
            let new_key = self
                .keyops
                .create(&entry.identity)
                .await
                .with_context(|| format!("issuing key for {}", entry.principal()))?;
            entry.install_current(new_key.key.id.clone(), new_key.serialized_value, now);
            issued = Some(new_key.key.id);
            mutated = true;
        }

        if mutated {
            self.cache.save(entry).await?;
        }
        if let Some(key_id) = issued {
            self.notifier.key_issued(entry, &key_id).await;
        }
        Ok(())
    }

    /// Step 4: disable rotated keys past the cutoff, unless usage metrics
    /// say they are still being used. An unsafe key fails the bundle but
    /// does not stop the other keys from being considered.
    async fn disable_old_keys(&self, entry: &mut Entry, cutoffs: &Cutoffs) -> Result<()> {
        let due: Vec<(String, chrono::DateTime<Utc>)> = entry
            .rotated_keys
            .iter()
            .map(|(id, at)| (id.clone(), *at))
            .collect();

        let mut unsafe_keys = Vec::new();
        for (key_id, rotated_at) in due {
            if !cutoffs.should_disable(rotated_at) {
                continue;
            }
            let key = Key::for_identity(&entry.identity, &key_id);

            if !cutoffs.ignore_usage_metrics() {
                let last_auth = self
                    .metrics
                    .last_auth_time(&key)
                    .await
                    .with_context(|| format!("fetching last auth time for key {key_id}"))?;
                if let Some(last_auth_at) = last_auth {
                    if !cutoffs.safe_to_disable(last_auth_at) {
                        unsafe_keys.push(format!(
                            "key {key_id} (rotated {rotated_at}) was last used at {last_auth_at}, \
                             within the safety window; investigate what still uses it before it \
                             can be disabled"
                        ));
                        continue;
                    }
                }
            }

            self.keyops
                .ensure_disabled(&key)
                .await
                .with_context(|| format!("disabling key {key_id}"))?;
            entry.mark_disabled(&key_id, Utc::now());
            self.cache.save(entry).await?;
            self.notifier.key_disabled(entry, &key_id).await;
        }

        if unsafe_keys.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{}", unsafe_keys.join("; "))
        }
    }

    /// Step 5: delete disabled keys past the cutoff.
    async fn delete_old_keys(&self, entry: &mut Entry, cutoffs: &Cutoffs) -> Result<()> {
        let due: Vec<(String, chrono::DateTime<Utc>)> = entry
            .disabled_keys
            .iter()
            .map(|(id, at)| (id.clone(), *at))
            .collect();

        for (key_id, disabled_at) in due {
            if !cutoffs.should_delete(disabled_at) {
                continue;
            }
            let key = Key::for_identity(&entry.identity, &key_id);
            self.keyops
                .delete_if_disabled(&key)
                .await
                .with_context(|| format!("deleting key {key_id}"))?;
            entry.mark_deleted(&key_id);
            self.cache.save(entry).await?;
            self.notifier.key_deleted(entry, &key_id).await;
        }
        Ok(())
    }

    /// Step 6: an identity with no declarations and no keys in any position
    /// is done; drop its cache entry. Keys still winding down keep the entry
    /// alive so the cloud credentials cannot leak.
    async fn retire_if_empty(&self, bundle: &Bundle) -> Result<()> {
        if bundle.declarations.is_empty() && bundle.entry.is_empty() {
            self.cache.delete(&bundle.entry).await?;
        }
        Ok(())
    }

    async fn record_failure(&self, entry: &mut Entry, message: &str) {
        let should_notify = entry.note_error(message, Utc::now(), self.error_notify_interval);
        if let Err(e) = self.cache.save(entry).await {
            warn!(
                "recording failure for {} in cache: {:#}",
                entry.principal(),
                e
            );
        }
        if should_notify {
            self.notifier.error(entry, message).await;
        }
    }
}
