//! # Resource mapper
//!
//! Joins declarations and cache entries into per-identity bundles. Each run
//! starts here: list both declaration kinds, group by principal, attach the
//! matching cache entry, validate, and materialize empty entries for
//! identities seen for the first time.
//!
//! Malformed declarations and inconsistent bundles are dropped with a
//! warning rather than failing the run; one bad resource must not stall
//! rotation for everyone else.

use anyhow::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheStore, Entry};
use crate::clients::ClusterClient;
use crate::crd::{AzureClientSecret, GcpSaKey, KeyRotation, ReplicationTarget, SecretSpec};
use crate::identity::Identity;

/// A declaration normalized from either CRD kind.
///
/// `spec_json` is the canonical JSON of the CRD spec, captured once at
/// mapping time; the sink replicator hashes it into its fingerprints so a
/// spec edit forces a resync.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub api_version: String,
    pub kind: String,
    pub identity: Identity,
    pub secret: SecretSpec,
    pub rotation: KeyRotation,
    pub replications: Vec<ReplicationTarget>,
    pub labels: BTreeMap<String, String>,
    pub spec_json: String,
}

impl Declaration {
    /// `<namespace>/<name>`, the sync-status key for this declaration.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Owner reference attached to the replicated cluster secret so cluster
    /// GC removes it when the declaration goes away.
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            ..OwnerReference::default()
        }
    }

    fn from_gcp(resource: &GcpSaKey) -> Option<Self> {
        let namespace = resource.meta().namespace.clone()?;
        let name = resource.meta().name.clone()?;
        let uid = resource.meta().uid.clone()?;
        let sa = &resource.spec.google_service_account;
        if sa.name.is_empty() || sa.project.is_empty() {
            warn!(
                "dropping GcpSaKey {}/{}: googleServiceAccount name/project missing",
                namespace, name
            );
            return None;
        }
        let spec_json = canonical_spec(&resource.spec, &namespace, &name)?;
        Some(Declaration {
            namespace,
            name,
            uid,
            api_version: GcpSaKey::api_version(&()).to_string(),
            kind: GcpSaKey::kind(&()).to_string(),
            identity: Identity::GcpServiceAccount {
                email: sa.name.clone(),
                project: sa.project.clone(),
            },
            secret: resource.spec.secret.clone(),
            rotation: resource.spec.key_rotation,
            replications: resource.spec.replications.clone(),
            labels: resource.meta().labels.clone().unwrap_or_default(),
            spec_json,
        })
    }

    fn from_azure(resource: &AzureClientSecret) -> Option<Self> {
        let namespace = resource.meta().namespace.clone()?;
        let name = resource.meta().name.clone()?;
        let uid = resource.meta().uid.clone()?;
        let sp = &resource.spec.azure_service_principal;
        if sp.application_id.is_empty() || sp.tenant_id.is_empty() {
            warn!(
                "dropping AzureClientSecret {}/{}: azureServicePrincipal ids missing",
                namespace, name
            );
            return None;
        }
        let spec_json = canonical_spec(&resource.spec, &namespace, &name)?;
        Some(Declaration {
            namespace,
            name,
            uid,
            api_version: AzureClientSecret::api_version(&()).to_string(),
            kind: AzureClientSecret::kind(&()).to_string(),
            identity: Identity::AzureServicePrincipal {
                application_id: sp.application_id.clone(),
                tenant_id: sp.tenant_id.clone(),
            },
            secret: resource.spec.secret.clone(),
            rotation: resource.spec.key_rotation,
            replications: resource.spec.replications.clone(),
            labels: resource.meta().labels.clone().unwrap_or_default(),
            spec_json,
        })
    }
}

fn canonical_spec<S: serde::Serialize>(spec: &S, namespace: &str, name: &str) -> Option<String> {
    match serde_json::to_string(spec) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("dropping declaration {}/{}: unserializable spec: {}", namespace, name, e);
            None
        }
    }
}

/// One identity's worth of work for the rotation engine.
///
/// Always carries an entry by the time `Mapper::build` returns; the
/// declaration list may legally be empty (identity retired by the user,
/// keys still winding down).
#[derive(Debug, Clone)]
pub struct Bundle {
    pub entry: Entry,
    pub declarations: Vec<Declaration>,
}

/// Builds bundles from the cluster's declarations and the cache.
pub struct Mapper {
    cluster: Arc<dyn ClusterClient>,
    cache: Arc<CacheStore>,
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper").finish_non_exhaustive()
    }
}

impl Mapper {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>, cache: Arc<CacheStore>) -> Self {
        Self { cluster, cache }
    }

    /// Bundle every known identity, in stable principal order.
    pub async fn build(&self) -> Result<Vec<Bundle>> {
        let mut pending: BTreeMap<String, PendingBundle> = BTreeMap::new();

        for declaration in self.list_declarations().await? {
            pending
                .entry(declaration.identity.principal().to_string())
                .or_default()
                .declarations
                .push(declaration);
        }

        for entry in self.cache.list().await? {
            let principal = entry.principal().to_string();
            pending.entry(principal).or_default().entry = Some(entry);
        }

        let mut bundles = Vec::with_capacity(pending.len());
        for (principal, bundle) in pending {
            if let Some(reason) = bundle.validation_error() {
                warn!("dropping bundle for {}: {}", principal, reason);
                continue;
            }
            let entry = match (bundle.entry, bundle.declarations.first()) {
                (Some(entry), _) => entry,
                // Declarations with no history: materialize an empty entry
                // before the engine sees the bundle.
                (None, Some(declaration)) => {
                    self.cache.get_or_create(&declaration.identity).await?
                }
                (None, None) => continue,
            };
            bundles.push(Bundle {
                entry,
                declarations: bundle.declarations,
            });
        }
        debug!("built {} bundles", bundles.len());
        Ok(bundles)
    }

    async fn list_declarations(&self) -> Result<Vec<Declaration>> {
        let mut declarations = Vec::new();
        for resource in self.cluster.list_gcp_sa_keys().await? {
            if let Some(declaration) = Declaration::from_gcp(&resource) {
                declarations.push(declaration);
            }
        }
        for resource in self.cluster.list_azure_client_secrets().await? {
            if let Some(declaration) = Declaration::from_azure(&resource) {
                declarations.push(declaration);
            }
        }
        Ok(declarations)
    }
}

#[derive(Debug, Default)]
struct PendingBundle {
    entry: Option<Entry>,
    declarations: Vec<Declaration>,
}

impl PendingBundle {
    /// A bundle is valid iff all members agree on identity kind and scope.
    /// A kind mismatch under one principal is a unique-identifier collision.
    fn validation_error(&self) -> Option<String> {
        let mut reference: Option<&Identity> = self.entry.as_ref().map(|e| &e.identity);
        for declaration in &self.declarations {
            match reference {
                None => reference = Some(&declaration.identity),
                Some(identity) => {
                    if identity.kind() != declaration.identity.kind() {
                        return Some(format!(
                            "identity kind collision: {} vs {}",
                            identity.kind().as_str(),
                            declaration.identity.kind().as_str()
                        ));
                    }
                    if identity.scope() != declaration.identity.scope() {
                        return Some(format!(
                            "declarations disagree on scope: {} vs {} (declaration {})",
                            identity.scope(),
                            declaration.identity.scope(),
                            declaration.qualified_name()
                        ));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use chrono::Utc;

    fn gcp_declaration(principal: &str, project: &str) -> Declaration {
        Declaration {
            namespace: "ns-1".to_string(),
            name: "decl".to_string(),
            uid: "uid-1".to_string(),
            api_version: "yale.terra.bio/v1beta1".to_string(),
            kind: "GcpSaKey".to_string(),
            identity: Identity::GcpServiceAccount {
                email: principal.to_string(),
                project: project.to_string(),
            },
            secret: SecretSpec {
                name: "s1".to_string(),
                json_key_name: "key.json".to_string(),
                pem_key_name: "key.pem".to_string(),
                client_secret_key_name: "client-secret".to_string(),
            },
            rotation: KeyRotation::default(),
            replications: Vec::new(),
            labels: BTreeMap::new(),
            spec_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_bundle_rejects_scope_conflict() {
        let mut bundle = PendingBundle::default();
        bundle.declarations.push(gcp_declaration("sa@p.com", "p"));
        bundle.declarations.push(gcp_declaration("sa@p.com", "q"));
        assert!(bundle.validation_error().is_some());
    }

    #[test]
    fn test_bundle_rejects_kind_collision() {
        let mut bundle = PendingBundle::default();
        bundle.declarations.push(gcp_declaration("shared", "p"));
        let mut azure = gcp_declaration("shared", "p");
        azure.identity = Identity::AzureServicePrincipal {
            application_id: "shared".to_string(),
            tenant_id: "t".to_string(),
        };
        bundle.declarations.push(azure);
        let reason = bundle.validation_error().unwrap();
        assert!(reason.contains("collision"), "{reason}");
    }

    #[test]
    fn test_bundle_rejects_entry_scope_mismatch() {
        let mut bundle = PendingBundle::default();
        let mut entry = Entry::new(Identity::GcpServiceAccount {
            email: "sa@p.com".to_string(),
            project: "other".to_string(),
        });
        entry.install_current("k1".to_string(), "{}".to_string(), Utc::now());
        bundle.entry = Some(entry);
        bundle.declarations.push(gcp_declaration("sa@p.com", "p"));
        assert!(bundle.validation_error().is_some());
    }

    #[test]
    fn test_entry_only_bundle_is_valid() {
        let mut bundle = PendingBundle::default();
        bundle.entry = Some(Entry::new(Identity::GcpServiceAccount {
            email: "sa@p.com".to_string(),
            project: "p".to_string(),
        }));
        assert!(bundle.validation_error().is_none());
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(gcp_declaration("a", "p").qualified_name(), "ns-1/decl");
    }
}
