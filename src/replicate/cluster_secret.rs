//! Target cluster secret writes.
//!
//! One server-side apply per sync: the declaration's labels, the reloader
//! annotation, the owner reference (so cluster GC removes the secret with
//! the declaration), and the credential data fields. Apply semantics do the
//! create-vs-update work and merge labels set by other field managers
//! instead of clobbering them.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use tracing::info;

use super::format::extract_pem;
use crate::cache::Entry;
use crate::clients::ClusterClient;
use crate::constants::RELOADER_ANNOTATION;
use crate::identity::IdentityKind;
use crate::resourcemap::Declaration;

/// Apply the declaration's target secret with the entry's current
/// credential.
pub async fn sync(
    cluster: &dyn ClusterClient,
    declaration: &Declaration,
    entry: &Entry,
) -> Result<()> {
    info!(
        "applying secret {}/{} for {}",
        declaration.namespace,
        declaration.secret.name,
        entry.principal()
    );

    let mut secret = Secret::default();
    secret.metadata.name = Some(declaration.secret.name.clone());
    secret.metadata.namespace = Some(declaration.namespace.clone());
    secret.metadata.owner_references = Some(vec![declaration.owner_reference()]);
    secret.metadata.labels = Some(declaration.labels.clone());
    secret.metadata.annotations = Some(BTreeMap::from([(
        RELOADER_ANNOTATION.to_string(),
        "true".to_string(),
    )]));
    secret.type_ = Some("Opaque".to_string());
    secret.data = Some(credential_data(declaration, entry)?);

    cluster.apply_secret(secret).await
}

fn credential_data(
    declaration: &Declaration,
    entry: &Entry,
) -> Result<BTreeMap<String, ByteString>> {
    let serialized = &entry.current_key.json;
    let mut data = BTreeMap::new();
    match entry.identity.kind() {
        IdentityKind::GcpServiceAccount => {
            let pem = extract_pem(IdentityKind::GcpServiceAccount, serialized)
                .with_context(|| format!("extracting PEM for {}", entry.principal()))?;
            data.insert(
                declaration.secret.json_key_name.clone(),
                ByteString(serialized.clone().into_bytes()),
            );
            data.insert(
                declaration.secret.pem_key_name.clone(),
                ByteString(pem.into_bytes()),
            );
        }
        IdentityKind::AzureServicePrincipal => {
            data.insert(
                declaration.secret.client_secret_key_name.clone(),
                ByteString(serialized.clone().into_bytes()),
            );
        }
    }
    Ok(data)
}
