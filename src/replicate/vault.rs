//! Vault sink.

use anyhow::Result;
use tracing::info;

use super::format::vault_payload;
use crate::cache::Entry;
use crate::clients::VaultWriter;
use crate::crd::ReplicationTarget;

/// Write the entry's current credential at the target's Vault path.
pub async fn sync(vault: &dyn VaultWriter, target: &ReplicationTarget, entry: &Entry) -> Result<()> {
    let payload = vault_payload(entry.identity.kind(), &entry.current_key.json, target)?;
    info!(
        "replicating {} to vault path {} ({} format)",
        entry.principal(),
        target.address,
        target.format.as_str()
    );
    vault.write_secret(&target.address, &payload).await
}
