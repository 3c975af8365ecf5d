//! Google Secret Manager sink.
//!
//! Creates the secret when absent, then adds a version only when the
//! payload differs byte-for-byte from the latest one. Rotations therefore
//! land as exactly one new version; re-runs add none.

use anyhow::{bail, Result};
use tracing::{debug, info};

use super::format::wrapped_scalar_payload;
use crate::cache::Entry;
use crate::clients::SecretManagerApi;
use crate::crd::ReplicationTarget;

/// Ensure `target.address` (`<project>/<secret-name>`) holds the entry's
/// current credential.
pub async fn sync(
    gsm: &dyn SecretManagerApi,
    target: &ReplicationTarget,
    entry: &Entry,
) -> Result<()> {
    let (project, name) = parse_address(&target.address)?;
    let payload = wrapped_scalar_payload(entry.identity.kind(), &entry.current_key.json, target)?;

    if !gsm.secret_exists(project, name).await? {
        gsm.create_secret(project, name).await?;
    }

    if let Some(latest) = gsm.latest_version_payload(project, name).await? {
        if latest == payload {
            debug!(
                "GSM secret {}/{} already holds the current credential",
                project, name
            );
            return Ok(());
        }
    }

    info!(
        "replicating {} to GSM secret {}/{}",
        entry.principal(),
        project,
        name
    );
    gsm.add_version(project, name, &payload).await
}

fn parse_address(address: &str) -> Result<(&str, &str)> {
    match address.split_once('/') {
        Some((project, name)) if !project.is_empty() && !name.is_empty() => Ok((project, name)),
        _ => bail!("secretManager address {address:?} is not <project>/<secret-name>"),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_address;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("p/s").unwrap(), ("p", "s"));
        assert!(parse_address("only-project").is_err());
        assert!(parse_address("/name").is_err());
        assert!(parse_address("project/").is_err());
    }
}
