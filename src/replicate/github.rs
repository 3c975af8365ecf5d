//! GitHub Actions repository-secret sink.

use anyhow::{bail, Result};
use tracing::info;

use super::format::scalar_value;
use crate::cache::Entry;
use crate::clients::RepoSecretWriter;
use crate::crd::ReplicationTarget;

/// Write the formatted credential to `target.address`
/// (`<org>/<repo>/<secret-name>`).
pub async fn sync(
    repo_secrets: &dyn RepoSecretWriter,
    target: &ReplicationTarget,
    entry: &Entry,
) -> Result<()> {
    let (org, repo, name) = parse_address(&target.address)?;
    let value = scalar_value(entry.identity.kind(), &entry.current_key.json, target.format)?;
    info!(
        "replicating {} to GitHub secret {}/{}/{}",
        entry.principal(),
        org,
        repo,
        name
    );
    repo_secrets
        .put_secret(org, repo, name, value.as_bytes())
        .await
}

fn parse_address(address: &str) -> Result<(&str, &str, &str)> {
    let mut parts = address.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(org), Some(repo), Some(name))
            if !org.is_empty() && !repo.is_empty() && !name.is_empty() =>
        {
            Ok((org, repo, name))
        }
        _ => bail!("github address {address:?} is not <org>/<repo>/<secret-name>"),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_address;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("org/repo/NAME").unwrap(), ("org", "repo", "NAME"));
        assert!(parse_address("org/repo").is_err());
        assert!(parse_address("org//NAME").is_err());
    }
}
