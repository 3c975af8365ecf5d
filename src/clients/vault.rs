//! Vault facade.
//!
//! Writes a key/value map to a KV v1 path. The operator only ever writes;
//! reads stay with the workloads consuming the credential.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::collections::BTreeMap;
use tracing::debug;

use super::error::classify_response;

/// Narrow write-only interface the sink replicator needs.
#[async_trait]
pub trait VaultWriter: Send + Sync {
    /// Write `data` at `path`, replacing whatever is there.
    async fn write_secret(&self, path: &str, data: &BTreeMap<String, String>) -> Result<()>;
}

/// Token-authenticated Vault client.
pub struct VaultClient {
    http_client: Client,
    addr: Url,
    token: String,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.addr.as_str())
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    pub fn new(http_client: Client, addr: &str, token: String) -> Result<Self> {
        let addr = Url::parse(addr).with_context(|| format!("parsing Vault address {addr}"))?;
        Ok(Self {
            http_client,
            addr,
            token,
        })
    }
}

#[async_trait]
impl VaultWriter for VaultClient {
    async fn write_secret(&self, path: &str, data: &BTreeMap<String, String>) -> Result<()> {
        let url = self
            .addr
            .join(&format!("v1/{}", path.trim_start_matches('/')))
            .with_context(|| format!("building Vault URL for path {path}"))?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .header("X-Vault-Token", &self.token)
            .json(data)
            .send()
            .await
            .with_context(|| format!("writing Vault secret at {path}"))?;

        if !response.status().is_success() {
            return Err(classify_response(
                &format!("writing Vault secret at {path}"),
                response,
            )
            .await);
        }
        Ok(())
    }
}
