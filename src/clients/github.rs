//! GitHub Actions repository-secret facade.
//!
//! The Actions secret API only accepts values sealed to the repository's
//! public key (libsodium sealed box: X25519 + XSalsa20-Poly1305), so the
//! write is a two-step: fetch the public key, then PUT the sealed payload.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use crypto_box::aead::OsRng;
use crypto_box::PublicKey;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::error::classify_response;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("yale/", env!("CARGO_PKG_VERSION"));

/// Narrow interface the sink replicator needs.
#[async_trait]
pub trait RepoSecretWriter: Send + Sync {
    /// Store `value` as the Actions secret `name` in `org/repo`.
    async fn put_secret(&self, org: &str, repo: &str, name: &str, value: &[u8]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct RepoPublicKey {
    key_id: String,
    /// Base64-encoded 32-byte X25519 public key.
    key: String,
}

/// Token-authenticated GitHub REST client.
pub struct GitHubClient {
    http_client: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    #[must_use]
    pub fn new(http_client: Client, token: String) -> Self {
        Self::with_base_url(http_client, token, DEFAULT_BASE_URL.to_string())
    }

    #[must_use]
    pub fn with_base_url(http_client: Client, token: String, base_url: String) -> Self {
        Self {
            http_client,
            base_url,
            token,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }

    async fn public_key(&self, org: &str, repo: &str) -> Result<RepoPublicKey> {
        let url = format!(
            "{}/repos/{org}/{repo}/actions/secrets/public-key",
            self.base_url
        );
        debug!("GET {}", url);
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .with_context(|| format!("fetching public key for {org}/{repo}"))?;

        if !response.status().is_success() {
            return Err(
                classify_response(&format!("fetching public key for {org}/{repo}"), response).await,
            );
        }
        response
            .json()
            .await
            .context("parsing repository public key response")
    }
}

/// Seal `value` to the repository public key the way libsodium's
/// `crypto_box_seal` does.
fn seal(value: &[u8], repo_key: &RepoPublicKey) -> Result<String> {
    let key_bytes: [u8; 32] = general_purpose::STANDARD
        .decode(&repo_key.key)
        .context("decoding repository public key from base64")?
        .try_into()
        .map_err(|_| anyhow::anyhow!("repository public key is not 32 bytes"))?;
    let public_key = PublicKey::from(key_bytes);
    let sealed = public_key
        .seal(&mut OsRng, value)
        .map_err(|e| anyhow::anyhow!("sealing secret payload: {e}"))?;
    Ok(general_purpose::STANDARD.encode(sealed))
}

#[async_trait]
impl RepoSecretWriter for GitHubClient {
    async fn put_secret(&self, org: &str, repo: &str, name: &str, value: &[u8]) -> Result<()> {
        let repo_key = self.public_key(org, repo).await?;
        let encrypted_value = seal(value, &repo_key)?;

        let url = format!(
            "{}/repos/{org}/{repo}/actions/secrets/{name}",
            self.base_url
        );
        info!("writing GitHub secret {}/{}/{}", org, repo, name);
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&json!({
                "encrypted_value": encrypted_value,
                "key_id": repo_key.key_id,
            }))
            .send()
            .await
            .with_context(|| format!("writing GitHub secret {org}/{repo}/{name}"))?;

        if !response.status().is_success() {
            return Err(classify_response(
                &format!("writing GitHub secret {org}/{repo}/{name}"),
                response,
            )
            .await);
        }
        Ok(())
    }
}
