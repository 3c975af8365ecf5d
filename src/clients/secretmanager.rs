//! Google Secret Manager REST facade.
//!
//! Native REST implementation for GCP Secret Manager API v1, speaking
//! reqwest with rustls. The sink replicator drives it: ensure the secret
//! exists, read the latest version, add a new version only when the payload
//! actually changed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{classify_response, is_not_found};
use super::gcp::GcpTokenSource;
use crate::constants::{OWNED_LABEL_KEY, OWNED_LABEL_VALUE};

const DEFAULT_BASE_URL: &str = "https://secretmanager.googleapis.com";

/// Narrow interface the sink replicator needs.
#[async_trait]
pub trait SecretManagerApi: Send + Sync {
    /// Whether `projects/{project}/secrets/{name}` exists.
    async fn secret_exists(&self, project: &str, name: &str) -> Result<bool>;

    /// Create the secret with automatic replication and operator-owned
    /// metadata.
    async fn create_secret(&self, project: &str, name: &str) -> Result<()>;

    /// Payload bytes of the latest version, or None when the secret has no
    /// accessible version yet.
    async fn latest_version_payload(&self, project: &str, name: &str) -> Result<Option<Vec<u8>>>;

    /// Add a new version holding `payload`.
    async fn add_version(&self, project: &str, name: &str, payload: &[u8]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    /// Base64-encoded secret data.
    data: String,
}

/// REST client for GCP Secret Manager.
pub struct GsmClient {
    http_client: Client,
    base_url: String,
    tokens: Arc<GcpTokenSource>,
}

impl std::fmt::Debug for GsmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GsmClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GsmClient {
    #[must_use]
    pub fn new(http_client: Client, tokens: Arc<GcpTokenSource>) -> Self {
        Self::with_base_url(http_client, tokens, DEFAULT_BASE_URL.to_string())
    }

    #[must_use]
    pub fn with_base_url(
        http_client: Client,
        tokens: Arc<GcpTokenSource>,
        base_url: String,
    ) -> Self {
        Self {
            http_client,
            base_url,
            tokens,
        }
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.tokens.token().await?))
    }
}

#[async_trait]
impl SecretManagerApi for GsmClient {
    async fn secret_exists(&self, project: &str, name: &str) -> Result<bool> {
        let url = format!("{}/v1/projects/{project}/secrets/{name}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .with_context(|| format!("getting GSM secret {project}/{name}"))?;

        if response.status().is_success() {
            return Ok(true);
        }
        let err = classify_response(&format!("getting GSM secret {project}/{name}"), response).await;
        if is_not_found(&err) {
            Ok(false)
        } else {
            Err(err)
        }
    }

    async fn create_secret(&self, project: &str, name: &str) -> Result<()> {
        info!("creating GSM secret {}/{}", project, name);
        let url = format!(
            "{}/v1/projects/{project}/secrets?secretId={name}",
            self.base_url
        );
        let mut labels = serde_json::Map::new();
        labels.insert(
            OWNED_LABEL_KEY.to_string(),
            serde_json::Value::String(OWNED_LABEL_VALUE.to_string()),
        );
        let body = json!({
            "replication": { "automatic": {} },
            "labels": labels,
        });
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("creating GSM secret {project}/{name}"))?;

        if !response.status().is_success() {
            return Err(
                classify_response(&format!("creating GSM secret {project}/{name}"), response).await,
            );
        }
        Ok(())
    }

    async fn latest_version_payload(&self, project: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let url = format!(
            "{}/v1/projects/{project}/secrets/{name}/versions/latest:access",
            self.base_url
        );
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .with_context(|| format!("accessing latest version of GSM secret {project}/{name}"))?;

        if response.status().is_success() {
            let access: AccessSecretVersionResponse = response
                .json()
                .await
                .context("parsing GSM access response")?;
            let payload = general_purpose::STANDARD
                .decode(access.payload.data)
                .context("decoding GSM payload from base64")?;
            return Ok(Some(payload));
        }

        let err = classify_response(
            &format!("accessing latest version of GSM secret {project}/{name}"),
            response,
        )
        .await;
        if is_not_found(&err) {
            debug!("GSM secret {}/{} has no accessible version", project, name);
            Ok(None)
        } else {
            Err(err)
        }
    }

    async fn add_version(&self, project: &str, name: &str, payload: &[u8]) -> Result<()> {
        info!("adding version to GSM secret {}/{}", project, name);
        let url = format!(
            "{}/v1/projects/{project}/secrets/{name}:addVersion",
            self.base_url
        );
        let body = json!({
            "payload": { "data": general_purpose::STANDARD.encode(payload) },
        });
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("adding version to GSM secret {project}/{name}"))?;

        if !response.status().is_success() {
            return Err(classify_response(
                &format!("adding version to GSM secret {project}/{name}"),
                response,
            )
            .await);
        }
        Ok(())
    }
}
