//! GCP IAM service account key operations.
//!
//! Native REST implementation over the IAM API v1, speaking reqwest with
//! rustls. Keys are issued as `TYPE_GOOGLE_CREDENTIALS_FILE` so the
//! serialized value is the familiar JSON credentials file.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Key, NewKey};
use crate::clients::error::{classify_response, is_not_found};
use crate::clients::gcp::GcpTokenSource;
use crate::identity::IdentityKind;
use crate::retry::{with_rate_limit_retry, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://iam.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyResponse {
    /// Full resource name `projects/*/serviceAccounts/*/keys/*`.
    name: String,
    /// Base64-encoded JSON credentials file.
    private_key_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetKeyResponse {
    #[serde(default)]
    disabled: bool,
}

/// REST client for IAM service account keys.
pub struct GcpKeyClient {
    http_client: Client,
    base_url: String,
    tokens: Arc<GcpTokenSource>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GcpKeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpKeyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GcpKeyClient {
    #[must_use]
    pub fn new(http_client: Client, tokens: Arc<GcpTokenSource>) -> Self {
        Self::with_base_url(http_client, tokens, DEFAULT_BASE_URL.to_string())
    }

    /// Construction against a non-default endpoint (mock servers).
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
            retry: RetryPolicy::rate_limit_default(),
        }
    }

    fn key_url(&self, key: &Key) -> String {
        format!(
            "{}/v1/projects/{}/serviceAccounts/{}/keys/{}",
            self.base_url, key.scope, key.principal, key.id
        )
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.tokens.token().await?))
    }

    pub(super) async fn create_key(&self, project: &str, email: &str) -> Result<NewKey> {
        let url = format!(
            "{}/v1/projects/{project}/serviceAccounts/{email}/keys",
            self.base_url
        );
        let response: CreateKeyResponse =
            with_rate_limit_retry(&self.retry, "iam.keys.create", || async {
                let response = self
                    .http_client
                    .post(&url)
                    .header("Authorization", self.bearer().await?)
                    .json(&json!({
                        "privateKeyType": "TYPE_GOOGLE_CREDENTIALS_FILE",
                        "keyAlgorithm": "KEY_ALG_RSA_2048",
                    }))
                    .send()
                    .await
                    .with_context(|| format!("creating key for {email}"))?;
                if !response.status().is_success() {
                    return Err(
                        classify_response(&format!("creating key for {email}"), response).await,
                    );
                }
                response
                    .json()
                    .await
                    .context("parsing IAM create key response")
            })
            .await?;

        let id = response
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&response.name)
            .to_string();
        let serialized = general_purpose::STANDARD
            .decode(&response.private_key_data)
            .context("decoding privateKeyData from base64")?;
        let serialized_value =
            String::from_utf8(serialized).context("privateKeyData is not UTF-8 JSON")?;
        info!("issued new key {} for {}", id, email);

        Ok(NewKey {
            key: Key {
                kind: IdentityKind::GcpServiceAccount,
                scope: project.to_string(),
                principal: email.to_string(),
                id,
            },
            serialized_value,
        })
    }

    pub(super) async fn ensure_disabled(&self, key: &Key) -> Result<()> {
        if self.key_disabled(key).await? {
            debug!("key {} already disabled", key);
            return Ok(());
        }
        let url = format!("{}:disable", self.key_url(key));
        with_rate_limit_retry(&self.retry, "iam.keys.disable", || async {
            let response = self
                .http_client
                .post(&url)
                .header("Authorization", self.bearer().await?)
                .json(&json!({}))
                .send()
                .await
                .with_context(|| format!("disabling key {key}"))?;
            if !response.status().is_success() {
                return Err(classify_response(&format!("disabling key {key}"), response).await);
            }
            Ok(())
        })
        .await?;
        info!("disabled key {}", key);
        Ok(())
    }

    pub(super) async fn delete_if_disabled(&self, key: &Key) -> Result<()> {
        match self.key_disabled(key).await {
            Ok(true) => {}
            Ok(false) => {
                anyhow::bail!("refusing to delete key {key}: provider reports it enabled")
            }
            // Already gone; deletion is idempotent.
            Err(err) if is_not_found(&err) => {
                debug!("key {} already deleted", key);
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let url = self.key_url(key);
        with_rate_limit_retry(&self.retry, "iam.keys.delete", || async {
            let response = self
                .http_client
                .delete(&url)
                .header("Authorization", self.bearer().await?)
                .send()
                .await
                .with_context(|| format!("deleting key {key}"))?;
            if response.status().is_success() {
                return Ok(());
            }
            let err = classify_response(&format!("deleting key {key}"), response).await;
            if is_not_found(&err) {
                Ok(())
            } else {
                Err(err)
            }
        })
        .await?;
        info!("deleted key {}", key);
        Ok(())
    }

    async fn key_disabled(&self, key: &Key) -> Result<bool> {
        let url = self.key_url(key);
        with_rate_limit_retry(&self.retry, "iam.keys.get", || async {
            let response = self
                .http_client
                .get(&url)
                .header("Authorization", self.bearer().await?)
                .send()
                .await
                .with_context(|| format!("getting key {key}"))?;
            if !response.status().is_success() {
                return Err(classify_response(&format!("getting key {key}"), response).await);
            }
            let key_state: GetKeyResponse =
                response.json().await.context("parsing IAM get key response")?;
            Ok(key_state.disabled)
        })
        .await
    }
}
