//! Azure application client secret operations via Microsoft Graph.
//!
//! Graph's password credentials have no disabled state: a secret is valid
//! until removed. `ensure_disabled` is therefore a logged no-op and the
//! delete path removes the credential after probing that it still exists.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Key, NewKey};
use crate::clients::azure::AzureTokenSource;
use crate::clients::error::classify_response;
use crate::identity::IdentityKind;
use crate::retry::{with_rate_limit_retry, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Display name stamped on credentials the operator issues.
const CREDENTIAL_DISPLAY_NAME: &str = "yale-managed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddPasswordResponse {
    key_id: String,
    secret_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationCredentials {
    #[serde(default)]
    password_credentials: Vec<PasswordCredential>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredential {
    key_id: String,
}

/// REST client for Microsoft Graph application password credentials.
pub struct AzureKeyClient {
    http_client: Client,
    base_url: String,
    tokens: Arc<AzureTokenSource>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AzureKeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureKeyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AzureKeyClient {
    #[must_use]
    pub fn new(http_client: Client, tokens: Arc<AzureTokenSource>) -> Self {
        Self::with_base_url(http_client, tokens, DEFAULT_BASE_URL.to_string())
    }

    /// Construction against a non-default endpoint (mock servers).
    #[must_use]
    pub fn with_base_url(
        http_client: Client,
        tokens: Arc<AzureTokenSource>,
        base_url: String,
    ) -> Self {
        Self {
            http_client,
            base_url,
            tokens,
            retry: RetryPolicy::rate_limit_default(),
        }
    }

    fn application_url(&self, application_id: &str, suffix: &str) -> String {
        format!(
            "{}/applications(appId='{application_id}'){suffix}",
            self.base_url
        )
    }

    pub(super) async fn create_secret(
        &self,
        tenant_id: &str,
        application_id: &str,
    ) -> Result<NewKey> {
        let url = self.application_url(application_id, "/addPassword");
        let response: AddPasswordResponse =
            with_rate_limit_retry(&self.retry, "graph.addPassword", || async {
                let token = self.tokens.token(tenant_id).await?;
                let response = self
                    .http_client
                    .post(&url)
                    .header("Authorization", format!("Bearer {token}"))
                    .json(&json!({
                        "passwordCredential": { "displayName": CREDENTIAL_DISPLAY_NAME },
                    }))
                    .send()
                    .await
                    .with_context(|| format!("adding password for application {application_id}"))?;
                if !response.status().is_success() {
                    return Err(classify_response(
                        &format!("adding password for application {application_id}"),
                        response,
                    )
                    .await);
                }
                response
                    .json()
                    .await
                    .context("parsing Graph addPassword response")
            })
            .await?;

        info!(
            "issued new client secret {} for application {}",
            response.key_id, application_id
        );
        Ok(NewKey {
            key: Key {
                kind: IdentityKind::AzureServicePrincipal,
                scope: tenant_id.to_string(),
                principal: application_id.to_string(),
                id: response.key_id,
            },
            serialized_value: response.secret_text,
        })
    }

    pub(super) async fn ensure_disabled(&self, key: &Key) -> Result<()> {
        // Graph cannot disable a password credential; the secret stays valid
        // until removePassword. The disabled position in the cache entry
        // still matters: it starts the delete-after clock.
        debug!(
            "client secret {} has no provider-side disable; deferring to delete",
            key
        );
        Ok(())
    }

    pub(super) async fn delete_if_disabled(&self, key: &Key) -> Result<()> {
        if !self.secret_exists(key).await? {
            debug!("client secret {} already removed", key);
            return Ok(());
        }
        let url = self.application_url(&key.principal, "/removePassword");
        with_rate_limit_retry(&self.retry, "graph.removePassword", || async {
            let token = self.tokens.token(&key.scope).await?;
            let response = self
                .http_client
                .post(&url)
                .header("Authorization", format!("Bearer {token}"))
                .json(&json!({ "keyId": key.id }))
                .send()
                .await
                .with_context(|| format!("removing client secret {key}"))?;
            if !response.status().is_success() {
                return Err(
                    classify_response(&format!("removing client secret {key}"), response).await,
                );
            }
            Ok(())
        })
        .await?;
        info!("removed client secret {}", key);
        Ok(())
    }

    async fn secret_exists(&self, key: &Key) -> Result<bool> {
        let url = self.application_url(&key.principal, "?$select=passwordCredentials");
        let credentials: ApplicationCredentials =
            with_rate_limit_retry(&self.retry, "graph.getApplication", || async {
                let token = self.tokens.token(&key.scope).await?;
                let response = self
                    .http_client
                    .get(&url)
                    .header("Authorization", format!("Bearer {token}"))
                    .send()
                    .await
                    .with_context(|| format!("getting application {}", key.principal))?;
                if !response.status().is_success() {
                    return Err(classify_response(
                        &format!("getting application {}", key.principal),
                        response,
                    )
                    .await);
                }
                response
                    .json()
                    .await
                    .context("parsing Graph application response")
            })
            .await?;
        Ok(credentials
            .password_credentials
            .iter()
            .any(|credential| credential.key_id == key.id))
    }
}
