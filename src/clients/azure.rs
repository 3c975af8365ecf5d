//! Azure AD token source for Microsoft Graph.
//!
//! Client-credentials flow against the v2.0 token endpoint, one token per
//! tenant. The operator's own service principal (from config) must hold
//! `Application.ReadWrite.OwnedBy` or equivalent on the managed
//! applications.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Credentials for the operator's own Azure application.
#[derive(Debug, Clone)]
pub struct AzureCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Per-tenant caching token source for Microsoft Graph.
///
/// Constructible without credentials so clusters that only manage GCP
/// identities need no Azure configuration; the first Azure declaration then
/// fails with a pointed error instead of a mysterious auth failure.
pub struct AzureTokenSource {
    http_client: Client,
    credentials: Option<AzureCredentials>,
    cached: Mutex<HashMap<String, CachedToken>>,
}

impl std::fmt::Debug for AzureTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureTokenSource")
            .field(
                "client_id",
                &self.credentials.as_ref().map(|c| c.client_id.as_str()),
            )
            .finish_non_exhaustive()
    }
}

impl AzureTokenSource {
    #[must_use]
    pub fn new(http_client: Client, credentials: Option<AzureCredentials>) -> Self {
        Self {
            http_client,
            credentials,
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// A Graph bearer token for the given tenant.
    pub async fn token(&self, tenant_id: &str) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.get(tenant_id) {
            if token.expires_at - Utc::now() > Duration::seconds(REFRESH_MARGIN_SECS) {
                return Ok(token.token.clone());
            }
        }
        let fresh = self.fetch(tenant_id).await?;
        let token = fresh.token.clone();
        cached.insert(tenant_id.to_string(), fresh);
        Ok(token)
    }

    async fn fetch(&self, tenant_id: &str) -> Result<CachedToken> {
        let credentials = self.credentials.as_ref().context(
            "an AzureClientSecret declaration needs Graph access, but \
             AZURE_CLIENT_ID/AZURE_CLIENT_SECRET are not configured",
        )?;
        let url = format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");
        debug!("requesting Graph token for tenant {}", tenant_id);

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];
        let response = self
            .http_client
            .post(&url)
            .form(&params)
            .send()
            .await
            .with_context(|| format!("reaching the AAD token endpoint for tenant {tenant_id}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AAD token request for tenant {tenant_id} returned {status}: {body}");
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("parsing AAD token response")?;
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}
