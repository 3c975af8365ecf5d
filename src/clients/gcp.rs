//! GCP OAuth2 token source.
//!
//! Shared by the IAM, Policy Analyzer, and Secret Manager facades. Tokens
//! come from the GCE metadata server (Workload Identity); outside GCP a
//! pre-minted token can be injected through `GOOGLE_OAUTH_ACCESS_TOKEN` for
//! local runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// How close to expiry a cached token may get before it is refreshed.
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

/// Caching OAuth2 token source for Google APIs.
pub struct GcpTokenSource {
    http_client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GcpTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpTokenSource").finish_non_exhaustive()
    }
}

impl GcpTokenSource {
    #[must_use]
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            cached: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least [`REFRESH_MARGIN_SECS`].
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Utc::now() > Duration::seconds(REFRESH_MARGIN_SECS) {
                return Ok(token.token.clone());
            }
        }
        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        // Pre-minted token for local/dev runs outside GCP.
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            debug!("using access token from GOOGLE_OAUTH_ACCESS_TOKEN");
            return Ok(CachedToken {
                token,
                expires_at: Utc::now() + Duration::hours(1),
            });
        }

        let response = self
            .http_client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("reaching the GCE metadata server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "metadata server returned {status}: {body}. Ensure the pod runs with \
                 Workload Identity, or set GOOGLE_OAUTH_ACCESS_TOKEN for local runs"
            );
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("parsing token response from metadata server")?;
        info!("retrieved access token from metadata server (Workload Identity)");
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}
