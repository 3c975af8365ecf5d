//! Key last-authentication lookup via the GCP Policy Analyzer API.
//!
//! Queries the `serviceAccountKeyLastAuthentication` activity type filtered
//! to one key. An empty activity list means the key has not authenticated
//! inside the API's observable window.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::clients::error::classify_response;
use crate::clients::gcp::GcpTokenSource;
use crate::keyops::Key;
use crate::retry::{with_rate_limit_retry, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://policyanalyzer.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryActivityResponse {
    #[serde(default)]
    activities: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Activity {
    activity: ActivityDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDetail {
    last_authenticated_time: DateTime<Utc>,
}

/// REST client for Policy Analyzer key-activity queries.
pub struct GcpUsageMetrics {
    http_client: Client,
    base_url: String,
    tokens: Arc<GcpTokenSource>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GcpUsageMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpUsageMetrics")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GcpUsageMetrics {
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

    pub(super) async fn last_auth_time(&self, key: &Key) -> Result<Option<DateTime<Utc>>> {
        let url = format!(
            "{}/v1/projects/{}/locations/global/activityTypes/serviceAccountKeyLastAuthentication/activities:query",
            self.base_url, key.scope
        );
        let full_resource_name = format!(
            "//iam.googleapis.com/projects/{}/serviceAccounts/{}/keys/{}",
            key.scope, key.principal, key.id
        );
        let filter = format!("activities.fullResourceName=\"{full_resource_name}\"");

        let response: QueryActivityResponse =
            with_rate_limit_retry(&self.retry, "policyanalyzer.activities.query", || async {
                let response = self
                    .http_client
                    .get(&url)
                    .query(&[("filter", filter.as_str())])
                    .header(
                        "Authorization",
                        format!("Bearer {}", self.tokens.token().await?),
                    )
                    .send()
                    .await
                    .with_context(|| format!("querying key activity for {key}"))?;
                if !response.status().is_success() {
                    return Err(classify_response(
                        &format!("querying key activity for {key}"),
                        response,
                    )
                    .await);
                }
                response
                    .json()
                    .await
                    .context("parsing Policy Analyzer response")
            })
            .await?;

        let last_auth = response
            .activities
            .first()
            .map(|activity| activity.activity.last_authenticated_time);
        if last_auth.is_none() {
            debug!("no recorded authentication for key {}", key);
        }
        Ok(last_auth)
    }
}
