//! # Yale
//!
//! Kubernetes operator that rotates GCP service account keys and Azure
//! application client secrets and replicates them to downstream secret
//! stores.
//!
//! ## Overview
//!
//! Each invocation is one run to completion:
//!
//! 1. **List declarations** - `GcpSaKey` and `AzureClientSecret` custom
//!    resources across all namespaces
//! 2. **Join with the cache** - per-identity state persisted in backing
//!    cluster secrets in the cache namespace
//! 3. **Rotate** - issue fresh credentials, rotate aged ones, disable
//!    rotated ones that stopped being used, delete disabled ones
//! 4. **Replicate** - fan the active credential out to cluster secrets,
//!    Vault paths, Google Secret Manager, and GitHub Actions secrets
//!
//! The process exits non-zero iff any identity failed; healthy identities
//! are always processed to completion. Deploy it as a CronJob (or similar)
//! with a single concurrent instance.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use yale::authmetrics::{AzureUsageMetrics, CloudUsageMetrics, GcpUsageMetrics};
use yale::clients::azure::{AzureCredentials, AzureTokenSource};
use yale::clients::gcp::GcpTokenSource;
use yale::clients::{
    GitHubClient, GsmClient, KubeClusterClient, RepoSecretWriter, UnconfiguredSink, VaultClient,
    VaultWriter,
};
use yale::constants::{DEFAULT_CACHE_NAMESPACE, DEFAULT_ERROR_NOTIFY_INTERVAL_HOURS};
use yale::keyops::{AzureKeyClient, CloudKeyOps, GcpKeyClient};
use yale::notify::LogNotifier;
use yale::{Collaborators, Config, Yale};

/// Rotates declared cloud credentials once and exits.
#[derive(Parser, Debug)]
#[command(name = "yale", version, about)]
struct Args {
    /// Namespace holding the cache-entry backing secrets.
    #[arg(long, env = "YALE_CACHE_NAMESPACE", default_value = DEFAULT_CACHE_NAMESPACE)]
    cache_namespace: String,

    /// Minimum hours between repeated error notifications per identity.
    #[arg(long, env = "YALE_ERROR_NOTIFY_INTERVAL_HOURS", default_value_t = DEFAULT_ERROR_NOTIFY_INTERVAL_HOURS)]
    error_notify_interval_hours: i64,

    /// Vault address for vault replications (e.g. https://vault.example.org).
    #[arg(long, env = "VAULT_ADDR")]
    vault_addr: Option<String>,

    /// Vault token for vault replications.
    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    vault_token: Option<String>,

    /// GitHub token for github replications.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Client id of the operator's own Azure application.
    #[arg(long, env = "AZURE_CLIENT_ID")]
    azure_client_id: Option<String>,

    /// Client secret of the operator's own Azure application.
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    azure_client_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yale=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting Yale");

    let yale = build(&args).await?;
    match yale.run().await {
        Ok(()) => {
            info!("run succeeded");
            Ok(())
        }
        Err(err) => {
            error!("run failed: {:#}", err);
            std::process::exit(1);
        }
    }
}

async fn build(args: &Args) -> Result<Yale> {
    let kube_client = kube::Client::try_default()
        .await
        .context("creating Kubernetes client")?;
    let http_client = reqwest::Client::builder()
        .build()
        .context("creating HTTP client")?;

    let gcp_tokens = Arc::new(GcpTokenSource::new(http_client.clone()));
    let azure_credentials = match (&args.azure_client_id, &args.azure_client_secret) {
        (Some(client_id), Some(client_secret)) => Some(AzureCredentials {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        }),
        _ => None,
    };
    let azure_tokens = Arc::new(AzureTokenSource::new(http_client.clone(), azure_credentials));

    let keyops = CloudKeyOps::new(
        Arc::new(GcpKeyClient::new(http_client.clone(), Arc::clone(&gcp_tokens))),
        Arc::new(AzureKeyClient::new(http_client.clone(), azure_tokens)),
    );
    let metrics = CloudUsageMetrics::new(
        Arc::new(GcpUsageMetrics::new(http_client.clone(), Arc::clone(&gcp_tokens))),
        Arc::new(AzureUsageMetrics::new()),
    );

    let vault: Arc<dyn VaultWriter> = match (&args.vault_addr, &args.vault_token) {
        (Some(addr), Some(token)) => Arc::new(VaultClient::new(
            http_client.clone(),
            addr,
            token.clone(),
        )?),
        _ => Arc::new(UnconfiguredSink::new("VAULT_ADDR/VAULT_TOKEN")),
    };
    let repo_secrets: Arc<dyn RepoSecretWriter> = match &args.github_token {
        Some(token) => Arc::new(GitHubClient::new(http_client.clone(), token.clone())),
        None => Arc::new(UnconfiguredSink::new("GITHUB_TOKEN")),
    };

    let config = Config {
        cache_namespace: args.cache_namespace.clone(),
        error_notify_interval_hours: args.error_notify_interval_hours,
    };
    Ok(Yale::new(
        config,
        Collaborators {
            cluster: Arc::new(KubeClusterClient::new(kube_client)),
            keyops: Arc::new(keyops),
            metrics: Arc::new(metrics),
            vault,
            secret_manager: Arc::new(GsmClient::new(http_client, gcp_tokens)),
            repo_secrets,
            notifier: Arc::new(LogNotifier),
        },
    ))
}
