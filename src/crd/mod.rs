//! # Custom Resource Definitions
//!
//! CRD types for the Yale operator.
//!
//! Two declaration kinds exist, one per identity shape:
//! `GcpSaKey` for GCP service account keys and `AzureClientSecret` for Azure
//! application client secrets. Both carry the same secret spec, rotation
//! spec, and replication list; they differ only in the identity block.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Shared spec fragments (secret spec, rotation, replications)
//! - `gcp_sa_key.rs` - GcpSaKey CRD
//! - `azure_client_secret.rs` - AzureClientSecret CRD

mod azure_client_secret;
mod gcp_sa_key;
mod spec;

// Re-export all public types
pub use azure_client_secret::{AzureClientSecret, AzureClientSecretSpec, AzureServicePrincipal};
pub use gcp_sa_key::{GcpSaKey, GcpSaKeySpec, GoogleServiceAccount};
pub use spec::{
    default_client_secret_key_name, default_json_key_name, default_pem_key_name, KeyRotation,
    ReplicationFormat, ReplicationTarget, SecretSpec, SinkKind,
};
