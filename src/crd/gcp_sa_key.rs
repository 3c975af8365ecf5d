//! GcpSaKey declaration.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::spec::{KeyRotation, ReplicationTarget, SecretSpec};

/// Declares a GCP service account whose keys Yale issues, rotates, and
/// replicates.
///
/// # Example
///
/// ```yaml
/// apiVersion: yale.terra.bio/v1beta1
/// kind: GcpSaKey
/// metadata:
///   name: my-service-sa
///   namespace: my-namespace
/// spec:
///   googleServiceAccount:
///     name: my-service@my-project.iam.gserviceaccount.com
///     project: my-project
///   secret:
///     name: my-service-sa-key
///     jsonKeyName: key.json
///     pemKeyName: key.pem
///   keyRotation:
///     rotateAfter: 90
///     disableAfter: 14
///     deleteAfter: 7
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "GcpSaKey",
    group = "yale.terra.bio",
    version = "v1beta1",
    namespaced,
    printcolumn = r#"{"name":"ServiceAccount", "type":"string", "jsonPath":".spec.googleServiceAccount.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GcpSaKeySpec {
    /// The managed service account.
    pub google_service_account: GoogleServiceAccount,
    /// Target cluster secret for the current key.
    pub secret: SecretSpec,
    /// Rotation thresholds.
    #[serde(default)]
    pub key_rotation: KeyRotation,
    /// Additional sinks the current key is replicated to.
    #[serde(default)]
    pub replications: Vec<ReplicationTarget>,
}

/// The GCP service account a `GcpSaKey` declaration manages.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleServiceAccount {
    /// Service account email.
    pub name: String,
    /// Project the service account lives in.
    pub project: String,
}
