//! AzureClientSecret declaration.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::spec::{KeyRotation, ReplicationTarget, SecretSpec};

/// Declares an Azure application whose client secrets Yale issues, rotates,
/// and replicates.
///
/// # Example
///
/// ```yaml
/// apiVersion: yale.terra.bio/v1beta1
/// kind: AzureClientSecret
/// metadata:
///   name: my-service-sp
///   namespace: my-namespace
/// spec:
///   azureServicePrincipal:
///     applicationId: 11111111-2222-3333-4444-555555555555
///     tenantId: 99999999-8888-7777-6666-555555555555
///   secret:
///     name: my-service-client-secret
///     clientSecretKeyName: client-secret
///   keyRotation:
///     rotateAfter: 90
///     disableAfter: 14
///     deleteAfter: 7
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AzureClientSecret",
    group = "yale.terra.bio",
    version = "v1beta1",
    namespaced,
    printcolumn = r#"{"name":"Application", "type":"string", "jsonPath":".spec.azureServicePrincipal.applicationId"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClientSecretSpec {
    /// The managed service principal.
    pub azure_service_principal: AzureServicePrincipal,
    /// Target cluster secret for the current client secret.
    pub secret: SecretSpec,
    /// Rotation thresholds.
    #[serde(default)]
    pub key_rotation: KeyRotation,
    /// Additional sinks the current client secret is replicated to.
    #[serde(default)]
    pub replications: Vec<ReplicationTarget>,
}

/// The Azure application an `AzureClientSecret` declaration manages.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureServicePrincipal {
    /// Application (client) id.
    pub application_id: String,
    /// Tenant the application lives in.
    pub tenant_id: String,
}
