//! Spec fragments shared by both declaration kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Target cluster secret for the replicated credential.
///
/// Field names are declaration-chosen so workloads can mount the credential
/// under whatever keys they already expect.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    /// Name of the cluster secret, created in the declaration's namespace.
    pub name: String,
    /// Data key for the serialized JSON credential (GCP service accounts).
    #[serde(default = "default_json_key_name")]
    pub json_key_name: String,
    /// Data key for the PEM private key extracted from the JSON credential
    /// (GCP service accounts).
    #[serde(default = "default_pem_key_name")]
    pub pem_key_name: String,
    /// Data key for the client secret text (Azure service principals).
    #[serde(default = "default_client_secret_key_name")]
    pub client_secret_key_name: String,
}

pub fn default_json_key_name() -> String {
    "sa-key.json".to_string()
}

pub fn default_pem_key_name() -> String {
    "sa-key.pem".to_string()
}

pub fn default_client_secret_key_name() -> String {
    "client-secret".to_string()
}

/// Age thresholds (in days) gating the rotate/disable/delete transitions.
///
/// Declared values below the operator floors are raised; see
/// [`crate::cutoff::Cutoffs`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotation {
    /// Days after issue before the key is rotated.
    #[serde(default = "default_rotate_after")]
    pub rotate_after: u32,
    /// Days after rotation before the old key is disabled.
    #[serde(default = "default_disable_after")]
    pub disable_after: u32,
    /// Days after disabling before the key is deleted at the provider.
    #[serde(default = "default_delete_after")]
    pub delete_after: u32,
    /// Skip the last-authentication safety check before disabling.
    /// Honored only if every declaration for the identity sets it.
    #[serde(default)]
    pub ignore_usage_metrics: bool,
}

impl Default for KeyRotation {
    fn default() -> Self {
        Self {
            rotate_after: default_rotate_after(),
            disable_after: default_disable_after(),
            delete_after: default_delete_after(),
            ignore_usage_metrics: false,
        }
    }
}

fn default_rotate_after() -> u32 {
    crate::constants::ROTATE_AFTER_FLOOR_DAYS
}

fn default_disable_after() -> u32 {
    crate::constants::DISABLE_AFTER_FLOOR_DAYS
}

fn default_delete_after() -> u32 {
    crate::constants::DELETE_AFTER_FLOOR_DAYS
}

/// Kind of downstream sink the credential is replicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SinkKind {
    /// HashiCorp Vault KV path.
    Vault,
    /// Google Secret Manager secret, addressed as `<project>/<name>`.
    SecretManager,
    /// GitHub Actions repository secret, addressed as `<org>/<repo>/<name>`.
    Github,
}

impl SinkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SinkKind::Vault => "vault",
            SinkKind::SecretManager => "secretManager",
            SinkKind::Github => "github",
        }
    }
}

/// Shape of the payload written to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReplicationFormat {
    /// Explode the serialized JSON credential into a flat key/value map.
    /// Only valid for GCP service accounts.
    Map,
    /// The serialized credential, verbatim, under the declared subkey.
    Json,
    /// Standard-base64 encoding of the serialized credential.
    Base64,
    /// The PEM private key extracted from the JSON credential. Only valid
    /// for GCP service accounts.
    Pem,
    /// The serialized credential as plain text under the declared subkey.
    PlainText,
}

impl ReplicationFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReplicationFormat::Map => "map",
            ReplicationFormat::Json => "json",
            ReplicationFormat::Base64 => "base64",
            ReplicationFormat::Pem => "pem",
            ReplicationFormat::PlainText => "plainText",
        }
    }
}

/// One replication sink for the current credential.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationTarget {
    pub kind: SinkKind,
    /// Sink address. Vault: the KV path. Secret Manager:
    /// `<project>/<secret-name>`. GitHub: `<org>/<repo>/<secret-name>`.
    pub address: String,
    pub format: ReplicationFormat,
    /// Subkey the payload is stored under where the format calls for one.
    /// Defaults to `sa-key` when omitted.
    #[serde(default)]
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rotation_defaults_sit_on_floors() {
        let rotation = KeyRotation::default();
        assert_eq!(rotation.rotate_after, 7);
        assert_eq!(rotation.disable_after, 7);
        assert_eq!(rotation.delete_after, 3);
        assert!(!rotation.ignore_usage_metrics);
    }

    #[test]
    fn test_replication_target_deserializes_camel_case() {
        let yaml = r#"
kind: secretManager
address: my-project/my-secret
format: plainText
key: token
"#;
        let target: ReplicationTarget = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(target.kind, SinkKind::SecretManager);
        assert_eq!(target.address, "my-project/my-secret");
        assert_eq!(target.format, ReplicationFormat::PlainText);
        assert_eq!(target.key.as_deref(), Some("token"));
    }

    #[test]
    fn test_replication_key_defaults_to_none() {
        let yaml = "kind: vault\naddress: secret/foo\nformat: map\n";
        let target: ReplicationTarget = serde_yaml::from_str(yaml).unwrap();
        assert!(target.key.is_none());
    }
}
