//! # CRD Validation Tests
//!
//! Deserialization tests for both declaration kinds, catching schema drift
//! early. Fixtures mirror what users actually apply.

use yale::crd::{
    AzureClientSecret, GcpSaKey, ReplicationFormat, SinkKind,
};

/// GcpSaKey with every field populated.
#[test]
fn test_gcp_sa_key_full() {
    let yaml = r#"
apiVersion: yale.terra.bio/v1beta1
kind: GcpSaKey
metadata:
  name: my-service-sa
  namespace: my-namespace
  labels:
    app: my-service
spec:
  googleServiceAccount:
    name: my-service@my-project.iam.gserviceaccount.com
    project: my-project
  secret:
    name: my-service-sa-key
    jsonKeyName: key.json
    pemKeyName: key.pem
  keyRotation:
    rotateAfter: 90
    disableAfter: 14
    deleteAfter: 7
    ignoreUsageMetrics: false
  replications:
    - kind: vault
      address: secret/dsp/my-service/sa-key
      format: map
    - kind: secretManager
      address: my-project/my-service-sa-key
      format: json
      key: credential
    - kind: github
      address: broadinstitute/my-service/SA_KEY_B64
      format: base64
"#;

    let resource: GcpSaKey = serde_yaml::from_str(yaml).expect("full GcpSaKey should deserialize");

    assert_eq!(
        resource.spec.google_service_account.name,
        "my-service@my-project.iam.gserviceaccount.com"
    );
    assert_eq!(resource.spec.google_service_account.project, "my-project");
    assert_eq!(resource.spec.secret.name, "my-service-sa-key");
    assert_eq!(resource.spec.secret.json_key_name, "key.json");
    assert_eq!(resource.spec.secret.pem_key_name, "key.pem");
    assert_eq!(resource.spec.key_rotation.rotate_after, 90);
    assert_eq!(resource.spec.key_rotation.disable_after, 14);
    assert_eq!(resource.spec.key_rotation.delete_after, 7);
    assert!(!resource.spec.key_rotation.ignore_usage_metrics);

    assert_eq!(resource.spec.replications.len(), 3);
    assert_eq!(resource.spec.replications[0].kind, SinkKind::Vault);
    assert_eq!(resource.spec.replications[0].format, ReplicationFormat::Map);
    assert_eq!(resource.spec.replications[1].kind, SinkKind::SecretManager);
    assert_eq!(
        resource.spec.replications[1].key.as_deref(),
        Some("credential")
    );
    assert_eq!(resource.spec.replications[2].kind, SinkKind::Github);
    assert_eq!(
        resource.spec.replications[2].format,
        ReplicationFormat::Base64
    );
}

/// Minimal GcpSaKey relies on the spec defaults.
#[test]
fn test_gcp_sa_key_minimal_defaults() {
    let yaml = r#"
apiVersion: yale.terra.bio/v1beta1
kind: GcpSaKey
metadata:
  name: minimal
  namespace: default
spec:
  googleServiceAccount:
    name: sa@p.iam.gserviceaccount.com
    project: p
  secret:
    name: sa-key
"#;

    let resource: GcpSaKey =
        serde_yaml::from_str(yaml).expect("minimal GcpSaKey should deserialize");

    assert_eq!(resource.spec.secret.json_key_name, "sa-key.json");
    assert_eq!(resource.spec.secret.pem_key_name, "sa-key.pem");
    assert_eq!(resource.spec.secret.client_secret_key_name, "client-secret");
    // Rotation defaults sit on the operator floors.
    assert_eq!(resource.spec.key_rotation.rotate_after, 7);
    assert_eq!(resource.spec.key_rotation.disable_after, 7);
    assert_eq!(resource.spec.key_rotation.delete_after, 3);
    assert!(!resource.spec.key_rotation.ignore_usage_metrics);
    assert!(resource.spec.replications.is_empty());
}

/// AzureClientSecret with every field populated.
#[test]
fn test_azure_client_secret_full() {
    let yaml = r#"
apiVersion: yale.terra.bio/v1beta1
kind: AzureClientSecret
metadata:
  name: my-service-sp
  namespace: my-namespace
spec:
  azureServicePrincipal:
    applicationId: 11111111-2222-3333-4444-555555555555
    tenantId: 99999999-8888-7777-6666-555555555555
  secret:
    name: my-service-client-secret
    clientSecretKeyName: azure-secret
  keyRotation:
    rotateAfter: 60
    disableAfter: 14
    deleteAfter: 7
    ignoreUsageMetrics: true
  replications:
    - kind: vault
      address: secret/dsp/my-service/client-secret
      format: plainText
      key: secret
"#;

    let resource: AzureClientSecret =
        serde_yaml::from_str(yaml).expect("full AzureClientSecret should deserialize");

    assert_eq!(
        resource.spec.azure_service_principal.application_id,
        "11111111-2222-3333-4444-555555555555"
    );
    assert_eq!(
        resource.spec.azure_service_principal.tenant_id,
        "99999999-8888-7777-6666-555555555555"
    );
    assert_eq!(resource.spec.secret.client_secret_key_name, "azure-secret");
    assert!(resource.spec.key_rotation.ignore_usage_metrics);
    assert_eq!(
        resource.spec.replications[0].format,
        ReplicationFormat::PlainText
    );
    assert_eq!(resource.spec.replications[0].key.as_deref(), Some("secret"));
}

/// Unknown replication kinds must fail loudly instead of silently syncing
/// nowhere.
#[test]
fn test_unknown_replication_kind_is_rejected() {
    let yaml = r#"
apiVersion: yale.terra.bio/v1beta1
kind: GcpSaKey
metadata:
  name: bad
  namespace: default
spec:
  googleServiceAccount:
    name: sa@p.iam.gserviceaccount.com
    project: p
  secret:
    name: sa-key
  replications:
    - kind: carrier-pigeon
      address: somewhere
      format: json
"#;

    assert!(serde_yaml::from_str::<GcpSaKey>(yaml).is_err());
}

/// Missing identity blocks deserialize at the schema level.
#[test]
fn test_missing_service_account_is_rejected() {
    let yaml = r#"
apiVersion: yale.terra.bio/v1beta1
kind: GcpSaKey
metadata:
  name: bad
  namespace: default
spec:
  secret:
    name: sa-key
"#;

    assert!(serde_yaml::from_str::<GcpSaKey>(yaml).is_err());
}
