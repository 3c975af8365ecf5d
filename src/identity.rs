//! # Identity
//!
//! A cloud principal the operator manages credentials for. Two shapes exist:
//! a GCP service account (email + project) and an Azure service principal
//! (application id + tenant id). Everything downstream of the resource mapper
//! keys its state off the identity's stable principal string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator tag for the two identity shapes. The numeric values are
/// part of the cache-entry wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IdentityKind {
    GcpServiceAccount = 1,
    AzureServicePrincipal = 2,
}

impl IdentityKind {
    /// Wire discriminator for the cache-entry `Type` field.
    #[must_use]
    pub fn discriminant(self) -> u8 {
        self as u8
    }

    /// Inverse of [`IdentityKind::discriminant`].
    #[must_use]
    pub fn from_discriminant(value: u8) -> Option<Self> {
        match value {
            1 => Some(IdentityKind::GcpServiceAccount),
            2 => Some(IdentityKind::AzureServicePrincipal),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityKind::GcpServiceAccount => "gcp-service-account",
            IdentityKind::AzureServicePrincipal => "azure-service-principal",
        }
    }
}

/// A cloud identity. Equality is tag + principal: two identities that share
/// a principal but disagree on scope are the *same* identity as far as
/// bundling is concerned; the resource mapper rejects such bundles instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Identity {
    /// GCP service account identified by email, living in a project.
    GcpServiceAccount { email: String, project: String },
    /// Azure application identified by client/application id, living in a
    /// tenant.
    AzureServicePrincipal {
        application_id: String,
        tenant_id: String,
    },
}

impl Identity {
    #[must_use]
    pub fn kind(&self) -> IdentityKind {
        match self {
            Identity::GcpServiceAccount { .. } => IdentityKind::GcpServiceAccount,
            Identity::AzureServicePrincipal { .. } => IdentityKind::AzureServicePrincipal,
        }
    }

    /// Stable principal string: the service account email or the Azure
    /// application id.
    #[must_use]
    pub fn principal(&self) -> &str {
        match self {
            Identity::GcpServiceAccount { email, .. } => email,
            Identity::AzureServicePrincipal { application_id, .. } => application_id,
        }
    }

    /// Containing cloud resource: the GCP project or the Azure tenant.
    #[must_use]
    pub fn scope(&self) -> &str {
        match self {
            Identity::GcpServiceAccount { project, .. } => project,
            Identity::AzureServicePrincipal { tenant_id, .. } => tenant_id,
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.principal() == other.principal()
    }
}

impl Eq for Identity {}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.principal(), self.kind().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_ignores_scope() {
        let a = Identity::GcpServiceAccount {
            email: "sa@p.iam.gserviceaccount.com".to_string(),
            project: "p".to_string(),
        };
        let b = Identity::GcpServiceAccount {
            email: "sa@p.iam.gserviceaccount.com".to_string(),
            project: "other".to_string(),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_equality_respects_kind() {
        let a = Identity::GcpServiceAccount {
            email: "shared".to_string(),
            project: "p".to_string(),
        };
        let b = Identity::AzureServicePrincipal {
            application_id: "shared".to_string(),
            tenant_id: "t".to_string(),
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_discriminant_round_trip() {
        for kind in [
            IdentityKind::GcpServiceAccount,
            IdentityKind::AzureServicePrincipal,
        ] {
            assert_eq!(IdentityKind::from_discriminant(kind.discriminant()), Some(kind));
        }
        assert_eq!(IdentityKind::from_discriminant(0), None);
        assert_eq!(IdentityKind::from_discriminant(3), None);
    }

    #[test]
    fn test_principal_and_scope() {
        let id = Identity::AzureServicePrincipal {
            application_id: "app-123".to_string(),
            tenant_id: "tenant-9".to_string(),
        };
        assert_eq!(id.principal(), "app-123");
        assert_eq!(id.scope(), "tenant-9");
    }
}
