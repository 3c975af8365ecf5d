//! Cache entry: the persisted per-identity state record.
//!
//! One entry exists per managed identity and lives in the `value` field of a
//! backing cluster secret as a single JSON object. The wire shape carries an
//! explicit `Type` discriminator plus a nested `Identifier` object; a legacy
//! shape without `Type` (bearing a top-level `ServiceAccount`) is accepted on
//! read and normalized to the GCP variant.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroize;

use crate::identity::{Identity, IdentityKind};

/// The active credential for an identity.
///
/// An empty `id` is the empty-sentinel: the identity currently has no active
/// credential (never issued, or just rotated away).
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub struct CurrentKey {
    /// Provider-assigned key id.
    pub id: String,
    /// Serialized credential exactly as issued (JSON key file for GCP,
    /// client secret text for Azure). This is the only form the operator
    /// ever stores.
    pub json: String,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
}

impl CurrentKey {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: String::new(),
            json: String::new(),
            created_at: epoch(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

impl Default for CurrentKey {
    fn default() -> Self {
        Self::empty()
    }
}

/// Most recent bundle failure, kept for notification throttling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "LastNotificationAt")]
    pub last_notification_at: DateTime<Utc>,
}

/// The persisted per-identity state record.
///
/// Invariants (held after every mutation):
/// - `current.id` is either empty or absent from both key maps;
/// - no key id appears in both `rotated_keys` and `disabled_keys`;
/// - the maps are always present (empty rather than nil) after decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "EntryRecord", try_from = "EntryRecord")]
pub struct Entry {
    pub identity: Identity,
    pub current_key: CurrentKey,
    /// keyID -> rotated-at. Was current, superseded, not yet disabled.
    pub rotated_keys: BTreeMap<String, DateTime<Utc>>,
    /// keyID -> disabled-at. Disabled, not yet deleted.
    pub disabled_keys: BTreeMap<String, DateTime<Utc>>,
    /// declaration qualified name -> `<spec-fingerprint>:<syncedKeyID>`.
    pub sync_status: BTreeMap<String, String>,
    pub last_error: Option<LastError>,
}

impl Entry {
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            current_key: CurrentKey::empty(),
            rotated_keys: BTreeMap::new(),
            disabled_keys: BTreeMap::new(),
            sync_status: BTreeMap::new(),
            last_error: None,
        }
    }

    #[must_use]
    pub fn principal(&self) -> &str {
        self.identity.principal()
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        self.identity.scope()
    }

    /// True when the entry tracks no credential in any position. Only such
    /// entries are eligible for retirement.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_key.is_empty() && self.rotated_keys.is_empty() && self.disabled_keys.is_empty()
    }

    /// Move the current key into the rotated set, stamped with `now`.
    /// No-op when there is no current key.
    pub fn rotate_current(&mut self, now: DateTime<Utc>) {
        if self.current_key.is_empty() {
            return;
        }
        self.rotated_keys.insert(self.current_key.id.clone(), now);
        self.current_key.zeroize();
        self.current_key = CurrentKey::empty();
    }

    /// Install a freshly issued credential as current.
    pub fn install_current(&mut self, id: String, json: String, now: DateTime<Utc>) {
        self.current_key = CurrentKey {
            id,
            json,
            created_at: now,
        };
    }

    /// Transition a key from rotated to disabled.
    pub fn mark_disabled(&mut self, key_id: &str, now: DateTime<Utc>) {
        self.rotated_keys.remove(key_id);
        self.disabled_keys.insert(key_id.to_string(), now);
    }

    /// Forget a key that was deleted at the provider.
    pub fn mark_deleted(&mut self, key_id: &str) {
        self.disabled_keys.remove(key_id);
    }

    /// Record a bundle failure, returning true when the notifier should be
    /// told about it. Repeats of the same message are throttled to once per
    /// `notify_interval`.
    pub fn note_error(
        &mut self,
        message: &str,
        now: DateTime<Utc>,
        notify_interval: Duration,
    ) -> bool {
        if let Some(last) = &self.last_error {
            if last.message == message && now - last.last_notification_at < notify_interval {
                self.last_error = Some(LastError {
                    message: message.to_string(),
                    timestamp: now,
                    last_notification_at: last.last_notification_at,
                });
                return false;
            }
        }
        self.last_error = Some(LastError {
            message: message.to_string(),
            timestamp: now,
            last_notification_at: now,
        });
        true
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

// Wire representation. `Type` + `Identifier` is the current shape; a record
// without `Type` must carry the legacy `ServiceAccount` object and is read
// back as a GCP identity. Refused when ambiguous.
#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<u8>,
    #[serde(rename = "Identifier", default, skip_serializing_if = "Option::is_none")]
    identifier: Option<IdentifierRecord>,
    #[serde(rename = "ServiceAccount", default, skip_serializing_if = "Option::is_none")]
    service_account: Option<LegacyServiceAccount>,
    #[serde(rename = "CurrentKey", default)]
    current_key: CurrentKeyRecord,
    #[serde(rename = "RotatedKeys", default)]
    rotated_keys: BTreeMap<String, DateTime<Utc>>,
    #[serde(rename = "DisabledKeys", default)]
    disabled_keys: BTreeMap<String, DateTime<Utc>>,
    #[serde(rename = "SyncStatus", default)]
    sync_status: BTreeMap<String, String>,
    #[serde(rename = "LastError", default, skip_serializing_if = "Option::is_none")]
    last_error: Option<LastError>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdentifierRecord {
    #[serde(rename = "Email", default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(rename = "Project", default, skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(rename = "ApplicationID", default, skip_serializing_if = "Option::is_none")]
    application_id: Option<String>,
    #[serde(rename = "TenantID", default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LegacyServiceAccount {
    #[serde(rename = "Email", default)]
    email: String,
    #[serde(rename = "Project", default)]
    project: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CurrentKeyRecord {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "JSON", default)]
    json: String,
    #[serde(rename = "CreatedAt", default = "epoch")]
    created_at: DateTime<Utc>,
}

impl From<Entry> for EntryRecord {
    fn from(entry: Entry) -> Self {
        let identifier = match &entry.identity {
            Identity::GcpServiceAccount { email, project } => IdentifierRecord {
                email: Some(email.clone()),
                project: Some(project.clone()),
                ..IdentifierRecord::default()
            },
            Identity::AzureServicePrincipal {
                application_id,
                tenant_id,
            } => IdentifierRecord {
                application_id: Some(application_id.clone()),
                tenant_id: Some(tenant_id.clone()),
                ..IdentifierRecord::default()
            },
        };
        EntryRecord {
            kind: Some(entry.identity.kind().discriminant()),
            identifier: Some(identifier),
            service_account: None,
            current_key: CurrentKeyRecord {
                id: entry.current_key.id.clone(),
                json: entry.current_key.json.clone(),
                created_at: entry.current_key.created_at,
            },
            rotated_keys: entry.rotated_keys,
            disabled_keys: entry.disabled_keys,
            sync_status: entry.sync_status,
            last_error: entry.last_error,
        }
    }
}

impl TryFrom<EntryRecord> for Entry {
    type Error = String;

    fn try_from(record: EntryRecord) -> Result<Self, Self::Error> {
        let identity = match record.kind {
            Some(tag) => {
                let kind = IdentityKind::from_discriminant(tag)
                    .ok_or_else(|| format!("unrecognized identity type tag {tag}"))?;
                let identifier = record
                    .identifier
                    .ok_or_else(|| "entry has a Type but no Identifier".to_string())?;
                match kind {
                    IdentityKind::GcpServiceAccount => Identity::GcpServiceAccount {
                        email: require(identifier.email, "Identifier.Email")?,
                        project: require(identifier.project, "Identifier.Project")?,
                    },
                    IdentityKind::AzureServicePrincipal => Identity::AzureServicePrincipal {
                        application_id: require(
                            identifier.application_id,
                            "Identifier.ApplicationID",
                        )?,
                        tenant_id: require(identifier.tenant_id, "Identifier.TenantID")?,
                    },
                }
            }
            None => {
                // Legacy shape. Only the ServiceAccount object makes it
                // unambiguously a GCP entry; anything else is refused rather
                // than guessed at.
                let sa = record
                    .service_account
                    .ok_or_else(|| "entry has neither Type nor ServiceAccount".to_string())?;
                if sa.email.is_empty() {
                    return Err("legacy entry has an empty ServiceAccount.Email".to_string());
                }
                Identity::GcpServiceAccount {
                    email: sa.email,
                    project: sa.project,
                }
            }
        };

        Ok(Entry {
            identity,
            current_key: CurrentKey {
                id: record.current_key.id,
                json: record.current_key.json,
                created_at: record.current_key.created_at,
            },
            rotated_keys: record.rotated_keys,
            disabled_keys: record.disabled_keys,
            sync_status: record.sync_status,
            last_error: record.last_error,
        })
    }
}

fn require(field: Option<String>, name: &str) -> Result<String, String> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("entry is missing {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcp_identity() -> Identity {
        Identity::GcpServiceAccount {
            email: "sa1@p.iam.gserviceaccount.com".to_string(),
            project: "p".to_string(),
        }
    }

    #[test]
    fn test_round_trip_preserves_entry() {
        let mut entry = Entry::new(gcp_identity());
        entry.install_current("k2".to_string(), r#"{"private_key":"pem"}"#.to_string(), Utc::now());
        entry.rotated_keys.insert("k1".to_string(), Utc::now());
        entry
            .sync_status
            .insert("ns/decl".to_string(), format!("{}:{}", "a".repeat(64), "k2"));

        let serialized = serde_json::to_string(&entry).unwrap();
        let decoded: Entry = serde_json::from_str(&serialized).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_wire_shape_has_type_and_identifier() {
        let entry = Entry::new(gcp_identity());
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&entry).unwrap()).unwrap();
        assert_eq!(value["Type"], 1);
        assert_eq!(value["Identifier"]["Email"], "sa1@p.iam.gserviceaccount.com");
        assert_eq!(value["Identifier"]["Project"], "p");
        assert!(value.get("ServiceAccount").is_none());
    }

    #[test]
    fn test_azure_wire_shape() {
        let entry = Entry::new(Identity::AzureServicePrincipal {
            application_id: "app-1".to_string(),
            tenant_id: "t-1".to_string(),
        });
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&entry).unwrap()).unwrap();
        assert_eq!(value["Type"], 2);
        assert_eq!(value["Identifier"]["ApplicationID"], "app-1");
        assert_eq!(value["Identifier"]["TenantID"], "t-1");
    }

    #[test]
    fn test_legacy_shape_decodes_as_gcp() {
        let legacy = r#"{
            "ServiceAccount": {"Email": "old@p.iam.gserviceaccount.com", "Project": "p"},
            "CurrentKey": {"ID": "k1", "JSON": "{}", "CreatedAt": "2023-01-02T03:04:05Z"},
            "RotatedKeys": {"k0": "2022-12-01T00:00:00Z"}
        }"#;
        let entry: Entry = serde_json::from_str(legacy).unwrap();
        assert_eq!(entry.identity.kind(), IdentityKind::GcpServiceAccount);
        assert_eq!(entry.principal(), "old@p.iam.gserviceaccount.com");
        assert_eq!(entry.current_key.id, "k1");
        assert_eq!(entry.rotated_keys.len(), 1);
        // Maps absent from the payload come back empty, not nil.
        assert!(entry.disabled_keys.is_empty());
        assert!(entry.sync_status.is_empty());
    }

    #[test]
    fn test_ambiguous_legacy_shape_is_refused() {
        let no_identity = r#"{"CurrentKey": {"ID": "", "JSON": ""}}"#;
        assert!(serde_json::from_str::<Entry>(no_identity).is_err());

        let empty_email = r#"{"ServiceAccount": {"Email": "", "Project": "p"}}"#;
        assert!(serde_json::from_str::<Entry>(empty_email).is_err());
    }

    #[test]
    fn test_unknown_type_tag_is_refused() {
        let bad = r#"{"Type": 9, "Identifier": {"Email": "a", "Project": "b"}}"#;
        assert!(serde_json::from_str::<Entry>(bad).is_err());
    }

    #[test]
    fn test_rotate_current_moves_id() {
        let mut entry = Entry::new(gcp_identity());
        let issued = Utc::now() - Duration::days(10);
        entry.install_current("k1".to_string(), "{}".to_string(), issued);

        let now = Utc::now();
        entry.rotate_current(now);

        assert!(entry.current_key.is_empty());
        assert_eq!(entry.rotated_keys.get("k1"), Some(&now));
    }

    #[test]
    fn test_rotate_empty_current_is_noop() {
        let mut entry = Entry::new(gcp_identity());
        entry.rotate_current(Utc::now());
        assert!(entry.rotated_keys.is_empty());
    }

    #[test]
    fn test_key_sets_stay_disjoint_through_lifecycle() {
        let mut entry = Entry::new(gcp_identity());
        let now = Utc::now();
        entry.install_current("k1".to_string(), "{}".to_string(), now);
        entry.rotate_current(now);
        entry.install_current("k2".to_string(), "{}".to_string(), now);
        entry.mark_disabled("k1", now);

        assert!(!entry.rotated_keys.contains_key(&entry.current_key.id));
        assert!(!entry.disabled_keys.contains_key(&entry.current_key.id));
        assert!(entry
            .rotated_keys
            .keys()
            .all(|k| !entry.disabled_keys.contains_key(k)));

        entry.mark_deleted("k1");
        assert!(entry.disabled_keys.is_empty());
        assert!(!entry.is_empty());
    }

    #[test]
    fn test_note_error_throttles_repeats() {
        let mut entry = Entry::new(gcp_identity());
        let now = Utc::now();
        let interval = Duration::hours(8);

        assert!(entry.note_error("boom", now, interval));
        assert!(!entry.note_error("boom", now + Duration::hours(1), interval));
        assert!(entry.note_error("boom", now + Duration::hours(9), interval));
        assert!(entry.note_error("different", now + Duration::hours(9), interval));
    }
}
