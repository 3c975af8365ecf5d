//! # Cutoff policy
//!
//! Derives the numeric age thresholds and the usage-metrics stance for one
//! identity from however many declarations reference it. Users can never
//! weaken safety: declared values below the operator floors are raised, and
//! conflicting declarations resolve to the shortest operational window so
//! old keys leave the system faster.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::constants::{
    DELETE_AFTER_FLOOR_DAYS, DISABLE_AFTER_FLOOR_DAYS, ROTATE_AFTER_FLOOR_DAYS, SAFETY_BUFFER_DAYS,
};
use crate::resourcemap::Declaration;

/// Age thresholds gating the rotate/disable/delete transitions for one
/// identity, plus the consensus usage-metrics stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    rotate_after_days: u32,
    disable_after_days: u32,
    delete_after_days: u32,
    ignore_usage_metrics: bool,
}

impl Cutoffs {
    /// Derive cutoffs from the declarations in a bundle. With zero
    /// declarations (entry-only retirement case) every threshold sits at its
    /// floor and usage metrics are honored.
    #[must_use]
    pub fn from_declarations(principal: &str, declarations: &[Declaration]) -> Self {
        let rotate_after_days = floored_minimum(
            principal,
            "rotateAfter",
            declarations.iter().map(|d| d.rotation.rotate_after),
            ROTATE_AFTER_FLOOR_DAYS,
        );
        let disable_after_days = floored_minimum(
            principal,
            "disableAfter",
            declarations.iter().map(|d| d.rotation.disable_after),
            DISABLE_AFTER_FLOOR_DAYS,
        );
        let delete_after_days = floored_minimum(
            principal,
            "deleteAfter",
            declarations.iter().map(|d| d.rotation.delete_after),
            DELETE_AFTER_FLOOR_DAYS,
        );

        let ignore_usage_metrics = !declarations.is_empty()
            && declarations.iter().all(|d| d.rotation.ignore_usage_metrics);
        if !ignore_usage_metrics && declarations.iter().any(|d| d.rotation.ignore_usage_metrics) {
            warn!(
                "{}: declarations disagree on ignoreUsageMetrics; honoring usage metrics",
                principal
            );
        }

        Self {
            rotate_after_days,
            disable_after_days,
            delete_after_days,
            ignore_usage_metrics,
        }
    }

    #[must_use]
    pub fn should_rotate(&self, created_at: DateTime<Utc>) -> bool {
        expired(created_at, i64::from(self.rotate_after_days))
    }

    #[must_use]
    pub fn should_disable(&self, rotated_at: DateTime<Utc>) -> bool {
        expired(rotated_at, i64::from(self.disable_after_days))
    }

    #[must_use]
    pub fn should_delete(&self, disabled_at: DateTime<Utc>) -> bool {
        expired(disabled_at, i64::from(self.delete_after_days))
    }

    /// Whether a key whose last authentication was at `last_auth_at` may be
    /// disabled. True when the last use is older than the fixed safety
    /// buffer, or when every declaration opted out of usage metrics.
    #[must_use]
    pub fn safe_to_disable(&self, last_auth_at: DateTime<Utc>) -> bool {
        self.ignore_usage_metrics || expired(last_auth_at, SAFETY_BUFFER_DAYS)
    }

    #[must_use]
    pub fn ignore_usage_metrics(&self) -> bool {
        self.ignore_usage_metrics
    }

    #[must_use]
    pub fn rotate_after_days(&self) -> u32 {
        self.rotate_after_days
    }

    #[must_use]
    pub fn disable_after_days(&self) -> u32 {
        self.disable_after_days
    }

    #[must_use]
    pub fn delete_after_days(&self) -> u32 {
        self.delete_after_days
    }
}

fn expired(at: DateTime<Utc>, threshold_days: i64) -> bool {
    Utc::now() - at > Duration::days(threshold_days)
}

fn floored_minimum(
    principal: &str,
    field: &str,
    declared: impl Iterator<Item = u32>,
    floor: u32,
) -> u32 {
    let mut values: Vec<u32> = declared.collect();
    values.sort_unstable();
    values.dedup();
    if values.len() > 1 {
        warn!(
            "{}: declarations disagree on {} ({:?}); using the smallest",
            principal, field, values
        );
    }
    match values.first() {
        None => floor,
        Some(&smallest) if smallest < floor => {
            warn!(
                "{}: declared {} of {} days is below the floor; raising to {}",
                principal, field, smallest, floor
            );
            floor
        }
        Some(&smallest) => smallest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KeyRotation, SecretSpec};
    use crate::identity::Identity;
    use std::collections::BTreeMap;

    fn declaration(rotation: KeyRotation) -> Declaration {
        Declaration {
            namespace: "ns".to_string(),
            name: "d".to_string(),
            uid: "u".to_string(),
            api_version: "yale.terra.bio/v1beta1".to_string(),
            kind: "GcpSaKey".to_string(),
            identity: Identity::GcpServiceAccount {
                email: "sa@p.com".to_string(),
                project: "p".to_string(),
            },
            secret: SecretSpec {
                name: "s".to_string(),
                json_key_name: "key.json".to_string(),
                pem_key_name: "key.pem".to_string(),
                client_secret_key_name: "client-secret".to_string(),
            },
            rotation,
            replications: Vec::new(),
            labels: BTreeMap::new(),
            spec_json: "{}".to_string(),
        }
    }

    fn rotation(rotate: u32, disable: u32, delete: u32, ignore: bool) -> KeyRotation {
        KeyRotation {
            rotate_after: rotate,
            disable_after: disable,
            delete_after: delete,
            ignore_usage_metrics: ignore,
        }
    }

    #[test]
    fn test_zero_declarations_yield_floors() {
        let cutoffs = Cutoffs::from_declarations("sa@p.com", &[]);
        assert_eq!(cutoffs.rotate_after_days(), 7);
        assert_eq!(cutoffs.disable_after_days(), 7);
        assert_eq!(cutoffs.delete_after_days(), 3);
        assert!(!cutoffs.ignore_usage_metrics());
    }

    #[test]
    fn test_low_values_raised_to_floor() {
        let declarations = vec![declaration(rotation(1, 2, 0, false))];
        let cutoffs = Cutoffs::from_declarations("sa@p.com", &declarations);
        assert_eq!(cutoffs.rotate_after_days(), 7);
        assert_eq!(cutoffs.disable_after_days(), 7);
        assert_eq!(cutoffs.delete_after_days(), 3);
    }

    #[test]
    fn test_conflicting_declarations_take_minimum() {
        let declarations = vec![
            declaration(rotation(90, 30, 14, false)),
            declaration(rotation(30, 14, 7, false)),
        ];
        let cutoffs = Cutoffs::from_declarations("sa@p.com", &declarations);
        assert_eq!(cutoffs.rotate_after_days(), 30);
        assert_eq!(cutoffs.disable_after_days(), 14);
        assert_eq!(cutoffs.delete_after_days(), 7);
    }

    #[test]
    fn test_ignore_usage_metrics_requires_consensus() {
        let split = vec![
            declaration(rotation(90, 14, 7, true)),
            declaration(rotation(90, 14, 7, false)),
        ];
        assert!(!Cutoffs::from_declarations("sa@p.com", &split).ignore_usage_metrics());

        let unanimous = vec![
            declaration(rotation(90, 14, 7, true)),
            declaration(rotation(90, 14, 7, true)),
        ];
        assert!(Cutoffs::from_declarations("sa@p.com", &unanimous).ignore_usage_metrics());
    }

    #[test]
    fn test_should_rotate_respects_threshold() {
        let cutoffs = Cutoffs::from_declarations("sa@p.com", &[declaration(rotation(7, 7, 3, false))]);
        assert!(cutoffs.should_rotate(Utc::now() - Duration::days(8)));
        assert!(!cutoffs.should_rotate(Utc::now() - Duration::days(6)));
    }

    #[test]
    fn test_safety_buffer() {
        let honoring = Cutoffs::from_declarations("sa@p.com", &[]);
        assert!(honoring.safe_to_disable(Utc::now() - Duration::days(4)));
        assert!(!honoring.safe_to_disable(Utc::now() - Duration::hours(4)));

        let ignoring = Cutoffs::from_declarations(
            "sa@p.com",
            &[declaration(rotation(7, 7, 3, true))],
        );
        assert!(ignoring.safe_to_disable(Utc::now() - Duration::hours(4)));
    }

    #[test]
    fn test_disable_and_delete_thresholds() {
        let cutoffs =
            Cutoffs::from_declarations("sa@p.com", &[declaration(rotation(7, 7, 3, false))]);
        assert!(cutoffs.should_disable(Utc::now() - Duration::days(8)));
        assert!(!cutoffs.should_disable(Utc::now() - Duration::days(2)));
        assert!(cutoffs.should_delete(Utc::now() - Duration::days(4)));
        assert!(!cutoffs.should_delete(Utc::now() - Duration::days(2)));
    }
}
