//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent the operator's fixed policy floors and wire-level
//! identifiers. None of them are user-configurable; the configurable surface
//! lives in [`crate::config::Config`].

/// Namespace that holds the cache-entry backing secrets unless overridden.
pub const DEFAULT_CACHE_NAMESPACE: &str = "yale-cache";

/// Name prefix for cache-entry backing secrets.
pub const CACHE_SECRET_PREFIX: &str = "yale-cache-";

/// Label applied to every cache-entry backing secret. Listing selects on
/// exactly `<CACHE_LABEL_KEY>=true`.
pub const CACHE_LABEL_KEY: &str = "yale.terra.bio/cache-entry";

/// The single data field inside a cache-entry backing secret.
pub const CACHE_SECRET_FIELD: &str = "value";

/// Annotation set on every replicated cluster secret so Stakater Reloader
/// restarts consumers when the credential rotates.
pub const RELOADER_ANNOTATION: &str = "reloader.stakater.com/match";

/// Label stamped on Google Secret Manager secrets created by the operator.
pub const OWNED_LABEL_KEY: &str = "owned-by";

/// Value for [`OWNED_LABEL_KEY`].
pub const OWNED_LABEL_VALUE: &str = "yale";

/// Minimum permitted rotate-after threshold (days). Declared values below
/// the floor are raised to it.
pub const ROTATE_AFTER_FLOOR_DAYS: u32 = 7;

/// Minimum permitted disable-after threshold (days).
pub const DISABLE_AFTER_FLOOR_DAYS: u32 = 7;

/// Minimum permitted delete-after threshold (days).
pub const DELETE_AFTER_FLOOR_DAYS: u32 = 3;

/// A key authenticated within this window is never disabled, whatever the
/// declared thresholds say. Cloud usage-metric APIs lag realtime; this is a
/// floor, not a ceiling.
pub const SAFETY_BUFFER_DAYS: i64 = 3;

/// Fallback subkey for replication payloads when the declaration omits one.
pub const DEFAULT_REPLICATION_KEY: &str = "sa-key";

/// Attempts made against rate-limited (HTTP 429) provider endpoints before
/// the error surfaces.
pub const RATE_LIMIT_RETRY_ATTEMPTS: u32 = 5;

/// Base sleep between rate-limit retries (seconds); doubles per attempt.
pub const RATE_LIMIT_RETRY_BASE_SECS: u64 = 15;

/// Default interval between repeated error notifications for the same
/// identity (hours).
pub const DEFAULT_ERROR_NOTIFY_INTERVAL_HOURS: i64 = 8;
