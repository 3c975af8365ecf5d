//! # Yale
//!
//! A Kubernetes-resident control loop that manages the full lifecycle of
//! cloud-identity credentials (GCP service account keys and Azure
//! application client secrets) declared through custom resources.
//!
//! For every declared identity Yale issues a fresh credential when none
//! exists, rotates it past an age threshold, disables the previous one after
//! it demonstrably stops being used, deletes it after a grace period, and
//! replicates the active credential to cluster secrets, Vault, Google Secret
//! Manager, and GitHub Actions secrets.
//!
//! The process runs to completion on demand and keeps all per-identity state
//! in backing cluster secrets, so repeated runs are idempotent.

pub mod authmetrics;
pub mod cache;
pub mod clients;
pub mod config;
pub mod constants;
pub mod crd;
pub mod cutoff;
pub mod identity;
pub mod keyops;
pub mod notify;
pub mod replicate;
pub mod resourcemap;
pub mod retry;
pub mod rotate;
pub mod yale;

pub use crate::config::Config;
pub use crate::yale::{Collaborators, Yale};
