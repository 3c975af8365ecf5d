//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition YAML from the Rust type
//! definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/yale-crds.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;

use yale::crd::{AzureClientSecret, GcpSaKey};

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&GcpSaKey::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&AzureClientSecret::crd())?);
    Ok(())
}
