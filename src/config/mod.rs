//! # Configuration
//!
//! Provisioner-level settings loaded from environment variables.

mod provisioner;

pub use provisioner::ProvisionerConfig;
