//! # Provider Modules
//!
//! Adapters over the external systems a service is materialized with.
//!
//! - [`ChartProvisioner`]: chart install/upgrade/uninstall/status
//!   ([`helm::HelmChartProvisioner`] shells out to `helm`)
//! - [`SecretStore`]: cluster-native secret objects
//!   ([`kubernetes::KubeSecretStore`] uses the Kubernetes API)
//!
//! Both are stateless with respect to the domain and can be swapped for fakes.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod helm;
pub mod kubernetes;

/// Chart values passed to an install or upgrade
pub type ChartValues = BTreeMap<String, String>;

/// Live state of a release as reported by the package manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Running,
    Failed,
    Provisioning,
    Unknown,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseStatus::Running => "running",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Provisioning => "provisioning",
            ReleaseStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("unexpected output from {command}: {message}")]
    InvalidOutput { command: String, message: String },
    #[error("Kubernetes API error: {0}")]
    Kubernetes(#[from] kube::Error),
}

/// Package-manager operations used to materialize a service
///
/// Installs must be idempotent per (chart, namespace), create the namespace
/// when absent, and wait for readiness with a bounded timeout.
#[async_trait]
pub trait ChartProvisioner: Send + Sync {
    /// Install (or re-install) `chart` into `namespace`
    async fn install(
        &self,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Result<(), ProviderError>;

    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<(), ProviderError>;

    async fn upgrade(
        &self,
        release_name: &str,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Result<(), ProviderError>;

    async fn status(
        &self,
        release_name: &str,
        namespace: &str,
    ) -> Result<ReleaseStatus, ProviderError>;
}

/// Cluster-native secret objects
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create or update secret `name` in `namespace` with `data`
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError>;

    /// Delete secret `name`
    /// Returns false if it did not exist
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool, ProviderError>;
}
