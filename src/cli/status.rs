//! # Status Command
//!
//! Query the package manager for the state of one release.

use crate::provider::{ChartProvisioner, ReleaseStatus};
use anyhow::{Context, Result};

/// Status of `release` in `namespace`
pub async fn status_command(
    charts: &dyn ChartProvisioner,
    release: &str,
    namespace: &str,
) -> Result<ReleaseStatus> {
    charts
        .status(release, namespace)
        .await
        .with_context(|| format!("Failed to get status of release '{namespace}/{release}'"))
}
