//! # Helm Chart Provisioner
//!
//! Drives the `helm` CLI as a subprocess.
//!
//! Every operation passes `--namespace`, installs use `upgrade --install`
//! with `--create-namespace`, and mutating operations `--wait` with a
//! `--timeout`. The subprocess itself is killed if it outlives that timeout
//! plus a short grace period.

use super::{ChartProvisioner, ChartValues, ProviderError, ReleaseStatus};
use crate::config::ProvisionerConfig;
use crate::constants::HELM_TIMEOUT_GRACE_SECS;
use crate::model::release_name;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HelmChartProvisioner {
    binary: PathBuf,
    timeout: Duration,
    kube_context: Option<String>,
}

impl HelmChartProvisioner {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            kube_context: None,
        }
    }

    /// Build from configuration, resolving the binary on `PATH`
    pub fn from_config(config: &ProvisionerConfig) -> Self {
        let configured = Path::new(&config.helm_binary);
        let binary = if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            match which::which(&config.helm_binary) {
                Ok(path) => {
                    debug!("Using helm binary at {}", path.display());
                    path
                }
                Err(e) => {
                    warn!(
                        "helm binary '{}' not found on PATH ({}), operations will fail until it is installed",
                        config.helm_binary, e
                    );
                    configured.to_path_buf()
                }
            }
        };

        Self {
            binary,
            timeout: config.helm_timeout(),
            kube_context: config.helm_kube_context.clone(),
        }
    }

    pub fn with_kube_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    fn timeout_arg(&self) -> String {
        format!("{}s", self.timeout.as_secs())
    }

    fn with_context(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        args
    }

    /// Arguments for an idempotent install or upgrade of `release`
    pub fn upgrade_install_args(
        &self,
        release: &str,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.to_string(),
            chart.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--create-namespace".to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            self.timeout_arg(),
        ];
        if let Some(set) = serialize_values(values) {
            args.push("--set-string".to_string());
            args.push(set);
        }
        self.with_context(args)
    }

    pub fn uninstall_args(&self, release: &str, namespace: &str) -> Vec<String> {
        self.with_context(vec![
            "uninstall".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            self.timeout_arg(),
        ])
    }

    pub fn status_args(&self, release: &str, namespace: &str) -> Vec<String> {
        self.with_context(vec![
            "status".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ])
    }

    /// Run helm with `args` and return stdout
    async fn run(&self, args: &[String]) -> Result<String, ProviderError> {
        let command = format!("helm {}", args.first().map(String::as_str).unwrap_or(""));
        debug!("Running {} ({} args)", command, args.len());

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let ceiling = self.timeout + Duration::from_secs(HELM_TIMEOUT_GRACE_SECS);
        let output = match tokio::time::timeout(ceiling, cmd.output()).await {
            Ok(result) => result.map_err(|source| ProviderError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_elapsed) => {
                return Err(ProviderError::Timeout {
                    command,
                    seconds: ceiling.as_secs(),
                });
            }
        };

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| ProviderError::InvalidOutput {
                command,
                message: format!("stdout is not valid UTF-8: {e}"),
            })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("{} failed with exit code {:?}: {}", command, output.status.code(), stderr);
            Err(ProviderError::CommandFailed {
                command,
                exit_code: output.status.code(),
                stderr,
            })
        }
    }
}

#[async_trait]
impl ChartProvisioner for HelmChartProvisioner {
    async fn install(
        &self,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Result<(), ProviderError> {
        let release = release_name(chart);
        info!(
            "Installing chart {} as release {} in namespace {}",
            chart, release, namespace
        );
        self.run(&self.upgrade_install_args(&release, chart, namespace, values))
            .await?;
        Ok(())
    }

    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<(), ProviderError> {
        info!("Uninstalling release {} from namespace {}", release_name, namespace);
        self.run(&self.uninstall_args(release_name, namespace))
            .await?;
        Ok(())
    }

    async fn upgrade(
        &self,
        release_name: &str,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Result<(), ProviderError> {
        info!(
            "Upgrading release {} to chart {} in namespace {}",
            release_name, chart, namespace
        );
        self.run(&self.upgrade_install_args(release_name, chart, namespace, values))
            .await?;
        Ok(())
    }

    async fn status(
        &self,
        release_name: &str,
        namespace: &str,
    ) -> Result<ReleaseStatus, ProviderError> {
        match self.run(&self.status_args(release_name, namespace)).await {
            Ok(stdout) => parse_status_output(&stdout),
            Err(ProviderError::CommandFailed { stderr, .. })
                if stderr.contains("release: not found") =>
            {
                debug!("Release {} not found in {}", release_name, namespace);
                Ok(ReleaseStatus::Unknown)
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusOutput {
    info: StatusInfo,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    status: String,
}

/// Map `helm status -o json` output to a release status
pub fn parse_status_output(stdout: &str) -> Result<ReleaseStatus, ProviderError> {
    let parsed: StatusOutput =
        serde_json::from_str(stdout).map_err(|e| ProviderError::InvalidOutput {
            command: "helm status".to_string(),
            message: e.to_string(),
        })?;
    Ok(map_helm_status(&parsed.info.status))
}

/// Map a helm release status string
pub fn map_helm_status(status: &str) -> ReleaseStatus {
    match status {
        "deployed" => ReleaseStatus::Running,
        "failed" => ReleaseStatus::Failed,
        "pending-install" | "pending-upgrade" | "pending-rollback" => ReleaseStatus::Provisioning,
        _ => ReleaseStatus::Unknown,
    }
}

/// Serialize values as one `--set-string` argument: `k1=v1,k2=v2`
///
/// Keys are emitted in sorted order. `--set-string` keeps values such as
/// `true` or `5432` as strings. Backslashes, commas, equals signs and braces
/// are backslash-escaped so helm neither splits the value nor reads `{a,b}`
/// as a list. Keys are passed through; a `.` or `[` in a key nests the value.
pub fn serialize_values(values: &ChartValues) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let pairs: Vec<String> = values
        .iter()
        .map(|(key, value)| format!("{key}={}", escape_set_value(value)))
        .collect();
    Some(pairs.join(","))
}

fn escape_set_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=' | '{' | '}') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
