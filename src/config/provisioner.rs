//! # Provisioner Configuration
//!
//! Settings for the helm adapter, the background worker pool and the
//! request guards, loaded from environment variables.

use crate::constants::{
    DEFAULT_FIELD_MANAGER, DEFAULT_HELM_BINARY, DEFAULT_HELM_TIMEOUT_SECS,
    DEFAULT_MAX_CONCURRENT_PROVISIONS, DEFAULT_NAMESPACE, DEFAULT_RATE_LIMIT_MAX_REQUESTS,
    DEFAULT_RATE_LIMIT_WINDOW_SECS, DEFAULT_STATUS_CACHE_TTL_SECS,
};
use std::time::Duration;

/// Provisioner configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Helm binary name or absolute path
    pub helm_binary: String,
    /// Ceiling for a single helm operation (seconds)
    pub helm_timeout_secs: u64,
    /// Optional kube context passed to helm via `--kube-context`
    pub helm_kube_context: Option<String>,
    /// Maximum concurrently running provisioning/teardown tasks
    pub max_concurrent_provisions: usize,
    /// Namespace used when an application does not declare one
    pub default_namespace: String,
    /// TTL for cached release status lookups (seconds)
    pub status_cache_ttl_secs: u64,
    /// Sliding window length for the per-application provisioning limit (seconds)
    pub rate_limit_window_secs: u64,
    /// Maximum provisioning requests per application inside one window
    /// Zero disables the limit
    pub rate_limit_max_requests: usize,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Field manager for server-side apply of secret objects
    pub field_manager: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            helm_binary: DEFAULT_HELM_BINARY.to_string(),
            helm_timeout_secs: DEFAULT_HELM_TIMEOUT_SECS,
            helm_kube_context: None,
            max_concurrent_provisions: DEFAULT_MAX_CONCURRENT_PROVISIONS,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            status_cache_ttl_secs: DEFAULT_STATUS_CACHE_TTL_SECS,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            helm_binary: env_var_or_default_str("HELM_BINARY", DEFAULT_HELM_BINARY),
            helm_timeout_secs: env_var_or_default("HELM_TIMEOUT_SECS", DEFAULT_HELM_TIMEOUT_SECS),
            helm_kube_context: std::env::var("HELM_KUBE_CONTEXT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_concurrent_provisions: env_var_or_default(
                "MAX_CONCURRENT_PROVISIONS",
                DEFAULT_MAX_CONCURRENT_PROVISIONS,
            )
            .max(1),
            default_namespace: env_var_or_default_str("DEFAULT_NAMESPACE", DEFAULT_NAMESPACE),
            status_cache_ttl_secs: env_var_or_default(
                "STATUS_CACHE_TTL_SECS",
                DEFAULT_STATUS_CACHE_TTL_SECS,
            ),
            rate_limit_window_secs: env_var_or_default(
                "PROVISION_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            ),
            rate_limit_max_requests: env_var_or_default(
                "PROVISION_RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            field_manager: env_var_or_default_str("FIELD_MANAGER", DEFAULT_FIELD_MANAGER),
        }
    }

    /// Get helm operation timeout duration
    pub fn helm_timeout(&self) -> Duration {
        Duration::from_secs(self.helm_timeout_secs)
    }

    /// Get release status cache TTL
    pub fn status_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.status_cache_ttl_secs)
    }

    /// Get rate limit window duration
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Whether JSON log output was requested
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
