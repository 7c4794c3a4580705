//! # Constants
//!
//! Shared constants used throughout the provisioner.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Literal prefix that marks a configuration value as a secret reference
pub const SECRET_MARKER_PREFIX: &str = "SECRET::";

/// Pattern matching one secret marker; capture group 1 is the secret name
pub const SECRET_MARKER_PATTERN: &str = r"SECRET::([a-zA-Z0-9_-]+)";

/// Suffix appended to a service name to build its cluster secret object name
pub const SERVICE_SECRET_SUFFIX: &str = "-secrets";

/// Value shown in place of a secret in masked listings
pub const MASKED_SECRET_VALUE: &str = "********";

/// Maximum length of a service name (RFC 1123 label)
pub const MAX_SERVICE_NAME_LENGTH: usize = 63;

/// Default helm binary name, resolved on `PATH`
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Default ceiling for a single helm operation (seconds)
/// Passed to helm as `--timeout` and enforced locally around the subprocess
pub const DEFAULT_HELM_TIMEOUT_SECS: u64 = 300;

/// Extra time granted to the helm subprocess beyond its own `--timeout`
/// before it is killed locally
pub const HELM_TIMEOUT_GRACE_SECS: u64 = 30;

/// Default upper bound on concurrently running provisioning tasks
pub const DEFAULT_MAX_CONCURRENT_PROVISIONS: usize = 10;

/// Default namespace when an application does not carry one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default TTL for cached release status lookups (seconds)
pub const DEFAULT_STATUS_CACHE_TTL_SECS: u64 = 15;

/// Default sliding window for per-application provisioning requests (seconds)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default maximum provisioning requests per application per window
/// A value of zero disables rate limiting
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 30;

/// Field manager used for server-side apply of secret objects
pub const DEFAULT_FIELD_MANAGER: &str = "infra-provisioner";
