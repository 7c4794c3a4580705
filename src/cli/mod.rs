//! # Operator commands
//!
//! Implementations behind the `infractl` binary. Commands return what to
//! print instead of writing to stdout themselves.
//!
//! ```bash
//! # Check a document
//! infractl validate services.yaml
//!
//! # List secret references
//! infractl secrets services.yaml
//!
//! # Show resolved values with secrets masked
//! infractl render services.yaml --namespace shop --secret db_password=hunter2
//!
//! # Provision into the current cluster
//! infractl apply services.yaml --namespace shop --secret db_password=hunter2
//!
//! # Query a live release
//! infractl status postgresql --namespace shop
//! ```

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::Path;

mod apply;
mod render;
mod secrets;
mod status;
mod validate;

pub use apply::apply_command;
pub use render::render_command;
pub use secrets::secrets_command;
pub use status::status_command;
pub use validate::validate_command;

/// Read a service document from disk
pub fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service document '{}'", path.display()))
}

/// Parse a `name=value` pair given on the command line
pub fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected NAME=VALUE, got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("secret name must not be empty in '{raw}'");
    }
    Ok((name.to_string(), value.to_string()))
}

/// Collect `--secret` pairs, last one wins
pub fn secret_map(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}
