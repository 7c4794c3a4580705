//! # Secrets Command
//!
//! List every secret marker in a document and where it appears.

use super::read_document;
use crate::parser;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// List secret names referenced by the document at `path`
///
/// One line per secret name with the `owner.KEY` locations using it.
pub fn secrets_command(path: &Path) -> Result<String> {
    let text = read_document(path)?;
    let document = parser::parse_and_validate(&text)?;

    let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for reference in parser::extract_secret_references(&document) {
        by_name
            .entry(reference.secret_name)
            .or_default()
            .push(reference.key_path);
    }

    let mut out = String::new();
    if by_name.is_empty() {
        writeln!(out, "No secret references in {}", path.display())?;
        return Ok(out);
    }
    for (name, locations) in by_name {
        writeln!(out, "{name}: {}", locations.join(", "))?;
    }
    Ok(out)
}
