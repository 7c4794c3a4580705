//! # Validate Command
//!
//! Parse and validate a service document without touching any backend.

use super::read_document;
use crate::parser;
use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

/// Validate the document at `path` and summarize it
pub fn validate_command(path: &Path) -> Result<String> {
    let text = read_document(path)?;
    let document = parser::parse_and_validate(&text)?;
    let references = parser::extract_secret_references(&document);

    let mut out = String::new();
    writeln!(out, "✅ {} is valid", path.display())?;
    writeln!(out)?;
    writeln!(out, "Services:")?;
    for (name, definition) in document.services() {
        writeln!(
            out,
            "  {name}: {} ({} env keys)",
            definition.chart.trim(),
            definition.env.len()
        )?;
    }
    writeln!(out)?;
    writeln!(out, "App env keys: {}", document.app.env.len())?;
    writeln!(out, "Secret references: {}", references.len())?;
    Ok(out)
}
