//! # Document Validation
//!
//! Validates service names (RFC 1123 label subset) and chart references.

use crate::constants::MAX_SERVICE_NAME_LENGTH;
use crate::parser::error::ParseError;
use crate::parser::types::ConfigDocument;
use regex::Regex;
use std::sync::LazyLock;

static SERVICE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9-]+$")
        .expect("Failed to compile service name regex - this should never happen")
});

/// Validate a service name
/// Format: lowercase alphanumeric and hyphens
/// Length: 1-63 characters
pub fn validate_service_name(name: &str) -> Result<(), ParseError> {
    let field = format!("services.{name}");

    if name.is_empty() {
        return Err(ParseError::validation(
            "services",
            "service name cannot be empty",
        ));
    }

    if name.len() > MAX_SERVICE_NAME_LENGTH {
        return Err(ParseError::validation(
            field,
            format!(
                "service name exceeds maximum length of {MAX_SERVICE_NAME_LENGTH} characters (got {})",
                name.len()
            ),
        ));
    }

    if !SERVICE_NAME.is_match(name) {
        return Err(ParseError::validation(
            field,
            format!("service name '{name}' must contain only lowercase alphanumeric characters and hyphens"),
        ));
    }

    Ok(())
}

/// Validate a chart reference (non-empty after trimming)
pub fn validate_chart_reference(service_name: &str, chart: &str) -> Result<(), ParseError> {
    if chart.trim().is_empty() {
        return Err(ParseError::validation(
            format!("services.{service_name}.chart"),
            "chart reference cannot be empty",
        ));
    }
    Ok(())
}

/// Validate a parsed document
///
/// Fails when `services` is absent or null, when any service has an empty
/// chart reference, or when a service name is invalid. An empty `services`
/// mapping is accepted.
pub fn validate(document: &ConfigDocument) -> Result<(), ParseError> {
    let Some(services) = document.services.as_ref() else {
        return Err(ParseError::validation(
            "services",
            "document must declare a 'services' mapping",
        ));
    };

    for (name, definition) in services {
        validate_service_name(name)?;
        validate_chart_reference(name, &definition.chart)?;
    }

    Ok(())
}
