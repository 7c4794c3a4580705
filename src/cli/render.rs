//! # Render Command
//!
//! Show what a document resolves to: per-service chart values and the
//! expanded app env. Secrets are masked unless `reveal` is set.

use super::read_document;
use crate::constants::MASKED_SECRET_VALUE;
use crate::model::release_name;
use crate::parser::{self, ServiceConfigData};
use crate::template::{ResolvedServiceConfigs, TemplateResolver};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Serialize)]
struct RenderedService {
    chart: String,
    release: String,
    namespace: String,
    values: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct RenderedDocument {
    services: BTreeMap<String, RenderedService>,
    app: BTreeMap<String, String>,
}

/// Render the document at `path` as pretty JSON
pub fn render_command(
    path: &Path,
    namespace: &str,
    secrets: &HashMap<String, String>,
    reveal: bool,
) -> Result<String> {
    let text = read_document(path)?;
    let document = parser::parse_and_validate(&text)?;

    // Every referenced name resolves to the mask unless revealing
    let lookup: HashMap<String, String> = if reveal {
        secrets.clone()
    } else {
        parser::extract_secret_references(&document)
            .into_iter()
            .map(|r| (r.secret_name, MASKED_SECRET_VALUE.to_string()))
            .collect()
    };

    let mut resolved = ResolvedServiceConfigs::new();
    let mut services = BTreeMap::new();
    for data in parser::generate_service_configs(&document, namespace) {
        let values = display_values(&data, &lookup);
        resolved.insert(data.service_name.clone(), values.clone());
        services.insert(
            data.service_name.clone(),
            RenderedService {
                release: release_name(&data.chart),
                chart: data.chart,
                namespace: data.namespace,
                values,
            },
        );
    }

    let app_values: BTreeMap<String, String> = document
        .app
        .env
        .iter()
        .map(|(key, value)| (key.clone(), parser::substitute_secrets(value, &lookup)))
        .collect();
    let app = TemplateResolver::new().resolve_values(&app_values, &resolved)?;

    serde_json::to_string_pretty(&RenderedDocument { services, app })
        .context("Failed to serialize rendered document")
}

fn display_values(
    data: &ServiceConfigData,
    lookup: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    data.configs
        .iter()
        .map(|(key, value)| {
            let shown = match (&value.secret_name, value.is_secret) {
                (Some(name), true) => lookup.get(name).cloned().unwrap_or_default(),
                _ => value.value.clone(),
            };
            (key.clone(), shown)
        })
        .collect()
}
