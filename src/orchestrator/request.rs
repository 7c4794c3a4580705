//! # Provisioning Requests
//!
//! Request and response shapes of the orchestrator.

use crate::model::ServiceSummary;
use crate::parser::SecretReference;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Request to provision the services of a document under an application
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub application_id: Uuid,
    /// Raw declarative document text
    pub document: String,
    /// Secret name to value, used for whole-value secret configs
    #[serde(default)]
    pub secret_values: HashMap<String, String>,
}

impl ProvisionRequest {
    pub fn new(application_id: Uuid, document: impl Into<String>) -> Self {
        Self {
            application_id,
            document: document.into(),
            secret_values: HashMap::new(),
        }
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_values.insert(name.into(), value.into());
        self
    }
}

impl std::fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut secret_names: Vec<&String> = self.secret_values.keys().collect();
        secret_names.sort();
        f.debug_struct("ProvisionRequest")
            .field("application_id", &self.application_id)
            .field("document_len", &self.document.len())
            .field("secret_names", &secret_names)
            .finish()
    }
}

/// Outcome of a provisioning request
///
/// Services listed here have been persisted and their background tasks
/// scheduled; their final state is observed by polling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResult {
    pub services: Vec<ServiceSummary>,
    /// Services already present under the application, left untouched
    pub skipped: Vec<String>,
    pub secret_references: Vec<SecretReference>,
    pub message: String,
}

pub(crate) fn summary_message(created: usize, skipped: &[String]) -> String {
    let noun = if created == 1 { "service" } else { "services" };
    if skipped.is_empty() {
        format!("Provisioning started for {created} {noun}")
    } else {
        format!(
            "Provisioning started for {created} {noun}; skipped existing: {}",
            skipped.join(", ")
        )
    }
}
