//! # Apply Command
//!
//! One-shot provisioning of a document outside the platform backend. Records
//! live in an in-memory store for the duration of the command; the cluster
//! side (releases and secrets) is real.

use super::read_document;
use crate::config::ProvisionerConfig;
use crate::model::{ApplicationRecord, Role};
use crate::orchestrator::{Collaborators, InfrastructureService, ProvisionRequest};
use crate::provider::{ChartProvisioner, SecretStore};
use crate::provisioner::ServiceProvisioner;
use crate::repository::InMemoryStore;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Provision every service of the document at `path` into `namespace`
///
/// Waits for all background tasks and reports the final status of each
/// service.
pub async fn apply_command(
    path: &Path,
    namespace: &str,
    secret_values: HashMap<String, String>,
    charts: Arc<dyn ChartProvisioner>,
    secrets: Arc<dyn SecretStore>,
    config: &ProvisionerConfig,
) -> Result<String> {
    let text = read_document(path)?;

    let store = Arc::new(InMemoryStore::new());
    let operator = Uuid::new_v4();
    let organization_id = Uuid::new_v4();
    let application = ApplicationRecord {
        id: Uuid::new_v4(),
        organization_id,
        name: namespace.to_string(),
        namespace: Some(namespace.to_string()),
    };
    let application_id = application.id;
    store.insert_application(application)?;
    store.grant_role(operator, organization_id, Role::Owner)?;

    let provisioner = Arc::new(ServiceProvisioner::new(
        charts,
        secrets,
        store.clone(),
        config.status_cache_ttl(),
    ));
    let collaborators = Collaborators {
        services: store.clone(),
        configs: store.clone(),
        applications: store.clone(),
        authorizer: store.clone(),
    };
    let service = InfrastructureService::new(collaborators, provisioner, config);

    let mut request = ProvisionRequest::new(application_id, text);
    request.secret_values = secret_values;
    let result = service
        .provision_services(operator, request)
        .await
        .context("Provisioning request rejected")?;
    info!("{}", result.message);

    service.drain().await;

    let current = service
        .get_services_by_application(operator, application_id)
        .await?;
    let mut out = String::new();
    for summary in &result.services {
        let status = current
            .iter()
            .find(|s| s.id == summary.id)
            .map(|s| s.status.to_string())
            .unwrap_or_else(|| "removed".to_string());
        writeln!(out, "{}: {} ({})", summary.name, status, summary.chart)?;
    }
    if result.services.is_empty() {
        writeln!(out, "No services declared in {}", path.display())?;
    }
    Ok(out)
}
