//! # Infrastructure Service
//!
//! Entry point of the provisioning pipeline. Authorizes the caller, parses
//! the document, persists `Service` and `ServiceConfig` records and schedules
//! one background task per new service.
//!
//! ## State machine
//!
//! - `provision_services`: `pending` -> `provisioning`, then the task records
//!   `running` or `failed`
//! - `unprovision_service`: any -> `stopped`, then the task deletes the record
//!   or records `failed`
//!
//! The call returns as soon as tasks are scheduled; outcomes are observed by
//! polling the service record.

mod error;
mod request;
mod tasks;

pub use error::InfrastructureError;
pub use request::{ProvisionRequest, ProvisionResult};
pub use tasks::TaskPool;

use crate::cache::SlidingWindowCounter;
use crate::config::ProvisionerConfig;
use crate::model::{ApplicationRecord, Role, Service, ServiceConfig, ServiceStatus, ServiceSummary};
use crate::parser::{self, ServiceConfigData};
use crate::provider::ReleaseStatus;
use crate::provisioner::ServiceProvisioner;
use crate::repository::{
    ApplicationRepository, Authorizer, RepositoryError, ServiceConfigRepository, ServiceRepository,
};
use crate::template::{ResolvedServiceConfigs, TemplateResolver};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

/// Persistence and authorization collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub services: Arc<dyn ServiceRepository>,
    pub configs: Arc<dyn ServiceConfigRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Required role for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Any member of the owning organization
    Read,
    /// Owner or admin
    Manage,
}

#[derive(Debug)]
pub struct InfrastructureService {
    collaborators: Collaborators,
    provisioner: Arc<ServiceProvisioner>,
    templates: TemplateResolver,
    pool: TaskPool,
    rate_limiter: SlidingWindowCounter<Uuid>,
    default_namespace: String,
}

impl InfrastructureService {
    pub fn new(
        collaborators: Collaborators,
        provisioner: Arc<ServiceProvisioner>,
        config: &ProvisionerConfig,
    ) -> Self {
        Self {
            collaborators,
            provisioner,
            templates: TemplateResolver::new(),
            pool: TaskPool::new(config.max_concurrent_provisions),
            rate_limiter: SlidingWindowCounter::new(
                config.rate_limit_window(),
                config.rate_limit_max_requests,
            ),
            default_namespace: config.default_namespace.clone(),
        }
    }

    /// Parse `request.document` and start provisioning every service not yet
    /// present under the application
    ///
    /// Existing services (same name, same application) are skipped, not
    /// upgraded. A persistence failure aborts the loop; services created
    /// before it stay persisted with their tasks already scheduled.
    pub async fn provision_services(
        &self,
        caller_id: Uuid,
        request: ProvisionRequest,
    ) -> InfrastructureResult<ProvisionResult> {
        let application = self.application(request.application_id).await?;
        self.authorize(caller_id, &application, Access::Manage)
            .await?;

        // Only authorized attempts count against the application's budget
        if let Err(retry_after) = self.rate_limiter.try_acquire(&application.id) {
            warn!("Rate limit reached for application {}", application.id);
            return Err(InfrastructureError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        let document = parser::parse_and_validate(&request.document)?;

        let secret_references = parser::extract_secret_references(&document);
        let unresolved: Vec<&str> = secret_references
            .iter()
            .map(|r| r.secret_name.as_str())
            .filter(|name| !request.secret_values.contains_key(*name))
            .collect();
        debug!(
            "Document references {} secrets ({} without a supplied value)",
            secret_references.len(),
            unresolved.len()
        );

        let namespace = self.namespace_for(&application);
        let service_configs = parser::generate_service_configs(&document, &namespace);

        let mut created = Vec::new();
        let mut skipped = Vec::new();

        for data in service_configs {
            if self
                .collaborators
                .services
                .find_by_name(application.id, &data.service_name)
                .await?
                .is_some()
            {
                debug!(
                    "Service {} already exists for application {}, skipping",
                    data.service_name, application.id
                );
                skipped.push(data.service_name);
                continue;
            }

            match self
                .create_service(&application, &data, &request.secret_values)
                .await
            {
                Ok((service, configs)) => {
                    created.push(ServiceSummary::from(&service));
                    self.schedule_provision(service, configs);
                }
                Err(InfrastructureError::Persistence(RepositoryError::Conflict(reason))) => {
                    // Lost a race with a concurrent request for the same name
                    debug!("Skipping {}: {}", data.service_name, reason);
                    skipped.push(data.service_name);
                }
                Err(e) => return Err(e),
            }
        }

        let message = request::summary_message(created.len(), &skipped);
        info!(
            "Application {}: {} (caller {})",
            application.id, message, caller_id
        );

        Ok(ProvisionResult {
            services: created,
            skipped,
            secret_references,
            message,
        })
    }

    /// Persist one service in `pending` with its configs, then move it to
    /// `provisioning`
    async fn create_service(
        &self,
        application: &ApplicationRecord,
        data: &ServiceConfigData,
        secret_values: &HashMap<String, String>,
    ) -> InfrastructureResult<(Service, Vec<ServiceConfig>)> {
        let mut service = Service::new(
            application.id,
            &data.service_name,
            &data.chart,
            &data.namespace,
        );
        self.collaborators.services.create(&service).await?;

        let configs = build_config_rows(service.id, data, secret_values);
        self.collaborators.configs.create_many(&configs).await?;

        self.collaborators
            .services
            .update_status(service.id, ServiceStatus::Provisioning)
            .await?;
        service.status = ServiceStatus::Provisioning;

        info!(
            "Created service {} ({} configs) for application {}",
            service.name,
            configs.len(),
            application.id
        );
        Ok((service, configs))
    }

    fn schedule_provision(&self, service: Service, configs: Vec<ServiceConfig>) {
        let provisioner = Arc::clone(&self.provisioner);
        self.pool
            .spawn(format!("provision:{}", service.name), async move {
                provisioner.provision(&service, &configs).await;
            });
    }

    /// Mark a service `stopped` and schedule its teardown
    ///
    /// The record stays until teardown succeeds.
    pub async fn unprovision_service(
        &self,
        caller_id: Uuid,
        service_id: Uuid,
    ) -> InfrastructureResult<ServiceSummary> {
        let mut service = self.service(service_id).await?;
        let application = self.application(service.application_id).await?;
        self.authorize(caller_id, &application, Access::Manage)
            .await?;

        self.collaborators
            .services
            .update_status(service.id, ServiceStatus::Stopped)
            .await?;
        service.status = ServiceStatus::Stopped;
        info!(
            "Service {} stopped, scheduling teardown (caller {})",
            service.name, caller_id
        );

        let summary = ServiceSummary::from(&service);
        let provisioner = Arc::clone(&self.provisioner);
        self.pool
            .spawn(format!("unprovision:{}", service.name), async move {
                provisioner.unprovision(&service).await;
            });
        Ok(summary)
    }

    /// Services of an application, for any member of its organization
    pub async fn get_services_by_application(
        &self,
        caller_id: Uuid,
        application_id: Uuid,
    ) -> InfrastructureResult<Vec<Service>> {
        let application = self.application(application_id).await?;
        self.authorize(caller_id, &application, Access::Read)
            .await?;
        Ok(self
            .collaborators
            .services
            .find_by_application(application_id)
            .await?)
    }

    /// Reveal one config value verbatim, secrets included (owner/admin only)
    pub async fn get_service_config(
        &self,
        caller_id: Uuid,
        service_id: Uuid,
        key: &str,
    ) -> InfrastructureResult<ServiceConfig> {
        let service = self.service(service_id).await?;
        let application = self.application(service.application_id).await?;
        self.authorize(caller_id, &application, Access::Manage)
            .await?;

        let config = self
            .collaborators
            .configs
            .find_by_key(service_id, key)
            .await?
            .ok_or_else(|| {
                InfrastructureError::NotFound(format!("config '{key}' of service {service_id}"))
            })?;
        if config.is_secret {
            info!(
                "Secret config {} of service {} revealed to {}",
                key, service.name, caller_id
            );
        }
        Ok(config)
    }

    /// All configs of a service with secret values masked
    pub async fn list_service_configs(
        &self,
        caller_id: Uuid,
        service_id: Uuid,
    ) -> InfrastructureResult<Vec<ServiceConfig>> {
        let service = self.service(service_id).await?;
        let application = self.application(service.application_id).await?;
        self.authorize(caller_id, &application, Access::Read)
            .await?;

        let configs = self
            .collaborators
            .configs
            .find_by_service(service_id)
            .await?;
        Ok(configs.iter().map(ServiceConfig::masked).collect())
    }

    /// Live release status of a service from the package manager
    pub async fn get_service_release_status(
        &self,
        caller_id: Uuid,
        service_id: Uuid,
    ) -> InfrastructureResult<ReleaseStatus> {
        let service = self.service(service_id).await?;
        let application = self.application(service.application_id).await?;
        self.authorize(caller_id, &application, Access::Read)
            .await?;
        Ok(self.provisioner.release_status(&service).await?)
    }

    /// Resolve the app env of `document_text` for an application
    ///
    /// Service values come from the document with supplied secrets
    /// substituted; secret values not supplied fall back to the persisted
    /// configs of the application's services.
    pub async fn resolve_app_environment(
        &self,
        caller_id: Uuid,
        application_id: Uuid,
        document_text: &str,
        secret_values: &HashMap<String, String>,
    ) -> InfrastructureResult<BTreeMap<String, String>> {
        let application = self.application(application_id).await?;
        self.authorize(caller_id, &application, Access::Manage)
            .await?;

        let document = parser::parse_and_validate(document_text)?;
        let namespace = self.namespace_for(&application);

        let mut resolved = ResolvedServiceConfigs::new();
        for data in parser::generate_service_configs(&document, &namespace) {
            let persisted = self.persisted_values(application.id, &data.service_name).await?;
            resolved.insert(
                data.service_name.clone(),
                resolve_service_values(&data, secret_values, &persisted),
            );
        }

        let app_values: BTreeMap<String, String> = document
            .app
            .env
            .iter()
            .map(|(key, value)| (key.clone(), parser::substitute_secrets(value, secret_values)))
            .collect();
        Ok(self.templates.resolve_values(&app_values, &resolved)?)
    }

    /// Wait for every scheduled background task
    pub async fn drain(&self) {
        self.pool.drain().await;
    }

    /// Background tasks not yet completed and reaped
    pub fn pending_tasks(&self) -> usize {
        self.pool.pending()
    }

    async fn persisted_values(
        &self,
        application_id: Uuid,
        service_name: &str,
    ) -> InfrastructureResult<HashMap<String, String>> {
        let Some(service) = self
            .collaborators
            .services
            .find_by_name(application_id, service_name)
            .await?
        else {
            return Ok(HashMap::new());
        };
        Ok(self
            .collaborators
            .configs
            .find_by_service(service.id)
            .await?
            .into_iter()
            .map(|c| (c.key, c.value))
            .collect())
    }

    fn namespace_for(&self, application: &ApplicationRecord) -> String {
        application
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.default_namespace)
            .to_string()
    }

    async fn application(&self, application_id: Uuid) -> InfrastructureResult<ApplicationRecord> {
        self.collaborators
            .applications
            .find_by_id(application_id)
            .await?
            .ok_or_else(|| InfrastructureError::NotFound(format!("application {application_id}")))
    }

    async fn service(&self, service_id: Uuid) -> InfrastructureResult<Service> {
        self.collaborators
            .services
            .find_by_id(service_id)
            .await?
            .ok_or_else(|| InfrastructureError::NotFound(format!("service {service_id}")))
    }

    async fn authorize(
        &self,
        caller_id: Uuid,
        application: &ApplicationRecord,
        access: Access,
    ) -> InfrastructureResult<Role> {
        let role = self
            .collaborators
            .authorizer
            .role_in_organization(caller_id, application.organization_id)
            .await?
            .ok_or_else(|| {
                InfrastructureError::Authorization(format!(
                    "caller is not a member of organization {}",
                    application.organization_id
                ))
            })?;

        if access == Access::Manage && !role.can_manage() {
            return Err(InfrastructureError::Authorization(format!(
                "role {role:?} cannot manage services of application {}",
                application.id
            )));
        }
        Ok(role)
    }
}

/// Config rows for a new service
///
/// Secret rows take their value from `secret_values` by secret name (empty
/// when not supplied); other rows are stored verbatim.
pub fn build_config_rows(
    service_id: Uuid,
    data: &ServiceConfigData,
    secret_values: &HashMap<String, String>,
) -> Vec<ServiceConfig> {
    data.configs
        .iter()
        .map(|(key, value)| {
            if value.is_secret {
                let secret = value
                    .secret_name
                    .as_ref()
                    .and_then(|name| secret_values.get(name))
                    .cloned()
                    .unwrap_or_else(|| {
                        warn!(
                            "No value supplied for secret {:?} ({}.{})",
                            value.secret_name, data.service_name, key
                        );
                        String::new()
                    });
                ServiceConfig::new(service_id, key, secret, true)
            } else {
                if parser::secrets::contains_secret_marker(&value.value) {
                    debug!(
                        "{}.{} embeds a secret marker, stored verbatim",
                        data.service_name, key
                    );
                }
                ServiceConfig::new(service_id, key, value.value.clone(), false)
            }
        })
        .collect()
}

/// Fully resolved values of one service for template expansion
fn resolve_service_values(
    data: &ServiceConfigData,
    secret_values: &HashMap<String, String>,
    persisted: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    data.configs
        .iter()
        .map(|(key, value)| {
            let resolved = if value.is_secret {
                value
                    .secret_name
                    .as_ref()
                    .and_then(|name| secret_values.get(name))
                    .or_else(|| persisted.get(key))
                    .cloned()
                    .unwrap_or_default()
            } else {
                parser::substitute_secrets(&value.value, secret_values)
            };
            (key.clone(), resolved)
        })
        .collect()
}
