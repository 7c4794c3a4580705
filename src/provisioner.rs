//! # Service Provisioner
//!
//! Body of the background tasks: materializes a service through the
//! [`SecretStore`] and [`ChartProvisioner`] adapters and records the outcome
//! as a status transition on the persisted [`Service`].
//!
//! ## Provision
//!
//! 1. Split configs into secret and non-secret
//! 2. Apply `<service>-secrets` when there is at least one secret config
//! 3. Install the chart with the non-secret configs as values
//! 4. `running` on success, `failed` on any error (a secret created in step 2
//!    is left in place)
//!
//! ## Unprovision
//!
//! 1. Uninstall the release derived from the chart reference
//! 2. Delete `<service>-secrets`, best effort
//! 3. Delete the service record (configs cascade)
//!
//! An uninstall failure marks the service `failed` and keeps the record.

use crate::cache::TtlCache;
use crate::model::{Service, ServiceConfig, ServiceStatus};
use crate::provider::{ChartProvisioner, ChartValues, ProviderError, ReleaseStatus, SecretStore};
use crate::repository::ServiceRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Result of a teardown attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Release uninstalled and service record deleted
    Deleted,
    /// Teardown failed; the record is kept with status `failed`
    Failed,
}

pub struct ServiceProvisioner {
    charts: Arc<dyn ChartProvisioner>,
    secrets: Arc<dyn SecretStore>,
    services: Arc<dyn ServiceRepository>,
    status_cache: TtlCache<(String, String), ReleaseStatus>,
}

impl std::fmt::Debug for ServiceProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvisioner")
            .field("cached_statuses", &self.status_cache.len())
            .finish_non_exhaustive()
    }
}

/// Secret configs as secret object data, non-secret configs as chart values
pub fn partition_configs(configs: &[ServiceConfig]) -> (BTreeMap<String, String>, ChartValues) {
    let mut secret_data = BTreeMap::new();
    let mut values = ChartValues::new();
    for config in configs {
        if config.is_secret {
            secret_data.insert(config.key.clone(), config.value.clone());
        } else {
            values.insert(config.key.clone(), config.value.clone());
        }
    }
    (secret_data, values)
}

impl ServiceProvisioner {
    pub fn new(
        charts: Arc<dyn ChartProvisioner>,
        secrets: Arc<dyn SecretStore>,
        services: Arc<dyn ServiceRepository>,
        status_cache_ttl: Duration,
    ) -> Self {
        Self {
            charts,
            secrets,
            services,
            status_cache: TtlCache::new(status_cache_ttl),
        }
    }

    /// Materialize `service` and record `running` or `failed`
    ///
    /// Returns the status that was recorded.
    pub async fn provision(&self, service: &Service, configs: &[ServiceConfig]) -> ServiceStatus {
        let span = info_span!("provision", service = %service.name, id = %service.id);
        async {
            let status = match self.try_provision(service, configs).await {
                Ok(()) => {
                    info!("Service {} is running", service.name);
                    ServiceStatus::Running
                }
                Err(e) => {
                    error!("Provisioning service {} failed: {}", service.name, e);
                    ServiceStatus::Failed
                }
            };
            self.invalidate_status(service);
            self.record_status(service, status).await;
            status
        }
        .instrument(span)
        .await
    }

    async fn try_provision(
        &self,
        service: &Service,
        configs: &[ServiceConfig],
    ) -> Result<(), ProviderError> {
        let (secret_data, values) = partition_configs(configs);

        if !secret_data.is_empty() {
            let unresolved = secret_data.values().filter(|v| v.is_empty()).count();
            if unresolved > 0 {
                warn!(
                    "{} of {} secret configs for {} have no value",
                    unresolved,
                    secret_data.len(),
                    service.name
                );
            }
            self.secrets
                .apply_secret(
                    &service.namespace,
                    &service.secret_object_name(),
                    &secret_data,
                )
                .await?;
            debug!(
                "Secret {} holds {} keys",
                service.secret_object_name(),
                secret_data.len()
            );
        }

        self.charts
            .install(&service.chart, &service.namespace, &values)
            .await
    }

    /// Tear down `service`; deletes its record on success
    pub async fn unprovision(&self, service: &Service) -> TeardownOutcome {
        let span = info_span!("unprovision", service = %service.name, id = %service.id);
        async {
            let release = service.release_name();
            self.invalidate_status(service);

            if let Err(e) = self.charts.uninstall(&release, &service.namespace).await {
                error!(
                    "Uninstalling release {} for service {} failed: {}",
                    release, service.name, e
                );
                self.record_status(service, ServiceStatus::Failed).await;
                return TeardownOutcome::Failed;
            }

            let secret_name = service.secret_object_name();
            if let Err(e) = self
                .secrets
                .delete_secret(&service.namespace, &secret_name)
                .await
            {
                warn!(
                    "Failed to delete secret {}/{}: {}",
                    service.namespace, secret_name, e
                );
            }

            match self.services.delete(service.id).await {
                Ok(()) => {
                    info!("Service {} removed", service.name);
                    TeardownOutcome::Deleted
                }
                Err(e) => {
                    error!("Failed to delete service record {}: {}", service.id, e);
                    self.record_status(service, ServiceStatus::Failed).await;
                    TeardownOutcome::Failed
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Live release status, cached per (release, namespace)
    pub async fn release_status(&self, service: &Service) -> Result<ReleaseStatus, ProviderError> {
        let key = (service.release_name(), service.namespace.clone());
        if let Some(status) = self.status_cache.get(&key) {
            debug!("Release status cache hit for {}", key.0);
            return Ok(status);
        }
        let status = self.charts.status(&key.0, &key.1).await?;
        self.status_cache.insert(key, status);
        Ok(status)
    }

    fn invalidate_status(&self, service: &Service) {
        self.status_cache
            .invalidate(&(service.release_name(), service.namespace.clone()));
    }

    async fn record_status(&self, service: &Service, status: ServiceStatus) {
        if let Err(e) = self.services.update_status(service.id, status).await {
            error!(
                "Failed to record status {} for service {}: {}",
                status, service.name, e
            );
        }
    }
}
