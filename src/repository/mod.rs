//! # Repository Contracts
//!
//! Narrow persistence and authorization contracts consumed by the
//! orchestrator and the background provisioning tasks.
//!
//! The real backends (database, identity service) live outside this crate;
//! [`InMemoryStore`] implements every contract for tests and local runs.

mod memory;

pub use memory::InMemoryStore;

use crate::model::{ApplicationRecord, Role, Service, ServiceConfig, ServiceStatus};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Uniqueness violation, e.g. (application id, service name)
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("repository backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Service>>;

    async fn find_by_application(&self, application_id: Uuid) -> RepositoryResult<Vec<Service>>;

    async fn find_by_name(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> RepositoryResult<Option<Service>>;

    /// Insert a new service
    /// Must fail with `Conflict` if (application id, name) already exists
    async fn create(&self, service: &Service) -> RepositoryResult<()>;

    async fn update_status(&self, id: Uuid, status: ServiceStatus) -> RepositoryResult<()>;

    /// Delete a service and all of its configs
    async fn delete(&self, id: Uuid) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ServiceConfigRepository: Send + Sync {
    async fn create_many(&self, configs: &[ServiceConfig]) -> RepositoryResult<()>;

    async fn find_by_service(&self, service_id: Uuid) -> RepositoryResult<Vec<ServiceConfig>>;

    async fn find_by_key(
        &self,
        service_id: Uuid,
        key: &str,
    ) -> RepositoryResult<Option<ServiceConfig>>;
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<ApplicationRecord>>;
}

/// Membership lookup used for authorization decisions
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Caller's role in the organization, `None` when not a member
    async fn role_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> RepositoryResult<Option<Role>>;
}
