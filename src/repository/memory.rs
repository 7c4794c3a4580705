//! # In-Memory Store
//!
//! Mutex-guarded maps implementing every repository contract.

use super::{
    ApplicationRepository, Authorizer, RepositoryError, RepositoryResult, ServiceConfigRepository,
    ServiceRepository,
};
use crate::model::{ApplicationRecord, Role, Service, ServiceConfig, ServiceStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    services: HashMap<Uuid, Service>,
    configs: HashMap<Uuid, ServiceConfig>,
    applications: HashMap<Uuid, ApplicationRecord>,
    memberships: HashMap<(Uuid, Uuid), Role>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RepositoryResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::Backend(anyhow::anyhow!("store lock poisoned: {e}")))
    }

    /// Register an application
    pub fn insert_application(&self, application: ApplicationRecord) -> RepositoryResult<()> {
        self.state()?
            .applications
            .insert(application.id, application);
        Ok(())
    }

    /// Grant `role` to `user_id` in `organization_id`
    pub fn grant_role(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        role: Role,
    ) -> RepositoryResult<()> {
        self.state()?
            .memberships
            .insert((user_id, organization_id), role);
        Ok(())
    }

    /// Number of stored services
    pub fn service_count(&self) -> RepositoryResult<usize> {
        Ok(self.state()?.services.len())
    }

    /// Number of stored configs
    pub fn config_count(&self) -> RepositoryResult<usize> {
        Ok(self.state()?.configs.len())
    }
}

#[async_trait]
impl ServiceRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Service>> {
        Ok(self.state()?.services.get(&id).cloned())
    }

    async fn find_by_application(&self, application_id: Uuid) -> RepositoryResult<Vec<Service>> {
        let mut services: Vec<Service> = self
            .state()?
            .services
            .values()
            .filter(|s| s.application_id == application_id)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn find_by_name(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> RepositoryResult<Option<Service>> {
        Ok(self
            .state()?
            .services
            .values()
            .find(|s| s.application_id == application_id && s.name == name)
            .cloned())
    }

    async fn create(&self, service: &Service) -> RepositoryResult<()> {
        let mut state = self.state()?;
        let duplicate = state
            .services
            .values()
            .any(|s| s.application_id == service.application_id && s.name == service.name);
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "service '{}' already exists for application {}",
                service.name, service.application_id
            )));
        }
        state.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: ServiceStatus) -> RepositoryResult<()> {
        let mut state = self.state()?;
        let service = state
            .services
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("service {id}")))?;
        service.status = status;
        service.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        let mut state = self.state()?;
        if state.services.remove(&id).is_none() {
            return Err(RepositoryError::NotFound(format!("service {id}")));
        }
        state.configs.retain(|_, config| config.service_id != id);
        Ok(())
    }
}

#[async_trait]
impl ServiceConfigRepository for InMemoryStore {
    async fn create_many(&self, configs: &[ServiceConfig]) -> RepositoryResult<()> {
        let mut state = self.state()?;
        for config in configs {
            if !state.services.contains_key(&config.service_id) {
                return Err(RepositoryError::NotFound(format!(
                    "service {} for config '{}'",
                    config.service_id, config.key
                )));
            }
        }
        for config in configs {
            state.configs.insert(config.id, config.clone());
        }
        Ok(())
    }

    async fn find_by_service(&self, service_id: Uuid) -> RepositoryResult<Vec<ServiceConfig>> {
        let mut configs: Vec<ServiceConfig> = self
            .state()?
            .configs
            .values()
            .filter(|c| c.service_id == service_id)
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(configs)
    }

    async fn find_by_key(
        &self,
        service_id: Uuid,
        key: &str,
    ) -> RepositoryResult<Option<ServiceConfig>> {
        Ok(self
            .state()?
            .configs
            .values()
            .find(|c| c.service_id == service_id && c.key == key)
            .cloned())
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<ApplicationRecord>> {
        Ok(self.state()?.applications.get(&id).cloned())
    }
}

#[async_trait]
impl Authorizer for InMemoryStore {
    async fn role_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> RepositoryResult<Option<Role>> {
        Ok(self
            .state()?
            .memberships
            .get(&(user_id, organization_id))
            .copied())
    }
}
