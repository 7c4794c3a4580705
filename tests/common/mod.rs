//! Common test utilities for provisioning integration tests
//!
//! Recording fakes for the chart and secret adapters, a repository wrapper
//! that fails on demand, and a harness wiring them into an
//! `InfrastructureService` backed by the in-memory store.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use infra_provisioner::model::{ApplicationRecord, Role, ServiceConfig};
use infra_provisioner::provider::{
    ChartProvisioner, ChartValues, ProviderError, ReleaseStatus, SecretStore,
};
use infra_provisioner::provisioner::ServiceProvisioner;
use infra_provisioner::repository::{
    InMemoryStore, RepositoryError, RepositoryResult, ServiceConfigRepository,
};
use infra_provisioner::{Collaborators, InfrastructureService, ProvisionerConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;
use uuid::Uuid;

static TRACING_INIT: Once = Once::new();

/// Install a test subscriber once per binary
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "infra_provisioner=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub const SHOP_DOCUMENT: &str = r#"
services:
  db:
    chart: bitnami/postgresql
    env:
      POSTGRES_USER: shop
      POSTGRES_PASSWORD: SECRET::db_password
      POSTGRES_DB: webshop
  cache:
    chart: bitnami/redis
    env:
      REDIS_PASSWORD: SECRET::redis_password
app:
  env:
    DATABASE_URL: "postgres://{{services.db.env.POSTGRES_USER}}:{{services.db.env.POSTGRES_PASSWORD}}@db:5432/{{services.db.env.POSTGRES_DB}}"
    REDIS_URL: "redis://:SECRET::redis_password@cache:6379"
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartCall {
    Install {
        chart: String,
        namespace: String,
        values: ChartValues,
    },
    Uninstall {
        release: String,
        namespace: String,
    },
    Status {
        release: String,
        namespace: String,
    },
}

/// Chart adapter that records calls and fails on request
#[derive(Debug, Default)]
pub struct FakeCharts {
    calls: Mutex<Vec<ChartCall>>,
    fail_install: AtomicBool,
    fail_uninstall: AtomicBool,
    status_calls: AtomicUsize,
    uninstall_gate: Option<Arc<Notify>>,
}

impl FakeCharts {
    pub fn failing_install() -> Self {
        let charts = Self::default();
        charts.fail_install.store(true, Ordering::SeqCst);
        charts
    }

    pub fn failing_uninstall() -> Self {
        let charts = Self::default();
        charts.fail_uninstall.store(true, Ordering::SeqCst);
        charts
    }

    /// Uninstalls block until `gate` is notified
    pub fn gated_uninstall(gate: Arc<Notify>) -> Self {
        Self {
            uninstall_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ChartCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn installs(&self) -> Vec<ChartCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ChartCall::Install { .. }))
            .collect()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: ChartCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn command_failed(command: &str) -> ProviderError {
    ProviderError::CommandFailed {
        command: command.to_string(),
        exit_code: Some(1),
        stderr: "Error: simulated failure".to_string(),
    }
}

#[async_trait]
impl ChartProvisioner for FakeCharts {
    async fn install(
        &self,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Result<(), ProviderError> {
        self.record(ChartCall::Install {
            chart: chart.to_string(),
            namespace: namespace.to_string(),
            values: values.clone(),
        });
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(command_failed("helm upgrade --install"));
        }
        Ok(())
    }

    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<(), ProviderError> {
        if let Some(gate) = &self.uninstall_gate {
            gate.notified().await;
        }
        self.record(ChartCall::Uninstall {
            release: release_name.to_string(),
            namespace: namespace.to_string(),
        });
        if self.fail_uninstall.load(Ordering::SeqCst) {
            return Err(command_failed("helm uninstall"));
        }
        Ok(())
    }

    async fn upgrade(
        &self,
        _release_name: &str,
        chart: &str,
        namespace: &str,
        values: &ChartValues,
    ) -> Result<(), ProviderError> {
        self.install(chart, namespace, values).await
    }

    async fn status(
        &self,
        release_name: &str,
        namespace: &str,
    ) -> Result<ReleaseStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.record(ChartCall::Status {
            release: release_name.to_string(),
            namespace: namespace.to_string(),
        });
        Ok(ReleaseStatus::Running)
    }
}

fn api_error(message: &str) -> ProviderError {
    ProviderError::InvalidOutput {
        command: "kubernetes secrets".to_string(),
        message: message.to_string(),
    }
}

/// Secret store keeping objects in a map keyed by (namespace, name)
#[derive(Debug, Default)]
pub struct FakeSecrets {
    objects: Mutex<BTreeMap<(String, String), BTreeMap<String, String>>>,
    applies: AtomicUsize,
    fail_apply: AtomicBool,
    fail_delete: AtomicBool,
}

impl FakeSecrets {
    pub fn failing_apply() -> Self {
        let secrets = Self::default();
        secrets.fail_apply.store(true, Ordering::SeqCst);
        secrets
    }

    pub fn failing_delete() -> Self {
        let secrets = Self::default();
        secrets.fail_delete.store(true, Ordering::SeqCst);
        secrets
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(api_error("secrets is forbidden"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), data.clone());
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool, ProviderError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(api_error("the server is currently unable to handle the request"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some())
    }
}

/// Config repository that delegates to the store until told to fail
#[derive(Debug)]
pub struct FlakyConfigs {
    inner: Arc<InMemoryStore>,
    fail_after: AtomicUsize,
}

impl FlakyConfigs {
    /// Fail every `create_many` after the first `successes`
    pub fn new(inner: Arc<InMemoryStore>, successes: usize) -> Self {
        Self {
            inner,
            fail_after: AtomicUsize::new(successes),
        }
    }
}

#[async_trait]
impl ServiceConfigRepository for FlakyConfigs {
    async fn create_many(&self, configs: &[ServiceConfig]) -> RepositoryResult<()> {
        let remaining = self.fail_after.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(RepositoryError::Backend(anyhow::anyhow!(
                "connection reset by peer"
            )));
        }
        self.fail_after.store(remaining - 1, Ordering::SeqCst);
        self.inner.create_many(configs).await
    }

    async fn find_by_service(&self, service_id: Uuid) -> RepositoryResult<Vec<ServiceConfig>> {
        self.inner.find_by_service(service_id).await
    }

    async fn find_by_key(
        &self,
        service_id: Uuid,
        key: &str,
    ) -> RepositoryResult<Option<ServiceConfig>> {
        self.inner.find_by_key(service_id, key).await
    }
}

/// Store, fakes and service wired together with one application
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub charts: Arc<FakeCharts>,
    pub secrets: Arc<FakeSecrets>,
    pub service: InfrastructureService,
    pub application_id: Uuid,
    pub organization_id: Uuid,
    pub owner: Uuid,
    pub member: Uuid,
    pub outsider: Uuid,
}

pub fn test_config() -> ProvisionerConfig {
    ProvisionerConfig {
        max_concurrent_provisions: 2,
        status_cache_ttl_secs: 60,
        ..ProvisionerConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeCharts::default(), FakeSecrets::default(), test_config(), None)
    }

    pub fn with_charts(charts: FakeCharts) -> Self {
        Self::build(charts, FakeSecrets::default(), test_config(), None)
    }

    pub fn with_secrets(secrets: FakeSecrets) -> Self {
        Self::build(FakeCharts::default(), secrets, test_config(), None)
    }

    pub fn with_config(config: ProvisionerConfig) -> Self {
        Self::build(FakeCharts::default(), FakeSecrets::default(), config, None)
    }

    /// Config writes succeed `successes` times, then fail
    pub fn with_flaky_configs(successes: usize) -> Self {
        Self::build(
            FakeCharts::default(),
            FakeSecrets::default(),
            test_config(),
            Some(successes),
        )
    }

    fn build(
        charts: FakeCharts,
        secrets: FakeSecrets,
        config: ProvisionerConfig,
        flaky: Option<usize>,
    ) -> Self {
        init_tracing();

        let store = Arc::new(InMemoryStore::new());
        let charts = Arc::new(charts);
        let secrets = Arc::new(secrets);

        let organization_id = Uuid::new_v4();
        let application_id = Uuid::new_v4();
        store
            .insert_application(ApplicationRecord {
                id: application_id,
                organization_id,
                name: "webshop".to_string(),
                namespace: Some("shop".to_string()),
            })
            .unwrap();

        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        store.grant_role(owner, organization_id, Role::Owner).unwrap();
        store
            .grant_role(member, organization_id, Role::Member)
            .unwrap();

        let configs: Arc<dyn ServiceConfigRepository> = match flaky {
            Some(successes) => Arc::new(FlakyConfigs::new(Arc::clone(&store), successes))
                as Arc<dyn ServiceConfigRepository>,
            None => store.clone() as Arc<dyn ServiceConfigRepository>,
        };

        let provisioner = Arc::new(ServiceProvisioner::new(
            charts.clone(),
            secrets.clone(),
            store.clone(),
            config.status_cache_ttl(),
        ));
        let collaborators = Collaborators {
            services: store.clone(),
            configs,
            applications: store.clone(),
            authorizer: store.clone(),
        };
        let service = InfrastructureService::new(collaborators, provisioner, &config);

        Self {
            store,
            charts,
            secrets,
            service,
            application_id,
            organization_id,
            owner,
            member,
            outsider: Uuid::new_v4(),
        }
    }
}
