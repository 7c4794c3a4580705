//! # Kubernetes Secret Store
//!
//! Creates, updates and deletes the `<service>-secrets` objects through the
//! Kubernetes API using server-side apply.

use super::{ProviderError, SecretStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Label marking objects owned by the provisioner
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

/// Build the Opaque secret object applied for a service
pub fn build_secret(
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, String>,
    field_manager: &str,
) -> Secret {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), field_manager.to_string());

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        string_data: Some(data.clone()),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = build_secret(namespace, name, data, &self.field_manager);

        secrets
            .patch(
                name,
                &PatchParams::apply(&self.field_manager).force(),
                &Patch::Apply(&secret),
            )
            .await?;

        info!(
            "Applied secret {}/{} with {} keys",
            namespace,
            name,
            data.len()
        );
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool, ProviderError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted secret {}/{}", namespace, name);
                Ok(true)
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!("Secret {}/{} already absent", namespace, name);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
