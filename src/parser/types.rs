//! # Parser Types
//!
//! Typed view of a declarative service document and the per-service
//! configuration records generated from it.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Top-level parsed service document
///
/// ```yaml
/// services:
///   db:
///     chart: bitnami/postgresql
///     env:
///       POSTGRES_PASSWORD: SECRET::db_password
/// app:
///   env:
///     DATABASE_URL: "postgres://shop:{{services.db.env.POSTGRES_PASSWORD}}@db:5432/webshop"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Declared services keyed by name
    /// `None` when the key is absent or null, which validation rejects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, ServiceDefinition>>,
    /// Application-level settings
    #[serde(default)]
    pub app: AppDefinition,
}

impl ConfigDocument {
    /// Iterate declared services in name order (empty when `services` is absent)
    pub fn services(&self) -> impl Iterator<Item = (&String, &ServiceDefinition)> {
        self.services.iter().flat_map(|services| services.iter())
    }
}

/// One auxiliary service entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Chart reference, e.g. `bitnami/postgresql` or `oci://registry/charts/redis`
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub chart: String,
    /// Environment key to raw value
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub env: BTreeMap<String, String>,
}

/// Application-level entry; values may hold template expressions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinition {
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub env: BTreeMap<String, String>,
}

/// Occurrence of a secret marker inside the document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name from the `SECRET::<name>` marker
    pub secret_name: String,
    /// `<service>.<key>` or `app.<key>`
    pub key_path: String,
}

/// One configuration value generated for a service
///
/// When `is_secret` is set, `value` is always empty and `secret_name`
/// carries the marker payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValue {
    pub value: String,
    pub is_secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

impl ConfigValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_secret: false,
            secret_name: None,
        }
    }

    pub fn secret(secret_name: impl Into<String>) -> Self {
        Self {
            value: String::new(),
            is_secret: true,
            secret_name: Some(secret_name.into()),
        }
    }
}

/// Transient per-service configuration produced by one parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfigData {
    pub service_name: String,
    pub chart: String,
    pub namespace: String,
    pub configs: BTreeMap<String, ConfigValue>,
}

impl ServiceConfigData {
    /// Iterate configs marked as secret
    pub fn secret_configs(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.configs.iter().filter(|(_, value)| value.is_secret)
    }
}

/// Accept any YAML scalar (string, number, bool) as a string; null becomes empty
fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Tagged(tagged) => scalar_to_string(tagged.value),
        serde_yaml::Value::Sequence(_) => Err("expected a scalar value, found a sequence".into()),
        serde_yaml::Value::Mapping(_) => Err("expected a scalar value, found a mapping".into()),
    }
}

fn deserialize_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(serde::de::Error::custom)
}

fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|v| (key.clone(), v))
                .map_err(|e| serde::de::Error::custom(format!("env key '{key}': {e}")))
        })
        .collect()
}
