//! # Model
//!
//! Persisted entities of the provisioning pipeline.
//!
//! ## Service lifecycle
//!
//! ```text
//! pending --create--> provisioning --success--> running
//!                     provisioning --failure--> failed
//! any     --unprovision--> stopped --teardown ok--> (deleted)
//!                          stopped --teardown failed--> failed
//! ```

use crate::constants::{MASKED_SECRET_VALUE, SERVICE_SECRET_SUFFIX};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Provisioning,
    Running,
    Failed,
    Stopped,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Provisioning => "provisioning",
            ServiceStatus::Running => "running",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One auxiliary workload provisioned for an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub chart: String,
    pub namespace: String,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// New service in `pending`
    pub fn new(
        application_id: Uuid,
        name: impl Into<String>,
        chart: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            application_id,
            name: name.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            status: ServiceStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name of the cluster secret object holding this service's secret configs
    pub fn secret_object_name(&self) -> String {
        format!("{}{SERVICE_SECRET_SUFFIX}", self.name)
    }

    /// Release name derived from the chart reference
    pub fn release_name(&self) -> String {
        release_name(&self.chart)
    }
}

/// Last path segment of a chart reference, without `@version` or `:tag`
///
/// `bitnami/postgresql` -> `postgresql`,
/// `oci://registry.io/charts/redis:18.1.0` -> `redis`
pub fn release_name(chart: &str) -> String {
    let trimmed = chart.trim().trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let segment = segment.split('@').next().unwrap_or(segment);
    let segment = segment.split(':').next().unwrap_or(segment);
    segment.to_string()
}

/// One configuration key of a service
///
/// Secret rows hold the literal secret value; encryption at rest belongs to
/// the persistence backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub id: Uuid,
    pub service_id: Uuid,
    pub key: String,
    pub value: String,
    pub is_secret: bool,
}

impl ServiceConfig {
    pub fn new(
        service_id: Uuid,
        key: impl Into<String>,
        value: impl Into<String>,
        is_secret: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            key: key.into(),
            value: value.into(),
            is_secret,
        }
    }

    /// Copy with the value replaced by a mask when secret
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.is_secret {
            masked.value = MASKED_SECRET_VALUE.to_string();
        }
        masked
    }
}

// Keeps secret values out of logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.is_secret {
            MASKED_SECRET_VALUE
        } else {
            self.value.as_str()
        };
        f.debug_struct("ServiceConfig")
            .field("id", &self.id)
            .field("service_id", &self.service_id)
            .field("key", &self.key)
            .field("value", &value)
            .field("is_secret", &self.is_secret)
            .finish()
    }
}

/// Application as seen through the application repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// Target namespace for the application's services, if pinned
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Caller role within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl Role {
    /// Owner or admin
    pub fn can_manage(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

/// Summary returned for each service created by a provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub id: Uuid,
    pub name: String,
    pub chart: String,
    pub namespace: String,
    pub status: ServiceStatus,
}

impl From<&Service> for ServiceSummary {
    fn from(service: &Service) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            chart: service.chart.clone(),
            namespace: service.namespace.clone(),
            status: service.status,
        }
    }
}
