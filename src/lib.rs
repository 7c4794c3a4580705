//! # Infra Provisioner
//!
//! Provisioning pipeline for a platform-as-a-service backend. A declarative
//! service document is parsed and validated, persisted as `Service` and
//! `ServiceConfig` records, and each new service is materialized in the
//! background as a Helm release plus a cluster secret.
//!
//! ## Layout
//!
//! - [`parser`]: document parsing, validation, secret marker extraction
//! - [`template`]: `{{services.<name>.env.<KEY>}}` expansion of app values
//! - [`orchestrator`]: [`orchestrator::InfrastructureService`], the entry point
//! - [`provisioner`]: background provision/unprovision of one service
//! - [`provider`]: Helm and Kubernetes adapters
//! - [`repository`]: persistence traits and an in-memory implementation
//!
//! ## Document format
//!
//! ```yaml
//! services:
//!   db:
//!     chart: bitnami/postgresql
//!     env:
//!       POSTGRES_USER: shop
//!       POSTGRES_PASSWORD: SECRET::db_password
//! app:
//!   env:
//!     DATABASE_URL: "postgres://{{services.db.env.POSTGRES_USER}}:{{services.db.env.POSTGRES_PASSWORD}}@db:5432/shop"
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod provider;
pub mod provisioner;
pub mod repository;
pub mod template;

pub use config::ProvisionerConfig;
pub use orchestrator::{
    Collaborators, InfrastructureError, InfrastructureService, ProvisionRequest, ProvisionResult,
};
