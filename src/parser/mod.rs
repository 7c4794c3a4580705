//! # Parser
//!
//! Parses declarative service documents into typed records and segregates
//! secret references.
//!
//! ## Flow
//!
//! 1. [`parse`] turns document text into a [`ConfigDocument`]
//! 2. [`validate`] checks service names and chart references
//! 3. [`extract_secret_references`] lists every `SECRET::<name>` occurrence
//! 4. [`generate_service_configs`] produces one [`ServiceConfigData`] per
//!    service, with whole-value markers stored as secrets
//!
//! [`extract_secret_names`] and [`substitute_secrets`] are also usable on
//! their own for ad-hoc resolution outside a full document.

mod error;
pub mod secrets;
mod types;
pub mod validation;

pub use error::ParseError;
pub use secrets::{extract_secret_names, substitute_secrets};
pub use types::{
    AppDefinition, ConfigDocument, ConfigValue, SecretReference, ServiceConfigData,
    ServiceDefinition,
};
pub use validation::validate;

use std::collections::BTreeMap;
use tracing::debug;

/// Parse document text
///
/// An empty (or comment-only) document yields `ConfigDocument::default()`,
/// which [`validate`] then rejects for lacking `services`.
pub fn parse(document_text: &str) -> Result<ConfigDocument, ParseError> {
    if document_text.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }
    let raw: serde_yaml::Value = serde_yaml::from_str(document_text)?;
    if raw.is_null() {
        debug!("Service document is empty, using defaults");
        return Ok(ConfigDocument::default());
    }
    let document: ConfigDocument = serde_yaml::from_value(raw)?;
    debug!(
        "Parsed service document with {} services and {} app env keys",
        document.services().count(),
        document.app.env.len()
    );
    Ok(document)
}

/// Parse and validate in one step
pub fn parse_and_validate(document_text: &str) -> Result<ConfigDocument, ParseError> {
    let document = parse(document_text)?;
    validate(&document)?;
    Ok(document)
}

/// List every secret marker occurrence in service and app values
///
/// Substring matching: a value may yield several references.
pub fn extract_secret_references(document: &ConfigDocument) -> Vec<SecretReference> {
    let service_values = document.services().flat_map(|(service, definition)| {
        definition
            .env
            .iter()
            .map(move |(key, value)| (format!("{service}.{key}"), value))
    });
    let app_values = document
        .app
        .env
        .iter()
        .map(|(key, value)| (format!("app.{key}"), value));

    service_values
        .chain(app_values)
        .flat_map(|(key_path, value)| {
            extract_secret_names(value)
                .into_iter()
                .map(move |secret_name| SecretReference {
                    secret_name,
                    key_path: key_path.clone(),
                })
        })
        .collect()
}

/// Generate per-service configuration records
///
/// A value is marked secret only when the whole value is exactly
/// `SECRET::<name>`; its raw value is cleared. Every other value, including
/// ones that merely contain a marker, passes through unchanged.
pub fn generate_service_configs(
    document: &ConfigDocument,
    namespace_hint: &str,
) -> Vec<ServiceConfigData> {
    document
        .services()
        .map(|(service_name, definition)| {
            let configs: BTreeMap<String, ConfigValue> = definition
                .env
                .iter()
                .map(|(key, raw)| {
                    let value = match secrets::whole_value_secret_name(raw) {
                        Some(secret_name) => ConfigValue::secret(secret_name),
                        None => ConfigValue::plain(raw.clone()),
                    };
                    (key.clone(), value)
                })
                .collect();

            ServiceConfigData {
                service_name: service_name.clone(),
                chart: definition.chart.trim().to_string(),
                namespace: namespace_hint.to_string(),
                configs,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP_DOCUMENT: &str = r#"
services:
  db:
    chart: bitnami/postgresql
    env:
      POSTGRES_USER: shop
      POSTGRES_PASSWORD: SECRET::db_password
      POSTGRES_PORT: 5432
  cache:
    chart: bitnami/redis
    env:
      REDIS_URL: "redis://:SECRET::redis_password@cache:6379"
app:
  env:
    DATABASE_URL: "postgres://shop:{{services.db.env.POSTGRES_PASSWORD}}@db:5432/webshop"
    API_TOKEN: SECRET::api_token
"#;

    #[test]
    fn test_parse_document() {
        let document = parse(SHOP_DOCUMENT).unwrap();
        let services = document.services.as_ref().unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services["db"].chart, "bitnami/postgresql");
        assert_eq!(services["db"].env["POSTGRES_PORT"], "5432");
        assert_eq!(document.app.env.len(), 2);
    }

    #[test]
    fn test_parse_empty_document_is_default() {
        assert_eq!(parse("").unwrap(), ConfigDocument::default());
        assert_eq!(parse("# nothing here\n").unwrap(), ConfigDocument::default());
    }

    #[test]
    fn test_parse_malformed_document() {
        let err = parse("services: [unterminated").unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(parse("- just\n- a list\n").unwrap_err().is_structural());
        assert!(parse("services:\n  db:\n    env:\n      K: [1, 2]\n")
            .unwrap_err()
            .is_structural());
    }

    #[test]
    fn test_parse_null_services_fails_validation() {
        let document = parse("services:\n").unwrap();
        assert!(document.services.is_none());
        assert!(validate(&document).is_err());
    }

    #[test]
    fn test_round_trip_services() {
        let document = parse(SHOP_DOCUMENT).unwrap();
        let services_only = ConfigDocument {
            services: document.services.clone(),
            app: AppDefinition::default(),
        };
        let serialized = serde_yaml::to_string(&services_only).unwrap();
        let reparsed = parse(&serialized).unwrap();
        assert_eq!(reparsed.services, document.services);
    }

    #[test]
    fn test_generate_marks_whole_value_secret() {
        let document = parse(SHOP_DOCUMENT).unwrap();
        let configs = generate_service_configs(&document, "shop");
        let db = configs.iter().find(|c| c.service_name == "db").unwrap();

        let password = &db.configs["POSTGRES_PASSWORD"];
        assert!(password.is_secret);
        assert_eq!(password.secret_name.as_deref(), Some("db_password"));
        assert_eq!(password.value, "");

        let user = &db.configs["POSTGRES_USER"];
        assert!(!user.is_secret);
        assert_eq!(user.value, "shop");
        assert_eq!(db.namespace, "shop");
    }

    #[test]
    fn test_embedded_marker_is_not_secret_but_is_referenced() {
        let document = parse(SHOP_DOCUMENT).unwrap();

        let configs = generate_service_configs(&document, "shop");
        let cache = configs.iter().find(|c| c.service_name == "cache").unwrap();
        let url = &cache.configs["REDIS_URL"];
        assert!(!url.is_secret);
        assert_eq!(url.value, "redis://:SECRET::redis_password@cache:6379");

        let references = extract_secret_references(&document);
        assert!(references.contains(&SecretReference {
            secret_name: "redis_password".to_string(),
            key_path: "cache.REDIS_URL".to_string(),
        }));
    }

    #[test]
    fn test_extract_secret_references_covers_services_and_app() {
        let document = parse(SHOP_DOCUMENT).unwrap();
        let mut names: Vec<String> = extract_secret_references(&document)
            .into_iter()
            .map(|r| format!("{}={}", r.key_path, r.secret_name))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "app.API_TOKEN=api_token",
                "cache.REDIS_URL=redis_password",
                "db.POSTGRES_PASSWORD=db_password",
            ]
        );
    }

    #[test]
    fn test_extract_secret_references_multiple_per_value() {
        let document =
            parse("services:\n  api:\n    chart: c/api\n    env:\n      PAIR: SECRET::a:SECRET::b\n")
                .unwrap();
        let references = extract_secret_references(&document);
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].secret_name, "a");
        assert_eq!(references[1].secret_name, "b");
    }

    #[test]
    fn test_secret_never_leaks_into_value() {
        let document = parse(
            "services:\n  db:\n    chart: c/db\n    env:\n      A: SECRET::a\n      B: SECRET::b\n",
        )
        .unwrap();
        for data in generate_service_configs(&document, "ns") {
            for (_, value) in data.secret_configs() {
                assert!(value.value.is_empty());
                assert!(value.secret_name.is_some());
            }
        }
    }
}
