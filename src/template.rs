//! # Template Resolver
//!
//! Expands template expressions in application env values against the
//! already-resolved configuration of the declared services.
//!
//! The evaluation context exposes `services.<service>.env.<key>`:
//!
//! ```text
//! DATABASE_URL: "postgres://shop:{{services.db.env.POSTGRES_PASSWORD}}@db:5432/webshop"
//! ```
//!
//! Paths that do not exist render as an empty string. Service values must be
//! fully resolved (secrets substituted) before they are handed in here.
//!
//! Helpers: `upper`, `lower`, `trim`, `default`, `replace`, `quote`,
//! `urlencode`.

use crate::parser::ConfigDocument;
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason, Template,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Resolved configuration of every service: service name -> key -> value
pub type ResolvedServiceConfigs = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid template in app.env.{key}: {message}")]
    Syntax { key: String, message: String },
    #[error("failed to render app.env.{key}: {message}")]
    Render { key: String, message: String },
}

#[derive(Debug)]
pub struct TemplateResolver {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Values end up in connection strings and env vars, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(false);

        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));
        handlebars.register_helper("trim", Box::new(trim_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("replace", Box::new(replace_helper));
        handlebars.register_helper("quote", Box::new(quote_helper));
        handlebars.register_helper("urlencode", Box::new(urlencode_helper));

        Self { handlebars }
    }

    /// Resolve every `app.env` value of `document`
    pub fn resolve_app_templates(
        &self,
        document: &ConfigDocument,
        resolved: &ResolvedServiceConfigs,
    ) -> Result<BTreeMap<String, String>, TemplateError> {
        self.resolve_values(&document.app.env, resolved)
    }

    /// Resolve an arbitrary key -> template map against `resolved`
    pub fn resolve_values(
        &self,
        templates: &BTreeMap<String, String>,
        resolved: &ResolvedServiceConfigs,
    ) -> Result<BTreeMap<String, String>, TemplateError> {
        let context = build_context(resolved);
        let mut output = BTreeMap::new();

        for (key, template) in templates {
            Template::compile(template).map_err(|e| TemplateError::Syntax {
                key: key.clone(),
                message: e.to_string(),
            })?;

            let rendered = self
                .handlebars
                .render_template(template, &context)
                .map_err(|e| TemplateError::Render {
                    key: key.clone(),
                    message: e.to_string(),
                })?;
            output.insert(key.clone(), rendered);
        }

        debug!("Resolved {} app env templates", output.len());
        Ok(output)
    }
}

fn build_context(resolved: &ResolvedServiceConfigs) -> Value {
    let services: Map<String, Value> = resolved
        .iter()
        .map(|(service, env)| (service.clone(), json!({ "env": env })))
        .collect();
    json!({ "services": services })
}

/// String value of parameter `index`; missing or null renders as empty,
/// any other non-string type is an error
fn string_param<'a>(
    h: &'a Helper<'_>,
    helper: &'static str,
    index: usize,
) -> Result<&'a str, RenderErrorReason> {
    match h.param(index).map(|p| p.value()) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(RenderErrorReason::ParamTypeMismatchForName(
            helper,
            index.to_string(),
            format!("string, got {other}"),
        )),
    }
}

fn required_param<'a>(
    h: &'a Helper<'_>,
    helper: &'static str,
    index: usize,
) -> Result<&'a str, RenderErrorReason> {
    if h.param(index).is_none() {
        return Err(RenderErrorReason::ParamNotFoundForIndex(helper, index));
    }
    string_param(h, helper, index)
}

fn upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = string_param(h, "upper", 0)?;
    out.write(&param.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = string_param(h, "lower", 0)?;
    out.write(&param.to_lowercase())?;
    Ok(())
}

fn trim_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = string_param(h, "trim", 0)?;
    out.write(param.trim())?;
    Ok(())
}

/// `{{default value "fallback"}}`: fallback when value is missing or empty
fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = string_param(h, "default", 0)?;
    let fallback = required_param(h, "default", 1)?;
    out.write(if value.is_empty() { fallback } else { value })?;
    Ok(())
}

/// `{{replace value "from" "to"}}`
fn replace_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = string_param(h, "replace", 0)?;
    let from = required_param(h, "replace", 1)?;
    let to = required_param(h, "replace", 2)?;
    if from.is_empty() {
        out.write(value)?;
    } else {
        out.write(&value.replace(from, to))?;
    }
    Ok(())
}

fn quote_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = string_param(h, "quote", 0)?;
    out.write(&format!("\"{}\"", param.replace('\\', "\\\\").replace('"', "\\\"")))?;
    Ok(())
}

/// Percent-encode everything outside RFC 3986 unreserved characters
fn urlencode_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = string_param(h, "urlencode", 0)?;
    out.write(&urlencoding::encode(param))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn db_resolved() -> ResolvedServiceConfigs {
        let mut env = BTreeMap::new();
        env.insert("POSTGRES_PASSWORD".to_string(), "secret123".to_string());
        env.insert("POSTGRES_USER".to_string(), "Shop".to_string());
        let mut resolved = BTreeMap::new();
        resolved.insert("db".to_string(), env);
        resolved
    }

    fn app(values: &[(&str, &str)]) -> BTreeMap<String, String> {
        values
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_connection_string() {
        let document = parser::parse(
            r#"
services:
  db:
    chart: bitnami/postgresql
    env:
      POSTGRES_PASSWORD: SECRET::db_password
app:
  env:
    DATABASE_URL: "postgres://shop:{{services.db.env.POSTGRES_PASSWORD}}@db:5432/webshop"
"#,
        )
        .unwrap();

        let resolver = TemplateResolver::new();
        let resolved = resolver
            .resolve_app_templates(&document, &db_resolved())
            .unwrap();
        assert_eq!(
            resolved["DATABASE_URL"],
            "postgres://shop:secret123@db:5432/webshop"
        );
    }

    #[test]
    fn test_missing_path_renders_empty() {
        let resolver = TemplateResolver::new();
        let resolved = resolver
            .resolve_values(
                &app(&[("URL", "x{{services.cache.env.REDIS_URL}}y")]),
                &db_resolved(),
            )
            .unwrap();
        assert_eq!(resolved["URL"], "xy");
    }

    #[test]
    fn test_values_are_not_html_escaped() {
        let mut resolved = db_resolved();
        resolved
            .get_mut("db")
            .unwrap()
            .insert("POSTGRES_PASSWORD".to_string(), "a&b<c>\"d'".to_string());
        let resolver = TemplateResolver::new();
        let output = resolver
            .resolve_values(
                &app(&[("PW", "{{services.db.env.POSTGRES_PASSWORD}}")]),
                &resolved,
            )
            .unwrap();
        assert_eq!(output["PW"], "a&b<c>\"d'");
    }

    #[test]
    fn test_helpers() {
        let resolver = TemplateResolver::new();
        let output = resolver
            .resolve_values(
                &app(&[
                    ("UPPER", "{{upper services.db.env.POSTGRES_USER}}"),
                    ("LOWER", "{{lower services.db.env.POSTGRES_USER}}"),
                    ("PORT", "{{default services.db.env.PORT \"5432\"}}"),
                    ("USER", "{{default services.db.env.POSTGRES_USER \"nobody\"}}"),
                    ("REPLACED", "{{replace services.db.env.POSTGRES_USER \"S\" \"Wh\"}}"),
                    ("QUOTED", "{{quote services.db.env.POSTGRES_USER}}"),
                    ("TRIMMED", "{{trim \"  padded  \"}}"),
                    ("ENCODED", "{{urlencode \"p@ss word\"}}"),
                ]),
                &db_resolved(),
            )
            .unwrap();
        assert_eq!(output["UPPER"], "SHOP");
        assert_eq!(output["LOWER"], "shop");
        assert_eq!(output["PORT"], "5432");
        assert_eq!(output["USER"], "Shop");
        assert_eq!(output["REPLACED"], "Whhop");
        assert_eq!(output["QUOTED"], "\"Shop\"");
        assert_eq!(output["TRIMMED"], "padded");
        assert_eq!(output["ENCODED"], "p%40ss%20word");
    }

    #[test]
    fn test_urlencode_password_in_connection_string() {
        let mut env = BTreeMap::new();
        env.insert("POSTGRES_PASSWORD".to_string(), "pä/ss?#~".to_string());
        let mut resolved = BTreeMap::new();
        resolved.insert("db".to_string(), env);

        let output = TemplateResolver::new()
            .resolve_values(
                &app(&[(
                    "DATABASE_URL",
                    "postgres://shop:{{urlencode services.db.env.POSTGRES_PASSWORD}}@db/webshop",
                )]),
                &resolved,
            )
            .unwrap();
        assert_eq!(
            output["DATABASE_URL"],
            "postgres://shop:p%C3%A4%2Fss%3F%23~@db/webshop"
        );
    }

    #[test]
    fn test_invalid_syntax_is_error() {
        let resolver = TemplateResolver::new();
        let err = resolver
            .resolve_values(&app(&[("BROKEN", "{{#if}")]), &db_resolved())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { ref key, .. } if key == "BROKEN"));
    }

    #[test]
    fn test_helper_type_mismatch_is_error() {
        let resolver = TemplateResolver::new();
        let err = resolver
            .resolve_values(&app(&[("N", "{{upper 42}}")]), &db_resolved())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[test]
    fn test_missing_required_param_is_error() {
        let resolver = TemplateResolver::new();
        let err = resolver
            .resolve_values(&app(&[("D", "{{default services.db.env.X}}")]), &db_resolved())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[test]
    fn test_plain_values_pass_through() {
        let resolver = TemplateResolver::new();
        let output = resolver
            .resolve_values(&app(&[("PLAIN", "just text")]), &BTreeMap::new())
            .unwrap();
        assert_eq!(output["PLAIN"], "just text");
    }
}
