//! Static checks on reference attributes, run before any lookup.
//!
//! # Example
//!
//! ```
//! use netbox_provider_refs::schema::{ReferenceAttribute, ResourceSchema};
//! use netbox_provider_refs::validation::validate;
//! use serde_json::json;
//!
//! let schema = ResourceSchema::new("netbox_device")
//!     .with_reference("site", ReferenceAttribute::required("site"))
//!     .with_reference("primary_ip4", ReferenceAttribute::id_only("ip_address"));
//!
//! assert!(validate(&schema, &json!({"site": "dc-east", "primary_ip4": 12})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"primary_ip4": "10.0.0.1/24"}));
//! assert_eq!(diagnostics.len(), 2);
//! ```

use serde_json::Value;

use crate::config::json_type_name;
use crate::reference::parse_id;
use crate::registry::ObjectRegistry;
use crate::schema::{Diagnostic, DiagnosticSeverity, ReferenceAttribute, ResourceSchema};

/// Validate the reference attributes of a resource configuration.
///
/// Returns a list of diagnostics. An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required references must be present, non-null, and non-empty
/// - Values must be strings or non-negative integers
/// - ID-only references must be numeric
/// - Surrounding whitespace is reported as a warning
pub fn validate(schema: &ResourceSchema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            for (name, attr) in &schema.references {
                validate_reference(attr, None, name, &mut diagnostics);
            }
            return diagnostics;
        },
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", json_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.references {
        validate_reference(attr, obj.get(name), name, &mut diagnostics);
    }
    diagnostics
}

/// Validate a configuration, returning Ok if valid or Err with the error diagnostics.
///
/// Warnings alone do not fail validation.
pub fn validate_result(schema: &ResourceSchema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let errors: Vec<Diagnostic> = validate(schema, value)
        .into_iter()
        .filter(Diagnostic::is_error)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if a configuration has no validation errors.
pub fn is_valid(schema: &ResourceSchema, value: &Value) -> bool {
    validate_result(schema, value).is_ok()
}

/// Check that every reference in `schema` points at a registered object type.
pub fn validate_object_types(
    schema: &ResourceSchema,
    registry: &ObjectRegistry,
) -> Vec<Diagnostic> {
    schema
        .references
        .iter()
        .filter(|(_, attr)| !registry.contains(&attr.object_type))
        .map(|(name, attr)| {
            Diagnostic::error("Unsupported reference")
                .with_detail(format!(
                    "{} references unknown object type '{}'",
                    schema.resource_type, attr.object_type
                ))
                .with_attribute(name.clone())
        })
        .collect()
}

fn validate_reference(
    attr: &ReferenceAttribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => missing(attr, path, diagnostics),
        Some(Value::String(s)) if s.is_empty() => missing(attr, path, diagnostics),
        Some(Value::String(s)) => {
            if attr.id_only && parse_id(s).is_none() {
                diagnostics.push(invalid_id(path, s));
            } else if s.trim() != s {
                diagnostics.push(
                    Diagnostic::warning(format!("Reference '{}' has surrounding whitespace", path))
                        .with_detail("Whitespace is sent to the API verbatim and will not match a slug or name")
                        .with_attribute(path),
                );
            }
        },
        Some(Value::Number(n)) => {
            if n.as_u64().is_none() {
                diagnostics.push(invalid_id(path, &n.to_string()));
            }
        },
        Some(other) => diagnostics.push(type_error(path, "string or integer", other)),
    }
}

fn missing(attr: &ReferenceAttribute, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if attr.flags.required {
        diagnostics.push(
            Diagnostic::error(format!("Missing required attribute '{}'", path))
                .with_detail(format!(
                    "This attribute is required and must name a {}",
                    attr.object_type.replace('_', " ")
                ))
                .with_attribute(path),
        );
    }
}

fn invalid_id(path: &str, got: &str) -> Diagnostic {
    Diagnostic::error(format!("Invalid ID for attribute '{}'", path))
        .with_detail(format!("Expected a non-negative integer ID, got '{}'", got))
        .with_attribute(path)
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!("Expected {}, got {}", expected, json_type_name(got))),
        attribute: Some(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("netbox_device")
            .with_reference("site", ReferenceAttribute::required("site"))
            .with_reference("tenant", ReferenceAttribute::optional("tenant"))
            .with_reference("primary_ip4", ReferenceAttribute::id_only("ip_address"))
    }

    #[test]
    fn test_valid_shapes() {
        assert!(validate(&schema(), &json!({"site": "dc-east"})).is_empty());
        assert!(validate(&schema(), &json!({"site": 4, "tenant": "acme"})).is_empty());
        assert!(validate(&schema(), &json!({"site": "4", "primary_ip4": "12"})).is_empty());
        assert!(validate(&schema(), &json!({"site": "dc", "primary_ip4": 12})).is_empty());
    }

    #[test]
    fn test_missing_required() {
        for config in [json!({}), json!({"site": null}), json!({"site": ""}), Value::Null] {
            let diagnostics = validate(&schema(), &config);
            assert_eq!(diagnostics.len(), 1, "{config}");
            assert_eq!(diagnostics[0].attribute.as_deref(), Some("site"));
            assert!(diagnostics[0].summary.contains("Missing required"));
        }
    }

    #[test]
    fn test_id_only_rejects_text() {
        let diagnostics = validate(&schema(), &json!({"site": "dc", "primary_ip4": "10.0.0.1/24"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("primary_ip4"));
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Expected a non-negative integer ID, got '10.0.0.1/24'")
        );
    }

    #[test]
    fn test_negative_and_fractional_numbers() {
        let diagnostics = validate(&schema(), &json!({"site": -3}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.starts_with("Invalid ID"));

        assert!(!is_valid(&schema(), &json!({"site": 1.5})));
    }

    #[test]
    fn test_wrong_type() {
        let diagnostics = validate(&schema(), &json!({"site": ["dc-east"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Expected string or integer, got array")
        );
    }

    #[test]
    fn test_whitespace_is_a_warning() {
        let config = json!({"site": " dc-east"});
        let diagnostics = validate(&schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert!(validate_result(&schema(), &config).is_ok());
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&schema(), &json!("dc-east"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result_helper() {
        assert!(validate_result(&schema(), &json!({"site": 1})).is_ok());
        let errors = validate_result(&schema(), &json!({"tenant": true})).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_unregistered_object_types() {
        let schema = schema().with_reference("widget", ReferenceAttribute::optional("widget"));
        let diagnostics = validate_object_types(&schema, &ObjectRegistry::netbox());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("widget"));
    }
}
