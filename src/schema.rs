//! Schema types for the relational attributes of NetBox resources.
//!
//! A [`ResourceSchema`] lists which attributes of a resource link to other
//! objects, what kind of object each one points at, and how text values in
//! that attribute should be read. Resource handlers declare one schema per
//! resource type; the [`Operation`](crate::operation::Operation) drives
//! resolution, normalization, and planning from it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::reference::LookupField;

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute may be filled in by the provider when not configured.
    pub computed: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }
}

/// An attribute that holds a reference to another NetBox object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAttribute {
    /// The referenced object type (e.g. `"site"`).
    pub object_type: String,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// How text values are read. `None` uses the object type's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupField>,
    /// Only numeric IDs are accepted.
    #[serde(default)]
    pub id_only: bool,
    /// Representation-only differences are hidden from plans.
    #[serde(default)]
    pub diff_suppress: bool,
    /// If set, changing this attribute forces resource replacement.
    #[serde(default)]
    pub force_new: bool,
    /// Human-readable description of the attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ReferenceAttribute {
    /// Create a reference attribute with the given flags.
    pub fn new(object_type: impl Into<String>, flags: AttributeFlags) -> Self {
        Self {
            object_type: object_type.into(),
            flags,
            lookup: None,
            id_only: false,
            diff_suppress: true,
            force_new: false,
            description: None,
        }
    }

    /// A required reference accepting an ID, slug, or name.
    pub fn required(object_type: impl Into<String>) -> Self {
        Self::new(object_type, AttributeFlags::required())
    }

    /// An optional reference accepting an ID, slug, or name.
    pub fn optional(object_type: impl Into<String>) -> Self {
        Self::new(object_type, AttributeFlags::optional())
    }

    /// An optional reference accepting only a numeric ID.
    pub fn id_only(object_type: impl Into<String>) -> Self {
        let mut attr = Self::new(object_type, AttributeFlags::optional());
        attr.id_only = true;
        attr.diff_suppress = false;
        attr
    }

    /// Mark the attribute as required.
    pub fn as_required(mut self) -> Self {
        self.flags = AttributeFlags::required();
        self
    }

    /// Mark the attribute as optional and computed.
    pub fn as_computed(mut self) -> Self {
        self.flags = AttributeFlags::optional_computed();
        self
    }

    /// Read text values as `field`.
    pub fn with_lookup(mut self, field: LookupField) -> Self {
        self.lookup = Some(field);
        self
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Hide differences between representations of the same object.
    pub fn with_diff_suppress(mut self) -> Self {
        self.diff_suppress = true;
        self
    }

    /// Show every textual difference in plans.
    pub fn without_diff_suppress(mut self) -> Self {
        self.diff_suppress = false;
        self
    }

    /// The description shown in documentation, generated when none was set.
    pub fn description_text(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        let noun = self.object_type.replace('_', " ");
        if self.id_only {
            return format!("ID of the {}.", noun);
        }
        match self.lookup {
            Some(LookupField::Name) => format!("ID or name of the {}.", noun),
            _ => format!("ID or slug of the {}.", noun),
        }
    }
}

/// The reference attributes of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// The resource type name (e.g. `"netbox_device"`).
    pub resource_type: String,
    /// The version of this schema (for state upgrades).
    #[serde(default)]
    pub version: u64,
    /// Reference attributes, by attribute name.
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceAttribute>,
}

impl ResourceSchema {
    /// Create an empty schema at version 0.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            version: 0,
            references: BTreeMap::new(),
        }
    }

    /// Set the schema version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a reference attribute.
    pub fn with_reference(mut self, name: impl Into<String>, attr: ReferenceAttribute) -> Self {
        self.references.insert(name.into(), attr);
        self
    }

    /// Look up a reference attribute.
    pub fn reference(&self, name: &str) -> Option<&ReferenceAttribute> {
        self.references.get(name)
    }

    /// Look up a reference attribute, failing if it is not declared.
    pub fn require(&self, name: &str) -> Result<&ReferenceAttribute, ProviderError> {
        self.reference(name).ok_or_else(|| {
            ProviderError::Validation(format!(
                "{} has no reference attribute '{}'",
                self.resource_type, name
            ))
        })
    }

    /// Names of attributes that point at `object_type`, sorted.
    pub fn references_to(&self, object_type: &str) -> Vec<&str> {
        self.references
            .iter()
            .filter(|(_, attr)| attr.object_type == object_type)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Reference schemas for every resource type a provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: HashMap<String, ResourceSchema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource schema, keyed by its resource type.
    pub fn with_resource(mut self, schema: ResourceSchema) -> Self {
        self.resources.insert(schema.resource_type.clone(), schema);
        self
    }

    /// Look up a resource schema.
    pub fn resource(&self, resource_type: &str) -> Result<&ResourceSchema, ProviderError> {
        self.resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Returns true for error severity.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> ResourceSchema {
        ResourceSchema::new("netbox_device")
            .with_reference("site", ReferenceAttribute::required("site"))
            .with_reference("tenant", ReferenceAttribute::optional("tenant"))
            .with_reference(
                "cluster",
                ReferenceAttribute::optional("cluster").with_lookup(LookupField::Name),
            )
            .with_reference("primary_ip4", ReferenceAttribute::id_only("ip_address"))
    }

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(!optional_computed.required);
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
    }

    #[test]
    fn test_reference_attribute_builders() {
        let attr = ReferenceAttribute::optional("device")
            .with_lookup(LookupField::Name)
            .with_force_new()
            .as_required();
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert!(attr.diff_suppress);
        assert_eq!(attr.lookup, Some(LookupField::Name));

        let id_only = ReferenceAttribute::id_only("ip_address");
        assert!(id_only.id_only);
        assert!(!id_only.diff_suppress);
        assert!(ReferenceAttribute::id_only("ip_address").with_diff_suppress().diff_suppress);
        assert!(!ReferenceAttribute::required("site").without_diff_suppress().diff_suppress);
    }

    #[test]
    fn test_generated_descriptions() {
        assert_eq!(
            ReferenceAttribute::required("device_role").description_text(),
            "ID or slug of the device role."
        );
        assert_eq!(
            ReferenceAttribute::optional("cluster")
                .with_lookup(LookupField::Name)
                .description_text(),
            "ID or name of the cluster."
        );
        assert_eq!(
            ReferenceAttribute::id_only("ip_address").description_text(),
            "ID of the ip address."
        );
        assert_eq!(
            ReferenceAttribute::required("site")
                .with_description("Where it lives.")
                .description_text(),
            "Where it lives."
        );
    }

    #[test]
    fn test_resource_schema_lookup() {
        let schema = device();
        assert!(schema.reference("site").is_some());
        assert!(schema.reference("name").is_none());
        assert_eq!(schema.references_to("site"), vec!["site"]);
        assert!(schema.references_to("vlan").is_empty());

        let err = schema.require("rack").unwrap_err();
        assert_eq!(err.message(), "netbox_device has no reference attribute 'rack'");
    }

    #[test]
    fn test_provider_schema() {
        let provider = ProviderSchema::new().with_resource(device());
        assert!(provider.resource("netbox_device").is_ok());
        assert!(matches!(
            provider.resource("netbox_widget"),
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_schema_serialization() {
        let value = serde_json::to_value(device()).unwrap();
        assert_eq!(value["references"]["site"]["object_type"], "site");
        assert_eq!(value["references"]["site"]["required"], true);
        assert_eq!(value["references"]["cluster"]["lookup"], "name");

        let back: ResourceSchema = serde_json::from_value(value).unwrap();
        assert_eq!(back, device());
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("The value must be positive")
            .with_attribute("count");

        assert_eq!(err.severity, DiagnosticSeverity::Error);
        assert!(err.is_error());
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.detail, Some("The value must be positive".to_string()));
        assert_eq!(err.attribute, Some("count".to_string()));
        assert!(!Diagnostic::warning("heads up").is_error());
    }
}
