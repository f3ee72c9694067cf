//! Error types for reference resolution and provider operations.

use thiserror::Error;

use crate::reference::ReferenceKind;
use crate::schema::Diagnostic;
use crate::types::ResolvedObject;

/// Errors reported by a [`LookupBackend`](crate::resolver::LookupBackend).
///
/// A backend reports a missing object through an empty result, never
/// through an error. Errors here are failures of the lookup itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The API could not be reached or answered with a server error.
    #[error("API unavailable: {0}")]
    Unavailable(String),

    /// The API answered with a payload that could not be understood.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

/// Errors produced while resolving a single reference.
///
/// This type is `Clone` so that every caller waiting on one in-flight
/// lookup receives the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No remote object of the declared type matches the reference.
    #[error("No {object_type} found with {kind} '{value}'")]
    UnresolvedReference {
        /// The referenced object type.
        object_type: String,
        /// How the reference was written.
        kind: ReferenceKind,
        /// The literal value that failed to resolve.
        value: String,
    },

    /// More than one remote object matches under the applied scope.
    #[error("Multiple {object_type} objects match '{value}' (IDs: {})", format_candidate_ids(.candidates))]
    AmbiguousReference {
        /// The referenced object type.
        object_type: String,
        /// The literal value that matched more than once.
        value: String,
        /// Every object that matched.
        candidates: Vec<ResolvedObject>,
    },

    /// The API failed for network or availability reasons.
    #[error("Lookup of {object_type} '{value}' failed: {source}")]
    TransientLookupFailure {
        /// The referenced object type.
        object_type: String,
        /// The literal value being looked up.
        value: String,
        /// The backend failure.
        source: LookupError,
    },

    /// The object type has no registered lookup descriptor.
    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),
}

impl ResolveError {
    /// Whether retrying the same lookup later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientLookupFailure { .. })
    }

    /// The object type the failing reference pointed at.
    pub fn object_type(&self) -> &str {
        match self {
            Self::UnresolvedReference { object_type, .. }
            | Self::AmbiguousReference { object_type, .. }
            | Self::TransientLookupFailure { object_type, .. } => object_type,
            Self::UnknownObjectType(object_type) => object_type,
        }
    }

    /// A short summary suitable for a diagnostic headline.
    pub fn summary(&self) -> String {
        match self {
            Self::UnresolvedReference { object_type, .. } => {
                format!("{} lookup failed", object_type)
            },
            Self::AmbiguousReference { object_type, .. } => {
                format!("Ambiguous {} reference", object_type)
            },
            Self::TransientLookupFailure { object_type, .. } => {
                format!("{} lookup failed", object_type)
            },
            Self::UnknownObjectType(_) => "Unsupported reference".to_string(),
        }
    }
}

fn format_candidate_ids(candidates: &[ResolvedObject]) -> String {
    candidates
        .iter()
        .map(|c| c.id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur while a resource handler drives references
/// through an [`Operation`](crate::operation::Operation).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A reference attribute could not be resolved.
    #[error("Invalid reference in '{attribute}': {source}")]
    Reference {
        /// The attribute path holding the reference.
        attribute: String,
        /// The underlying resolution failure.
        #[source]
        source: ResolveError,
    },

    /// The resource configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The resource type has no reference schema.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Wrap a resolution failure with the attribute it occurred on.
    pub fn reference(attribute: impl Into<String>, source: ResolveError) -> Self {
        Self::Reference {
            attribute: attribute.into(),
            source,
        }
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Reference { source, .. } => source.to_string(),
            Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
        }
    }

    /// Whether the failing operation may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reference { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Render this error as a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Reference { attribute, source } => Diagnostic::error(source.summary())
                .with_detail(source.to_string())
                .with_attribute(attribute.clone()),
            Self::Validation(msg) => {
                Diagnostic::error("Invalid resource configuration").with_detail(msg.clone())
            },
            Self::Configuration(msg) => {
                Diagnostic::error("Invalid provider configuration").with_detail(msg.clone())
            },
            Self::UnknownResource(msg) => {
                Diagnostic::error("Unknown resource type").with_detail(msg.clone())
            },
            Self::Serialization(err) => {
                Diagnostic::error("Serialization error").with_detail(err.to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    fn unresolved() -> ResolveError {
        ResolveError::UnresolvedReference {
            object_type: "tenant".to_string(),
            kind: ReferenceKind::Slug,
            value: "ghost".to_string(),
        }
    }

    #[test]
    fn test_resolve_error_display() {
        assert_eq!(unresolved().to_string(), "No tenant found with slug 'ghost'");

        let err = ResolveError::AmbiguousReference {
            object_type: "vlan".to_string(),
            value: "servers".to_string(),
            candidates: vec![ResolvedObject::new(3), ResolvedObject::new(9)],
        };
        assert_eq!(
            err.to_string(),
            "Multiple vlan objects match 'servers' (IDs: 3, 9)"
        );

        let err = ResolveError::TransientLookupFailure {
            object_type: "site".to_string(),
            value: "dc-east".to_string(),
            source: LookupError::Unavailable("502 Bad Gateway".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Lookup of site 'dc-east' failed: API unavailable: 502 Bad Gateway"
        );
    }

    #[test]
    fn test_only_transient_failures_are_retryable() {
        assert!(!unresolved().is_retryable());
        assert!(!ResolveError::UnknownObjectType("widget".to_string()).is_retryable());

        let transient = ResolveError::TransientLookupFailure {
            object_type: "site".to_string(),
            value: "1".to_string(),
            source: LookupError::Unavailable("timeout".to_string()),
        };
        assert!(transient.is_retryable());
        assert!(ProviderError::reference("site", transient).is_retryable());
    }

    #[test]
    fn test_provider_error_diagnostic_carries_attribute() {
        let err = ProviderError::reference("tenant", unresolved());
        assert_eq!(
            err.to_string(),
            "Invalid reference in 'tenant': No tenant found with slug 'ghost'"
        );
        assert_eq!(err.message(), "No tenant found with slug 'ghost'");

        let diag = err.to_diagnostic();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "tenant lookup failed");
        assert_eq!(diag.attribute, Some("tenant".to_string()));
    }

    #[test]
    fn test_object_type_accessor() {
        assert_eq!(unresolved().object_type(), "tenant");
        assert_eq!(
            ResolveError::UnknownObjectType("widget".to_string()).object_type(),
            "widget"
        );
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("bad log filter".to_string());
        assert_eq!(err.message(), "bad log filter");
        assert_eq!(format!("{}", err), "Configuration error: bad log filter");
    }
}
