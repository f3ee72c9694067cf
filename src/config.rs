//! Provider-level settings that shape reference resolution.
//!
//! The settings are read from the provider configuration block. Keys the
//! resolver does not own (server URL, token, TLS options) are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::error::ProviderError;
use crate::schema::Diagnostic;

/// Settings consulted by the resolver, normalizer, and diff suppressor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Preserve a configured slug or name that differs from the API's only
    /// in letter case.
    pub case_insensitive_match: bool,
    /// Retry a slug lookup that matched nothing against the name field.
    pub slug_name_fallback: bool,
    /// Log filter directive used when no logging environment variable is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            case_insensitive_match: true,
            slug_name_fallback: true,
            log_level: None,
        }
    }
}

impl ResolverConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a provider configuration block.
    ///
    /// `null` yields the defaults.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        if !value.is_object() {
            return Err(ProviderError::Configuration(format!(
                "expected an object, got {}",
                json_type_name(value)
            )));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ProviderError::Configuration(e.to_string()))
    }

    /// Set whether case-only differences are tolerated.
    pub fn with_case_insensitive_match(mut self, enabled: bool) -> Self {
        self.case_insensitive_match = enabled;
        self
    }

    /// Set whether slug lookups fall back to name lookups.
    pub fn with_slug_name_fallback(mut self, enabled: bool) -> Self {
        self.slug_name_fallback = enabled;
        self
    }

    /// Set the default log filter.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Compare a configured alias with the API's value under this configuration.
    pub fn aliases_match(&self, configured: &str, remote: &str) -> bool {
        if self.case_insensitive_match {
            configured.eq_ignore_ascii_case(remote)
        } else {
            configured == remote
        }
    }

    /// Check the settings, returning diagnostics for anything unusable.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if let Some(level) = &self.log_level {
            if let Err(e) = EnvFilter::try_new(level) {
                diagnostics.push(
                    Diagnostic::error("Invalid log level")
                        .with_detail(format!("'{}' is not a valid filter: {}", level, e))
                        .with_attribute("log_level"),
                );
            }
        }
        diagnostics
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
