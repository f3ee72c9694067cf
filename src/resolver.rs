//! Translating a [`Reference`] into the canonical object it denotes.
//!
//! The resolver is generic over object kind: an [`ObjectDescriptor`] from
//! the [`ObjectRegistry`] says which filter fields to query, and a
//! [`LookupBackend`] performs the actual API calls.
//!
//! Resolution rules:
//!
//! - unset references resolve to nothing without touching the backend
//! - numeric IDs are fetched directly, and a missing object is an error
//! - slugs are filtered on the slug field, then on the name field when the
//!   slug matched nothing and fallback is enabled
//! - names are filtered on the name field, then on the slug field likewise
//! - zero matches is [`ResolveError::UnresolvedReference`]; more than one is
//!   [`ResolveError::AmbiguousReference`] and nothing is picked

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::ResolverConfig;
use crate::error::{LookupError, ResolveError};
use crate::reference::{Reference, ReferenceKind};
use crate::registry::{ObjectDescriptor, ObjectRegistry};
use crate::types::ResolvedObject;

/// Filters that narrow a text lookup, keyed by API filter name.
///
/// Values are IDs of already-resolved sibling references, so a device
/// named `"device-42"` is looked up with `site_id=<resolved site>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    filters: BTreeMap<String, u64>,
}

impl Scope {
    /// An empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter.
    pub fn with_filter(mut self, filter: impl Into<String>, id: u64) -> Self {
        self.insert(filter, id);
        self
    }

    /// Add a filter in place.
    pub fn insert(&mut self, filter: impl Into<String>, id: u64) {
        self.filters.insert(filter.into(), id);
    }

    /// The ID bound to `filter`, if any.
    pub fn get(&self, filter: &str) -> Option<u64> {
        self.filters.get(filter).copied()
    }

    /// Returns true when no filters apply.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Iterate over `(filter, id)` pairs in filter order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (filter, id) in self.iter() {
            if !first {
                f.write_str("&")?;
            }
            write!(f, "{}={}", filter, id)?;
            first = false;
        }
        Ok(())
    }
}

/// Access to the NetBox API for lookups.
///
/// Implementations report "no such object" as `Ok(None)` or an empty list.
/// `Err` is reserved for failures of the call itself.
#[async_trait]
pub trait LookupBackend: Send + Sync {
    /// Fetch one object by ID.
    async fn get_by_id(
        &self,
        object: &ObjectDescriptor,
        id: u64,
    ) -> Result<Option<ResolvedObject>, LookupError>;

    /// List objects whose `field` equals `value`, narrowed by `scope`.
    async fn list_by_filter(
        &self,
        object: &ObjectDescriptor,
        field: &str,
        value: &str,
        scope: &Scope,
    ) -> Result<Vec<ResolvedObject>, LookupError>;
}

#[async_trait]
impl<T: LookupBackend + ?Sized> LookupBackend for Arc<T> {
    async fn get_by_id(
        &self,
        object: &ObjectDescriptor,
        id: u64,
    ) -> Result<Option<ResolvedObject>, LookupError> {
        (**self).get_by_id(object, id).await
    }

    async fn list_by_filter(
        &self,
        object: &ObjectDescriptor,
        field: &str,
        value: &str,
        scope: &Scope,
    ) -> Result<Vec<ResolvedObject>, LookupError> {
        (**self).list_by_filter(object, field, value, scope).await
    }
}

/// Resolves references against a [`LookupBackend`].
///
/// A resolver holds no per-operation state and can be shared across
/// operations; memoization lives in the
/// [`ResolutionCache`](crate::cache::ResolutionCache).
pub struct Resolver {
    backend: Arc<dyn LookupBackend>,
    registry: ObjectRegistry,
    config: ResolverConfig,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("object_types", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver over the NetBox registry with default settings.
    pub fn new(backend: impl LookupBackend + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Create a resolver from a shared backend.
    pub fn from_arc(backend: Arc<dyn LookupBackend>) -> Self {
        Self {
            backend,
            registry: ObjectRegistry::netbox(),
            config: ResolverConfig::default(),
        }
    }

    /// Replace the object registry.
    pub fn with_registry(mut self, registry: ObjectRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the settings.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// The object registry.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// The settings.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve one reference.
    ///
    /// Returns `Ok(None)` only for unset references.
    #[instrument(
        skip(self, reference, scope),
        fields(
            object_type = %reference.object_type(),
            kind = %reference.kind(),
            value = %reference.raw_value()
        )
    )]
    pub async fn resolve(
        &self,
        reference: &Reference,
        scope: &Scope,
    ) -> Result<Option<ResolvedObject>, ResolveError> {
        if reference.is_unset() {
            return Ok(None);
        }

        let descriptor = self.registry.require(reference.object_type())?;
        let resolved = match reference.kind() {
            ReferenceKind::NumericId => self.resolve_id(descriptor, reference).await?,
            ReferenceKind::Slug | ReferenceKind::Name => {
                self.resolve_text(descriptor, reference, scope).await?
            },
            ReferenceKind::Unset => return Ok(None),
        };

        debug!(id = resolved.id, "reference resolved");
        Ok(Some(resolved))
    }

    async fn resolve_id(
        &self,
        descriptor: &ObjectDescriptor,
        reference: &Reference,
    ) -> Result<ResolvedObject, ResolveError> {
        let id = reference.id().ok_or_else(|| unresolved(reference))?;
        match self.backend.get_by_id(descriptor, id).await {
            Ok(Some(object)) => Ok(object),
            Ok(None) => Err(unresolved(reference)),
            Err(source) => Err(transient(reference, source)),
        }
    }

    async fn resolve_text(
        &self,
        descriptor: &ObjectDescriptor,
        reference: &Reference,
        scope: &Scope,
    ) -> Result<ResolvedObject, ResolveError> {
        let fields = self.lookup_fields(descriptor, reference.kind());
        if fields.is_empty() {
            debug!("object type has no text lookup field");
            return Err(unresolved(reference));
        }

        for field in fields {
            let mut matches = match self
                .backend
                .list_by_filter(descriptor, field, reference.raw_value(), scope)
                .await
            {
                Ok(matches) => matches,
                Err(source) => {
                    warn!(field, error = %source, "lookup request failed");
                    return Err(transient(reference, source));
                },
            };

            match matches.len() {
                0 => debug!(field, %scope, "no match"),
                1 => return Ok(matches.remove(0)),
                n => {
                    debug!(field, %scope, matches = n, "reference is ambiguous");
                    return Err(ResolveError::AmbiguousReference {
                        object_type: reference.object_type().to_string(),
                        value: reference.raw_value().to_string(),
                        candidates: matches,
                    });
                },
            }
        }

        Err(unresolved(reference))
    }

    /// Filter fields to try, in order, for a text reference of `kind`.
    fn lookup_fields<'d>(
        &self,
        descriptor: &'d ObjectDescriptor,
        kind: ReferenceKind,
    ) -> Vec<&'d str> {
        let (primary, secondary) = match kind {
            ReferenceKind::Slug => (
                descriptor.field_for(ReferenceKind::Slug),
                descriptor.field_for(ReferenceKind::Name),
            ),
            ReferenceKind::Name => (
                descriptor.field_for(ReferenceKind::Name),
                descriptor.field_for(ReferenceKind::Slug),
            ),
            ReferenceKind::NumericId | ReferenceKind::Unset => (None, None),
        };

        match (primary, secondary) {
            (Some(primary), Some(secondary)) if self.config.slug_name_fallback => {
                vec![primary, secondary]
            },
            (Some(primary), _) => vec![primary],
            (None, Some(secondary)) => vec![secondary],
            (None, None) => Vec::new(),
        }
    }
}

fn unresolved(reference: &Reference) -> ResolveError {
    ResolveError::UnresolvedReference {
        object_type: reference.object_type().to_string(),
        kind: reference.kind(),
        value: reference.raw_value().to_string(),
    }
}

fn transient(reference: &Reference, source: LookupError) -> ResolveError {
    ResolveError::TransientLookupFailure {
        object_type: reference.object_type().to_string(),
        value: reference.raw_value().to_string(),
        source,
    }
}
