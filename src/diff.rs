//! Deciding whether a configured reference and a stored one differ only in
//! representation.
//!
//! `"dc-east"`, `"DC East"` and `"1"` may all denote the same site. The
//! suppressor resolves both sides through the operation's cache and treats
//! them as equal when they land on the same ID.
//!
//! Suppression fails open: if either side cannot be resolved, the diff is
//! shown. Hiding a real change is worse than showing a spurious one.

use tracing::{debug, warn};

use crate::cache::ResolutionCache;
use crate::reference::{LookupField, Reference};
use crate::resolver::{Resolver, Scope};
use crate::types::ResolvedObject;

/// Compares reference representations by the object they resolve to.
#[derive(Debug, Clone, Copy)]
pub struct DiffSuppressor<'a> {
    resolver: &'a Resolver,
    cache: &'a ResolutionCache,
}

impl<'a> DiffSuppressor<'a> {
    /// Create a suppressor sharing `cache` with the rest of the operation.
    pub fn new(resolver: &'a Resolver, cache: &'a ResolutionCache) -> Self {
        Self { resolver, cache }
    }

    /// Whether `configured` and `state` denote the same `object_type`.
    ///
    /// Text values take the object type's default shape and no scope is
    /// applied.
    pub async fn should_suppress_diff(
        &self,
        configured: &str,
        state: &str,
        object_type: &str,
    ) -> bool {
        let declared = match self.resolver.registry().get(object_type) {
            Some(descriptor) => descriptor.default_lookup(),
            None => LookupField::Slug,
        };
        self.should_suppress(configured, state, object_type, declared, &Scope::new())
            .await
    }

    /// Whether `configured` and `state` denote the same object, with text
    /// values read as `declared` and narrowed by `scope`.
    pub async fn should_suppress(
        &self,
        configured: &str,
        state: &str,
        object_type: &str,
        declared: LookupField,
        scope: &Scope,
    ) -> bool {
        if configured == state {
            return true;
        }
        if configured.is_empty() || state.is_empty() {
            return false;
        }

        let configured = Reference::parse(configured, object_type, declared);
        let state = Reference::parse(state, object_type, declared);

        let Some(left) = self.resolve(&configured, scope).await else {
            return false;
        };
        let Some(right) = self.resolve(&state, scope).await else {
            return false;
        };

        let same = left.id == right.id;
        debug!(
            configured = %configured,
            state = %state,
            configured_id = left.id,
            state_id = right.id,
            suppressed = same,
            "compared reference representations"
        );
        same
    }

    async fn resolve(&self, reference: &Reference, scope: &Scope) -> Option<ResolvedObject> {
        let resolution = self
            .cache
            .get_or_resolve(reference, scope, || self.resolver.resolve(reference, scope))
            .await;

        match resolution {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(
                    reference = %reference,
                    error = %err,
                    "cannot compare reference, showing diff"
                );
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use std::sync::Arc;

    fn fixture() -> (Arc<MockBackend>, Resolver) {
        let backend = Arc::new(
            MockBackend::new()
                .with_object(
                    "site",
                    ResolvedObject::new(1).with_slug("dc-east").with_name("DC East"),
                )
                .with_object(
                    "site",
                    ResolvedObject::new(2).with_slug("dc-west").with_name("DC West"),
                )
                .with_object("vrf", ResolvedObject::new(8).with_name("blue"))
                .with_object(
                    "provider_account",
                    ResolvedObject::new(20).with_name("acct-1"),
                )
                .with_object(
                    "provider_account",
                    ResolvedObject::new(21).with_name("acct-1"),
                ),
        );
        let resolver = Resolver::new(backend.clone());
        (backend, resolver)
    }

    #[tokio::test]
    async fn test_exact_match_needs_no_lookup() {
        let (backend, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        assert!(suppressor.should_suppress_diff("dc-east", "dc-east", "site").await);
        assert!(suppressor.should_suppress_diff("", "", "site").await);
        assert_eq!(backend.total_lookups(), 0);
    }

    #[tokio::test]
    async fn test_empty_side_never_suppresses() {
        let (_, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        assert!(!suppressor.should_suppress_diff("", "1", "site").await);
        assert!(!suppressor.should_suppress_diff("dc-east", "", "site").await);
    }

    #[tokio::test]
    async fn test_equivalent_representations() {
        let (_, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        assert!(suppressor.should_suppress_diff("1", "dc-east", "site").await);
        assert!(suppressor.should_suppress_diff("dc-east", "1", "site").await);
        assert!(suppressor.should_suppress_diff("DC East", "dc-east", "site").await);
        assert!(suppressor.should_suppress_diff("blue", "8", "vrf").await);
    }

    #[tokio::test]
    async fn test_different_objects_are_not_suppressed() {
        let (_, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        assert!(!suppressor.should_suppress_diff("dc-west", "1", "site").await);
        assert!(!suppressor.should_suppress_diff("1", "2", "site").await);
    }

    #[tokio::test]
    async fn test_unresolvable_values_fail_open() {
        let (_, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        assert!(!suppressor.should_suppress_diff("999", "dc-east", "site").await);
        assert!(!suppressor.should_suppress_diff("dc-east", "nope", "site").await);
        assert!(!suppressor.should_suppress_diff("acct-1", "20", "provider_account").await);
        assert!(!suppressor.should_suppress_diff("x", "1", "widget").await);
    }

    #[tokio::test]
    async fn test_scope_resolves_ambiguity() {
        let backend = Arc::new(
            MockBackend::new()
                .with_scoped_object(
                    "provider_account",
                    ResolvedObject::new(20).with_name("acct-1"),
                    &[("provider_id", 1)],
                )
                .with_scoped_object(
                    "provider_account",
                    ResolvedObject::new(21).with_name("acct-1"),
                    &[("provider_id", 2)],
                ),
        );
        let resolver = Resolver::new(backend);
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        let scope = Scope::new().with_filter("provider_id", 2);
        assert!(
            suppressor
                .should_suppress("acct-1", "21", "provider_account", LookupField::Name, &scope)
                .await
        );
    }

    #[tokio::test]
    async fn test_transient_failure_fails_open() {
        let (backend, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        backend.fail_next(1);
        assert!(!suppressor.should_suppress_diff("dc-east", "1", "site").await);
        assert!(suppressor.should_suppress_diff("dc-east", "1", "site").await);
    }

    #[tokio::test]
    async fn test_lookups_are_shared_through_cache() {
        let (backend, resolver) = fixture();
        let cache = ResolutionCache::new();
        let suppressor = DiffSuppressor::new(&resolver, &cache);

        assert!(suppressor.should_suppress_diff("dc-east", "1", "site").await);
        let after_first = backend.total_lookups();
        assert!(suppressor.should_suppress_diff("dc-east", "1", "site").await);
        assert_eq!(backend.total_lookups(), after_first);
    }
}
