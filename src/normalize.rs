//! Choosing the representation of a reference that is written to state.
//!
//! After a create, update, or read, the API reports the linked object by
//! ID. Writing that ID back when the user configured a slug would produce a
//! permanent diff, so the normalizer keeps the authored text whenever it
//! still denotes the same object, and falls back to the ID otherwise.
//!
//! Normalization never performs a lookup. It consults only the operation's
//! [`ResolutionCache`] and the aliases carried by the resolved object.

use tracing::debug;

use crate::cache::ResolutionCache;
use crate::config::ResolverConfig;
use crate::reference::{LookupField, Reference, ReferenceKind};
use crate::resolver::Scope;
use crate::types::ResolvedObject;

/// Picks state values for reference attributes.
#[derive(Debug, Clone, Copy)]
pub struct StateNormalizer<'a> {
    cache: &'a ResolutionCache,
    config: &'a ResolverConfig,
}

impl<'a> StateNormalizer<'a> {
    /// Create a normalizer reading from `cache`.
    pub fn new(cache: &'a ResolutionCache, config: &'a ResolverConfig) -> Self {
        Self { cache, config }
    }

    /// The value to store for an attribute that links to `resolved`.
    ///
    /// - an unset attribute with no prior state stays `None`
    /// - an unset attribute with prior state is normalized from the prior value
    /// - a numeric reference stores `resolved.id`
    /// - a slug or name is kept verbatim if it still denotes `resolved`,
    ///   otherwise `resolved.id` is stored
    pub fn normalize(
        &self,
        configured: &Reference,
        scope: &Scope,
        resolved: &ResolvedObject,
        prior_state: Option<&str>,
    ) -> Option<String> {
        let authored = match (configured.kind(), prior_state) {
            (ReferenceKind::Unset, None) => return None,
            (ReferenceKind::Unset, Some("")) => return None,
            (ReferenceKind::Unset, Some(prior)) => {
                Reference::parse(prior, configured.object_type(), LookupField::Slug)
            },
            _ => configured.clone(),
        };

        match authored.kind() {
            ReferenceKind::Slug | ReferenceKind::Name => {
                if self.still_denotes(&authored, scope, resolved) {
                    debug!(reference = %authored, id = resolved.id, "keeping authored value");
                    Some(authored.raw_value().to_string())
                } else {
                    debug!(
                        reference = %authored,
                        id = resolved.id,
                        "authored value is stale, storing ID"
                    );
                    Some(resolved.id_string())
                }
            },
            ReferenceKind::NumericId | ReferenceKind::Unset => Some(resolved.id_string()),
        }
    }

    /// Whether a text reference still picks out `resolved`.
    ///
    /// A memoized lookup from this operation is authoritative. Without one,
    /// the value must equal the object's slug or name.
    fn still_denotes(
        &self,
        reference: &Reference,
        scope: &Scope,
        resolved: &ResolvedObject,
    ) -> bool {
        let other = match reference.kind() {
            ReferenceKind::Slug => ReferenceKind::Name,
            _ => ReferenceKind::Slug,
        };

        for kind in [reference.kind(), other] {
            match self.cache.peek(&reference.with_kind(kind), scope) {
                Some(Ok(Some(object))) => return object.id == resolved.id,
                Some(Ok(None)) | Some(Err(_)) => return false,
                None => continue,
            }
        }

        let raw = reference.raw_value();
        [resolved.slug.as_deref(), resolved.name.as_deref()]
            .into_iter()
            .flatten()
            .any(|alias| self.config.aliases_match(raw, alias))
    }
}

/// The value stored for an imported resource, which has no authored form.
pub fn normalize_imported(resolved: &ResolvedObject) -> String {
    resolved.id_string()
}
