//! One plan or apply, as seen by the reference layer.
//!
//! An [`Operation`] owns the [`ResolutionCache`] for its lifetime, so every
//! resource handler taking part in the same plan or apply shares lookups
//! and sees one consistent view of the remote objects. Handlers call into
//! it at three points:
//!
//! - [`Operation::build_payload`] before a create or update, to turn
//!   configured references into the IDs the API expects
//! - [`Operation::normalize_state`] after the API answers, to choose what is
//!   written to state
//! - [`Operation::plan`] while diffing, to hide representation-only changes
//!
//! Text lookups for a reference are narrowed by sibling references on the
//! same resource when the object type declares a scope (a device name is
//! looked up within the device's site). Siblings are resolved first.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::cache::{Resolution, ResolutionCache};
use crate::config::json_type_name;
use crate::diff::DiffSuppressor;
use crate::error::ProviderError;
use crate::normalize::{normalize_imported, StateNormalizer};
use crate::reference::{LookupField, Reference};
use crate::resolver::{Resolver, Scope};
use crate::schema::{ReferenceAttribute, ResourceSchema};
use crate::types::{AttributeChange, PlanResult, ResolvedObject};
use crate::validation::validate_result;

/// Per-operation entry point for resource handlers.
#[derive(Debug)]
pub struct Operation {
    resolver: Arc<Resolver>,
    cache: ResolutionCache,
}

impl Operation {
    /// Start an operation with an empty cache.
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            cache: ResolutionCache::new(),
        }
    }

    /// The resolver backing this operation.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// The operation's resolution cache.
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// A normalizer reading from this operation's cache.
    pub fn normalizer(&self) -> StateNormalizer<'_> {
        StateNormalizer::new(&self.cache, self.resolver.config())
    }

    /// A diff suppressor sharing this operation's cache.
    pub fn suppressor(&self) -> DiffSuppressor<'_> {
        DiffSuppressor::new(&self.resolver, &self.cache)
    }

    /// Resolve one reference through the cache.
    pub async fn resolve(&self, reference: &Reference, scope: &Scope) -> Resolution {
        self.cache
            .get_or_resolve(reference, scope, || self.resolver.resolve(reference, scope))
            .await
    }

    /// Parse the configured value of attribute `name`.
    pub fn reference_for(
        &self,
        schema: &ResourceSchema,
        name: &str,
        config: &Value,
    ) -> Result<Reference, ProviderError> {
        let attr = schema.require(name)?;
        let raw = attribute_text(config, name)?;
        Ok(Reference::parse_optional(
            raw.as_deref(),
            &attr.object_type,
            self.lookup_field(attr),
        ))
    }

    /// Resolve attribute `name`, resolving any sibling references that
    /// scope it first.
    pub async fn resolve_attribute(
        &self,
        schema: &ResourceSchema,
        name: &str,
        config: &Value,
    ) -> Result<Option<ResolvedObject>, ProviderError> {
        let order = self.resolution_order(schema, &[name])?;
        let mut resolved = self.resolve_ordered(schema, config, &order, true).await?;
        Ok(resolved.remove(name).flatten())
    }

    /// Resolve every configured reference of a resource.
    pub async fn resolve_all(
        &self,
        schema: &ResourceSchema,
        config: &Value,
    ) -> Result<BTreeMap<String, ResolvedObject>, ProviderError> {
        let names: Vec<&str> = schema.references.keys().map(String::as_str).collect();
        let order = self.resolution_order(schema, &names)?;
        let resolved = self.resolve_ordered(schema, config, &order, true).await?;
        Ok(resolved
            .into_iter()
            .filter_map(|(name, object)| object.map(|object| (name, object)))
            .collect())
    }

    /// The API payload fragment for a create or update: each configured
    /// reference replaced by the ID it resolves to.
    ///
    /// Fails on the first reference that cannot be resolved; nothing is
    /// sent for a partially resolved resource.
    #[instrument(skip_all, fields(resource_type = %schema.resource_type))]
    pub async fn build_payload(
        &self,
        schema: &ResourceSchema,
        config: &Value,
    ) -> Result<Map<String, Value>, ProviderError> {
        check_config(schema, config)?;

        let resolved = self.resolve_all(schema, config).await?;
        let payload: Map<String, Value> = resolved
            .into_iter()
            .map(|(name, object)| (name, Value::from(object.id)))
            .collect();

        info!(references = payload.len(), lookups = self.cache.lookups(), "references resolved");
        Ok(payload)
    }

    /// The state to store for the reference attributes of a resource.
    ///
    /// `read_back` holds the object the API reports for each linked
    /// attribute. Non-reference attributes of `config` (or of
    /// `prior_state` when `config` is null) are carried through unchanged.
    pub fn normalize_state(
        &self,
        schema: &ResourceSchema,
        config: &Value,
        read_back: &BTreeMap<String, ResolvedObject>,
        prior_state: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let mut state = match (config, prior_state) {
            (Value::Object(map), _) => map.clone(),
            (Value::Null, Some(Value::Object(prior))) => prior.clone(),
            (Value::Null, _) => Map::new(),
            (other, _) => {
                return Err(ProviderError::Validation(format!(
                    "expected an object, got {}",
                    json_type_name(other)
                )))
            },
        };

        let linked: BTreeMap<String, Option<ResolvedObject>> = read_back
            .iter()
            .map(|(name, object)| (name.clone(), Some(object.clone())))
            .collect();
        let normalizer = self.normalizer();

        for (name, attr) in &schema.references {
            let Some(object) = read_back.get(name) else {
                state.insert(name.clone(), Value::Null);
                continue;
            };

            let configured = self.reference_for(schema, name, config)?;
            let prior = match prior_state {
                Some(prior) => attribute_text(prior, name)?,
                None => None,
            };

            let value = if configured.is_unset() && prior.is_none() && attr.flags.computed {
                Some(normalize_imported(object))
            } else {
                let scope = self.scope_from(schema, name, &linked);
                normalizer.normalize(&configured, &scope, object, prior.as_deref())
            };

            state.insert(name.clone(), value.map(Value::String).unwrap_or(Value::Null));
        }

        Ok(Value::Object(state))
    }

    /// Plan the reference attributes of a resource.
    ///
    /// Attributes whose configured and stored values denote the same object
    /// keep the stored value and produce no change.
    #[instrument(skip_all, fields(resource_type = %schema.resource_type))]
    pub async fn plan(
        &self,
        schema: &ResourceSchema,
        prior_state: Option<&Value>,
        config: &Value,
    ) -> Result<PlanResult, ProviderError> {
        check_config(schema, config)?;

        let mut planned = match config {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        let names: Vec<&str> = schema.references.keys().map(String::as_str).collect();
        let order = self.resolution_order(schema, &names)?;
        let resolved = self.resolve_ordered(schema, config, &order, false).await?;
        let suppressor = self.suppressor();

        let mut changes = Vec::new();
        let mut requires_replace = false;

        for (name, attr) in &schema.references {
            let configured = attribute_text(config, name)?;
            let stored = match prior_state {
                Some(prior) => attribute_text(prior, name)?,
                None => None,
            };

            match (configured, stored) {
                (None, None) => {},
                (Some(configured), None) => {
                    changes.push(AttributeChange::added(name.clone(), Value::String(configured)));
                    requires_replace |= prior_state.is_some() && attr.force_new;
                },
                (None, Some(stored)) if attr.flags.computed => {
                    planned.insert(name.clone(), Value::String(stored));
                },
                (None, Some(stored)) => {
                    changes.push(AttributeChange::removed(name.clone(), Value::String(stored)));
                    requires_replace |= attr.force_new;
                },
                (Some(configured), Some(stored)) if configured == stored => {},
                (Some(configured), Some(stored)) => {
                    let scope = self.scope_from(schema, name, &resolved);
                    let suppress = attr.diff_suppress
                        && suppressor
                            .should_suppress(
                                &configured,
                                &stored,
                                &attr.object_type,
                                self.lookup_field(attr),
                                &scope,
                            )
                            .await;

                    if suppress {
                        debug!(
                            attribute = %name,
                            %configured,
                            %stored,
                            "representation-only difference suppressed"
                        );
                        planned.insert(name.clone(), Value::String(stored));
                    } else {
                        changes.push(AttributeChange::modified(
                            name.clone(),
                            Value::String(stored),
                            Value::String(configured),
                        ));
                        requires_replace |= attr.force_new;
                    }
                },
            }
        }

        Ok(PlanResult::with_changes(
            Value::Object(planned),
            changes,
            requires_replace,
        ))
    }

    /// State for an imported resource: every linked attribute as an ID.
    pub fn import_state(
        &self,
        schema: &ResourceSchema,
        read_back: &BTreeMap<String, ResolvedObject>,
    ) -> Value {
        let state: Map<String, Value> = schema
            .references
            .keys()
            .map(|name| {
                let value = read_back
                    .get(name)
                    .map(|object| Value::String(normalize_imported(object)))
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        Value::Object(state)
    }

    fn lookup_field(&self, attr: &ReferenceAttribute) -> LookupField {
        attr.lookup
            .or_else(|| {
                self.resolver
                    .registry()
                    .get(&attr.object_type)
                    .map(|descriptor| descriptor.default_lookup())
            })
            .unwrap_or_default()
    }

    /// Sibling attributes that scope `name`, with the filter each one feeds.
    ///
    /// A sibling is used only when exactly one attribute of the resource
    /// points at the scoping object type.
    fn scope_dependencies(&self, schema: &ResourceSchema, name: &str) -> Vec<(String, String)> {
        let Some(attr) = schema.reference(name) else {
            return Vec::new();
        };
        let Some(descriptor) = self.resolver.registry().get(&attr.object_type) else {
            return Vec::new();
        };

        descriptor
            .scope
            .iter()
            .filter_map(|scope| match schema.references_to(&scope.sibling).as_slice() {
                [sibling] if *sibling != name => {
                    Some((sibling.to_string(), scope.filter.clone()))
                },
                _ => None,
            })
            .collect()
    }

    fn scope_from(
        &self,
        schema: &ResourceSchema,
        name: &str,
        resolved: &BTreeMap<String, Option<ResolvedObject>>,
    ) -> Scope {
        let mut scope = Scope::new();
        for (sibling, filter) in self.scope_dependencies(schema, name) {
            if let Some(Some(object)) = resolved.get(&sibling) {
                scope.insert(filter, object.id);
            }
        }
        scope
    }

    /// `targets` and everything they depend on, dependencies first.
    fn resolution_order(
        &self,
        schema: &ResourceSchema,
        targets: &[&str],
    ) -> Result<Vec<String>, ProviderError> {
        let mut order = Vec::new();
        let mut visiting = Vec::new();
        for target in targets {
            self.visit(schema, target, &mut visiting, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        schema: &ResourceSchema,
        name: &str,
        visiting: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), ProviderError> {
        if order.iter().any(|done| done == name) {
            return Ok(());
        }
        if visiting.iter().any(|open| open == name) {
            return Err(ProviderError::Validation(format!(
                "circular scope between reference attributes: {} -> {}",
                visiting.join(" -> "),
                name
            )));
        }
        schema.require(name)?;

        visiting.push(name.to_string());
        for (sibling, _) in self.scope_dependencies(schema, name) {
            self.visit(schema, &sibling, visiting, order)?;
        }
        visiting.pop();

        order.push(name.to_string());
        Ok(())
    }

    /// Resolve attributes in `order`. When not `strict`, failures leave the
    /// attribute unresolved instead of aborting.
    async fn resolve_ordered(
        &self,
        schema: &ResourceSchema,
        config: &Value,
        order: &[String],
        strict: bool,
    ) -> Result<BTreeMap<String, Option<ResolvedObject>>, ProviderError> {
        let mut resolved = BTreeMap::new();
        for name in order {
            let reference = self.reference_for(schema, name, config)?;
            let scope = self.scope_from(schema, name, &resolved);
            match self.resolve(&reference, &scope).await {
                Ok(object) => {
                    resolved.insert(name.clone(), object);
                },
                Err(err) if strict => return Err(ProviderError::reference(name.clone(), err)),
                Err(err) => {
                    debug!(attribute = %name, error = %err, "reference left unresolved");
                    resolved.insert(name.clone(), None);
                },
            }
        }
        Ok(resolved)
    }
}

/// The textual value of attribute `name`, or `None` when unset.
///
/// Integers are rendered in decimal so `1` and `"1"` compare equal.
pub(crate) fn attribute_text(value: &Value, name: &str) -> Result<Option<String>, ProviderError> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => n.as_u64().map(|id| Some(id.to_string())).ok_or_else(|| {
            ProviderError::Validation(format!("'{}' is not a valid ID: {}", name, n))
        }),
        Some(other) => Err(ProviderError::Validation(format!(
            "'{}' must be a string or integer, got {}",
            name,
            json_type_name(other)
        ))),
    }
}

fn check_config(schema: &ResourceSchema, config: &Value) -> Result<(), ProviderError> {
    validate_result(schema, config).map_err(|errors| {
        let message = errors
            .iter()
            .map(|d| match &d.detail {
                Some(detail) => format!("{}: {}", d.summary, detail),
                None => d.summary.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        ProviderError::Validation(message)
    })
}
