//! Testing utilities for resource handlers that use references.
//!
//! [`MockBackend`] stands in for the NetBox API with in-memory tables and
//! lookup counters. [`ReferenceTester`] drives a resource schema through
//! apply, refresh, and plan the way Terraform does, each step with a fresh
//! [`Operation`], so drift shows up as a non-empty plan.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use netbox_provider_refs::schema::{ReferenceAttribute, ResourceSchema};
//! use netbox_provider_refs::testing::{assert_plan_no_changes, MockBackend, ReferenceTester};
//! use netbox_provider_refs::{ResolvedObject, Resolver};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let backend = MockBackend::new()
//!     .with_object("site", ResolvedObject::new(1).with_slug("dc-east").with_name("DC East"));
//! let schema = ResourceSchema::new("netbox_rack")
//!     .with_reference("site", ReferenceAttribute::required("site"));
//! let tester = ReferenceTester::new(Arc::new(Resolver::new(backend)), schema);
//!
//! let (state, plan) = tester.apply_then_plan(&json!({"site": "dc-east"})).await.unwrap();
//! assert_eq!(state["site"], "dc-east");
//! assert_plan_no_changes(&plan);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{LookupError, ProviderError};
use crate::operation::Operation;
use crate::reference::Reference;
use crate::registry::ObjectDescriptor;
use crate::resolver::{LookupBackend, Resolver, Scope};
use crate::schema::{Diagnostic, DiagnosticSeverity, ResourceSchema};
use crate::types::{PlanResult, ResolvedObject};
use crate::validation;

#[derive(Debug, Clone)]
struct MockRecord {
    object: ResolvedObject,
    scope: BTreeMap<String, u64>,
}

/// An in-memory [`LookupBackend`].
///
/// Objects are stored per object type in insertion order. Filter lookups
/// match the descriptor's slug or name field exactly (or ignoring ASCII
/// case when enabled) and require every scope filter to match the
/// object's scope attributes.
#[derive(Debug, Default)]
pub struct MockBackend {
    records: Mutex<HashMap<String, Vec<MockRecord>>>,
    id_lookups: AtomicUsize,
    filter_lookups: AtomicUsize,
    failures: AtomicUsize,
    latency: Option<Duration>,
    case_insensitive: bool,
}

impl MockBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unscoped object.
    pub fn with_object(self, object_type: &str, object: ResolvedObject) -> Self {
        self.insert(object_type, object);
        self
    }

    /// Add an object with scope attributes (e.g. `[("site_id", 1)]`).
    pub fn with_scoped_object(
        self,
        object_type: &str,
        object: ResolvedObject,
        scope: &[(&str, u64)],
    ) -> Self {
        self.insert_scoped(object_type, object, scope);
        self
    }

    /// Delay every lookup by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Match filter values ignoring ASCII case.
    pub fn with_case_insensitive_filters(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Add an unscoped object.
    pub fn insert(&self, object_type: &str, object: ResolvedObject) {
        self.insert_scoped(object_type, object, &[]);
    }

    /// Add an object with scope attributes.
    pub fn insert_scoped(&self, object_type: &str, object: ResolvedObject, scope: &[(&str, u64)]) {
        let record = MockRecord {
            object,
            scope: scope.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };
        self.lock()
            .entry(object_type.to_string())
            .or_default()
            .push(record);
    }

    /// Replace the object with the same ID, keeping its scope attributes.
    ///
    /// Returns false if no such object exists.
    pub fn update(&self, object_type: &str, object: ResolvedObject) -> bool {
        let mut records = self.lock();
        let Some(record) = records
            .get_mut(object_type)
            .and_then(|list| list.iter_mut().find(|r| r.object.id == object.id))
        else {
            return false;
        };
        record.object = object;
        true
    }

    /// Delete an object. Returns false if no such object exists.
    pub fn remove(&self, object_type: &str, id: u64) -> bool {
        let mut records = self.lock();
        let Some(list) = records.get_mut(object_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.object.id != id);
        list.len() != before
    }

    /// Make the next `n` lookups fail with [`LookupError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of `get_by_id` calls.
    pub fn id_lookups(&self) -> usize {
        self.id_lookups.load(Ordering::SeqCst)
    }

    /// Number of `list_by_filter` calls.
    pub fn filter_lookups(&self) -> usize {
        self.filter_lookups.load(Ordering::SeqCst)
    }

    /// Number of backend calls of either kind.
    pub fn total_lookups(&self) -> usize {
        self.id_lookups() + self.filter_lookups()
    }

    /// Reset the lookup counters.
    pub fn reset_counters(&self) {
        self.id_lookups.store(0, Ordering::SeqCst);
        self.filter_lookups.store(0, Ordering::SeqCst);
    }

    async fn simulate_call(&self) -> Result<(), LookupError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LookupError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn matches(&self, candidate: Option<&str>, value: &str) -> bool {
        match candidate {
            Some(candidate) if self.case_insensitive => candidate.eq_ignore_ascii_case(value),
            Some(candidate) => candidate == value,
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<MockRecord>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LookupBackend for MockBackend {
    async fn get_by_id(
        &self,
        object: &ObjectDescriptor,
        id: u64,
    ) -> Result<Option<ResolvedObject>, LookupError> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await?;

        Ok(self.lock().get(&object.object_type).and_then(|list| {
            list.iter()
                .find(|r| r.object.id == id)
                .map(|r| r.object.clone())
        }))
    }

    async fn list_by_filter(
        &self,
        object: &ObjectDescriptor,
        field: &str,
        value: &str,
        scope: &Scope,
    ) -> Result<Vec<ResolvedObject>, LookupError> {
        self.filter_lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await?;

        let records = self.lock();
        let Some(list) = records.get(&object.object_type) else {
            return Ok(Vec::new());
        };

        let matched = list
            .iter()
            .filter(|r| {
                let candidate = if object.slug_field.as_deref() == Some(field) {
                    r.object.slug.as_deref()
                } else if object.name_field.as_deref() == Some(field) {
                    r.object.name.as_deref()
                } else {
                    None
                };
                self.matches(candidate, value)
            })
            .filter(|r| scope.iter().all(|(filter, id)| r.scope.get(filter) == Some(&id)))
            .map(|r| r.object.clone())
            .collect();
        Ok(matched)
    }
}

/// Drives one resource schema through apply, refresh, and plan.
///
/// Every step runs in its own [`Operation`], matching how Terraform runs
/// apply and the following plan as separate invocations.
pub struct ReferenceTester {
    resolver: Arc<Resolver>,
    schema: ResourceSchema,
}

impl ReferenceTester {
    /// Create a tester for `schema`.
    pub fn new(resolver: Arc<Resolver>, schema: ResourceSchema) -> Self {
        Self { resolver, schema }
    }

    /// The schema under test.
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// A fresh operation.
    pub fn operation(&self) -> Operation {
        Operation::new(self.resolver.clone())
    }

    /// Validate a configuration.
    ///
    /// Returns `Err` with the diagnostics if there are errors.
    pub fn validate(&self, config: &Value) -> Result<(), TestError> {
        check_diagnostics(validation::validate(&self.schema, config))
    }

    /// Create or update: resolve the payload, read the linked objects
    /// back by ID, and normalize the result into state.
    pub async fn apply(
        &self,
        config: &Value,
        prior_state: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let op = self.operation();
        let payload = op.build_payload(&self.schema, config).await?;
        let read_back = self.read_back(&op, &payload).await?;
        op.normalize_state(&self.schema, config, &read_back, prior_state)
    }

    /// Refresh: read the linked objects for `state` and normalize without
    /// a configuration.
    pub async fn refresh(&self, state: &Value) -> Result<Value, ProviderError> {
        let op = self.operation();
        let linked = op.resolve_all(&self.schema, state).await?;
        let ids: Map<String, Value> = linked
            .into_iter()
            .map(|(name, object)| (name, Value::from(object.id)))
            .collect();

        let read_back = self.read_back(&op, &ids).await?;
        op.normalize_state(&self.schema, &Value::Null, &read_back, Some(state))
    }

    /// Plan `config` against `state`.
    pub async fn plan(&self, state: &Value, config: &Value) -> Result<PlanResult, ProviderError> {
        self.operation().plan(&self.schema, Some(state), config).await
    }

    /// Apply `config`, refresh, then plan it again.
    ///
    /// Returns the refreshed state and the follow-up plan, which should be
    /// empty.
    pub async fn apply_then_plan(
        &self,
        config: &Value,
    ) -> Result<(Value, PlanResult), ProviderError> {
        let applied = self.apply(config, None).await?;
        let state = self.refresh(&applied).await?;
        let plan = self.plan(&state, config).await?;
        Ok((state, plan))
    }

    async fn read_back(
        &self,
        op: &Operation,
        ids: &Map<String, Value>,
    ) -> Result<BTreeMap<String, ResolvedObject>, ProviderError> {
        let mut read_back = BTreeMap::new();
        for (name, id) in ids {
            let attr = self.schema.require(name)?;
            let id = id.as_u64().ok_or_else(|| {
                ProviderError::Validation(format!("'{}' read back a non-numeric ID: {}", name, id))
            })?;
            let reference = Reference::from_id(id, &attr.object_type);
            if let Some(object) = op
                .resolve(&reference, &Scope::new())
                .await
                .map_err(|e| ProviderError::reference(name.clone(), e))?
            {
                read_back.insert(name.clone(), object);
            }
        }
        Ok(read_back)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes
            .iter()
            .map(|c| format!("{}: {:?} -> {:?}", c.path, c.before, c.after))
            .collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changed_paths()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
