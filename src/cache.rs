//! Per-operation memoization of reference lookups with single-flight
//! coalescing.
//!
//! A [`ResolutionCache`] is created for one plan or apply and dropped when
//! it finishes. Within that window:
//!
//! - the first caller for a key runs the lookup; concurrent callers for the
//!   same key wait for that one lookup instead of issuing their own
//! - every waiter receives the leader's exact outcome, success or failure
//! - definitive answers (found, not found, ambiguous) are memoized, so one
//!   key gives one answer for the whole operation
//! - transient failures are never memoized; the next caller looks up again
//!
//! If the leading caller is cancelled mid-lookup, its pending entry is
//! withdrawn and one of the waiters takes over.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::trace;

use crate::error::ResolveError;
use crate::reference::{Reference, ReferenceKind};
use crate::resolver::Scope;
use crate::types::ResolvedObject;

/// The outcome of one lookup as seen by every caller sharing it.
pub type Resolution = Result<Option<ResolvedObject>, ResolveError>;

/// Identifies one lookup: what was asked for, how, and under which scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    object_type: String,
    kind: ReferenceKind,
    raw_value: String,
    scope: Scope,
}

impl CacheKey {
    /// The key for `reference` under `scope`.
    ///
    /// Scope only narrows text lookups, so it is dropped for IDs.
    pub fn new(reference: &Reference, scope: &Scope) -> Self {
        let scope = match reference.kind() {
            ReferenceKind::Slug | ReferenceKind::Name => scope.clone(),
            ReferenceKind::NumericId | ReferenceKind::Unset => Scope::new(),
        };
        Self {
            object_type: reference.object_type().to_string(),
            kind: reference.kind(),
            raw_value: reference.raw_value().to_string(),
            scope,
        }
    }
}

enum Slot {
    Ready(Resolution),
    Pending(watch::Receiver<Option<Resolution>>),
}

enum Claim<'a> {
    Hit(Resolution),
    Wait(watch::Receiver<Option<Resolution>>),
    Lead(InFlight<'a>),
}

/// Memoized lookups for one operation.
#[derive(Default)]
pub struct ResolutionCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    lookups: AtomicUsize,
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("entries", &self.len())
            .field("lookups", &self.lookups())
            .finish()
    }
}

impl ResolutionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized outcome for `reference`, or run `resolve` to
    /// produce it.
    ///
    /// At most one `resolve` runs per key at a time.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        reference: &Reference,
        scope: &Scope,
        resolve: F,
    ) -> Resolution
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Resolution>,
    {
        let key = CacheKey::new(reference, scope);

        let flight = loop {
            match self.claim(&key) {
                Claim::Hit(resolution) => {
                    trace!(%reference, "cache hit");
                    return resolution;
                },
                Claim::Wait(rx) => {
                    trace!(%reference, "waiting on in-flight lookup");
                    if let Some(resolution) = wait(rx).await {
                        return resolution;
                    }
                },
                Claim::Lead(flight) => break flight,
            }
        };

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let resolution = resolve().await;
        flight.complete(resolution.clone());
        resolution
    }

    /// The memoized outcome for `reference`, if one is ready.
    ///
    /// Never triggers a lookup and never waits.
    pub fn peek(&self, reference: &Reference, scope: &Scope) -> Option<Resolution> {
        match self.lock().get(&CacheKey::new(reference, scope)) {
            Some(Slot::Ready(resolution)) => Some(resolution.clone()),
            Some(Slot::Pending(_)) | None => None,
        }
    }

    /// Number of lookups actually run (cache misses).
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of memoized or in-flight entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing has been looked up.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn claim(&self, key: &CacheKey) -> Claim<'_> {
        let mut slots = self.lock();
        match slots.get(key) {
            Some(Slot::Ready(resolution)) => Claim::Hit(resolution.clone()),
            Some(Slot::Pending(rx)) => Claim::Wait(rx.clone()),
            None => {
                let (tx, rx) = watch::channel(None);
                slots.insert(key.clone(), Slot::Pending(rx));
                Claim::Lead(InFlight {
                    cache: self,
                    key: Some(key.clone()),
                    tx,
                })
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wait for the leader's outcome. `None` means the leader went away.
async fn wait(mut rx: watch::Receiver<Option<Resolution>>) -> Option<Resolution> {
    rx.wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|published| (*published).clone())
}

/// The leader's claim on a key. Dropping it unfinished withdraws the claim.
struct InFlight<'a> {
    cache: &'a ResolutionCache,
    key: Option<CacheKey>,
    tx: watch::Sender<Option<Resolution>>,
}

impl InFlight<'_> {
    fn complete(mut self, resolution: Resolution) {
        if let Some(key) = self.key.take() {
            let mut slots = self.cache.lock();
            match &resolution {
                Err(err) if err.is_retryable() => {
                    slots.remove(&key);
                },
                _ => {
                    slots.insert(key, Slot::Ready(resolution.clone()));
                },
            }
        }
        self.tx.send_replace(Some(resolution));
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            trace!("in-flight lookup abandoned");
            self.cache.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::reference::LookupField;
    use std::sync::Arc;
    use std::time::Duration;

    fn site(value: &str) -> Reference {
        Reference::parse(value, "site", LookupField::Slug)
    }

    fn transient() -> ResolveError {
        ResolveError::TransientLookupFailure {
            object_type: "site".to_string(),
            value: "dc-east".to_string(),
            source: LookupError::Unavailable("503".to_string()),
        }
    }

    #[tokio::test]
    async fn test_memoizes_success() {
        let cache = ResolutionCache::new();
        let reference = site("dc-east");

        let first = cache
            .get_or_resolve(&reference, &Scope::new(), || async {
                Ok(Some(ResolvedObject::new(1)))
            })
            .await;
        let second = cache
            .get_or_resolve(&reference, &Scope::new(), || async {
                Ok(Some(ResolvedObject::new(2)))
            })
            .await;

        assert_eq!(first, second);
        assert_eq!(cache.lookups(), 1);
        assert_eq!(cache.peek(&reference, &Scope::new()), Some(first));
    }

    #[tokio::test]
    async fn test_memoizes_not_found() {
        let cache = ResolutionCache::new();
        let reference = site("ghost");
        let not_found = ResolveError::UnresolvedReference {
            object_type: "site".to_string(),
            kind: ReferenceKind::Slug,
            value: "ghost".to_string(),
        };

        let expected = not_found.clone();
        let first = cache
            .get_or_resolve(&reference, &Scope::new(), || async move { Err(expected) })
            .await;
        let second = cache
            .get_or_resolve(&reference, &Scope::new(), || async {
                Ok(Some(ResolvedObject::new(1)))
            })
            .await;

        assert_eq!(first, Err(not_found.clone()));
        assert_eq!(second, Err(not_found));
        assert_eq!(cache.lookups(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_not_memoized() {
        let cache = ResolutionCache::new();
        let reference = site("dc-east");

        let first = cache
            .get_or_resolve(&reference, &Scope::new(), || async { Err(transient()) })
            .await;
        assert!(first.unwrap_err().is_retryable());
        assert!(cache.peek(&reference, &Scope::new()).is_none());

        let second = cache
            .get_or_resolve(&reference, &Scope::new(), || async {
                Ok(Some(ResolvedObject::new(1)))
            })
            .await;
        assert_eq!(second, Ok(Some(ResolvedObject::new(1))));
        assert_eq!(cache.lookups(), 2);
    }

    #[tokio::test]
    async fn test_keys_include_type_and_scope() {
        let cache = ResolutionCache::new();
        let tenant = Reference::parse("shared", "tenant", LookupField::Slug);
        let site = site("shared");
        let scoped = Scope::new().with_filter("site_id", 1);

        cache
            .get_or_resolve(&tenant, &Scope::new(), || async { Ok(Some(ResolvedObject::new(3))) })
            .await
            .unwrap();
        cache
            .get_or_resolve(&site, &Scope::new(), || async { Ok(Some(ResolvedObject::new(9))) })
            .await
            .unwrap();
        cache
            .get_or_resolve(&site, &scoped, || async { Ok(Some(ResolvedObject::new(10))) })
            .await
            .unwrap();

        assert_eq!(cache.lookups(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_scope_is_ignored_for_ids() {
        let scope = Scope::new().with_filter("site_id", 1);
        let id = Reference::from_id(4, "device");
        assert_eq!(CacheKey::new(&id, &scope), CacheKey::new(&id, &Scope::new()));

        let name = Reference::parse("device-4", "device", LookupField::Name);
        assert_ne!(CacheKey::new(&name, &scope), CacheKey::new(&name, &Scope::new()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_lookup() {
        let cache = Arc::new(ResolutionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(&site("dc-east"), &Scope::new(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some(ResolvedObject::new(1).with_slug("dc-east")))
                    })
                    .await
            }));
        }

        for handle in handles {
            let resolved = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(resolved.id, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lookups(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_receive_leader_failure() {
        let cache = Arc::new(ResolutionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(&site("dc-east"), &Scope::new(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err(transient())
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err, transient());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_leader_hands_over() {
        let cache = Arc::new(ResolutionCache::new());

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_resolve(&site("dc-east"), &Scope::new(), || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(Some(ResolvedObject::new(1)))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.len(), 1);

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_resolve(&site("dc-east"), &Scope::new(), || async {
                        Ok(Some(ResolvedObject::new(2)))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        let resolved = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(resolved.id, 2);
        assert_eq!(cache.lookups(), 2);
    }
}
