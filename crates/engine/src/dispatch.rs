//! Resolver dispatch registry.
//!
//! Maps reporter capabilities to the logic that produces their report
//! content. Lookup is capability-aware: the requested key is tried first,
//! then the reporter's concrete runtime type, then every capability
//! interface the runtime type advertises. At each step a delegate-pair
//! registration takes precedence over an instance registration for the
//! same key, and re-registering a key replaces the previous entry
//! (last write wins).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use postmortem_types::{CapabilityKey, ReportError, Reporter};
use postmortem_util::block_on_future;

/// Uniform dispatch surface for registered resolvers.
///
/// Typed resolvers obtain their capability view from the reporter
/// (`as_rest_source()`, `as_db_source()`, or an `as_any()` downcast) and
/// report a dispatch miss when the view is absent.
#[async_trait]
pub trait ErasedResolver: Send + Sync {
    async fn resolve(&self, reporter: Arc<dyn Reporter>, cancel: CancellationToken) -> Result<String, ReportError>;

    fn resolve_blocking(&self, reporter: Arc<dyn Reporter>) -> Result<String, ReportError>;
}

/// Boxed async resolution function over an erased reporter.
pub type AsyncResolveFn =
    Arc<dyn Fn(Arc<dyn Reporter>, CancellationToken) -> BoxFuture<'static, Result<String, ReportError>> + Send + Sync>;

/// Boxed sync resolution function over an erased reporter.
pub type SyncResolveFn = Arc<dyn Fn(Arc<dyn Reporter>) -> Result<String, ReportError> + Send + Sync>;

#[derive(Clone)]
struct DelegatePair {
    async_fn: AsyncResolveFn,
    sync_fn: SyncResolveFn,
}

/// Build an erased delegate pair from typed resolution functions.
///
/// The reporter is downcast to `T` and cloned into the delegate; a reporter
/// of any other concrete type registered under the same key is a dispatch
/// miss.
pub fn delegates_for<T, FA, Fut, FS>(async_fn: FA, sync_fn: FS) -> (AsyncResolveFn, SyncResolveFn)
where
    T: Reporter + Clone,
    FA: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ReportError>> + Send + 'static,
    FS: Fn(T) -> Result<String, ReportError> + Send + Sync + 'static,
{
    let erased_async: AsyncResolveFn = Arc::new(
        move |reporter: Arc<dyn Reporter>, cancel: CancellationToken| -> BoxFuture<'static, Result<String, ReportError>> {
            match reporter.as_any().downcast_ref::<T>() {
                Some(typed) => Box::pin(async_fn(typed.clone(), cancel)),
                None => {
                    let type_name = reporter.type_name();
                    Box::pin(async move { Err(ReportError::no_resolver(type_name)) })
                }
            }
        },
    );

    let erased_sync: SyncResolveFn = Arc::new(move |reporter: Arc<dyn Reporter>| match reporter.as_any().downcast_ref::<T>() {
        Some(typed) => sync_fn(typed.clone()),
        None => Err(ReportError::no_resolver(reporter.type_name())),
    });

    (erased_async, erased_sync)
}

/// Capability-keyed resolver registry.
///
/// Registration and resolution are safe under concurrent callers; each
/// registration replaces the whole entry for its key under the write lock,
/// so resolvers never observe a partially-updated registration.
#[derive(Default)]
pub struct ResolverRegistry {
    instances: RwLock<HashMap<CapabilityKey, Arc<dyn ErasedResolver>>>,
    delegates: RwLock<HashMap<CapabilityKey, DelegatePair>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver instance for a capability key. The most recent
    /// registration for a key wins.
    pub fn register_resolver(&self, key: CapabilityKey, resolver: Arc<dyn ErasedResolver>) {
        debug!(capability = %key, "resolver registered");
        self.instances.write().expect("resolver registry lock").insert(key, resolver);
    }

    /// Register a resolver instance keyed by a concrete reporter type.
    pub fn register_resolver_for<T: Reporter>(&self, resolver: Arc<dyn ErasedResolver>) {
        self.register_resolver(CapabilityKey::of::<T>(), resolver);
    }

    /// Register an async/sync delegate pair for a capability key. Delegates
    /// take precedence over instance registrations for the same key.
    pub fn register_delegates(&self, key: CapabilityKey, async_fn: AsyncResolveFn, sync_fn: SyncResolveFn) {
        debug!(capability = %key, "delegate resolvers registered");
        self.delegates
            .write()
            .expect("resolver registry lock")
            .insert(key, DelegatePair { async_fn, sync_fn });
    }

    /// Register typed delegate functions keyed by a concrete reporter type.
    pub fn register_delegates_for<T, FA, Fut, FS>(&self, async_fn: FA, sync_fn: FS)
    where
        T: Reporter + Clone,
        FA: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ReportError>> + Send + 'static,
        FS: Fn(T) -> Result<String, ReportError> + Send + Sync + 'static,
    {
        let (erased_async, erased_sync) = delegates_for::<T, _, _, _>(async_fn, sync_fn);
        self.register_delegates(CapabilityKey::of::<T>(), erased_async, erased_sync);
    }

    /// Whether an exact registration exists for a capability key.
    pub fn can_resolve(&self, key: CapabilityKey) -> bool {
        self.delegates.read().expect("resolver registry lock").contains_key(&key)
            || self.instances.read().expect("resolver registry lock").contains_key(&key)
    }

    /// Whether the full three-tier lookup would find a resolver for this
    /// reporter, without executing anything.
    pub fn can_resolve_reporter(&self, reporter: &dyn Reporter) -> bool {
        self.lookup_order(reporter.type_key(), reporter).into_iter().any(|key| self.can_resolve(key))
    }

    /// Resolve with the reporter's concrete type as the requested
    /// capability.
    pub async fn resolve_async(&self, reporter: Arc<dyn Reporter>, cancel: &CancellationToken) -> Result<String, ReportError> {
        self.resolve_async_as(reporter.type_key(), reporter, cancel).await
    }

    /// Resolve for an explicitly requested capability, e.g.
    /// `CapabilityKey::of::<dyn RestSource>()`.
    pub async fn resolve_async_as(
        &self,
        requested: CapabilityKey,
        reporter: Arc<dyn Reporter>,
        cancel: &CancellationToken,
    ) -> Result<String, ReportError> {
        for key in self.lookup_order(requested, reporter.as_ref()) {
            if let Some(pair) = self.delegate_for(key) {
                debug!(capability = %key, reporter = reporter.type_name(), "resolving via delegate");
                return (pair.async_fn)(reporter, cancel.clone()).await;
            }
            if let Some(resolver) = self.instance_for(key) {
                debug!(capability = %key, reporter = reporter.type_name(), "resolving via instance");
                return resolver.resolve(reporter, cancel.clone()).await;
            }
        }
        Err(ReportError::no_resolver(reporter.type_name()))
    }

    /// Synchronous counterpart of [`Self::resolve_async`].
    pub fn resolve_sync(&self, reporter: Arc<dyn Reporter>) -> Result<String, ReportError> {
        self.resolve_sync_as(reporter.type_key(), reporter)
    }

    pub fn resolve_sync_as(&self, requested: CapabilityKey, reporter: Arc<dyn Reporter>) -> Result<String, ReportError> {
        for key in self.lookup_order(requested, reporter.as_ref()) {
            if let Some(pair) = self.delegate_for(key) {
                return (pair.sync_fn)(reporter);
            }
            if let Some(resolver) = self.instance_for(key) {
                return resolver.resolve_blocking(reporter);
            }
        }
        Err(ReportError::no_resolver(reporter.type_name()))
    }

    /// Lookup order: requested capability, runtime type, then the
    /// capability interfaces the runtime type advertises, deduplicated.
    fn lookup_order(&self, requested: CapabilityKey, reporter: &dyn Reporter) -> Vec<CapabilityKey> {
        let mut keys = vec![requested];
        let runtime = reporter.type_key();
        if runtime != requested {
            keys.push(runtime);
        }
        for key in reporter.capability_keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn delegate_for(&self, key: CapabilityKey) -> Option<DelegatePair> {
        self.delegates.read().expect("resolver registry lock").get(&key).cloned()
    }

    fn instance_for(&self, key: CapabilityKey) -> Option<Arc<dyn ErasedResolver>> {
        self.instances.read().expect("resolver registry lock").get(&key).cloned()
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let instance_count = self.instances.read().expect("resolver registry lock").len();
        let delegate_count = self.delegates.read().expect("resolver registry lock").len();
        f.debug_struct("ResolverRegistry")
            .field("instances", &instance_count)
            .field("delegates", &delegate_count)
            .finish()
    }
}
