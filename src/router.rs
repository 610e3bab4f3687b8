//! The connection router: a registry of per-(tenant, role) providers.
//!
//! One router instance owns every [`ConnectionProvider`] in the process.
//! Lookups create providers lazily, exactly once per key, and cache them
//! until [`ConnectionRouter::clear_all`] drops them for re-initialization
//! (after a failover, say) or [`ConnectionRouter::close`] stops them at
//! shutdown. Both of those, together with
//! [`ConnectionRouter::add_migrated_tenant`], are meant to be reachable from
//! an administrative surface so operators can trigger them out-of-band.
//!
//! # Migration fallback
//!
//! The router supports incremental migration of tenants out of a shared
//! database: once the migrated-tenant set is non-empty, a request for any
//! tenant *not* in the set is redirected to the default tenant's pool and
//! logged as a warning. Note the flip side: as soon as one tenant is marked
//! migrated, every other tenant must be registered too (via the
//! `MIGRATED_TENANTS` environment variable or
//! [`ConnectionRouter::add_migrated_tenant`]) or its traffic silently lands
//! on the shared default store. That fail-toward-known-good behavior is
//! intentional.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::context::TenantId;
use crate::credentials::{EnvSource, StdEnvSource};
use crate::error::{RouterError, RouterResult, ShutdownFailure};
use crate::provider::{ConnectionLease, ConnectionProvider, ProviderFactory};
use crate::resolver::TenantIdentifierResolver;
use crate::role::{self, DatabaseRole};

/// Environment variable seeding the migrated-tenant set: a comma-separated
/// list of tenant identifiers, read once on first policy evaluation.
pub const MIGRATED_TENANTS_VAR: &str = "MIGRATED_TENANTS";

/// Registry key: one provider per (tenant, role).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    tenant: TenantId,
    role: DatabaseRole,
}

enum SlotState<P> {
    Empty,
    Ready(Arc<P>),
    Failed(String),
}

/// One registry entry. The per-slot mutex serializes construction for a
/// single key without blocking lookups of unrelated keys.
struct Slot<P> {
    state: Mutex<SlotState<P>>,
}

impl<P> Slot<P> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
        }
    }
}

/// Routes data-access calls to the connection provider for the effective
/// (tenant, role) pair, creating providers lazily through a
/// [`ProviderFactory`].
pub struct ConnectionRouter<F: ProviderFactory> {
    factory: F,
    resolver: TenantIdentifierResolver,
    providers: RwLock<HashMap<ProviderKey, Arc<Slot<F::Provider>>>>,
    migrated: Mutex<HashMap<TenantId, bool>>,
    env_seeded: AtomicBool,
    env: Box<dyn EnvSource>,
    read_only_probe: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl<F: ProviderFactory> ConnectionRouter<F> {
    /// Create a router with an empty migrated-tenant set and the standard
    /// environment.
    pub fn new(resolver: TenantIdentifierResolver, factory: F) -> Self {
        Self::builder(resolver, factory).build()
    }

    /// Create a builder for configuring the router.
    pub fn builder(resolver: TenantIdentifierResolver, factory: F) -> RouterBuilder<F> {
        RouterBuilder {
            resolver,
            factory,
            migrated: HashMap::new(),
            env: Box::new(StdEnvSource),
            read_only_probe: None,
        }
    }

    /// The resolver this router consults for the current tenant.
    pub fn resolver(&self) -> &TenantIdentifierResolver {
        &self.resolver
    }

    /// Resolve the current tenant and return its provider, with the
    /// migration fallback applied.
    pub fn any_connection_provider(&self) -> RouterResult<Arc<F::Provider>> {
        let tenant = self.resolver.resolve();
        trace!(tenant = %tenant, "selecting provider for resolved tenant");
        self.select_connection_provider(&tenant)
    }

    /// Apply the migration fallback to `tenant`, then return the provider
    /// for the effective tenant and the current role.
    pub fn select_connection_provider(&self, tenant: &TenantId) -> RouterResult<Arc<F::Provider>> {
        let effective = self.effective_tenant(tenant);
        trace!(tenant = %effective, "selecting specific connection provider");
        self.connection_provider(&effective)
    }

    /// Return the provider for `tenant` and the current role, creating it
    /// on first access.
    ///
    /// The role is [`DatabaseRole::Reader`] when the calling thread's role
    /// says so or when the injected read-only probe reports a read-only unit
    /// of work; [`DatabaseRole::Writer`] otherwise.
    pub fn connection_provider(&self, tenant: &TenantId) -> RouterResult<Arc<F::Provider>> {
        let role = self.current_role();
        trace!(tenant = %tenant, role = %role, "fetching connection provider");
        self.provider_for(tenant, role)
    }

    /// Acquire a connection for the resolved tenant, released on drop.
    pub fn acquire(&self) -> RouterResult<ConnectionLease<F::Provider>> {
        ConnectionLease::acquire(self.any_connection_provider()?)
    }

    /// Acquire a connection for a specific tenant, released on drop.
    pub fn acquire_for(&self, tenant: &TenantId) -> RouterResult<ConnectionLease<F::Provider>> {
        ConnectionLease::acquire(self.select_connection_provider(tenant)?)
    }

    /// Mark a tenant as migrated to its own database/schema.
    ///
    /// Idempotent upsert; returns whether the tenant was already marked.
    pub fn add_migrated_tenant(&self, tenant: impl Into<TenantId>) -> bool {
        let tenant = tenant.into();
        self.with_migrated(|migrated| {
            migrated.insert(tenant.clone(), true).unwrap_or(false)
        })
    }

    /// Stop every cached provider and empty the registry, forcing
    /// re-initialization on next access.
    ///
    /// Stopping is best-effort broadcast: every provider is asked to stop
    /// even if earlier ones fail, and the failures come back aggregated in
    /// [`RouterError::Shutdown`].
    pub fn clear_all(&self) -> RouterResult<()> {
        let drained: Vec<(ProviderKey, Arc<Slot<F::Provider>>)> =
            self.providers.write().drain().collect();
        debug!(providers = drained.len(), "clearing all connection providers");
        Self::stop_slots(drained)
    }

    /// Stop every cached provider without clearing the registry. Used at
    /// process shutdown.
    pub fn close(&self) -> RouterResult<()> {
        let snapshot: Vec<(ProviderKey, Arc<Slot<F::Provider>>)> = self
            .providers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        debug!(providers = snapshot.len(), "closing all connection providers");
        Self::stop_slots(snapshot)
    }

    /// Number of provider entries currently cached.
    pub fn cached_providers(&self) -> usize {
        self.providers.read().len()
    }

    fn current_role(&self) -> DatabaseRole {
        if role::current_role() == DatabaseRole::Reader
            || self.read_only_probe.as_ref().is_some_and(|probe| probe())
        {
            DatabaseRole::Reader
        } else {
            DatabaseRole::Writer
        }
    }

    /// Redirect a not-yet-migrated tenant to the default tenant.
    ///
    /// The requested tenant is used as-is when it is the default tenant,
    /// when no tenant has been marked migrated yet, or when it is marked
    /// migrated itself.
    fn effective_tenant(&self, requested: &TenantId) -> TenantId {
        if requested != self.resolver.default_tenant() {
            let unmigrated = self.with_migrated(|migrated| {
                !migrated.is_empty() && !migrated.get(requested).copied().unwrap_or(false)
            });
            if unmigrated {
                warn!(
                    tenant = %requested,
                    "schema/database for tenant does not exist yet; routing to default tenant \
                     {}. Migrate the tenant and call add_migrated_tenant to signal completion",
                    self.resolver.default_tenant()
                );
                return self.resolver.default_tenant().clone();
            }
        }
        requested.clone()
    }

    /// Run `f` against the migrated-tenant set, seeding it from the
    /// environment exactly once beforehand.
    fn with_migrated<R>(&self, f: impl FnOnce(&mut HashMap<TenantId, bool>) -> R) -> R {
        let mut migrated = self.migrated.lock();
        if !self.env_seeded.swap(true, Ordering::AcqRel) {
            if let Some(csv) = self.env.get(MIGRATED_TENANTS_VAR) {
                for tenant in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    migrated.insert(TenantId::new(tenant), true);
                }
            }
        }
        f(&mut migrated)
    }

    /// Get or create the provider for one registry key.
    ///
    /// Construction runs under the key's own slot mutex, never under the
    /// registry lock, so concurrent first-access for the same key observes
    /// exactly one construction while unrelated keys proceed. A failed
    /// construction leaves `Failed` in the (removed) slot so waiters get the
    /// error, and the next fresh lookup retries.
    fn provider_for(&self, tenant: &TenantId, role: DatabaseRole) -> RouterResult<Arc<F::Provider>> {
        let key = ProviderKey {
            tenant: tenant.clone(),
            role,
        };

        let slot = {
            let providers = self.providers.read();
            match providers.get(&key) {
                Some(slot) => slot.clone(),
                None => {
                    drop(providers);
                    self.providers
                        .write()
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(Slot::new()))
                        .clone()
                }
            }
        };

        let mut state = slot.state.lock();
        match &*state {
            SlotState::Ready(provider) => Ok(provider.clone()),
            SlotState::Failed(message) => Err(RouterError::configuration(
                key.tenant.clone(),
                message.clone(),
            )),
            SlotState::Empty => {
                debug!(tenant = %key.tenant, role = %role, "creating connection provider");
                let created = match role {
                    DatabaseRole::Writer => self.factory.create_writer(&key.tenant),
                    DatabaseRole::Reader => self.factory.create_reader(&key.tenant),
                };
                match created {
                    Ok(provider) => {
                        let provider = Arc::new(provider);
                        *state = SlotState::Ready(provider.clone());
                        Ok(provider)
                    }
                    Err(err) => {
                        *state = SlotState::Failed(err.to_string());
                        drop(state);
                        // Uncache the key so the next access retries; only
                        // remove our own slot in case a clear_all already
                        // replaced it.
                        let mut providers = self.providers.write();
                        if providers
                            .get(&key)
                            .is_some_and(|cached| Arc::ptr_eq(cached, &slot))
                        {
                            providers.remove(&key);
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    fn stop_slots(slots: Vec<(ProviderKey, Arc<Slot<F::Provider>>)>) -> RouterResult<()> {
        let mut failures = Vec::new();
        for (key, slot) in slots {
            let provider = match &*slot.state.lock() {
                SlotState::Ready(provider) => provider.clone(),
                SlotState::Empty | SlotState::Failed(_) => continue,
            };
            if let Err(err) = provider.stop() {
                warn!(tenant = %key.tenant, role = %key.role, error = %err, "provider failed to stop");
                failures.push(ShutdownFailure {
                    tenant: key.tenant,
                    role: key.role,
                    message: err.to_string(),
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RouterError::Shutdown { failures })
        }
    }
}

impl<F: ProviderFactory> std::fmt::Debug for ConnectionRouter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRouter")
            .field("resolver", &self.resolver)
            .field("cached_providers", &self.cached_providers())
            .finish()
    }
}

/// Builder for a [`ConnectionRouter`].
pub struct RouterBuilder<F: ProviderFactory> {
    resolver: TenantIdentifierResolver,
    factory: F,
    migrated: HashMap<TenantId, bool>,
    env: Box<dyn EnvSource>,
    read_only_probe: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl<F: ProviderFactory> RouterBuilder<F> {
    /// Pre-seed one migrated tenant.
    pub fn migrated_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.migrated.insert(tenant.into(), true);
        self
    }

    /// Pre-seed the migrated-tenant set.
    pub fn migrated_tenants<I, T>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TenantId>,
    {
        for tenant in tenants {
            self.migrated.insert(tenant.into(), true);
        }
        self
    }

    /// Replace the environment source used to seed the migrated-tenant set.
    pub fn env_source<S: EnvSource + 'static>(mut self, env: S) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Set the secondary read-only signal, typically backed by the
    /// transaction manager's "is the current unit of work read-only" query.
    pub fn read_only_probe<P>(mut self, probe: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        self.read_only_probe = Some(Box::new(probe));
        self
    }

    /// Build the router.
    pub fn build(self) -> ConnectionRouter<F> {
        ConnectionRouter {
            factory: self.factory,
            resolver: self.resolver,
            providers: RwLock::new(HashMap::new()),
            migrated: Mutex::new(self.migrated),
            env_seeded: AtomicBool::new(false),
            env: self.env,
            read_only_probe: self.read_only_probe,
        }
    }
}
