//! # rwsplit
//!
//! Read/write splitting and multi-tenant connection routing for pooled
//! database resources.
//!
//! rwsplit decides, per unit of work, which connection pool serves it: the
//! tenant comes from a call-scoped tenant stack (with a pluggable supplier
//! and a `"master"` default behind it), the [`DatabaseRole`] from a
//! thread-scoped writer/reader flag. A [`ConnectionRouter`] maps each
//! (tenant, role) pair to a [`ConnectionProvider`] built lazily, exactly
//! once, through your [`ProviderFactory`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use rwsplit::{ConnectionRouter, TenantIdentifierResolver, with_tenant, with_role, DatabaseRole};
//!
//! let router = ConnectionRouter::new(TenantIdentifierResolver::new(), MyFactory::new());
//!
//! // Write path, tenant "acme": served by acme's writer pool.
//! with_tenant("acme", || {
//!     let conn = router.acquire()?;
//!     // ... use conn, released on drop
//!     Ok::<_, rwsplit::RouterError>(())
//! })?;
//!
//! // Read path: same tenant, replica pool.
//! with_tenant("acme", || {
//!     with_role(DatabaseRole::Reader, || router.acquire())
//! })?;
//! ```
//!
//! ## Incremental migration
//!
//! Tenants can be moved out of a shared database one at a time: seed the
//! migrated set from the `MIGRATED_TENANTS` environment variable or call
//! [`ConnectionRouter::add_migrated_tenant`] as each migration completes.
//! While the set is non-empty, tenants not in it are routed to the default
//! tenant's pool instead of a pool of their own.
//!
//! ## Crossing threads
//!
//! Tenant and role are thread-scoped and do not follow work to other
//! threads. Wrap closures in [`TenantScopedCall`] / [`TenantScopedTask`], or
//! capture everything with [`ContextSnapshot`], before handing them off.

pub mod context;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod role;
pub mod router;
pub mod task;

pub use context::{
    TenantGuard, TenantId, all_tenants, clear_tenants, current_tenant, pop_tenant, push_tenant,
    tenant_depth, with_tenant,
};
pub use credentials::{
    CredentialSource, EnvCredentialSource, EnvSource, MapEnvSource, StaticCredentialSource,
    StdEnvSource, TenantCredentials,
};
pub use error::{RouterError, RouterResult, ShutdownFailure};
pub use provider::{
    ConnectionLease, ConnectionProvider, IsolationLevel, PoolSettings, ProviderFactory, pool_name,
};
pub use resolver::{DEFAULT_TENANT, TenantIdentifierResolver, TenantSupplier};
pub use role::{
    DatabaseRole, RoleGuard, current_role, reset_current_role, set_current_role, with_role,
};
pub use router::{ConnectionRouter, MIGRATED_TENANTS_VAR, RouterBuilder};
pub use task::{ContextSnapshot, TenantScopedCall, TenantScopedTask};
