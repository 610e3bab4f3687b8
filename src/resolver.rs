//! Resolution of the effective tenant for the current call.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::context::{self, TenantId};

/// The reserved tenant used when nothing selects one: the shared store that
/// also backs not-yet-migrated tenants.
pub const DEFAULT_TENANT: &str = "master";

/// A callback producing a tenant from ambient state (request, session, ...).
///
/// Invoked lazily, and only when the tenant stack is empty.
pub type TenantSupplier = dyn Fn() -> Option<TenantId> + Send + Sync;

/// Resolves the effective tenant identifier for the current call.
///
/// Precedence, first non-empty wins:
/// 1. the top of the calling thread's tenant stack,
/// 2. the injected [`TenantSupplier`],
/// 3. the configured default tenant (`"master"`).
///
/// Nothing is cached between calls — the tenant may legitimately change
/// between two resolutions on the same thread.
#[derive(Clone)]
pub struct TenantIdentifierResolver {
    default_tenant: TenantId,
    supplier: Option<Arc<TenantSupplier>>,
}

impl TenantIdentifierResolver {
    /// Create a resolver with the default tenant [`DEFAULT_TENANT`] and no
    /// supplier.
    pub fn new() -> Self {
        Self {
            default_tenant: TenantId::new(DEFAULT_TENANT),
            supplier: None,
        }
    }

    /// Set the default tenant.
    pub fn with_default_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.default_tenant = tenant.into();
        self
    }

    /// Set the tenant supplier consulted when the tenant stack is empty.
    pub fn with_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> Option<TenantId> + Send + Sync + 'static,
    {
        self.supplier = Some(Arc::new(supplier));
        self
    }

    /// The configured default tenant.
    pub fn default_tenant(&self) -> &TenantId {
        &self.default_tenant
    }

    /// Resolve the tenant identifier for the current call.
    pub fn resolve(&self) -> TenantId {
        let tenant = context::current_tenant()
            .or_else(|| self.supplier.as_ref().and_then(|s| s()))
            .unwrap_or_else(|| self.default_tenant.clone());
        trace!(tenant = %tenant, "resolved current tenant identifier");
        tenant
    }
}

impl Default for TenantIdentifierResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TenantIdentifierResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantIdentifierResolver")
            .field("default_tenant", &self.default_tenant)
            .field("has_supplier", &self.supplier.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{clear_tenants, with_tenant};

    #[test]
    fn test_falls_back_to_default() {
        clear_tenants();
        let resolver = TenantIdentifierResolver::new();
        assert_eq!(resolver.resolve(), TenantId::new(DEFAULT_TENANT));
    }

    #[test]
    fn test_custom_default() {
        clear_tenants();
        let resolver = TenantIdentifierResolver::new().with_default_tenant("shared");
        assert_eq!(resolver.resolve(), TenantId::new("shared"));
    }

    #[test]
    fn test_stack_wins_over_supplier() {
        clear_tenants();
        let resolver = TenantIdentifierResolver::new()
            .with_supplier(|| Some(TenantId::new("from-supplier")));
        let resolved = with_tenant("from-stack", || resolver.resolve());
        assert_eq!(resolved, TenantId::new("from-stack"));
    }

    #[test]
    fn test_supplier_wins_over_default() {
        clear_tenants();
        let resolver = TenantIdentifierResolver::new()
            .with_supplier(|| Some(TenantId::new("from-supplier")));
        assert_eq!(resolver.resolve(), TenantId::new("from-supplier"));
    }

    #[test]
    fn test_empty_supplier_falls_through() {
        clear_tenants();
        let resolver = TenantIdentifierResolver::new().with_supplier(|| None);
        assert_eq!(resolver.resolve(), TenantId::new(DEFAULT_TENANT));
    }

    #[test]
    fn test_not_cached_between_calls() {
        clear_tenants();
        let resolver = TenantIdentifierResolver::new();
        let first = with_tenant("a", || resolver.resolve());
        let second = with_tenant("b", || resolver.resolve());
        assert_eq!(first, TenantId::new("a"));
        assert_eq!(second, TenantId::new("b"));
    }
}
