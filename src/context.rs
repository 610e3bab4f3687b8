//! Tenant identifiers and the call-scoped tenant stack.
//!
//! Each thread carries an ordered stack of [`TenantId`]s so that tenant
//! scopes can nest: an operation acting as tenant "a" may call into one
//! acting as tenant "b" and get "a" back when the inner scope ends. The top
//! of the stack is the current tenant; an empty stack means the resolver
//! falls through to its supplier or default.
//!
//! Popping an empty stack is a deliberate no-op so that defensive
//! double-cleanup in nested scopes never faults.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;

/// A unique identifier for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(SmolStr);

impl TenantId {
    /// Create a new tenant ID.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Get the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

thread_local! {
    static TENANT_STACK: RefCell<SmallVec<[TenantId; 4]>> = const { RefCell::new(SmallVec::new_const()) };
}

/// Push a tenant onto the current thread's tenant stack.
pub fn push_tenant(tenant: impl Into<TenantId>) {
    TENANT_STACK.with_borrow_mut(|stack| stack.push(tenant.into()));
}

/// Pop the most recently pushed tenant, restoring the previous scope.
///
/// Returns the popped tenant, or `None` if the stack was already empty
/// (tolerated, not a fault).
pub fn pop_tenant() -> Option<TenantId> {
    TENANT_STACK.with_borrow_mut(|stack| stack.pop())
}

/// Get the current tenant, the top of this thread's tenant stack.
pub fn current_tenant() -> Option<TenantId> {
    TENANT_STACK.with_borrow(|stack| stack.last().cloned())
}

/// Get every tenant queued on this thread, outermost first.
pub fn all_tenants() -> Vec<TenantId> {
    TENANT_STACK.with_borrow(|stack| stack.to_vec())
}

/// Remove every tenant from this thread's stack.
pub fn clear_tenants() {
    TENANT_STACK.with_borrow_mut(|stack| stack.clear());
}

/// Depth of this thread's tenant stack.
pub fn tenant_depth() -> usize {
    TENANT_STACK.with_borrow(|stack| stack.len())
}

/// Guard that pops one tenant scope when dropped.
#[must_use = "the tenant scope is popped when the guard is dropped"]
pub struct TenantGuard {
    _private: (),
}

impl TenantGuard {
    /// Push `tenant` and return a guard that pops it again.
    pub fn enter(tenant: impl Into<TenantId>) -> Self {
        push_tenant(tenant);
        Self { _private: () }
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        pop_tenant();
    }
}

/// Run a closure scoped to the given tenant.
///
/// The tenant is pushed before the closure runs and popped afterward, on
/// every exit path including unwind, so the stack depth seen by surrounding
/// code never changes.
pub fn with_tenant<F, R>(tenant: impl Into<TenantId>, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = TenantGuard::enter(tenant);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tenant_id() {
        let id = TenantId::new("acme");
        assert_eq!(id.as_str(), "acme");
        assert_eq!(id.to_string(), "acme");

        let from_str: TenantId = "acme".into();
        let from_string: TenantId = String::from("acme").into();
        assert_eq!(from_str, from_string);
    }

    #[test]
    fn test_nested_scopes() {
        clear_tenants();
        push_tenant("a");
        push_tenant("b");
        assert_eq!(current_tenant(), Some(TenantId::new("b")));
        assert_eq!(pop_tenant(), Some(TenantId::new("b")));
        assert_eq!(current_tenant(), Some(TenantId::new("a")));
        assert_eq!(pop_tenant(), Some(TenantId::new("a")));
        assert_eq!(current_tenant(), None);
    }

    #[test]
    fn test_pop_empty_is_noop() {
        clear_tenants();
        assert_eq!(pop_tenant(), None);
        assert_eq!(pop_tenant(), None);
        assert_eq!(tenant_depth(), 0);
    }

    #[test]
    fn test_all_tenants_outermost_first() {
        clear_tenants();
        push_tenant("outer");
        push_tenant("inner");
        assert_eq!(
            all_tenants(),
            vec![TenantId::new("outer"), TenantId::new("inner")]
        );
        clear_tenants();
        assert!(all_tenants().is_empty());
    }

    #[test]
    fn test_with_tenant_restores_depth() {
        clear_tenants();
        push_tenant("ambient");
        let seen = with_tenant("scoped", || current_tenant());
        assert_eq!(seen, Some(TenantId::new("scoped")));
        assert_eq!(current_tenant(), Some(TenantId::new("ambient")));
        clear_tenants();
    }

    #[test]
    fn test_with_tenant_restores_on_panic() {
        clear_tenants();
        push_tenant("ambient");
        let result = std::panic::catch_unwind(|| {
            with_tenant("scoped", || panic!("boom"));
        });
        assert!(result.is_err());
        assert_eq!(current_tenant(), Some(TenantId::new("ambient")));
        clear_tenants();
    }

    #[test]
    fn test_stack_is_thread_scoped() {
        clear_tenants();
        push_tenant("here");
        let other = std::thread::spawn(current_tenant).join().unwrap();
        assert_eq!(other, None);
        clear_tenants();
    }
}
