//! Propagating tenant and role context across execution boundaries.
//!
//! The tenant stack and role are thread-scoped, so handing work to another
//! thread or executor loses them. The wrappers here capture context at wrap
//! time and re-establish it around the wrapped closure on whichever thread
//! runs it, restoring the runner's prior context afterward even when the
//! closure panics.
//!
//! [`TenantScopedCall`] and [`TenantScopedTask`] capture just the current
//! tenant, mirroring the submit-to-a-worker-pool pattern;
//! [`ContextSnapshot`] captures the full tenant stack plus the role for
//! callers that need everything carried over.

use crate::context::{self, TenantGuard, TenantId};
use crate::resolver::TenantIdentifierResolver;
use crate::role::{self, DatabaseRole, RoleGuard};

/// A result-returning closure bound to the tenant that was current when it
/// was wrapped.
pub struct TenantScopedCall<F> {
    tenant: Option<TenantId>,
    inner: F,
}

impl<F, R> TenantScopedCall<F>
where
    F: FnOnce() -> R,
{
    /// Wrap `inner`, capturing the calling thread's current tenant.
    pub fn wrap(inner: F) -> Self {
        Self {
            tenant: context::current_tenant(),
            inner,
        }
    }

    /// Wrap `inner`, resolving the tenant through `resolver` instead of the
    /// raw stack so supplier and default fallbacks are baked in.
    pub fn wrap_resolved(resolver: &TenantIdentifierResolver, inner: F) -> Self {
        Self {
            tenant: Some(resolver.resolve()),
            inner,
        }
    }

    /// Wrap `inner` with an explicit tenant.
    pub fn for_tenant(tenant: impl Into<TenantId>, inner: F) -> Self {
        Self {
            tenant: Some(tenant.into()),
            inner,
        }
    }

    /// The tenant this call will run as, if one was captured.
    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    /// Run the wrapped closure under the captured tenant scope.
    ///
    /// The scope is popped when the closure returns or unwinds, so the
    /// running thread's own tenant stack is unaffected.
    pub fn call(self) -> R {
        let _guard = self.tenant.map(TenantGuard::enter);
        (self.inner)()
    }

    /// Convert into a plain closure, for APIs that take `FnOnce()`.
    pub fn into_fn(self) -> impl FnOnce() -> R {
        move || self.call()
    }
}

/// A fire-and-forget unit of work bound to the tenant that was current when
/// it was wrapped. Same mechanics as [`TenantScopedCall`], named for the
/// executor-submission use.
pub struct TenantScopedTask<F> {
    inner: TenantScopedCall<F>,
}

impl<F> TenantScopedTask<F>
where
    F: FnOnce(),
{
    /// Wrap `inner`, capturing the calling thread's current tenant.
    pub fn wrap(inner: F) -> Self {
        Self {
            inner: TenantScopedCall::wrap(inner),
        }
    }

    /// Wrap `inner` with an explicit tenant.
    pub fn for_tenant(tenant: impl Into<TenantId>, inner: F) -> Self {
        Self {
            inner: TenantScopedCall::for_tenant(tenant, inner),
        }
    }

    /// The tenant this task will run as, if one was captured.
    pub fn tenant(&self) -> Option<&TenantId> {
        self.inner.tenant()
    }

    /// Run the task under the captured tenant scope.
    pub fn run(self) {
        self.inner.call();
    }

    /// Convert into a plain closure, for `std::thread::spawn` and friends.
    pub fn into_fn(self) -> impl FnOnce() {
        move || self.run()
    }
}

/// A point-in-time copy of the full routing context: the whole tenant stack
/// and the database role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    tenants: Vec<TenantId>,
    role: DatabaseRole,
}

impl ContextSnapshot {
    /// Capture the calling thread's tenant stack and role.
    pub fn capture() -> Self {
        Self {
            tenants: context::all_tenants(),
            role: role::current_role(),
        }
    }

    /// The captured tenant stack, outermost first.
    pub fn tenants(&self) -> &[TenantId] {
        &self.tenants
    }

    /// The captured role.
    pub fn role(&self) -> DatabaseRole {
        self.role
    }

    /// Run `f` under this snapshot's context. Afterward, including on
    /// unwind, the running thread's tenant stack is back to what it was and
    /// its role is reset to the writer default.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _role = RoleGuard::enter(self.role);
        let _tenants: Vec<TenantGuard> = self
            .tenants
            .iter()
            .map(|tenant| TenantGuard::enter(tenant.clone()))
            .collect();
        f()
    }
}
