//! The current database role, scoped to the calling thread.
//!
//! Every unit of work carries a [`DatabaseRole`] that decides whether it is
//! served by the writable primary or by a read replica. The role is implicit
//! `Writer` until something sets it; a read-only unit of work sets `Reader`
//! on entry and resets on exit. [`with_role`] wraps a closure with exactly
//! that set/invoke/reset discipline, reset guaranteed even on unwind.
//!
//! The role is thread-scoped. Work handed to another thread or task does not
//! inherit it implicitly; use [`crate::task::ContextSnapshot`] to carry it
//! across explicitly.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of backing database a unit of work needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseRole {
    /// The writable primary database.
    #[default]
    Writer,
    /// A read-only replica.
    Reader,
}

impl DatabaseRole {
    /// Check if this role only ever reads.
    pub fn is_read_only(self) -> bool {
        self == Self::Reader
    }
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writer => write!(f, "writer"),
            Self::Reader => write!(f, "reader"),
        }
    }
}

thread_local! {
    static CURRENT_ROLE: Cell<DatabaseRole> = const { Cell::new(DatabaseRole::Writer) };
}

/// Get the database role for the current thread. Defaults to
/// [`DatabaseRole::Writer`] when never set.
pub fn current_role() -> DatabaseRole {
    CURRENT_ROLE.get()
}

/// Set the database role for the current thread.
pub fn set_current_role(role: DatabaseRole) {
    CURRENT_ROLE.set(role);
}

/// Reset the current thread's role to [`DatabaseRole::Writer`].
pub fn reset_current_role() {
    CURRENT_ROLE.set(DatabaseRole::Writer);
}

/// Guard that resets the role to `Writer` when dropped.
///
/// The reset is unconditional rather than a restore of the previous value:
/// leaving a role-scoped unit of work always lands back on the writer, the
/// safe default.
#[must_use = "the role is reset when the guard is dropped"]
pub struct RoleGuard {
    _private: (),
}

impl RoleGuard {
    /// Set `role` for the current thread and return a guard that resets it.
    pub fn enter(role: DatabaseRole) -> Self {
        set_current_role(role);
        Self { _private: () }
    }
}

impl Drop for RoleGuard {
    fn drop(&mut self) {
        reset_current_role();
    }
}

/// Run a closure with the given role, resetting to `Writer` afterward.
///
/// This is the explicit form of the interception an ORM layer performs
/// around read-only transactions: set role, invoke, reset — the reset
/// happens even if the closure panics.
pub fn with_role<F, R>(role: DatabaseRole, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = RoleGuard::enter(role);
    f()
}
