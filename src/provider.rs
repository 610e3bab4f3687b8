//! Connection providers: the capability wrapped around one pooled resource.
//!
//! A [`ConnectionProvider`] owns exactly one pooled-connection resource for
//! one (tenant, role) pair. The router creates providers through a
//! [`ProviderFactory`] and owns them exclusively; callers only ever hold a
//! connection between acquire and release, never the provider itself beyond
//! that window. [`ConnectionLease`] enforces the release on every exit path.
//!
//! How a provider obtains its physical endpoint and credentials is a
//! [`crate::credentials`] concern; pool sizing and isolation defaults live
//! in [`PoolSettings`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::TenantId;
use crate::error::RouterResult;
use crate::role::DatabaseRole;

/// Owner of one pooled-connection resource for a single (tenant, role) pair.
pub trait ConnectionProvider: Send + Sync {
    /// The connection handle this provider hands out.
    type Connection;

    /// Acquire a connection from the underlying pool.
    fn acquire(&self) -> RouterResult<Self::Connection>;

    /// Release a connection back to the underlying pool.
    fn release(&self, conn: Self::Connection);

    /// Whether this provider fronts a read-only pool.
    fn is_read_only(&self) -> bool;

    /// Stop the provider and release the underlying pooled resources.
    ///
    /// Must be idempotent: stopping an already-stopped provider is a no-op.
    fn stop(&self) -> RouterResult<()>;
}

/// Factory constructing providers on first access of a (tenant, role) key.
///
/// Construction may perform I/O (fetching credentials, opening a pool); the
/// router never holds a global lock across it. A returned error propagates
/// to the caller and the key is retried on the next access.
pub trait ProviderFactory: Send + Sync {
    /// The provider type this factory constructs.
    type Provider: ConnectionProvider + 'static;

    /// Construct the writer provider for a tenant.
    fn create_writer(&self, tenant: &TenantId) -> RouterResult<Self::Provider>;

    /// Construct the reader provider for a tenant.
    fn create_reader(&self, tenant: &TenantId) -> RouterResult<Self::Provider>;
}

/// Transaction isolation level applied to a provider's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// Dirty reads allowed.
    ReadUncommitted,
    /// Only committed rows are visible.
    ReadCommitted,
    /// Repeated reads within a transaction see the same rows.
    RepeatableRead,
    /// Full serializable isolation.
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            Self::ReadCommitted => write!(f, "READ COMMITTED"),
            Self::RepeatableRead => write!(f, "REPEATABLE READ"),
            Self::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Sizing and isolation settings for one provider's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Minimum number of idle connections kept open.
    pub min_connections: usize,
    /// Maximum number of connections in the pool.
    pub max_connections: usize,
    /// Isolation level for connections from this pool.
    pub isolation: IsolationLevel,
}

impl PoolSettings {
    /// Defaults for a writer pool: 1..10 connections, repeatable read.
    pub fn writer_defaults() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            isolation: IsolationLevel::RepeatableRead,
        }
    }

    /// Defaults for a reader pool: 1..10 connections, read committed.
    pub fn reader_defaults() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            isolation: IsolationLevel::ReadCommitted,
        }
    }

    /// Defaults for the given role.
    pub fn defaults_for(role: DatabaseRole) -> Self {
        match role {
            DatabaseRole::Writer => Self::writer_defaults(),
            DatabaseRole::Reader => Self::reader_defaults(),
        }
    }

    /// Set the minimum number of connections.
    pub fn with_min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the maximum number of connections.
    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the isolation level.
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::writer_defaults()
    }
}

/// A distinct, human-readable name for the pool behind a (tenant, role) key.
pub fn pool_name(tenant: &TenantId, role: DatabaseRole) -> String {
    format!("{} {} pool", tenant, role)
}

/// A connection checked out of a provider, released back on drop.
///
/// Dereferences to the provider's connection type. Guarantees the
/// acquire/use/release discipline on all exit paths, including unwind.
pub struct ConnectionLease<P: ConnectionProvider> {
    provider: Arc<P>,
    conn: Option<P::Connection>,
}

impl<P: ConnectionProvider> ConnectionLease<P> {
    /// Acquire a connection from `provider` and wrap it in a lease.
    pub fn acquire(provider: Arc<P>) -> RouterResult<Self> {
        let conn = provider.acquire()?;
        Ok(Self {
            provider,
            conn: Some(conn),
        })
    }

    /// Whether the backing provider fronts a read-only pool.
    pub fn is_read_only(&self) -> bool {
        self.provider.is_read_only()
    }
}

impl<P: ConnectionProvider> fmt::Debug for ConnectionLease<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("held", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: ConnectionProvider> Deref for ConnectionLease<P> {
    type Target = P::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already released")
    }
}

impl<P: ConnectionProvider> DerefMut for ConnectionLease<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already released")
    }
}

impl<P: ConnectionProvider> Drop for ConnectionLease<P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.provider.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        outstanding: AtomicUsize,
    }

    impl ConnectionProvider for CountingProvider {
        type Connection = u32;

        fn acquire(&self) -> RouterResult<u32> {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }

        fn release(&self, _conn: u32) {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }

        fn is_read_only(&self) -> bool {
            false
        }

        fn stop(&self) -> RouterResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pool_settings_defaults() {
        let writer = PoolSettings::writer_defaults();
        assert_eq!(writer.min_connections, 1);
        assert_eq!(writer.max_connections, 10);
        assert_eq!(writer.isolation, IsolationLevel::RepeatableRead);

        let reader = PoolSettings::defaults_for(DatabaseRole::Reader);
        assert_eq!(reader.isolation, IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_pool_settings_builder() {
        let settings = PoolSettings::reader_defaults()
            .with_min_connections(2)
            .with_max_connections(20)
            .with_isolation(IsolationLevel::Serializable);
        assert_eq!(settings.min_connections, 2);
        assert_eq!(settings.max_connections, 20);
        assert_eq!(settings.isolation, IsolationLevel::Serializable);
    }

    #[test]
    fn test_pool_name() {
        let name = pool_name(&TenantId::new("acme"), DatabaseRole::Reader);
        assert_eq!(name, "acme reader pool");
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let provider = Arc::new(CountingProvider {
            outstanding: AtomicUsize::new(0),
        });
        {
            let lease = ConnectionLease::acquire(provider.clone()).unwrap();
            assert_eq!(*lease, 7);
            assert_eq!(provider.outstanding.load(Ordering::SeqCst), 1);
        }
        assert_eq!(provider.outstanding.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lease_releases_on_panic() {
        let provider = Arc::new(CountingProvider {
            outstanding: AtomicUsize::new(0),
        });
        let cloned = provider.clone();
        let result = std::panic::catch_unwind(move || {
            let _lease = ConnectionLease::acquire(cloned).unwrap();
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(provider.outstanding.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_isolation_display() {
        assert_eq!(IsolationLevel::RepeatableRead.to_string(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::ReadCommitted.to_string(), "READ COMMITTED");
    }
}
