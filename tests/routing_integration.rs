//! End-to-end routing scenarios against an in-memory provider stack.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rwsplit::{
    ConnectionProvider, ConnectionRouter, CredentialSource, DatabaseRole, MapEnvSource,
    PoolSettings, ProviderFactory, RouterResult, StaticCredentialSource, TenantCredentials,
    TenantId, TenantIdentifierResolver, TenantScopedTask, pool_name, with_role, with_tenant,
};

/// A connection that remembers which pool it came from.
struct MemoryConnection {
    pool: String,
    url: String,
}

struct MemoryProvider {
    pool: String,
    url: String,
    role: DatabaseRole,
    settings: PoolSettings,
    outstanding: AtomicUsize,
}

impl ConnectionProvider for MemoryProvider {
    type Connection = MemoryConnection;

    fn acquire(&self) -> RouterResult<MemoryConnection> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            pool: self.pool.clone(),
            url: self.url.clone(),
        })
    }

    fn release(&self, _conn: MemoryConnection) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_read_only(&self) -> bool {
        self.role.is_read_only()
    }

    fn stop(&self) -> RouterResult<()> {
        Ok(())
    }
}

struct MemoryFactory {
    credentials: StaticCredentialSource,
}

impl MemoryFactory {
    fn create(&self, tenant: &TenantId, role: DatabaseRole) -> RouterResult<MemoryProvider> {
        let creds = self.credentials.fetch(tenant, role)?;
        Ok(MemoryProvider {
            pool: pool_name(tenant, role),
            url: creds.url,
            role,
            settings: PoolSettings::defaults_for(role),
            outstanding: AtomicUsize::new(0),
        })
    }
}

impl ProviderFactory for MemoryFactory {
    type Provider = MemoryProvider;

    fn create_writer(&self, tenant: &TenantId) -> RouterResult<MemoryProvider> {
        self.create(tenant, DatabaseRole::Writer)
    }

    fn create_reader(&self, tenant: &TenantId) -> RouterResult<MemoryProvider> {
        self.create(tenant, DatabaseRole::Reader)
    }
}

fn seeded_credentials() -> StaticCredentialSource {
    let credentials = StaticCredentialSource::new();
    credentials.insert_both(
        "master",
        TenantCredentials::new("postgres://shared/master", "master", "pw"),
    );
    credentials.insert(
        "acme",
        DatabaseRole::Writer,
        TenantCredentials::new("postgres://primary/acme", "acme", "pw"),
    );
    credentials.insert(
        "acme",
        DatabaseRole::Reader,
        TenantCredentials::new("postgres://replica/acme", "acme_ro", "pw"),
    );
    credentials
}

fn memory_router() -> ConnectionRouter<MemoryFactory> {
    ConnectionRouter::builder(
        TenantIdentifierResolver::new(),
        MemoryFactory {
            credentials: seeded_credentials(),
        },
    )
    .env_source(MapEnvSource::new())
    .migrated_tenant("acme")
    .build()
}

#[test]
fn writer_and_reader_hit_different_endpoints() {
    let router = memory_router();

    let write = with_tenant("acme", || router.acquire()).unwrap();
    assert_eq!(write.url, "postgres://primary/acme");
    assert_eq!(write.pool, "acme writer pool");
    drop(write);

    let read = with_tenant("acme", || with_role(DatabaseRole::Reader, || router.acquire())).unwrap();
    assert_eq!(read.url, "postgres://replica/acme");
    assert_eq!(read.pool, "acme reader pool");
}

#[test]
fn unmigrated_tenant_lands_on_shared_store() {
    let router = memory_router();

    let conn = with_tenant("startup-co", || router.acquire()).unwrap();
    assert_eq!(conn.url, "postgres://shared/master");
    drop(conn);

    // No credentials were ever registered for "startup-co"; migrating it
    // without them now surfaces a configuration error instead.
    router.add_migrated_tenant("startup-co");
    let err = with_tenant("startup-co", || router.acquire()).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn pool_settings_follow_role() {
    let router = memory_router();

    let writer = router
        .select_connection_provider(&TenantId::new("acme"))
        .unwrap();
    assert_eq!(writer.settings, PoolSettings::writer_defaults());

    let reader = with_role(DatabaseRole::Reader, || {
        router.select_connection_provider(&TenantId::new("acme"))
    })
    .unwrap();
    assert_eq!(reader.settings, PoolSettings::reader_defaults());
}

#[test]
fn leases_are_returned_on_every_path() {
    let router = memory_router();
    let provider = with_tenant("acme", || router.any_connection_provider()).unwrap();

    {
        let _lease = with_tenant("acme", || router.acquire()).unwrap();
        assert_eq!(provider.outstanding.load(Ordering::SeqCst), 1);
    }
    assert_eq!(provider.outstanding.load(Ordering::SeqCst), 0);
}

#[test]
fn background_work_keeps_its_tenant() {
    let router = Arc::new(memory_router());

    let handle = with_tenant("acme", || {
        let router = router.clone();
        let task = TenantScopedTask::wrap(move || {
            let conn = router.acquire().unwrap();
            assert_eq!(conn.url, "postgres://primary/acme");
        });
        std::thread::spawn(task.into_fn())
    });
    handle.join().unwrap();
}

#[test]
fn clear_all_rebuilds_pools() {
    let router = memory_router();
    let tenant = TenantId::new("acme");

    let before = router.select_connection_provider(&tenant).unwrap();
    router.clear_all().unwrap();
    let after = router.select_connection_provider(&tenant).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.url, "postgres://primary/acme");
}
