//! Per-tenant credential sourcing for provider construction.
//!
//! Providers differ only in where their endpoint and credentials come from:
//! local configuration, environment, a remote parameter store. That concern
//! lives behind [`CredentialSource`] so factories stay identical across
//! deployments. Fetching happens at provider-construction time, once per
//! (tenant, role) key, never per connection.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::TenantId;
use crate::error::{RouterError, RouterResult};
use crate::role::DatabaseRole;

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;

    /// Check if a variable exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Default environment source using std::env.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create a new map-based environment source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Endpoint and credentials for one (tenant, role) pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantCredentials {
    /// Connection URL of the physical database.
    pub url: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
}

impl TenantCredentials {
    /// Create credentials.
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Loads the credentials for a (tenant, role) pool.
pub trait CredentialSource: Send + Sync {
    /// Fetch credentials, or a configuration error if the tenant has none.
    fn fetch(&self, tenant: &TenantId, role: DatabaseRole) -> RouterResult<TenantCredentials>;
}

/// Credential source backed by a pre-seeded in-memory map.
#[derive(Debug, Default)]
pub struct StaticCredentialSource {
    entries: RwLock<HashMap<(TenantId, DatabaseRole), TenantCredentials>>,
}

impl StaticCredentialSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register credentials for a (tenant, role) pair.
    pub fn insert(
        &self,
        tenant: impl Into<TenantId>,
        role: DatabaseRole,
        credentials: TenantCredentials,
    ) -> &Self {
        self.entries
            .write()
            .insert((tenant.into(), role), credentials);
        self
    }

    /// Register the same credentials for both roles of a tenant.
    pub fn insert_both(
        &self,
        tenant: impl Into<TenantId>,
        credentials: TenantCredentials,
    ) -> &Self {
        let tenant = tenant.into();
        self.insert(tenant.clone(), DatabaseRole::Writer, credentials.clone());
        self.insert(tenant, DatabaseRole::Reader, credentials);
        self
    }
}

impl CredentialSource for StaticCredentialSource {
    fn fetch(&self, tenant: &TenantId, role: DatabaseRole) -> RouterResult<TenantCredentials> {
        self.entries
            .read()
            .get(&(tenant.clone(), role))
            .cloned()
            .ok_or_else(|| {
                RouterError::configuration(
                    tenant.clone(),
                    format!("no credentials registered for the {role} role"),
                )
            })
    }
}

/// Credential source reading per-tenant environment variables.
///
/// Looks up `{TENANT}_{ROLE}_URL`, `{TENANT}_{ROLE}_USER` and
/// `{TENANT}_{ROLE}_PASSWORD`, tenant and role uppercased with `-`
/// normalized to `_` (e.g. `ACME_READER_URL`).
#[derive(Debug, Clone)]
pub struct EnvCredentialSource<S: EnvSource = StdEnvSource> {
    source: S,
}

impl EnvCredentialSource<StdEnvSource> {
    /// Create a source reading the standard environment.
    pub fn new() -> Self {
        Self {
            source: StdEnvSource,
        }
    }
}

impl Default for EnvCredentialSource<StdEnvSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EnvSource> EnvCredentialSource<S> {
    /// Create a source reading a custom environment.
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    fn var(&self, tenant: &TenantId, role: DatabaseRole, suffix: &str) -> RouterResult<String> {
        let name = format!(
            "{}_{}_{}",
            tenant.as_str().to_uppercase().replace('-', "_"),
            role.to_string().to_uppercase(),
            suffix
        );
        self.source.get(&name).ok_or_else(|| {
            RouterError::configuration(
                tenant.clone(),
                format!("environment variable {name} is not set"),
            )
        })
    }
}

impl<S: EnvSource> CredentialSource for EnvCredentialSource<S> {
    fn fetch(&self, tenant: &TenantId, role: DatabaseRole) -> RouterResult<TenantCredentials> {
        Ok(TenantCredentials {
            url: self.var(tenant, role, "URL")?,
            user: self.var(tenant, role, "USER")?,
            password: self.var(tenant, role, "PASSWORD")?,
        })
    }
}
