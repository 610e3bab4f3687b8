//! Error types for routing operations.

use std::fmt;

use thiserror::Error;

use crate::context::TenantId;
use crate::role::DatabaseRole;

/// Result type for routing operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors that can occur while routing or managing connection providers.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Missing or invalid connection parameters for a tenant at provider
    /// construction time. Fatal for that attempt only; the failed key is not
    /// cached and the next access retries construction.
    #[error("configuration error for tenant {tenant}: {message}")]
    Configuration {
        /// The tenant whose provider could not be configured.
        tenant: TenantId,
        /// What went wrong.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A pooled resource failed to hand out or take back a connection.
    #[error("pool error: {0}")]
    Pool(String),

    /// One or more providers failed to stop cleanly during a broadcast
    /// shutdown. Every remaining provider was still asked to stop.
    #[error("{} connection provider(s) failed to stop cleanly", failures.len())]
    Shutdown {
        /// The providers that did not stop cleanly.
        failures: Vec<ShutdownFailure>,
    },
}

impl RouterError {
    /// Create a configuration error for a tenant.
    pub fn configuration(tenant: impl Into<TenantId>, message: impl Into<String>) -> Self {
        Self::Configuration {
            tenant: tenant.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, src: E) -> Self {
        if let Self::Configuration { source, .. } = &mut self {
            *source = Some(Box::new(src));
        }
        self
    }

    /// Create a pool error.
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool(message.into())
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Check if this is an aggregated shutdown error.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }
}

/// A single provider that failed to stop during [`RouterError::Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownFailure {
    /// The tenant the provider belonged to.
    pub tenant: TenantId,
    /// The role the provider served.
    pub role: DatabaseRole,
    /// The stop failure message.
    pub message: String,
}

impl fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} provider: {}", self.tenant, self.role, self.message)
    }
}
