//!
//! The contract the lifecycle orchestrator drives the name system through.
//! Implemented by real network clients and by [`crate::InMemoryNameSystem`]
//! for tests and demos.
//!

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use namekit_common::identity::Identity;
use namekit_common::keys::Keypair;
use namekit_common::record::Record;

/// Default record lifetime: 24 hours.
pub const DEFAULT_LIFETIME_MS: u64 = 24 * 60 * 60 * 1000;
/// Default advisory cache duration: one hour.
pub const DEFAULT_TTL_MS: u64 = 60 * 60 * 1000;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("name system unreachable: {0}")]
    Network(String),
    #[error("no record found for this name")]
    NotFound,
    #[error("failed to sign the record: {0}")]
    Signing(String),
}

impl ClientError {
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }

    pub fn is_signing(&self) -> bool {
        matches!(self, ClientError::Signing(_))
    }
}

/// Parameters of a publish operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// How long the record stays valid, milliseconds from now.
    pub lifetime_ms: u64,
    /// Advisory cache duration embedded in the record, milliseconds.
    pub ttl_ms: u64,
    /// Build and sign only; skip the network broadcast.
    pub offline: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            lifetime_ms: DEFAULT_LIFETIME_MS,
            ttl_ms: DEFAULT_TTL_MS,
            offline: false,
        }
    }
}

/// Resolution and publication operations of the name system.
///
/// Resolution always bypasses caches so the orchestrator reconciles its
/// optimistic local state against remote truth, never against a stale copy.
#[async_trait]
pub trait NameSystemClient: Send + Sync {
    /// Resolve `identity` to its current record.
    async fn resolve(&self, identity: &Identity) -> Result<Record, ClientError>;

    /// Build, sign and (unless `options.offline`) broadcast a new record
    /// authored by `keypair`.
    async fn publish(
        &self,
        keypair: &Keypair,
        value: &str,
        options: PublishOptions,
    ) -> Result<Record, ClientError>;

    /// Re-broadcast an already-signed record without re-signing it.
    async fn republish(&self, identity: &Identity, record: &Record) -> Result<(), ClientError>;
}

/// Shared, read-only handle to a [`NameSystemClient`]. Created once at
/// startup and never mutated afterwards, only invoked.
pub type SharedClient = Arc<dyn NameSystemClient>;

/// Future producing the client during initialization. Consumed exactly
/// once, by the startup task.
pub type Connector = Pin<Box<dyn Future<Output = Result<SharedClient, ClientError>> + Send>>;
