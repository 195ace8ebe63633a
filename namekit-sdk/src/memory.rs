//!
//! An in-memory name system. Plays the role a local testnet plays for a
//! real network client: tests and demos run the full lifecycle against it,
//! including simulated outages.
//!

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use namekit_common::identity::Identity;
use namekit_common::keys::Keypair;
use namekit_common::record::{now_ms, Record};

use crate::client::{ClientError, NameSystemClient, PublishOptions, SharedClient};

/// A [`NameSystemClient`] backed by a process-local map of canonical name
/// to record.
#[derive(Default)]
pub struct InMemoryNameSystem {
    records: RwLock<HashMap<String, Record>>,
    unreachable: AtomicBool,
}

impl InMemoryNameSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Async constructor shaped like a real client's bootstrap, usable as a
    /// session connector.
    pub async fn connect() -> Result<SharedClient, ClientError> {
        Ok(Self::new())
    }

    /// Toggle the simulated network. While unreachable every operation that
    /// would touch the network fails with [`ClientError::Network`]; offline
    /// record construction keeps working.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// The record currently stored under `name`, if any.
    pub async fn stored(&self, name: &str) -> Option<Record> {
        self.records.read().await.get(name).cloned()
    }

    fn check_reachable(&self) -> Result<(), ClientError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Network("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NameSystemClient for InMemoryNameSystem {
    async fn resolve(&self, identity: &Identity) -> Result<Record, ClientError> {
        self.check_reachable()?;
        let name = identity.to_name();
        let records = self.records.read().await;
        let record = records.get(&name).ok_or(ClientError::NotFound)?;
        if record.is_expired_at(now_ms()) {
            tracing::debug!(%name, "stored record expired");
            return Err(ClientError::NotFound);
        }
        Ok(record.clone())
    }

    async fn publish(
        &self,
        keypair: &Keypair,
        value: &str,
        options: PublishOptions,
    ) -> Result<Record, ClientError> {
        let name = Identity::from_public_key(&keypair.public_key()).to_name();
        let mut records = self.records.write().await;
        // A fresh record always supersedes whatever is currently stored.
        let sequence = records.get(&name).map(|r| r.sequence + 1).unwrap_or(1);
        let record = Record::build(
            keypair,
            value,
            options.lifetime_ms,
            options.ttl_ms,
            sequence,
            false,
        );
        if !options.offline {
            self.check_reachable()?;
            tracing::debug!(%name, sequence, "stored record");
            records.insert(name, record.clone());
        }
        Ok(record)
    }

    async fn republish(&self, identity: &Identity, record: &Record) -> Result<(), ClientError> {
        self.check_reachable()?;
        let public_key = match record.embedded_public_key() {
            Ok(Some(public_key)) => Some(public_key),
            Ok(None) => identity.public_key(),
            Err(_) => None,
        };
        let public_key = public_key.ok_or_else(|| {
            ClientError::Signing("no public key to verify the record against".to_string())
        })?;
        record
            .verify(&public_key)
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        let name = identity.to_name();
        tracing::debug!(%name, sequence = record.sequence, "republished record");
        self.records.write().await.insert(name, record.clone());
        Ok(())
    }
}
