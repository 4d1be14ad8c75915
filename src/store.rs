//! Document store access
//!
//! `DocumentStore` is the narrow seam over the backing store; `Store` is the
//! façade the loaders and the orchestrator use. It adds typed encode/decode,
//! the reset/ensure lifecycle helpers and a semaphore gate that bounds the
//! number of in-flight store requests.
//!
//! # Module Structure
//! - `couch`: CouchDB HTTP backend
//! - `memory`: in-process backend with an operation journal

pub mod couch;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::StoreError;

pub use couch::CouchStore;
pub use memory::{MemoryStore, StoreOp};

/// Collection names used by the bootstrap
pub mod collections {
    pub const USERS: &str = "_users";
    pub const REPLICATOR: &str = "_replicator";
    pub const FINDING: &str = "finding";
    pub const CROWDSOURCER: &str = "crowdsourcer";
    pub const SEVERITY: &str = "severity";
    pub const VULNERABILITY: &str = "vulnerability";

    /// Created if missing, never reset
    pub const SYSTEM: [&str; 2] = [USERS, REPLICATOR];

    /// Destroyed and recreated on every bootstrap
    pub const ENTITY: [&str; 4] = [FINDING, CROWDSOURCER, SEVERITY, VULNERABILITY];
}

/// Whether `id` can name a document in a URL path.
///
/// `.` and `..` are dot segments (also in their `%2E` spellings) and are
/// removed during URL normalization; an empty id addresses the database.
pub fn is_addressable_id(id: &str) -> bool {
    !matches!(id, "" | "." | "..")
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn database_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Creating a database that already exists is not an error.
    async fn create_database(&self, name: &str) -> Result<(), StoreError>;

    /// Destroying a database that does not exist is not an error.
    async fn destroy_database(&self, name: &str) -> Result<(), StoreError>;

    /// Insert or overwrite the document stored under `id`.
    async fn put_document(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn get_document(&self, collection: &str, id: &str)
    -> Result<serde_json::Value, StoreError>;

    fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn DocumentStore>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl Store {
    pub fn new(backend: Arc<dyn DocumentStore>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool, StoreError> {
        let _permit = self.acquire("database_exists").await?;
        self.backend.database_exists(name).await
    }

    pub async fn create_database(&self, name: &str) -> Result<(), StoreError> {
        let _permit = self.acquire("create_database").await?;
        self.backend.create_database(name).await
    }

    pub async fn destroy_database(&self, name: &str) -> Result<(), StoreError> {
        let _permit = self.acquire("destroy_database").await?;
        self.backend.destroy_database(name).await
    }

    /// Destroy the database if present, then create it empty.
    pub async fn reset_database(&self, name: &str) -> Result<(), StoreError> {
        if self.database_exists(name).await? {
            debug!(database = %name, "Destroying existing database");
            self.destroy_database(name).await?;
        }
        self.create_database(name).await?;
        info!(database = %name, "Database reset");
        Ok(())
    }

    /// Create the database only if it is missing. Existing contents are kept.
    pub async fn ensure_database(&self, name: &str) -> Result<(), StoreError> {
        if self.database_exists(name).await? {
            debug!(database = %name, "Database already exists");
            return Ok(());
        }
        self.create_database(name).await?;
        info!(database = %name, "Database created");
        Ok(())
    }

    pub async fn put_document<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let doc = serde_json::to_value(record)?;
        let _permit = self.acquire("put_document").await?;
        self.backend.put_document(collection, id, doc).await
    }

    pub async fn get_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, StoreError> {
        let doc = {
            let _permit = self.acquire("get_document").await?;
            self.backend.get_document(collection, id).await?
        };
        Ok(serde_json::from_value(doc)?)
    }

    async fn acquire(
        &self,
        operation: &str,
    ) -> Result<tokio::sync::SemaphorePermit<'_>, StoreError> {
        self.permits
            .acquire()
            .await
            .map_err(|e| StoreError::unavailable(operation, e))
    }
}
