//! In-process document store
//!
//! Used for dry runs and tests. Every call is appended to a journal with a
//! monotonically increasing sequence number, so callers can check the order
//! in which the pipeline touched the store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{DocumentStore, is_addressable_id};
use crate::error::StoreError;

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    pub seq: usize,
    pub operation: &'static str,
    pub database: String,
    pub id: Option<String>,
}

#[derive(Default)]
struct State {
    databases: HashMap<String, BTreeMap<String, serde_json::Value>>,
    journal: Vec<StoreOp>,
}

impl State {
    fn record(&mut self, operation: &'static str, database: &str, id: Option<&str>) {
        let seq = self.journal.len();
        self.journal.push(StoreOp {
            seq,
            operation,
            database: database.to_string(),
            id: id.map(str::to_string),
        });
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in call order
    pub async fn journal(&self) -> Vec<StoreOp> {
        self.state.lock().await.journal.clone()
    }

    /// Snapshot of a database's documents, or `None` if it does not exist
    pub async fn documents(&self, database: &str) -> Option<BTreeMap<String, serde_json::Value>> {
        self.state.lock().await.databases.get(database).cloned()
    }

    pub async fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.databases.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn database_exists(&self, name: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.record("database_exists", name, None);
        Ok(state.databases.contains_key(name))
    }

    async fn create_database(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.record("create_database", name, None);
        state.databases.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn destroy_database(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.record("destroy_database", name, None);
        state.databases.remove(name);
        Ok(())
    }

    async fn put_document(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.record("put_document", collection, Some(id));
        if !is_addressable_id(id) {
            return Err(StoreError::unavailable(
                "put_document",
                format!("{collection}/{id:?}: document id cannot be addressed"),
            ));
        }
        let database = state.databases.get_mut(collection).ok_or_else(|| {
            StoreError::unavailable(
                "put_document",
                format!("database {collection} does not exist"),
            )
        })?;
        database.insert(id.to_string(), doc);
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<serde_json::Value, StoreError> {
        let mut state = self.state.lock().await;
        state.record("get_document", collection, Some(id));
        state
            .databases
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
