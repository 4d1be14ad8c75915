//! Read-through accessors
//!
//! Each call fetches the record from the store. The in-memory `Catalog`
//! filled by the loaders is never consulted, so a successful lookup also
//! proves the record has been committed.

use tracing::debug;

use crate::error::StoreError;
use crate::models::{Crowdsourcer, Severity, Vulnerability};
use crate::store::{Store, collections};

pub async fn get_crowdsourcer(store: &Store, id: &str) -> Result<Crowdsourcer, StoreError> {
    debug!(id = %id, "Fetching crowdsourcer");
    store.get_document(collections::CROWDSOURCER, id).await
}

pub async fn get_severity(store: &Store, id: &str) -> Result<Severity, StoreError> {
    debug!(id = %id, "Fetching severity");
    store.get_document(collections::SEVERITY, id).await
}

pub async fn get_vulnerability(store: &Store, id: &str) -> Result<Vulnerability, StoreError> {
    debug!(id = %id, "Fetching vulnerability");
    store.get_document(collections::VULNERABILITY, id).await
}
