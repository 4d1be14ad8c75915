//! Map/reduce views installed on the `finding` collection

use std::collections::BTreeMap;
use tracing::info;

use crate::error::StoreError;
use crate::models::{DesignDocument, ViewDefinition};
use crate::store::{Store, collections};

pub const FINDING_DESIGN_ID: &str = "_design/findingDesign";

/// Karma per (crowdsourcer name, severity name)
pub const FINDING_KARMA_VIEW: &str = "findingcs";

const FINDING_KARMA_MAP: &str = "function (doc) {\n  emit([doc.vulnerability.crowdsourcer.name, doc.vulnerability.severity.name], doc.vulnerability.severity.karma);\n}";

pub fn finding_design() -> DesignDocument {
    let mut views = BTreeMap::new();
    views.insert(
        FINDING_KARMA_VIEW.to_string(),
        ViewDefinition {
            map: FINDING_KARMA_MAP.to_string(),
            reduce: Some("_sum".to_string()),
        },
    );

    DesignDocument {
        id: FINDING_DESIGN_ID.to_string(),
        views,
    }
}

pub async fn install_finding_views(store: &Store) -> Result<(), StoreError> {
    let design = finding_design();
    store
        .put_document(collections::FINDING, &design.id, &design)
        .await?;
    info!(
        collection = collections::FINDING,
        design = %design.id,
        views = design.views.len(),
        "Views installed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_finding_design_document() {
        let value = serde_json::to_value(finding_design()).unwrap();
        assert_eq!(value["_id"], "_design/findingDesign");
        assert_eq!(value["views"]["findingcs"]["reduce"], "_sum");
        let map = value["views"]["findingcs"]["map"].as_str().unwrap();
        assert!(map.contains("doc.vulnerability.crowdsourcer.name"));
        assert!(map.contains("doc.vulnerability.severity.karma"));
    }

    #[tokio::test]
    async fn test_install_writes_design_document() {
        let backend = Arc::new(MemoryStore::new());
        let store = Store::new(backend.clone(), 1);
        store.create_database(collections::FINDING).await.unwrap();

        install_finding_views(&store).await.unwrap();

        let stored: DesignDocument = store
            .get_document(collections::FINDING, FINDING_DESIGN_ID)
            .await
            .unwrap();
        assert_eq!(stored, finding_design());
    }

    #[tokio::test]
    async fn test_install_requires_collection() {
        let store = Store::new(Arc::new(MemoryStore::new()), 1);
        let err = install_finding_views(&store).await.unwrap_err();
        assert_eq!(err.kind(), "store-unavailable");
    }
}
