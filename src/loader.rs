//! Bulk loaders for the reference data files
//!
//! Each loader streams its source file, records every row in the caller's
//! id -> record map (last row wins on repeated ids) and upserts it into the
//! matching collection.

pub mod source;

use csv::StringRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::lookup;
use crate::models::{Crowdsourcer, Severity, Vulnerability};
use crate::store::{Store, collections};
use source::SourceRow;

/// The three source files and the collections they feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Crowdsourcer,
    Severity,
    Vulnerability,
}

impl SourceKind {
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Crowdsourcer => "crowdsourcer.csv",
            Self::Severity => "severity.csv",
            Self::Vulnerability => "vulnerability.csv",
        }
    }

    pub const fn collection(self) -> &'static str {
        match self {
            Self::Crowdsourcer => collections::CROWDSOURCER,
            Self::Severity => collections::SEVERITY,
            Self::Vulnerability => collections::VULNERABILITY,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// In-memory id -> record maps built by the loaders.
///
/// Owned by the bootstrap and rebuilt from scratch on every run. The store
/// stays the source of truth; `lookup` never reads from here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub crowdsourcers: HashMap<String, Crowdsourcer>,
    pub severities: HashMap<String, Severity>,
    pub vulnerabilities: HashMap<String, Vulnerability>,
}

impl SourceRow for Crowdsourcer {
    const FIELDS: usize = 2;

    fn from_record(record: &StringRecord, _line: u64) -> Self {
        Self {
            id: field(record, 0),
            name: field(record, 1),
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl SourceRow for Severity {
    const FIELDS: usize = 3;

    fn from_record(record: &StringRecord, line: u64) -> Self {
        let raw_karma = record.get(2).unwrap_or("");
        let karma = raw_karma.parse::<i64>().unwrap_or_else(|_| {
            warn!(
                line = line,
                id = record.get(0).unwrap_or(""),
                karma = %raw_karma,
                "Unparsable karma, using 0"
            );
            0
        });

        Self {
            id: field(record, 0),
            name: field(record, 1),
            karma,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// A vulnerability row before its references are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnerabilityRow {
    pub id: String,
    pub crowdsourcer_id: String,
    pub severity_id: String,
}

impl SourceRow for VulnerabilityRow {
    const FIELDS: usize = 3;

    fn from_record(record: &StringRecord, _line: u64) -> Self {
        Self {
            id: field(record, 0),
            crowdsourcer_id: field(record, 1),
            severity_id: field(record, 2),
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}

fn field(record: &StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

pub struct Loader {
    store: Store,
    input_dir: PathBuf,
    queue_size: usize,
}

impl Loader {
    pub fn new(store: Store, input_dir: impl Into<PathBuf>, queue_size: usize) -> Self {
        Self {
            store,
            input_dir: input_dir.into(),
            queue_size,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn source_path(&self, kind: SourceKind) -> PathBuf {
        self.input_dir.join(kind.file_name())
    }

    pub async fn load_crowdsourcers(
        &self,
        into: &mut HashMap<String, Crowdsourcer>,
    ) -> Result<usize, LoadError> {
        self.load_records(SourceKind::Crowdsourcer, into).await
    }

    pub async fn load_severities(
        &self,
        into: &mut HashMap<String, Severity>,
    ) -> Result<usize, LoadError> {
        self.load_records(SourceKind::Severity, into).await
    }

    /// Load vulnerabilities, embedding the crowdsourcer and severity fetched
    /// from the store for every row.
    ///
    /// Must only run once both reference loads have committed.
    pub async fn load_vulnerabilities(
        &self,
        into: &mut HashMap<String, Vulnerability>,
    ) -> Result<usize, LoadError> {
        let kind = SourceKind::Vulnerability;
        let path = self.source_path(kind);
        info!(kind = %kind, path = %path.display(), "Loading source file");

        into.clear();
        let mut rows = source::stream_rows::<VulnerabilityRow>(path.clone(), self.queue_size);
        let mut count = 0usize;

        while let Some(row) = rows.next().await {
            let row = row?;
            let (crowdsourcer, severity) = tokio::try_join!(
                lookup::get_crowdsourcer(&self.store, &row.crowdsourcer_id),
                lookup::get_severity(&self.store, &row.severity_id),
            )
            .inspect_err(|e| {
                warn!(
                    id = %row.id,
                    crowdsourcer_id = %row.crowdsourcer_id,
                    severity_id = %row.severity_id,
                    error = %e,
                    "Failed to resolve vulnerability references"
                );
            })?;

            let vulnerability = Vulnerability {
                id: row.id,
                crowdsourcer,
                severity,
            };
            into.insert(vulnerability.id.clone(), vulnerability.clone());
            self.store
                .put_document(kind.collection(), &vulnerability.id, &vulnerability)
                .await?;
            count += 1;
        }
        rows.finish().await?;

        info!(
            kind = %kind,
            rows = count,
            records = into.len(),
            "Source file loaded"
        );
        Ok(count)
    }

    async fn load_records<R>(
        &self,
        kind: SourceKind,
        into: &mut HashMap<String, R>,
    ) -> Result<usize, LoadError>
    where
        R: SourceRow + Serialize + Clone,
    {
        let path = self.source_path(kind);
        info!(kind = %kind, path = %path.display(), "Loading source file");

        into.clear();
        let mut rows = source::stream_rows::<R>(path.clone(), self.queue_size);
        let mut count = 0usize;

        while let Some(row) = rows.next().await {
            let record = row?;
            let id = record.id().to_string();
            if into.insert(id.clone(), record.clone()).is_some() {
                debug!(kind = %kind, id = %id, "Repeated id, later row wins");
            }
            self.store
                .put_document(kind.collection(), &id, &record)
                .await?;
            count += 1;
        }
        rows.finish().await?;

        info!(
            kind = %kind,
            rows = count,
            records = into.len(),
            "Source file loaded"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    async fn loader_with(files: &[(&str, &str)]) -> (Loader, Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let backend = Arc::new(MemoryStore::new());
        let store = Store::new(backend.clone(), 4);
        for name in collections::ENTITY {
            store.create_database(name).await.unwrap();
        }
        (Loader::new(store, dir.path(), 8), backend, dir)
    }

    #[test]
    fn test_severity_karma_parses() {
        let sev = Severity::from_record(&record(&["sev1", "High", "100"]), 1);
        assert_eq!(sev.karma, 100);
        let sev = Severity::from_record(&record(&["sev2", "Low", "-5"]), 2);
        assert_eq!(sev.karma, -5);
    }

    #[test]
    fn test_severity_bad_karma_is_zero() {
        let sev = Severity::from_record(&record(&["sev1", "High", "lots"]), 1);
        assert_eq!(sev.karma, 0);
        assert_eq!(sev.name, "High");
    }

    #[test]
    fn test_source_paths() {
        let store = Store::new(Arc::new(MemoryStore::new()), 1);
        let loader = Loader::new(store, "/srv/input", 1);
        assert_eq!(
            loader.source_path(SourceKind::Severity),
            PathBuf::from("/srv/input/severity.csv")
        );
        assert_eq!(SourceKind::Vulnerability.to_string(), "vulnerability");
    }

    #[tokio::test]
    async fn test_repeated_ids_last_row_wins() {
        let (loader, backend, _dir) = loader_with(&[(
            "crowdsourcer.csv",
            "cs1,Alice\ncs2,Bob\ncs1,Alicia\n",
        )])
        .await;

        let mut map = HashMap::new();
        let rows = loader.load_crowdsourcers(&mut map).await.unwrap();

        assert_eq!(rows, 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map["cs1"].name, "Alicia");

        let stored = backend.documents("crowdsourcer").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored["cs1"]["name"], "Alicia");
    }

    #[tokio::test]
    async fn test_map_is_rebuilt_from_scratch() {
        let (loader, _backend, _dir) =
            loader_with(&[("severity.csv", "sev1,High,100\n")]).await;

        let mut map = HashMap::new();
        map.insert(
            "stale".to_string(),
            Severity {
                id: "stale".to_string(),
                name: "Old".to_string(),
                karma: 1,
            },
        );
        loader.load_severities(&mut map).await.unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.contains_key("sev1"));
    }

    #[tokio::test]
    async fn test_vulnerability_embeds_stored_records() {
        let (loader, _backend, _dir) = loader_with(&[
            ("crowdsourcer.csv", "cs1,\"Alice\"\n"),
            ("severity.csv", "sev1,\"High\",100\n"),
            ("vulnerability.csv", "vul1,cs1,sev1\n"),
        ])
        .await;

        let mut catalog = Catalog::default();
        loader
            .load_crowdsourcers(&mut catalog.crowdsourcers)
            .await
            .unwrap();
        loader
            .load_severities(&mut catalog.severities)
            .await
            .unwrap();
        loader
            .load_vulnerabilities(&mut catalog.vulnerabilities)
            .await
            .unwrap();

        let vul = &catalog.vulnerabilities["vul1"];
        assert_eq!(vul.crowdsourcer, catalog.crowdsourcers["cs1"]);
        assert_eq!(vul.severity, catalog.severities["sev1"]);
    }

    #[tokio::test]
    async fn test_vulnerability_with_unknown_reference_fails() {
        let (loader, backend, _dir) = loader_with(&[
            ("crowdsourcer.csv", "cs1,Alice\n"),
            ("severity.csv", "sev1,High,100\n"),
            ("vulnerability.csv", "vul1,cs9,sev1\n"),
        ])
        .await;

        let mut catalog = Catalog::default();
        loader
            .load_crowdsourcers(&mut catalog.crowdsourcers)
            .await
            .unwrap();
        loader
            .load_severities(&mut catalog.severities)
            .await
            .unwrap();
        let err = loader
            .load_vulnerabilities(&mut catalog.vulnerabilities)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "document-not-found");
        assert!(catalog.vulnerabilities.is_empty());
        assert!(backend.documents("vulnerability").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_file_fails() {
        let (loader, _backend, _dir) = loader_with(&[]).await;
        let mut map = HashMap::new();
        let err = loader.load_crowdsourcers(&mut map).await.unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
