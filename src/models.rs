//! Entity model for the karmafarm reference data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A crowdsourcer that vulnerabilities are credited to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crowdsourcer {
    pub id: String,
    pub name: String,
}

/// A severity level and the karma awarded for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Severity {
    pub id: String,
    pub name: String,
    pub karma: i64,
}

/// A vulnerability with value snapshots of its crowdsourcer and severity.
///
/// The snapshots are copies taken at load time; later changes to the
/// referenced records are not reflected here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub crowdsourcer: Crowdsourcer,
    pub severity: Severity,
}

/// A reported occurrence of a vulnerability.
///
/// Findings are written by the serving layer; the bootstrap only prepares the
/// `finding` collection and its aggregation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub time: DateTime<Utc>,
    pub vulnerability: Vulnerability,
}

impl Finding {
    pub fn new(id: String, vulnerability: Vulnerability) -> Self {
        Self {
            id,
            time: Utc::now(),
            vulnerability,
        }
    }

    /// Karma this finding contributes to its crowdsourcer
    pub fn karma(&self) -> i64 {
        self.vulnerability.severity.karma
    }
}

/// CouchDB design document holding map/reduce view definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub views: BTreeMap<String, ViewDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}
