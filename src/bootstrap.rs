//! Bootstrap pipeline
//!
//! Four stages, each joined before the next one starts:
//!
//! 1. `system-databases`: ensure `_users` and `_replicator` exist
//! 2. `entity-databases`: reset the four entity collections
//! 3. `reference-data`: finding views, crowdsourcers and severities
//! 4. `vulnerabilities`: vulnerabilities, resolved against stage 3 records
//!
//! The first failing task aborts its stage and the whole run.

use futures::future::try_join_all;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Instrument, info, info_span};

use crate::error::BootstrapError;
use crate::loader::{Catalog, Loader};
use crate::store::{Store, collections};
use crate::views;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    SystemDatabases,
    EntityDatabases,
    ReferenceData,
    Vulnerabilities,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::SystemDatabases => write!(f, "system-databases"),
            Stage::EntityDatabases => write!(f, "entity-databases"),
            Stage::ReferenceData => write!(f, "reference-data"),
            Stage::Vulnerabilities => write!(f, "vulnerabilities"),
        }
    }
}

/// Wall-clock seconds spent in each stage
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub system_databases: f64,
    pub entity_databases: f64,
    pub reference_data: f64,
    pub vulnerabilities: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapSummary {
    pub store: String,
    pub input_location: String,
    pub crowdsourcers: usize,
    pub severities: usize,
    pub vulnerabilities: usize,
    pub stage_timings: StageTimings,
    pub total_execution_time_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub catalog: Catalog,
    pub summary: BootstrapSummary,
}

pub struct Bootstrap {
    store: Store,
    loader: Loader,
}

impl Bootstrap {
    pub fn new(store: Store, input_dir: impl Into<PathBuf>, queue_size: usize) -> Self {
        let loader = Loader::new(store.clone(), input_dir, queue_size);
        Self { store, loader }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run all four stages once.
    pub async fn run(&self) -> Result<BootstrapOutcome, BootstrapError> {
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let mut catalog = Catalog::default();

        info!(
            store = %self.store.backend_name(),
            input = %self.loader.input_dir().display(),
            max_concurrency = self.store.max_concurrency(),
            "Bootstrap started"
        );

        let stage_start = Instant::now();
        self.system_databases()
            .instrument(info_span!("stage", stage = %Stage::SystemDatabases))
            .await?;
        timings.system_databases = stage_start.elapsed().as_secs_f64();

        let stage_start = Instant::now();
        self.entity_databases()
            .instrument(info_span!("stage", stage = %Stage::EntityDatabases))
            .await?;
        timings.entity_databases = stage_start.elapsed().as_secs_f64();

        let stage_start = Instant::now();
        self.reference_data(&mut catalog)
            .instrument(info_span!("stage", stage = %Stage::ReferenceData))
            .await?;
        timings.reference_data = stage_start.elapsed().as_secs_f64();

        let stage_start = Instant::now();
        self.vulnerabilities(&mut catalog)
            .instrument(info_span!("stage", stage = %Stage::Vulnerabilities))
            .await?;
        timings.vulnerabilities = stage_start.elapsed().as_secs_f64();

        let summary = BootstrapSummary {
            store: self.store.backend_name().to_string(),
            input_location: self.loader.input_dir().display().to_string(),
            crowdsourcers: catalog.crowdsourcers.len(),
            severities: catalog.severities.len(),
            vulnerabilities: catalog.vulnerabilities.len(),
            stage_timings: timings,
            total_execution_time_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            crowdsourcers = summary.crowdsourcers,
            severities = summary.severities,
            vulnerabilities = summary.vulnerabilities,
            total_execution_seconds = summary.total_execution_time_seconds,
            "Bootstrap completed"
        );

        Ok(BootstrapOutcome { catalog, summary })
    }

    async fn system_databases(&self) -> Result<(), BootstrapError> {
        info!(databases = ?collections::SYSTEM, "Ensuring system databases");
        try_join_all(
            collections::SYSTEM
                .iter()
                .map(|name| self.store.ensure_database(name)),
        )
        .await
        .map_err(|e| BootstrapError::store(Stage::SystemDatabases, e))?;
        Ok(())
    }

    async fn entity_databases(&self) -> Result<(), BootstrapError> {
        info!(databases = ?collections::ENTITY, "Resetting entity databases");
        try_join_all(
            collections::ENTITY
                .iter()
                .map(|name| self.store.reset_database(name)),
        )
        .await
        .map_err(|e| BootstrapError::store(Stage::EntityDatabases, e))?;
        Ok(())
    }

    async fn reference_data(&self, catalog: &mut Catalog) -> Result<(), BootstrapError> {
        let stage = Stage::ReferenceData;
        let Catalog {
            crowdsourcers,
            severities,
            ..
        } = catalog;

        info!("Installing views and loading reference data");
        tokio::try_join!(
            async {
                views::install_finding_views(&self.store)
                    .await
                    .map_err(|e| BootstrapError::store(stage, e))
            },
            async {
                self.loader
                    .load_crowdsourcers(crowdsourcers)
                    .await
                    .map_err(|e| BootstrapError::load(stage, e))
            },
            async {
                self.loader
                    .load_severities(severities)
                    .await
                    .map_err(|e| BootstrapError::load(stage, e))
            },
        )?;
        Ok(())
    }

    async fn vulnerabilities(&self, catalog: &mut Catalog) -> Result<(), BootstrapError> {
        self.loader
            .load_vulnerabilities(&mut catalog.vulnerabilities)
            .await
            .map_err(|e| BootstrapError::load(Stage::Vulnerabilities, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::SystemDatabases.to_string(), "system-databases");
        assert_eq!(Stage::EntityDatabases.to_string(), "entity-databases");
        assert_eq!(Stage::ReferenceData.to_string(), "reference-data");
        assert_eq!(Stage::Vulnerabilities.to_string(), "vulnerabilities");
    }

    #[test]
    fn test_stage_serializes_kebab_case() {
        let value = serde_json::to_value(Stage::ReferenceData).unwrap();
        assert_eq!(value, "reference-data");
    }

    #[test]
    fn test_summary_serialization() {
        let summary = BootstrapSummary {
            store: "memory".to_string(),
            input_location: "input".to_string(),
            crowdsourcers: 1,
            severities: 2,
            vulnerabilities: 3,
            stage_timings: StageTimings::default(),
            total_execution_time_seconds: 0.5,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["vulnerabilities"], 3);
        assert_eq!(value["stage_timings"]["reference_data"], 0.0);
    }
}
