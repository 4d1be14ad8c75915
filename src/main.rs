use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use karmafarm_seed::config::{Command, Config};
use karmafarm_seed::logging;
use karmafarm_seed::store::{CouchStore, DocumentStore, MemoryStore, Store};
use karmafarm_seed::{Bootstrap, BootstrapError};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();

    // Handle version subcommand
    if let Some(Command::Version) = &config.command {
        println!(
            "karmafarm-seed {}, commit: {}, build_date: {}",
            env!("CARGO_PKG_VERSION"),
            env!("VERGEN_GIT_SHA"),
            env!("VERGEN_BUILD_TIMESTAMP"),
        );
        return Ok(());
    }

    let log_location = config.log_location.as_ref().map(PathBuf::from);
    logging::init(&config.log_format, &config.log_level, log_location.as_deref())
        .context("Failed to open log file")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("VERGEN_GIT_SHA"),
        build_date = env!("VERGEN_BUILD_TIMESTAMP"),
        couchdb_url = %config.redacted_couchdb_url(),
        input_location = %config.input_location,
        max_concurrency = config.concurrency_limit(),
        queue_size = config.queue_size,
        dry_run = config.dry_run,
        "karmafarm-seed starting"
    );

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    let backend = match create_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Failed to create store client");
            std::process::exit(1);
        }
    };
    let store = Store::new(backend, config.concurrency_limit());
    let bootstrap = Bootstrap::new(store, config.input_dir(), config.queue_size);

    match bootstrap.run().await {
        Ok(outcome) => {
            let timings = &outcome.summary.stage_timings;
            info!(
                system_databases_seconds = timings.system_databases,
                entity_databases_seconds = timings.entity_databases,
                reference_data_seconds = timings.reference_data,
                vulnerabilities_seconds = timings.vulnerabilities,
                total_execution_seconds = outcome.summary.total_execution_time_seconds,
                "Execution timing summary"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            std::process::exit(1);
        }
    }
}

fn create_backend(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    if config.dry_run {
        info!("Dry run, loading into in-process store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let couch = CouchStore::new(&config.couchdb_url, config.request_timeout_secs)
        .context("Invalid CouchDB URL")?;
    info!(couchdb_url = %couch.base_url(), "CouchDB client ready");
    Ok(Arc::new(couch))
}

fn report_failure(err: &BootstrapError) {
    error!(
        status = "failed",
        stage = %err.stage(),
        kind = err.kind(),
        error = %err,
        "Bootstrap failed"
    );
}
