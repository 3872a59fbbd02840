// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Command-line entry point: run one replication pass from a config file.
//!
//! ```text
//! doc-replicator --config replicator.toml
//! RUST_LOG=doc_replicator=debug doc-replicator -c replicator.toml
//! ```
//!
//! Exits non-zero when the source is unreachable, no destination could be
//! connected, or the pass ends with a non-isolated error. Isolated failures
//! are logged and counted in the summary but do not change the exit status.

use anyhow::{bail, Context, Result};
use clap::Parser;
use doc_replicator::config::ReplicationConfig;
use doc_replicator::connection::redact_uri;
use doc_replicator::{metrics, MongoReplica, MongoSource, ReplicationEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Replicate one source database to every configured destination.
#[derive(Parser, Debug)]
#[command(name = "doc-replicator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Cli::parse();

    debug!("loading config from {:?}", args.config);
    let config = ReplicationConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let retry = config.settings.connect.retry_config();

    let source = MongoSource::connect(&config.source.uri, &config.source.database, &retry)
        .await
        .context("connecting to source")?;
    metrics::record_connection(&redact_uri(&config.source.uri), true);

    let database = config.destination_database();
    let attempts = futures::future::join_all(config.destinations.iter().map(|destination| {
        let label = destination.label();
        let retry = retry.clone();
        async move {
            let connected =
                MongoReplica::connect(&destination.uri, database, Some(&label), &retry).await;
            (label, connected)
        }
    }))
    .await;

    let mut replicas = Vec::with_capacity(attempts.len());
    for (label, connected) in attempts {
        match connected {
            Ok(replica) => {
                metrics::record_connection(&label, true);
                replicas.push(Arc::new(replica));
            }
            Err(e) => {
                metrics::record_connection(&label, false);
                warn!(destination = %label, error = %e, "Skipping unreachable destination");
            }
        }
    }
    metrics::set_connected_destinations(replicas.len());

    if replicas.is_empty() {
        error!(total = config.destinations.len(), "Failed to connect to any destination");
        bail!("no destination reachable");
    }

    let engine = ReplicationEngine::new(config.settings.clone(), Arc::new(source), replicas)?;
    let report = engine.run().await?;

    info!(
        database = %config.source.database,
        destinations = report.destinations.len(),
        documents_upserted = report.documents_upserted(),
        documents_deleted = report.documents_deleted(),
        collections_dropped = report.collections_dropped(),
        failures = report.failure_count(),
        "Sync completed"
    );

    Ok(())
}
