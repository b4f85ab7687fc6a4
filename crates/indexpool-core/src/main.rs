// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! indexpool-core daemon.
//!
//! Runs the reconcile worker, the cleanup worker, and the daily scheduler
//! against a Postgres database and the real AWS SDKs. The `RequestFacade`
//! itself is consumed by a host application embedding this crate as a
//! library (an HTTP layer, a CLI) rather than by this binary.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use indexpool_core::cloud::AwsCloudAdapter;
use indexpool_core::config::Config;
use indexpool_core::migrations;
use indexpool_core::persistence::IndexRepository;
use indexpool_core::provisioner::{Provisioner, ProvisionerSettings};
use indexpool_core::scheduler::Scheduler;
use indexpool_core::trigger::TriggerBus;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("indexpool_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting indexpool-core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        min_index_pool = config.min_index_pool,
        max_index_provisioner = config.max_index_provisioner,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    // Verify connection
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    migrations::run(&pool).await?;
    info!("Migrations completed");

    let sdk_config = aws_config::from_env()
        .region(aws_config::Region::new(config.aws_region.clone()))
        .load()
        .await;
    let cloud = Arc::new(AwsCloudAdapter::new(&sdk_config, config.queue_url.clone()));

    let indexes = Arc::new(IndexRepository::new(pool.clone()));
    let triggers = Arc::new(TriggerBus::new());

    let settings = ProvisionerSettings {
        min_index_pool: config.min_index_pool,
        max_index_provisioner: config.max_index_provisioner,
        time_threshold: chrono::Duration::minutes(config.time_threshold_minutes),
        vector_bucket_arn: config.vector_bucket_arn.clone(),
        vector_bucket_name: config.vector_bucket_name.clone(),
        embedding_dimension: config.embedding_dimension,
        non_filterable_metadata_keys: config.non_filterable_metadata_keys.clone(),
    };

    let provisioner = Arc::new(Provisioner::new(cloud, indexes, settings, triggers));

    info!("Priming index pool...");
    if let Err(err) = provisioner.prime().await {
        error!(error = %err, "initial pool priming failed");
    }

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(config.daily_cleanup_time);

    // Start reconcile worker (refills the warm pool)
    let reconcile_handle = {
        let provisioner = provisioner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { provisioner.reconcile_worker(cancel).await })
    };

    // Start cleanup worker (tears down failed/stuck/orphaned indexes)
    let cleanup_handle = {
        let provisioner = provisioner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { provisioner.cleanup_worker(cancel).await })
    };

    // Start the daily cleanup scheduler
    let scheduler_handle = {
        let provisioner = provisioner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(&provisioner, cancel).await })
    };

    info!("indexpool-core initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    cancel.cancel();

    let _ = tokio::join!(reconcile_handle, cleanup_handle, scheduler_handle);

    info!("Shutdown complete");
    Ok(())
}
