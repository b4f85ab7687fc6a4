// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The reconcile and cleanup control loops that keep a warm pool of
//! vector indexes at its configured floor.

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::cloud::{CloudAdapter, CreateIndexParams, DeleteIndexParams};
use crate::error::{ProvisionerError, Result};
use crate::models::VectorIndex;
use crate::persistence::IndexRepository;
use crate::trigger::TriggerBus;

const RECONCILE_IDLE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

/// Settings the provisioner needs that come from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// Floor for the warm pool of `AVAILABLE` + fresh `PROVISIONING` rows.
    pub min_index_pool: u32,
    /// Max concurrently in-flight provision/cleanup tasks per cycle.
    pub max_index_provisioner: u32,
    /// Age past which a `PROVISIONING` row is considered stuck.
    pub time_threshold: Duration,
    /// ARN of the vector bucket new indexes are created in.
    pub vector_bucket_arn: String,
    /// Name of the vector bucket (delete calls take a name, not an ARN).
    pub vector_bucket_name: String,
    /// Embedding dimension new indexes are created with.
    pub embedding_dimension: u32,
    /// Metadata keys excluded from the filterable set.
    pub non_filterable_metadata_keys: Vec<String>,
}

/// Owns the warm pool's reconcile and cleanup cycles.
pub struct Provisioner {
    cloud: Arc<dyn CloudAdapter>,
    indexes: Arc<IndexRepository>,
    settings: ProvisionerSettings,
    triggers: Arc<TriggerBus>,
}

impl Provisioner {
    /// Construct a provisioner over the given cloud adapter and index
    /// repository.
    pub fn new(
        cloud: Arc<dyn CloudAdapter>,
        indexes: Arc<IndexRepository>,
        settings: ProvisionerSettings,
        triggers: Arc<TriggerBus>,
    ) -> Self {
        Self {
            cloud,
            indexes,
            settings,
            triggers,
        }
    }

    /// Ask the reconcile worker to run a cycle as soon as it is free.
    pub fn trigger_reconcile(&self) {
        self.triggers.trigger_reconcile();
    }

    /// Ask the cleanup worker to run a cycle as soon as it is free.
    pub fn trigger_cleanup(&self) {
        self.triggers.trigger_cleanup();
    }

    /// Run one reconciliation cycle synchronously, before the workers are
    /// spawned, so the pool is never observed empty right after startup.
    pub async fn prime(&self) -> Result<()> {
        self.reconcile_once().await
    }

    /// Event-driven reconcile loop: runs a cycle, then waits for either a
    /// trigger or the idle interval to elapse, until cancelled.
    pub async fn reconcile_worker(&self, cancel: CancellationToken) {
        loop {
            if let Err(err) = self.reconcile_once().await {
                error!(error = %err, "reconcile cycle failed");
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("reconcile worker shutting down");
                    return;
                }
                _ = self.triggers.wait_reconcile() => {
                    // drain any further triggers that coalesced while we were away
                }
                _ = tokio::time::sleep(RECONCILE_IDLE_INTERVAL) => {}
            }
        }
    }

    /// Event-driven cleanup loop: waits for a trigger (fired by a knowledge
    /// base deletion, the scheduler's daily sweep, or the reconcile cycle
    /// noticing stuck rows) and runs a cycle each time, until cancelled.
    pub async fn cleanup_worker(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("cleanup worker shutting down");
                    return;
                }
                _ = self.triggers.wait_cleanup() => {}
            }

            if let Err(err) = self.cleanup_once().await {
                error!(error = %err, "cleanup cycle failed");
            }
        }
    }

    /// Run the cleanup cycle directly. Exposed so the scheduler's daily
    /// sweep can invoke it without going through the trigger bus.
    pub async fn scheduled_cleanup(&self) -> Result<()> {
        self.cleanup_once().await
    }

    #[instrument(skip(self))]
    async fn reconcile_once(&self) -> Result<()> {
        let stats = self
            .indexes
            .pool_stats(Some(self.settings.time_threshold))
            .await?;

        let need = self.settings.min_index_pool as i64 - stats.total_warm();
        if need <= 0 {
            info!(total_warm = stats.total_warm(), "pool at or above floor");
            return Ok(());
        }

        info!(need, "provisioning new indexes to reach floor");

        let semaphore = Arc::new(Semaphore::new(self.settings.max_index_provisioner as usize));
        let mut tasks = JoinSet::new();

        for _ in 0..need {
            let semaphore = semaphore.clone();
            let cloud = self.cloud.clone();
            let indexes = self.indexes.clone();
            let settings = self.settings.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                provision_new_index(cloud, indexes, settings).await
            });
        }

        let mut failures = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(error = %err, "provision task failed");
                }
                Err(join_err) => {
                    failures += 1;
                    error!(error = %join_err, "provision task panicked");
                }
            }
        }

        if failures > 0 {
            warn!(failures, need, "reconcile cycle finished with failures");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup_once(&self) -> Result<()> {
        let candidates = self
            .indexes
            .list_for_cleanup(self.settings.time_threshold)
            .await?;

        if candidates.is_empty() {
            return Ok(());
        }

        info!(count = candidates.len(), "cleaning up vector indexes");

        let semaphore = Arc::new(Semaphore::new(self.settings.max_index_provisioner as usize));
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let semaphore = semaphore.clone();
            let cloud = self.cloud.clone();
            let indexes = self.indexes.clone();
            let settings = self.settings.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                cleanup_one_index(cloud, indexes, settings, candidate).await
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "cleanup task failed");
                    failures.push(err.to_string());
                }
                Err(join_err) => {
                    error!(error = %join_err, "cleanup task panicked");
                    failures.push(join_err.to_string());
                }
            }
        }

        if !failures.is_empty() {
            warn!(failures = failures.len(), "cleanup cycle finished with failures");
            return Err(ProvisionerError::Inconsistency {
                context: format!("{} cleanup task(s) failed: {}", failures.len(), failures.join("; ")),
            });
        }

        Ok(())
    }
}

/// The three-phase commit for bringing one new vector index into the pool:
/// (A) reserve a DB row in `PROVISIONING` with its ARN already known, (B)
/// create the remote resource, (C) guarded-finalize to `AVAILABLE`.
///
/// If (B) fails, the row is marked `FAILED` and left for the cleanup sweep
/// to tear down — no compensating delete is needed since nothing was
/// created remotely. If (C)'s guarded update affects zero rows (the row
/// was deleted or changed state from under us), a compensating
/// `delete_index` runs immediately against the already-known ARN and an
/// `Inconsistency` is returned; the sweep is not relied on to rediscover an
/// orphan that, by that point, has no corresponding row.
async fn provision_new_index(
    cloud: Arc<dyn CloudAdapter>,
    indexes: Arc<IndexRepository>,
    settings: ProvisionerSettings,
) -> Result<()> {
    let index_name = format!("kb-index-{}", random_suffix(16));
    let index_arn = format!("{}/index/{}", settings.vector_bucket_arn, index_name);

    let id = indexes
        .insert_provisioning(&index_arn, &settings.vector_bucket_arn)
        .await?;

    let create_result = cloud
        .create_index(CreateIndexParams {
            vector_bucket_arn: settings.vector_bucket_arn.clone(),
            index_name: index_name.clone(),
            index_arn: index_arn.clone(),
            dimension: settings.embedding_dimension,
            non_filterable_metadata_keys: settings.non_filterable_metadata_keys.clone(),
        })
        .await;

    if let Err(err) = create_result {
        indexes.mark_failed(id).await?;
        return Err(err);
    }

    if indexes.finalize_available(id).await? {
        info!(index_id = %id, index_arn, "index provisioned");
        return Ok(());
    }

    warn!(index_id = %id, index_arn, "row vanished before finalize, issuing compensating delete");
    cloud
        .delete_index(DeleteIndexParams {
            vector_bucket_name: settings.vector_bucket_name.clone(),
            index_arn: index_arn.clone(),
        })
        .await?;

    Err(ProvisionerError::Inconsistency {
        context: format!("index '{id}' vanished between create and finalize"),
    })
}

/// Tear down one candidate index: delete the remote resource, then remove
/// the DB row. Deleting the remote resource is idempotent, so a retry
/// after a crash between the two steps is always safe.
async fn cleanup_one_index(
    cloud: Arc<dyn CloudAdapter>,
    indexes: Arc<IndexRepository>,
    settings: ProvisionerSettings,
    candidate: VectorIndex,
) -> Result<()> {
    cloud
        .delete_index(DeleteIndexParams {
            vector_bucket_name: settings.vector_bucket_name.clone(),
            index_arn: candidate.index_arn.clone(),
        })
        .await?;

    indexes.delete(candidate.id).await?;
    info!(index_id = %candidate.id, index_arn = %candidate.index_arn, "index cleaned up");
    Ok(())
}

fn random_suffix(len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_suffix_has_requested_length() {
        assert_eq!(random_suffix(16).len(), 16);
        assert!(random_suffix(16).chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn settings_clone_is_cheap_to_construct_per_task() {
        let settings = ProvisionerSettings {
            min_index_pool: 3,
            max_index_provisioner: 2,
            time_threshold: Duration::minutes(30),
            vector_bucket_arn: "arn:aws:s3vectors:us-east-1:1:bucket/b".to_string(),
            vector_bucket_name: "b".to_string(),
            embedding_dimension: 1536,
            non_filterable_metadata_keys: vec!["source".to_string()],
        };
        let cloned = settings.clone();
        assert_eq!(cloned.min_index_pool, settings.min_index_pool);
    }
}
