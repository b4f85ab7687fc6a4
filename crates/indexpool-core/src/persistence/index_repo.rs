// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence for [`VectorIndex`] rows.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{ProvisionerError, Result};
use crate::models::{PoolStats, VectorIndex, VectorIndexStatus};

/// Repository for `vector_indexes`.
pub struct IndexRepository {
    pool: PgPool,
}

impl IndexRepository {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new row in `PROVISIONING`, ahead of the remote `create_index`
    /// call (Phase A of the three-phase provision). Returns the row id.
    pub async fn insert_provisioning(&self, index_arn: &str, bucket_arn: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO vector_indexes (id, index_arn, bucket_arn, status, created_at, updated_at)
             VALUES ($1, $2, $3, 'PROVISIONING', now(), now())",
        )
        .bind(id)
        .bind(index_arn)
        .bind(bucket_arn)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Guarded transition `PROVISIONING -> AVAILABLE` (Phase C). Returns
    /// `true` if the row was still `PROVISIONING` and got finalized, `false`
    /// if it had already vanished or moved to another state — the caller
    /// treats `false` as the signal to run the compensating delete.
    pub async fn finalize_available(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE vector_indexes SET status = 'AVAILABLE', updated_at = now()
             WHERE id = $1 AND status = 'PROVISIONING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a row `FAILED` (remote `create_index` itself failed, Phase B).
    pub async fn mark_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE vector_indexes SET status = 'FAILED', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a row outright, used after a compensating remote delete.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM vector_indexes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reserve one `AVAILABLE` row for a new knowledge base and transition
    /// it to `ASSIGNED`, within the caller's transaction. Uses `SELECT ...
    /// FOR UPDATE SKIP LOCKED` to pick a row no concurrent reserver already
    /// holds, then a guarded update to defend the TOCTOU window between the
    /// select and the update even under `SKIP LOCKED`.
    pub async fn reserve_available_index(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<VectorIndex> {
        let candidate: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM vector_indexes
             WHERE status = 'AVAILABLE'
             ORDER BY random()
             LIMIT 1
             FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut **tx)
        .await?;

        let Some((id,)) = candidate else {
            return Err(ProvisionerError::NoCapacity);
        };

        let result = sqlx::query(
            "UPDATE vector_indexes SET status = 'ASSIGNED', updated_at = now()
             WHERE id = $1 AND status = 'AVAILABLE'",
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(ProvisionerError::NoCapacity);
        }

        let index: VectorIndex =
            sqlx::query_as("SELECT * FROM vector_indexes WHERE id = $1")
                .bind(id)
                .fetch_one(&mut **tx)
                .await?;
        Ok(index)
    }

    /// Set a row's status to `CLEANUP` directly on the index row (not via
    /// any relationship attribute — the original implementation's bug of
    /// assigning the enum onto the ORM relationship rather than the FK
    /// row's own `status` column is not reproduced here).
    pub async fn mark_cleanup(&self, id: Uuid, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        sqlx::query(
            "UPDATE vector_indexes SET status = 'CLEANUP', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Aggregate counts over all statuses. When `time_threshold` is
    /// provided, `provisioning_count` only counts rows created at or after
    /// `now() - time_threshold` — rows older than that are "stuck" and are
    /// surfaced by [`Self::list_for_cleanup`] instead of counting toward
    /// the warm pool.
    pub async fn pool_stats(&self, time_threshold: Option<Duration>) -> Result<PoolStats> {
        let cutoff: Option<DateTime<Utc>> = time_threshold.map(|d| Utc::now() - d);

        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT
                count(*) FILTER (WHERE status = 'AVAILABLE') AS available_count,
                count(*) FILTER (WHERE status = 'PROVISIONING' AND ($1::timestamptz IS NULL OR created_at >= $1)) AS provisioning_count,
                count(*) FILTER (WHERE status = 'FAILED') AS failed_count,
                count(*) FILTER (WHERE status = 'CLEANUP') AS cleanup_count,
                count(*) FILTER (WHERE status = 'ASSIGNED') AS assigned_count
             FROM vector_indexes",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(PoolStats {
            available_count: row.0,
            provisioning_count: row.1,
            failed_count: row.2,
            cleanup_count: row.3,
            assigned_count: row.4,
        })
    }

    /// Rows the cleanup cycle should tear down: `FAILED`, `PROVISIONING`
    /// older than `stuck_threshold`, or `CLEANUP` with no knowledge base
    /// still pointing at them (an orphan left behind by a delete that
    /// crashed after marking `CLEANUP` but before the row was removed).
    pub async fn list_for_cleanup(&self, stuck_threshold: Duration) -> Result<Vec<VectorIndex>> {
        let cutoff = Utc::now() - stuck_threshold;
        let rows = sqlx::query_as::<_, VectorIndex>(
            "SELECT vi.* FROM vector_indexes vi
             LEFT JOIN knowledge_bases kb ON kb.vector_index_id = vi.id
             WHERE vi.status = 'FAILED'
                OR (vi.status = 'PROVISIONING' AND vi.created_at < $1)
                OR (vi.status = 'CLEANUP' AND kb.id IS NULL)
             GROUP BY vi.id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Begin a transaction, for callers that need to compose a reservation
    /// with another insert (the request facade's `create_kb`).
    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}
