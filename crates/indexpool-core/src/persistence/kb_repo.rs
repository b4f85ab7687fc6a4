// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence for [`KnowledgeBase`] and [`KnowledgeBaseDocument`] rows.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{ProvisionerError, Result};
use crate::models::{KnowledgeBase, KnowledgeBaseDocument};

/// Repository for `knowledge_bases` and `knowledge_base_documents`.
pub struct KnowledgeBaseRepository {
    pool: PgPool,
}

impl KnowledgeBaseRepository {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a knowledge base row bound to an already-reserved vector
    /// index, within the same transaction as the reservation.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        name: &str,
        vector_index_id: Uuid,
    ) -> Result<KnowledgeBase> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO knowledge_bases (id, user_id, name, vector_index_id, created_at)
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(vector_index_id)
        .execute(&mut **tx)
        .await?;

        let kb: KnowledgeBase = sqlx::query_as("SELECT * FROM knowledge_bases WHERE id = $1")
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(kb)
    }

    /// List knowledge bases owned by a tenant.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<KnowledgeBase>> {
        let rows = sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fetch one knowledge base, scoped to its owning tenant.
    pub async fn get_for_user(&self, user_id: Uuid, kb_id: Uuid) -> Result<KnowledgeBase> {
        sqlx::query_as::<_, KnowledgeBase>(
            "SELECT * FROM knowledge_bases WHERE id = $1 AND user_id = $2",
        )
        .bind(kb_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ProvisionerError::NotFound {
            entity: "knowledge_base".to_string(),
            id: kb_id.to_string(),
        })
    }

    /// Delete a knowledge base row. The caller is responsible for having
    /// already moved its vector index to `CLEANUP` in the same transaction.
    pub async fn delete(&self, tx: &mut Transaction<'_, Postgres>, kb_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM knowledge_bases WHERE id = $1")
            .bind(kb_id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ProvisionerError::NotFound {
                entity: "knowledge_base".to_string(),
                id: kb_id.to_string(),
            });
        }
        Ok(())
    }

    /// List documents linked into a knowledge base, paginated.
    pub async fn list_documents(
        &self,
        kb_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<KnowledgeBaseDocument>, i64)> {
        let rows = sqlx::query_as::<_, KnowledgeBaseDocument>(
            "SELECT * FROM knowledge_base_documents
             WHERE knowledge_base_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(kb_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM knowledge_base_documents WHERE knowledge_base_id = $1",
        )
        .bind(kb_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Begin a transaction, for callers composing a reservation with the
    /// knowledge-base insert (the request facade's `create_kb`) or the
    /// delete-and-mark-cleanup pair (`delete_kb`).
    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}
