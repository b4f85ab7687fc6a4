// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence for `documents_registry` rows.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ProvisionerError, Result};
use crate::models::DocumentRegistry;

/// Repository for `documents_registry`.
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch one document, scoped to its owning tenant.
    pub async fn get_for_user(&self, user_id: Uuid, document_id: Uuid) -> Result<DocumentRegistry> {
        sqlx::query_as::<_, DocumentRegistry>(
            "SELECT * FROM documents_registry WHERE id = $1 AND user_id = $2",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ProvisionerError::NotFound {
            entity: "document".to_string(),
            id: document_id.to_string(),
        })
    }

    /// Hard-delete a document. Fails with [`ProvisionerError::Conflict`] if
    /// it is still referenced by any `knowledge_base_documents` row — a
    /// linked document cannot be deleted out from under the knowledge base
    /// it belongs to.
    pub async fn delete(&self, user_id: Uuid, document_id: Uuid) -> Result<()> {
        let linked: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM knowledge_base_documents WHERE document_id = $1)",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;

        if linked.0 {
            return Err(ProvisionerError::Conflict {
                reason: format!("document '{document_id}' is linked into a knowledge base"),
            });
        }

        let result = sqlx::query(
            "DELETE FROM documents_registry
             WHERE id = $1 AND user_id = $2 AND op_status = 'PENDING' AND lock_status = true",
        )
        .bind(document_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ProvisionerError::NotFound {
                entity: "document".to_string(),
                id: document_id.to_string(),
            });
        }
        Ok(())
    }
}
