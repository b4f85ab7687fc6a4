// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Request Facade: the library surface a host application (an HTTP
//! layer, a CLI, a test harness) calls into. It composes the repositories
//! and the trigger bus; it owns no background tasks of its own.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{KnowledgeBase, KnowledgeBaseDocument};
use crate::persistence::{DocumentRepository, IndexRepository, KnowledgeBaseRepository};
use crate::trigger::TriggerBus;

/// Entry point for knowledge-base and document operations. Every mutating
/// call that changes the shape of the pool fires the matching trigger so
/// the provisioner's workers pick up the change without waiting out the
/// idle interval.
pub struct RequestFacade {
    indexes: Arc<IndexRepository>,
    knowledge_bases: Arc<KnowledgeBaseRepository>,
    documents: Arc<DocumentRepository>,
    triggers: Arc<TriggerBus>,
}

impl RequestFacade {
    /// Construct a facade over the given repositories and trigger bus.
    pub fn new(
        indexes: Arc<IndexRepository>,
        knowledge_bases: Arc<KnowledgeBaseRepository>,
        documents: Arc<DocumentRepository>,
        triggers: Arc<TriggerBus>,
    ) -> Self {
        Self {
            indexes,
            knowledge_bases,
            documents,
            triggers,
        }
    }

    /// Create a knowledge base for `user_id`, reserving one `AVAILABLE`
    /// vector index and transitioning it to `ASSIGNED` in the same
    /// transaction as the insert. Fires `trigger_reconcile` regardless of
    /// outcome: a pool at its floor still wants to refill after one
    /// reservation leaves it one short, and a [`crate::error::ProvisionerError::NoCapacity`]
    /// result is itself the signal that a reconcile cycle is overdue.
    #[instrument(skip(self))]
    pub async fn create_kb(&self, user_id: Uuid, name: &str) -> Result<KnowledgeBase> {
        let mut tx = self.indexes.begin().await?;

        let reservation = self.indexes.reserve_available_index(&mut tx).await;
        self.triggers.trigger_reconcile();
        let index = reservation?;

        let kb = self
            .knowledge_bases
            .insert(&mut tx, user_id, name, index.id)
            .await?;

        tx.commit().await?;
        Ok(kb)
    }

    /// Delete a knowledge base: mark its vector index `CLEANUP` and remove
    /// the knowledge-base row in one transaction, then fire
    /// `trigger_cleanup` so the index is torn down promptly instead of
    /// waiting for the daily sweep.
    #[instrument(skip(self))]
    pub async fn delete_kb(&self, user_id: Uuid, kb_id: Uuid) -> Result<()> {
        let kb = self.knowledge_bases.get_for_user(user_id, kb_id).await?;

        let mut tx = self.indexes.begin().await?;
        self.indexes.mark_cleanup(kb.vector_index_id, &mut tx).await?;
        self.knowledge_bases.delete(&mut tx, kb_id).await?;
        tx.commit().await?;

        self.triggers.trigger_cleanup();
        Ok(())
    }

    /// List knowledge bases owned by `user_id`.
    pub async fn list_kb(&self, user_id: Uuid) -> Result<Vec<KnowledgeBase>> {
        self.knowledge_bases.list_for_user(user_id).await
    }

    /// List documents linked into a knowledge base, scoped to its owner.
    pub async fn list_kb_docs(
        &self,
        user_id: Uuid,
        kb_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<KnowledgeBaseDocument>, i64)> {
        self.knowledge_bases.get_for_user(user_id, kb_id).await?;
        self.knowledge_bases.list_documents(kb_id, limit, offset).await
    }

    /// Delete a tenant's uploaded document. Fails with
    /// [`crate::error::ProvisionerError::Conflict`] if it is still linked
    /// into a knowledge base.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, user_id: Uuid, document_id: Uuid) -> Result<()> {
        self.documents.delete(user_id, document_id).await
    }
}
