// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted entities and their state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a [`VectorIndex`].
///
/// ```text
/// PROVISIONING --(create succeeds)--> AVAILABLE --(reserved by a KB)--> ASSIGNED --(KB deleted)--> CLEANUP --(remote delete)--> [removed]
///      |                                                                                              ^
///      +--(create fails / stuck past threshold)--> FAILED -------------------------------------------+
/// ```
///
/// `FAILED` and a stuck `PROVISIONING` row are both swept into `CLEANUP` by
/// the sweep; `CLEANUP` is a staging state, not a sink — the row is removed
/// once the remote index has been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum VectorIndexStatus {
    /// Row reserved, remote `create_index` call in flight or not yet made.
    Provisioning,
    /// Remote index exists and is unassigned; part of the warm pool.
    Available,
    /// Reserved by exactly one knowledge base.
    Assigned,
    /// Marked for teardown; the remote index may still exist.
    Cleanup,
    /// Remote `create_index` failed permanently.
    Failed,
}

impl VectorIndexStatus {
    /// String form used in SQL literals and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Available => "AVAILABLE",
            Self::Assigned => "ASSIGNED",
            Self::Cleanup => "CLEANUP",
            Self::Failed => "FAILED",
        }
    }
}

/// A single vector-search index, backed by a remote cloud resource.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VectorIndex {
    /// Primary key.
    pub id: Uuid,
    /// ARN of the remote vector index. Unique; present even while
    /// `PROVISIONING` so a failed finalize can still issue a compensating
    /// delete.
    pub index_arn: String,
    /// ARN of the vector bucket this index was created in.
    pub bucket_arn: String,
    /// Current lifecycle state.
    pub status: VectorIndexStatus,
    /// When the row was created (used to detect stuck `PROVISIONING` rows).
    pub created_at: DateTime<Utc>,
    /// When the row was last transitioned.
    pub updated_at: DateTime<Utc>,
}

/// A knowledge base owned by a tenant, backed by exactly one
/// [`VectorIndex`] for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeBase {
    /// Primary key.
    pub id: Uuid,
    /// Owning tenant.
    pub user_id: Uuid,
    /// Tenant-chosen display name.
    pub name: String,
    /// The vector index backing this knowledge base.
    pub vector_index_id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Per-document outcome of the ingestion pipeline feeding a knowledge
/// base. The consumer that writes these rows from queue results is out of
/// this crate's scope; the shape is owned here because the provisioner's
/// cleanup sweep reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentLinkStatus {
    /// Ingestion job has not yet reported an outcome.
    Pending,
    /// Document successfully ingested into the index.
    Success,
    /// Ingestion failed for this document.
    Failed,
}

/// A document's membership in a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeBaseDocument {
    /// Primary key.
    pub id: Uuid,
    /// The knowledge base this document is linked into.
    pub knowledge_base_id: Uuid,
    /// The document, as registered in [`DocumentRegistry`].
    pub document_id: Uuid,
    /// Outcome of the ingestion job for this document.
    pub status: DocumentLinkStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Outcome of a document-level operation (ingestion or deletion) recorded
/// against a tenant's uploaded file, independent of any one knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentOpStatus {
    /// Job accepted but not yet resolved.
    Pending,
    /// Job completed successfully.
    Success,
    /// Job failed.
    Failed,
}

/// A tenant's uploaded file, opaque to the provisioner except through its
/// links into [`KnowledgeBaseDocument`] rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentRegistry {
    /// Primary key.
    pub id: Uuid,
    /// Owning tenant.
    pub user_id: Uuid,
    /// Original file name.
    pub file_name: String,
    /// Key in the object store.
    pub object_key: String,
    /// True while an ingestion or deletion job holds the document locked.
    pub lock_status: bool,
    /// Outcome of the most recent job against this document.
    pub op_status: DocumentOpStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts over [`VectorIndex`] rows, used to decide how many new
/// indexes the provisioner needs to bring the pool back to its floor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Rows currently `AVAILABLE`.
    pub available_count: i64,
    /// Rows currently `PROVISIONING` (optionally windowed by a time
    /// threshold — see [`crate::persistence::index_repo::IndexRepository::pool_stats`]).
    pub provisioning_count: i64,
    /// Rows currently `FAILED`.
    pub failed_count: i64,
    /// Rows currently `CLEANUP`.
    pub cleanup_count: i64,
    /// Rows currently `ASSIGNED`.
    pub assigned_count: i64,
}

impl PoolStats {
    /// `available + provisioning` — the count the reconcile algorithm
    /// compares against the configured floor.
    pub fn total_warm(&self) -> i64 {
        self.available_count + self.provisioning_count
    }
}
