// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence layer: one repository per entity family, each a thin
//! wrapper around a `PgPool` issuing plain SQL through sqlx.

pub mod doc_repo;
pub mod index_repo;
pub mod kb_repo;

pub use doc_repo::DocumentRepository;
pub use index_repo::IndexRepository;
pub use kb_repo::KnowledgeBaseRepository;
