// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for indexpool-core.
//!
//! This module exposes embedded migrations that can be run programmatically.
//! A product embedding this crate can call [`run`] to set up (or update)
//! the tables this crate owns: `vector_indexes`, `knowledge_bases`,
//! `knowledge_base_documents`, and `documents_registry`.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use indexpool_core::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

/// PostgreSQL migrator with all of this crate's migrations embedded.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Run all pending migrations. Safe to call multiple times; already-
/// applied migrations are skipped.
pub async fn run(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
