// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Index-pool provisioner for a multi-tenant vector-search knowledge-base
//! service.
//!
//! This crate keeps a warm pool of remote vector-search indexes at a
//! configured floor, hands one out whenever a tenant creates a knowledge
//! base, and tears indexes down once their knowledge base is deleted or
//! their remote creation never completed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Host application (HTTP, CLI)                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         RequestFacade                            │
//! │        create_kb / delete_kb / list_kb / delete_document          │
//! └─────────────────────────────────────────────────────────────────┘
//!           │                           │
//!           ▼                           ▼
//! ┌─────────────────────┐   ┌─────────────────────────────────────┐
//! │  Index/KB/Document   │   │             TriggerBus               │
//! │     Repositories     │   │   coalesced reconcile/cleanup wake   │
//! └─────────────────────┘   └─────────────────────────────────────┘
//!           │                           │
//!           ▼                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Provisioner                              │
//! │     reconcile_worker (refill floor)  │  cleanup_worker (teardown) │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         CloudAdapter                              │
//! │            AWS S3 Vectors (create/delete index) + SQS             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Vector index state machine
//!
//! ```text
//! PROVISIONING --(create succeeds)--> AVAILABLE --(reserved by a KB)--> ASSIGNED --(KB deleted)--> CLEANUP --(remote delete)--> [removed]
//!      |                                                                                              ^
//!      +--(create fails / stuck past threshold)--> FAILED -------------------------------------------+
//! ```
//!
//! `PROVISIONING` rows older than `time_threshold` and orphaned `CLEANUP`
//! rows (no knowledge base references them) are swept up by the same
//! cleanup cycle that tears down `FAILED` rows.
//!
//! # Configuration
//!
//! Loaded from environment variables by [`config::Config::from_env`]:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `INDEXPOOL_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `INDEXPOOL_AWS_REGION` | Yes | - | AWS region for the vector service and queue |
//! | `INDEXPOOL_VECTOR_BUCKET_ARN` | Yes | - | ARN of the vector bucket new indexes are created in |
//! | `INDEXPOOL_VECTOR_BUCKET_NAME` | Yes | - | Name of that vector bucket |
//! | `INDEXPOOL_OBJECT_STORE_BUCKET` | Yes | - | Object-store bucket name (pass-through) |
//! | `INDEXPOOL_QUEUE_URL` | Yes | - | SQS queue URL for ingestion jobs |
//! | `INDEXPOOL_MIN_INDEX_POOL` | No | `5` | Warm-pool floor |
//! | `INDEXPOOL_MAX_INDEX_PROVISIONER` | No | `3` | Max concurrent provision/cleanup tasks |
//! | `INDEXPOOL_TIME_THRESHOLD_MINUTES` | No | `30` | Stuck-`PROVISIONING` age threshold |
//! | `INDEXPOOL_EMBEDDING_DIMENSION` | No | `1536` | Embedding dimension for new indexes |
//! | `INDEXPOOL_NON_FILTERABLE_METADATA_KEYS` | No | empty | Comma-separated metadata keys |
//! | `INDEXPOOL_DAILY_CLEANUP_TIME` | No | `08:03` | `HH:MM` time of the daily sweep |
//!
//! # Modules
//!
//! - [`config`]: environment-variable configuration
//! - [`error`]: the crate-wide error taxonomy
//! - [`models`]: persisted entities and their state machines
//! - [`cloud`]: the boundary to the remote vector-index service and queue
//! - [`persistence`]: repositories over `vector_indexes`, `knowledge_bases`,
//!   `knowledge_base_documents`, and `documents_registry`
//! - [`trigger`]: coalesced wakeup signals between the facade and the
//!   provisioner's workers
//! - [`provisioner`]: the reconcile and cleanup control loops
//! - [`scheduler`]: the daily wall-clock cleanup timer
//! - [`facade`]: the `RequestFacade` library surface
//! - [`queue`]: ingestion queue message builders
//! - [`migrations`]: embedded SQL migrations for this crate's tables

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// The boundary to the remote vector-index service and message queue.
pub mod cloud;

/// Error types for provisioner operations.
pub mod error;

/// The `RequestFacade` library surface.
pub mod facade;

/// Embedded SQL migrations for this crate's tables.
pub mod migrations;

/// Persisted entities and their state machines.
pub mod models;

/// Repositories over this crate's tables.
pub mod persistence;

/// The reconcile and cleanup control loops.
pub mod provisioner;

/// Ingestion queue message builders.
pub mod queue;

/// The daily wall-clock cleanup timer.
pub mod scheduler;

/// Coalesced wakeup signals between the facade and the provisioner.
pub mod trigger;
