// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests against a real Postgres container: reservation
//! exclusivity, the knowledge-base lifecycle, and the document-conflict
//! edge case.

mod common;

use std::sync::Arc;

use indexpool_core::error::ProvisionerError;
use indexpool_core::facade::RequestFacade;
use indexpool_core::trigger::TriggerBus;
use uuid::Uuid;

use common::TestContext;

fn facade(ctx: &TestContext) -> RequestFacade {
    RequestFacade::new(
        Arc::new(ctx.index_repo()),
        Arc::new(ctx.kb_repo()),
        Arc::new(ctx.document_repo()),
        Arc::new(TriggerBus::new()),
    )
}

#[tokio::test]
async fn reserving_the_only_available_index_leaves_none_for_a_second_caller() {
    let ctx = TestContext::new().await;
    ctx.insert_available_index("arn:aws:s3vectors:us-east-1:1:bucket/b/index/only")
        .await;

    let mut tx = ctx.indexes.begin().await.unwrap();
    let reserved = ctx.indexes.reserve_available_index(&mut tx).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(reserved.status.as_str(), "ASSIGNED");

    let mut tx2 = ctx.indexes.begin().await.unwrap();
    let second = ctx.indexes.reserve_available_index(&mut tx2).await;
    assert!(matches!(second, Err(ProvisionerError::NoCapacity)));
}

#[tokio::test]
async fn concurrent_reservations_never_double_assign_the_same_row() {
    let ctx = Arc::new(TestContext::new().await);
    ctx.insert_available_index("arn:aws:s3vectors:us-east-1:1:bucket/b/index/race")
        .await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let repo = ctx.index_repo();
            let mut tx = repo.begin().await.unwrap();
            let result = repo.reserve_available_index(&mut tx).await;
            if result.is_ok() {
                tx.commit().await.unwrap();
            }
            result.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1, "exactly one concurrent reserver should win");
    assert_eq!(ctx.count_with_status("ASSIGNED").await, 1);
}

#[tokio::test]
async fn create_kb_reserves_an_index_and_delete_kb_marks_it_for_cleanup() {
    let ctx = TestContext::new().await;
    ctx.insert_available_index("arn:aws:s3vectors:us-east-1:1:bucket/b/index/kb-flow")
        .await;

    let facade = facade(&ctx);
    let user_id = Uuid::new_v4();

    let kb = facade.create_kb(user_id, "my kb").await.unwrap();
    assert_eq!(ctx.count_with_status("ASSIGNED").await, 1);

    facade.delete_kb(user_id, kb.id).await.unwrap();
    assert_eq!(ctx.count_with_status("CLEANUP").await, 1);
    assert_eq!(ctx.count_with_status("ASSIGNED").await, 0);
}

#[tokio::test]
async fn create_kb_without_capacity_returns_no_capacity() {
    let ctx = TestContext::new().await;
    let facade = facade(&ctx);

    let err = facade
        .create_kb(Uuid::new_v4(), "no capacity")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionerError::NoCapacity));
}

#[tokio::test]
async fn deleting_a_document_linked_into_a_knowledge_base_conflicts() {
    let ctx = TestContext::new().await;
    ctx.insert_available_index("arn:aws:s3vectors:us-east-1:1:bucket/b/index/doc-conflict")
        .await;

    let facade = facade(&ctx);
    let user_id = Uuid::new_v4();
    let kb = facade.create_kb(user_id, "doc-conflict-kb").await.unwrap();

    let document_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO documents_registry (id, user_id, file_name, object_key, lock_status, op_status, created_at)
         VALUES ($1, $2, 'a.txt', 'uploads/a.txt', true, 'PENDING', now())",
    )
    .bind(document_id)
    .bind(user_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO knowledge_base_documents (id, knowledge_base_id, document_id, status, created_at)
         VALUES ($1, $2, $3, 'PENDING', now())",
    )
    .bind(Uuid::new_v4())
    .bind(kb.id)
    .bind(document_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let err = facade
        .delete_document(user_id, document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionerError::Conflict { .. }));
}

#[tokio::test]
async fn unlinked_document_can_be_deleted() {
    let ctx = TestContext::new().await;
    let user_id = Uuid::new_v4();
    let document_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO documents_registry (id, user_id, file_name, object_key, lock_status, op_status, created_at)
         VALUES ($1, $2, 'b.txt', 'uploads/b.txt', true, 'PENDING', now())",
    )
    .bind(document_id)
    .bind(user_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let facade = facade(&ctx);
    facade.delete_document(user_id, document_id).await.unwrap();
}
