// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the reconcile and cleanup control loops, against a
//! real Postgres container and an in-memory [`FakeCloudAdapter`]. These
//! cover the end-to-end scenarios and invariants from spec.md §8.

mod common;

use std::sync::Arc;

use chrono::Duration;
use indexpool_core::cloud::fake::{CreateBehavior, FakeCloudAdapter};
use indexpool_core::facade::RequestFacade;
use indexpool_core::provisioner::{Provisioner, ProvisionerSettings};
use indexpool_core::trigger::TriggerBus;
use uuid::Uuid;

use common::TestContext;

fn settings(min_index_pool: u32, max_index_provisioner: u32) -> ProvisionerSettings {
    ProvisionerSettings {
        min_index_pool,
        max_index_provisioner,
        time_threshold: Duration::minutes(10),
        vector_bucket_arn: "arn:aws:s3vectors:us-east-1:1:bucket/b".to_string(),
        vector_bucket_name: "b".to_string(),
        embedding_dimension: 1536,
        non_filterable_metadata_keys: vec!["source".to_string()],
    }
}

fn provisioner(
    ctx: &TestContext,
    cloud: Arc<FakeCloudAdapter>,
    min_index_pool: u32,
    max_index_provisioner: u32,
) -> Provisioner {
    Provisioner::new(
        cloud,
        Arc::new(ctx.index_repo()),
        settings(min_index_pool, max_index_provisioner),
        Arc::new(TriggerBus::new()),
    )
}

/// S1 — cold start primes the pool: an empty DB gets exactly `MIN_POOL`
/// `AVAILABLE` rows after `prime()`, and exactly that many `create_index`
/// calls are issued.
#[tokio::test]
async fn s1_cold_start_primes_pool() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    let provisioner = provisioner(&ctx, cloud.clone(), 3, 4);

    provisioner.prime().await.unwrap();

    assert_eq!(ctx.count_with_status("AVAILABLE").await, 3);
    assert_eq!(cloud.live_indexes().len(), 3);
}

/// S2 — creating a knowledge base reserves one index (pool goes from
/// `MIN_POOL` AVAILABLE to `MIN_POOL - 1` AVAILABLE + 1 ASSIGNED); a
/// subsequent reconcile cycle brings AVAILABLE back up to the floor.
#[tokio::test]
async fn s2_kb_creation_then_reconcile_refills_pool() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    let provisioner = provisioner(&ctx, cloud.clone(), 3, 4);
    provisioner.prime().await.unwrap();
    assert_eq!(ctx.count_with_status("AVAILABLE").await, 3);

    let facade = RequestFacade::new(
        Arc::new(ctx.index_repo()),
        Arc::new(ctx.kb_repo()),
        Arc::new(ctx.document_repo()),
        Arc::new(TriggerBus::new()),
    );
    let kb = facade.create_kb(Uuid::new_v4(), "a").await.unwrap();
    assert_eq!(ctx.count_with_status("ASSIGNED").await, 1);
    assert_eq!(ctx.count_with_status("AVAILABLE").await, 2);

    provisioner.prime().await.unwrap();
    assert_eq!(ctx.count_with_status("AVAILABLE").await, 3);
    assert_eq!(ctx.count_with_status("ASSIGNED").await, 1);
    assert!(kb.vector_index_id != Uuid::nil());
}

/// S3 — remote create fails: no `AVAILABLE` row is added, the
/// `PROVISIONING` row is marked `FAILED` (this crate's chosen Phase-B
/// policy per spec.md's failure-semantics table), and the subsequent
/// cleanup cycle tears it down without ever having created a remote
/// resource.
#[tokio::test]
async fn s3_remote_create_failure_yields_no_orphan() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    cloud.set_create_behavior(CreateBehavior::FailPermanent);
    let provisioner = provisioner(&ctx, cloud.clone(), 1, 2);

    // prime() surfaces the aggregated task failure only via logs, not as
    // an error from the cycle itself (spec.md §4.4: "log and continue").
    provisioner.prime().await.unwrap();

    assert_eq!(ctx.count_with_status("AVAILABLE").await, 0);
    assert_eq!(ctx.count_with_status("FAILED").await, 1);
    assert!(cloud.live_indexes().is_empty());

    provisioner.scheduled_cleanup().await.unwrap();
    assert_eq!(ctx.count_with_status("FAILED").await, 0);
    assert!(
        cloud.live_indexes().is_empty(),
        "nothing was ever created remotely, so nothing should be live"
    );
}

/// S4 — a `PROVISIONING` row older than `T_stuck` is swept: `delete_index`
/// is called against its ARN and the row is removed, even though it was
/// never marked `FAILED`.
#[tokio::test]
async fn s4_stuck_provisioning_is_swept() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    let provisioner = provisioner(&ctx, cloud.clone(), 1, 2);

    let stuck_arn = "arn:aws:s3vectors:us-east-1:1:bucket/b/index/stuck";
    ctx.insert_stuck_provisioning(stuck_arn, Duration::minutes(20))
        .await;

    provisioner.scheduled_cleanup().await.unwrap();

    assert_eq!(ctx.count_with_status("PROVISIONING").await, 0);
    assert_eq!(cloud.deleted_indexes(), vec![stuck_arn.to_string()]);
}

/// S5 — deleting a knowledge base marks its index `CLEANUP` immediately;
/// the cleanup cycle then deletes the remote resource and removes the row.
#[tokio::test]
async fn s5_kb_delete_then_cleanup_removes_the_index() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    let arn = "arn:aws:s3vectors:us-east-1:1:bucket/b/index/kb-delete";
    ctx.insert_available_index(arn).await;

    let facade = RequestFacade::new(
        Arc::new(ctx.index_repo()),
        Arc::new(ctx.kb_repo()),
        Arc::new(ctx.document_repo()),
        Arc::new(TriggerBus::new()),
    );
    let user_id = Uuid::new_v4();
    let kb = facade.create_kb(user_id, "to-delete").await.unwrap();

    facade.delete_kb(user_id, kb.id).await.unwrap();
    assert_eq!(ctx.count_with_status("CLEANUP").await, 1);

    let provisioner = provisioner(&ctx, cloud.clone(), 0, 2);
    provisioner.scheduled_cleanup().await.unwrap();

    assert_eq!(ctx.count_with_status("CLEANUP").await, 0);
    assert_eq!(cloud.deleted_indexes(), vec![arn.to_string()]);
}

/// S6 — ten concurrent `create_kb` callers against five `AVAILABLE` rows:
/// exactly five succeed, five fail with `NoCapacity`; a subsequent
/// reconcile brings the pool back to its floor.
#[tokio::test]
async fn s6_concurrent_creators_respect_capacity_then_reconcile_refills() {
    let ctx = Arc::new(TestContext::new().await);
    for i in 0..5 {
        ctx.insert_available_index(&format!(
            "arn:aws:s3vectors:us-east-1:1:bucket/b/index/c{i}"
        ))
        .await;
    }

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let facade = RequestFacade::new(
                Arc::new(ctx.index_repo()),
                Arc::new(ctx.kb_repo()),
                Arc::new(ctx.document_repo()),
                Arc::new(TriggerBus::new()),
            );
            facade.create_kb(Uuid::new_v4(), "race").await.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 5, "exactly min(N, initial_available) should succeed");
    assert_eq!(ctx.count_with_status("ASSIGNED").await, 5);
    assert_eq!(ctx.count_with_status("AVAILABLE").await, 0);

    let cloud = Arc::new(FakeCloudAdapter::new());
    let provisioner = provisioner(&ctx, cloud.clone(), 5, 4);
    provisioner.prime().await.unwrap();
    assert_eq!(ctx.count_with_status("AVAILABLE").await, 5);
}

/// Property: cleanup safety — a `VectorIndex` row still referenced by a
/// knowledge base (`ASSIGNED`) is never a cleanup candidate, regardless of
/// how long it has existed.
#[tokio::test]
async fn property_cleanup_never_touches_an_index_referenced_by_a_kb() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    let arn = "arn:aws:s3vectors:us-east-1:1:bucket/b/index/referenced";
    ctx.insert_available_index(arn).await;

    let facade = RequestFacade::new(
        Arc::new(ctx.index_repo()),
        Arc::new(ctx.kb_repo()),
        Arc::new(ctx.document_repo()),
        Arc::new(TriggerBus::new()),
    );
    facade.create_kb(Uuid::new_v4(), "keep-me").await.unwrap();

    let provisioner = provisioner(&ctx, cloud.clone(), 0, 2);
    provisioner.scheduled_cleanup().await.unwrap();

    assert_eq!(ctx.count_with_status("ASSIGNED").await, 1);
    assert!(cloud.deleted_indexes().is_empty());
}

/// Property: idempotent cleanup — running `scheduled_cleanup` twice in a
/// row against a stable remote converges to an empty candidate set without
/// error on the second pass.
#[tokio::test]
async fn property_cleanup_is_idempotent() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    ctx.insert_stuck_provisioning(
        "arn:aws:s3vectors:us-east-1:1:bucket/b/index/idempotent",
        Duration::minutes(20),
    )
    .await;

    let provisioner = provisioner(&ctx, cloud.clone(), 0, 2);
    provisioner.scheduled_cleanup().await.unwrap();
    assert_eq!(ctx.count_with_status("PROVISIONING").await, 0);

    // second pass: nothing left to do, no error.
    provisioner.scheduled_cleanup().await.unwrap();
    assert_eq!(cloud.deleted_indexes().len(), 1, "remote delete is not reissued once the row is gone");
}

/// Property: rollback — if `create_index` fails, no `AVAILABLE` row is ever
/// produced for that attempt; the row lands in `FAILED` instead.
#[tokio::test]
async fn property_rollback_on_create_failure_never_yields_available() {
    let ctx = TestContext::new().await;
    let cloud = Arc::new(FakeCloudAdapter::new());
    cloud.set_create_behavior(CreateBehavior::FailTransient);
    let provisioner = provisioner(&ctx, cloud.clone(), 2, 4);

    provisioner.prime().await.unwrap();

    assert_eq!(ctx.count_with_status("AVAILABLE").await, 0);
    assert_eq!(ctx.count_with_status("FAILED").await, 2);
}
