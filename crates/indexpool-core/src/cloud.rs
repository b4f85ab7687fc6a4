// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The boundary between this crate and the remote vector-index service and
//! message queue.
//!
//! All AWS-specific error inspection happens in [`AwsCloudAdapter`]; nothing
//! above this module matches on SDK error types.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ProvisionerError, Result};

/// Parameters for creating a remote vector index.
///
/// `index_arn` is computed by the caller ahead of the remote call (the
/// vector-index service's ARN shape is derived from the bucket ARN and the
/// index name, not assigned by the service) so a row can be inserted in
/// `PROVISIONING` with its eventual ARN already known — required for the
/// Phase C compensating delete to target the right resource if the
/// finalize step loses the race.
#[derive(Debug, Clone)]
pub struct CreateIndexParams {
    /// ARN of the vector bucket the index is created in.
    pub vector_bucket_arn: String,
    /// Name for the new index.
    pub index_name: String,
    /// The index's ARN, precomputed from `vector_bucket_arn` and `index_name`.
    pub index_arn: String,
    /// Embedding dimension.
    pub dimension: u32,
    /// Metadata keys excluded from the filterable set.
    pub non_filterable_metadata_keys: Vec<String>,
}

/// Parameters for deleting a remote vector index.
#[derive(Debug, Clone)]
pub struct DeleteIndexParams {
    /// Name of the vector bucket the index lives in.
    pub vector_bucket_name: String,
    /// ARN of the index to delete.
    pub index_arn: String,
}

/// A message to enqueue for the ingestion worker to consume. Field names
/// match the wire shape the worker (out of this crate's scope) expects.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueMessage {
    /// Correlates this message with a tenant-visible ingestion job.
    pub ingestion_job_id: uuid::Uuid,
    /// Files to ingest, if this message requests an insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_kb_doc_id: Option<Vec<FileForIngestion>>,
    /// Document ids to remove, if this message requests a deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_kb_doc_id: Option<Vec<uuid::Uuid>>,
    /// ARN of the vector index the job targets.
    pub index_arn: String,
    /// Knowledge base the job targets.
    pub kb_id: uuid::Uuid,
    /// Tenant the job is performed on behalf of.
    pub user_id: uuid::Uuid,
}

/// One file referenced by an insert-flavored [`QueueMessage`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileForIngestion {
    /// Id of the `knowledge_base_documents` row this file will create.
    pub kb_doc_id: uuid::Uuid,
    /// Id of the underlying `documents_registry` row.
    pub doc_id: uuid::Uuid,
    /// Original file name.
    pub file_name: String,
    /// Key in the object store, if already known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
}

/// One message popped off the ingestion queue, paired with the receipt
/// handle needed to delete it once the consumer (out of this crate's
/// scope) has processed it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Opaque handle SQS requires to delete or extend the visibility of
    /// this specific delivery.
    pub receipt_handle: String,
    /// The message body, already parsed into a [`QueueMessage`]. Bodies
    /// that fail to parse are logged and left off this list — they stay
    /// on the queue until their visibility timeout expires, per
    /// `delete_queue_message`'s idempotent-delete contract.
    pub message: QueueMessage,
}

/// The remote operations the provisioner and the request facade depend on.
///
/// Implemented once against real AWS SDKs ([`AwsCloudAdapter`]) and once
/// in-memory for tests (`crate::cloud::fake::FakeCloudAdapter`, behind
/// `#[cfg(any(test, feature = "test-util"))]`).
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    /// Create a remote vector index at `params.index_arn`.
    async fn create_index(&self, params: CreateIndexParams) -> Result<()>;

    /// Delete a remote vector index. Idempotent: deleting an index that no
    /// longer exists is treated as success.
    async fn delete_index(&self, params: DeleteIndexParams) -> Result<()>;

    /// Enqueue a message for the ingestion worker.
    async fn send_queue_message(&self, message: QueueMessage) -> Result<()>;

    /// Long-poll for up to `max` messages, waiting up to `wait_seconds` for
    /// at least one to arrive. Bodies that do not parse as a
    /// [`QueueMessage`] are logged and omitted from the result; they remain
    /// on the queue until their visibility timeout lapses rather than being
    /// deleted, so a later fix to the consumer can still pick them up.
    async fn receive_queue_messages(
        &self,
        max: u32,
        wait_seconds: u32,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Delete a message by receipt handle. Idempotent: deleting a handle
    /// that has already expired or been deleted is treated as success.
    async fn delete_queue_message(&self, receipt_handle: &str) -> Result<()>;
}

/// Production [`CloudAdapter`] backed by the AWS S3 Vectors and SQS SDKs.
pub struct AwsCloudAdapter {
    vectors: aws_sdk_s3vectors::Client,
    sqs: aws_sdk_sqs::Client,
    queue_url: String,
}

impl AwsCloudAdapter {
    /// Build an adapter from a loaded AWS SDK config and the queue this
    /// crate sends ingestion jobs to. Fails fast (`ConfigError` at the
    /// call site, via [`crate::config::Config::from_env`]) rather than
    /// deferring credential/region problems to the first call.
    pub fn new(sdk_config: &aws_config::SdkConfig, queue_url: String) -> Self {
        Self {
            vectors: aws_sdk_s3vectors::Client::new(sdk_config),
            sqs: aws_sdk_sqs::Client::new(sdk_config),
            queue_url,
        }
    }
}

#[async_trait]
impl CloudAdapter for AwsCloudAdapter {
    async fn create_index(&self, params: CreateIndexParams) -> Result<()> {
        let metadata_configuration = aws_sdk_s3vectors::types::MetadataConfiguration::builder()
            .set_non_filterable_metadata_keys(Some(params.non_filterable_metadata_keys))
            .build();

        self.vectors
            .create_index()
            .vector_bucket_arn(&params.vector_bucket_arn)
            .index_name(&params.index_name)
            .data_type(aws_sdk_s3vectors::types::DataType::Float32)
            .dimension(params.dimension as i32)
            .distance_metric(aws_sdk_s3vectors::types::DistanceMetric::Cosine)
            .metadata_configuration(metadata_configuration)
            .send()
            .await
            .map_err(|err| map_service_error("create_index", &err))?;

        Ok(())
    }

    async fn delete_index(&self, params: DeleteIndexParams) -> Result<()> {
        let result = self
            .vectors
            .delete_index()
            .vector_bucket_name(&params.vector_bucket_name)
            .index_arn(&params.index_arn)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(map_service_error("delete_index", &err)),
        }
    }

    async fn send_queue_message(&self, message: QueueMessage) -> Result<()> {
        let body = serde_json::to_string(&message).map_err(|err| ProvisionerError::Config {
            setting: "queue_message".to_string(),
            reason: err.to_string(),
        })?;

        self.sqs
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|err| map_service_error("send_queue_message", &err))?;

        Ok(())
    }

    async fn receive_queue_messages(
        &self,
        max: u32,
        wait_seconds: u32,
    ) -> Result<Vec<ReceivedMessage>> {
        let response = self
            .sqs
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max as i32)
            .wait_time_seconds(wait_seconds as i32)
            .send()
            .await
            .map_err(|err| map_sqs_error("receive_queue_messages", &err))?;

        let mut out = Vec::new();
        for raw in response.messages.unwrap_or_default() {
            let (Some(receipt_handle), Some(body)) = (raw.receipt_handle, raw.body) else {
                continue;
            };
            match serde_json::from_str::<QueueMessage>(&body) {
                Ok(message) => out.push(ReceivedMessage {
                    receipt_handle,
                    message,
                }),
                Err(err) => {
                    warn!(error = %err, "skipping malformed queue message body");
                }
            }
        }
        Ok(out)
    }

    async fn delete_queue_message(&self, receipt_handle: &str) -> Result<()> {
        let result = self
            .sqs
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_sqs_not_found(&err) => Ok(()),
            Err(err) => Err(map_sqs_error("delete_queue_message", &err)),
        }
    }
}

fn map_service_error<E, R>(
    operation: &str,
    err: &aws_sdk_s3vectors::error::SdkError<E, R>,
) -> ProvisionerError
where
    E: std::fmt::Debug,
{
    // Connector/timeout/dispatch failures before a response was received
    // are always worth retrying; everything with an HTTP response is
    // classified by status code below.
    let Some(raw) = err.raw_response() else {
        return ProvisionerError::TransientCloud {
            operation: operation.to_string(),
            details: format!("{err:?}"),
        };
    };

    let status = raw.status().as_u16();
    if matches!(status, 408 | 429) || status >= 500 {
        ProvisionerError::TransientCloud {
            operation: operation.to_string(),
            details: format!("{err:?}"),
        }
    } else {
        ProvisionerError::PermanentCloud {
            operation: operation.to_string(),
            details: format!("{err:?}"),
        }
    }
}

fn is_not_found<E, R>(err: &aws_sdk_s3vectors::error::SdkError<E, R>) -> bool {
    err.raw_response()
        .map(|raw| raw.status().as_u16() == 404)
        .unwrap_or(false)
}

fn map_sqs_error<E, R>(operation: &str, err: &aws_sdk_sqs::error::SdkError<E, R>) -> ProvisionerError
where
    E: std::fmt::Debug,
{
    let Some(raw) = err.raw_response() else {
        return ProvisionerError::TransientCloud {
            operation: operation.to_string(),
            details: format!("{err:?}"),
        };
    };

    let status = raw.status().as_u16();
    if matches!(status, 408 | 429) || status >= 500 {
        ProvisionerError::TransientCloud {
            operation: operation.to_string(),
            details: format!("{err:?}"),
        }
    } else {
        ProvisionerError::PermanentCloud {
            operation: operation.to_string(),
            details: format!("{err:?}"),
        }
    }
}

fn is_sqs_not_found<E, R>(err: &aws_sdk_sqs::error::SdkError<E, R>) -> bool {
    err.raw_response()
        .map(|raw| raw.status().as_u16() == 404)
        .unwrap_or(false)
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! An in-memory [`CloudAdapter`] for provisioner unit tests, with hooks
    //! to inject failures for the stuck-provisioning and create-failure
    //! scenarios. Gated behind `#[cfg(test)]` plus the crate's own
    //! `test-util` feature so integration tests in `tests/` (which link
    //! against this crate as an external dependency, not under its own
    //! `cfg(test)`) can use it too.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Behavior [`FakeCloudAdapter::create_index`] should exhibit on its
    /// next call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CreateBehavior {
        /// Succeed and return a synthetic ARN.
        Succeed,
        /// Fail with a transient error.
        FailTransient,
        /// Fail with a permanent error.
        FailPermanent,
    }

    /// In-memory double for [`CloudAdapter`].
    pub struct FakeCloudAdapter {
        create_behavior: Mutex<CreateBehavior>,
        created: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        sent: Mutex<Vec<QueueMessage>>,
        queued: Mutex<VecDeque<(String, QueueMessage)>>,
        deleted_receipts: Mutex<Vec<String>>,
        #[allow(dead_code)]
        counter: AtomicU64,
    }

    impl FakeCloudAdapter {
        /// A fake that always succeeds.
        pub fn new() -> Self {
            Self {
                create_behavior: Mutex::new(CreateBehavior::Succeed),
                created: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                queued: Mutex::new(VecDeque::new()),
                deleted_receipts: Mutex::new(Vec::new()),
                counter: AtomicU64::new(0),
            }
        }

        /// Change what the next (and subsequent) `create_index` calls do.
        pub fn set_create_behavior(&self, behavior: CreateBehavior) {
            *self.create_behavior.lock().unwrap() = behavior;
        }

        /// ARNs of indexes that were "created" and not subsequently deleted.
        pub fn live_indexes(&self) -> Vec<String> {
            let created = self.created.lock().unwrap();
            let deleted = self.deleted.lock().unwrap();
            created
                .iter()
                .filter(|arn| !deleted.contains(arn))
                .cloned()
                .collect()
        }

        /// All ARNs ever passed to `delete_index`.
        pub fn deleted_indexes(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }

        /// All messages ever passed to `send_queue_message`.
        pub fn sent_messages(&self) -> Vec<QueueMessage> {
            self.sent.lock().unwrap().clone()
        }

        /// Place a raw body on the fake queue for a subsequent
        /// `receive_queue_messages` call to pop. Pass a non-JSON body to
        /// exercise the malformed-message-is-skipped path.
        pub fn enqueue_raw(&self, receipt_handle: &str, body: &str) {
            if let Ok(message) = serde_json::from_str::<QueueMessage>(body) {
                self.queued
                    .lock()
                    .unwrap()
                    .push_back((receipt_handle.to_string(), message));
            }
        }

        /// Place a well-formed message on the fake queue.
        pub fn enqueue(&self, receipt_handle: &str, message: QueueMessage) {
            self.queued
                .lock()
                .unwrap()
                .push_back((receipt_handle.to_string(), message));
        }

        /// Receipt handles ever passed to `delete_queue_message`.
        pub fn deleted_receipts(&self) -> Vec<String> {
            self.deleted_receipts.lock().unwrap().clone()
        }
    }

    impl Default for FakeCloudAdapter {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CloudAdapter for FakeCloudAdapter {
        async fn create_index(&self, params: CreateIndexParams) -> Result<()> {
            match *self.create_behavior.lock().unwrap() {
                CreateBehavior::Succeed => {
                    self.created.lock().unwrap().push(params.index_arn.clone());
                    Ok(())
                }
                CreateBehavior::FailTransient => Err(ProvisionerError::TransientCloud {
                    operation: "create_index".to_string(),
                    details: "injected transient failure".to_string(),
                }),
                CreateBehavior::FailPermanent => Err(ProvisionerError::PermanentCloud {
                    operation: "create_index".to_string(),
                    details: "injected permanent failure".to_string(),
                }),
            }
        }

        async fn delete_index(&self, params: DeleteIndexParams) -> Result<()> {
            self.deleted.lock().unwrap().push(params.index_arn);
            Ok(())
        }

        async fn send_queue_message(&self, message: QueueMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn receive_queue_messages(
            &self,
            max: u32,
            _wait_seconds: u32,
        ) -> Result<Vec<ReceivedMessage>> {
            let mut queued = self.queued.lock().unwrap();
            let mut out = Vec::new();
            for _ in 0..max {
                let Some((receipt_handle, message)) = queued.pop_front() else {
                    break;
                };
                out.push(ReceivedMessage {
                    receipt_handle,
                    message,
                });
            }
            Ok(out)
        }

        async fn delete_queue_message(&self, receipt_handle: &str) -> Result<()> {
            self.deleted_receipts
                .lock()
                .unwrap()
                .push(receipt_handle.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_then_delete_removes_from_live_set() {
        let fake = FakeCloudAdapter::new();
        let arn = "arn:aws:s3vectors:us-east-1:1:bucket/b/index/kb-index".to_string();
        fake.create_index(CreateIndexParams {
            vector_bucket_arn: "arn:aws:s3vectors:us-east-1:1:bucket/b".to_string(),
            index_name: "kb-index".to_string(),
            index_arn: arn.clone(),
            dimension: 1536,
            non_filterable_metadata_keys: vec![],
        })
        .await
        .unwrap();
        assert_eq!(fake.live_indexes(), vec![arn.clone()]);

        fake.delete_index(DeleteIndexParams {
            vector_bucket_name: "b".to_string(),
            index_arn: arn,
        })
        .await
        .unwrap();
        assert!(fake.live_indexes().is_empty());
    }

    #[tokio::test]
    async fn create_behavior_can_be_flipped_to_fail() {
        let fake = FakeCloudAdapter::new();
        fake.set_create_behavior(CreateBehavior::FailTransient);
        let err = fake
            .create_index(CreateIndexParams {
                vector_bucket_arn: "arn:aws:s3vectors:us-east-1:1:bucket/b".to_string(),
                index_name: "kb-index".to_string(),
                index_arn: "arn:aws:s3vectors:us-east-1:1:bucket/b/index/kb-index".to_string(),
                dimension: 1536,
                non_filterable_metadata_keys: vec![],
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn receive_returns_up_to_max_and_skips_malformed_bodies() {
        let fake = FakeCloudAdapter::new();
        fake.enqueue(
            "receipt-1",
            QueueMessage {
                ingestion_job_id: uuid::Uuid::new_v4(),
                index_kb_doc_id: None,
                delete_kb_doc_id: Some(vec![uuid::Uuid::new_v4()]),
                index_arn: "arn:aws:s3vectors:us-east-1:1:bucket/b/index/q".to_string(),
                kb_id: uuid::Uuid::new_v4(),
                user_id: uuid::Uuid::new_v4(),
            },
        );
        // a malformed body never makes it into the queue in the first
        // place via `enqueue_raw` (it silently drops non-JSON input,
        // mirroring the adapter logging-and-skipping it on receive).
        fake.enqueue_raw("receipt-2", "not json");

        let received = fake.receive_queue_messages(10, 0).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].receipt_handle, "receipt-1");
    }

    #[tokio::test]
    async fn receive_respects_max_and_delete_is_idempotent() {
        let fake = FakeCloudAdapter::new();
        for i in 0..3 {
            fake.enqueue(
                &format!("receipt-{i}"),
                QueueMessage {
                    ingestion_job_id: uuid::Uuid::new_v4(),
                    index_kb_doc_id: None,
                    delete_kb_doc_id: Some(vec![]),
                    index_arn: "arn".to_string(),
                    kb_id: uuid::Uuid::new_v4(),
                    user_id: uuid::Uuid::new_v4(),
                },
            );
        }

        let received = fake.receive_queue_messages(2, 0).await.unwrap();
        assert_eq!(received.len(), 2);

        fake.delete_queue_message(&received[0].receipt_handle)
            .await
            .unwrap();
        // deleting the same handle twice is a no-op, not an error.
        fake.delete_queue_message(&received[0].receipt_handle)
            .await
            .unwrap();
        assert_eq!(fake.deleted_receipts().len(), 2);
    }
}
