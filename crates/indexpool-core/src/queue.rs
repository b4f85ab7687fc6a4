// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers for building the ingestion queue messages the request facade
//! sends after a document insert or delete. The ingestion worker that
//! consumes these messages is out of this crate's scope.

use uuid::Uuid;

use crate::cloud::{FileForIngestion, QueueMessage};

/// Build a message requesting that a set of files be ingested into a
/// knowledge base's vector index.
pub fn insert_job(
    kb_id: Uuid,
    user_id: Uuid,
    index_arn: String,
    files: Vec<FileForIngestion>,
) -> QueueMessage {
    QueueMessage {
        ingestion_job_id: Uuid::new_v4(),
        index_kb_doc_id: Some(files),
        delete_kb_doc_id: None,
        index_arn,
        kb_id,
        user_id,
    }
}

/// Build a message requesting that a set of documents be removed from a
/// knowledge base's vector index.
pub fn delete_job(
    kb_id: Uuid,
    user_id: Uuid,
    index_arn: String,
    document_ids: Vec<Uuid>,
) -> QueueMessage {
    QueueMessage {
        ingestion_job_id: Uuid::new_v4(),
        index_kb_doc_id: None,
        delete_kb_doc_id: Some(document_ids),
        index_arn,
        kb_id,
        user_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_jobs_are_mutually_exclusive() {
        let kb_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let insert = insert_job(kb_id, user_id, "arn".to_string(), vec![]);
        assert!(insert.index_kb_doc_id.is_some());
        assert!(insert.delete_kb_doc_id.is_none());

        let delete = delete_job(kb_id, user_id, "arn".to_string(), vec![Uuid::new_v4()]);
        assert!(delete.index_kb_doc_id.is_none());
        assert!(delete.delete_kb_doc_id.is_some());
    }
}
