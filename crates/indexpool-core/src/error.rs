// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error taxonomy for indexpool-core.
//!
//! A single crate-wide error type carrying the stable error kinds the rest
//! of the system (cycles, the request facade, a host HTTP layer) switches
//! on. Vendor-specific codes are mapped onto this taxonomy once, at the
//! [`crate::cloud`] boundary; nothing above that layer inspects AWS error
//! codes directly.

use std::fmt;

/// Result type using [`ProvisionerError`].
pub type Result<T> = std::result::Result<T, ProvisionerError>;

/// Stable error kinds shared across the provisioner, the repositories, and
/// the request facade.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ProvisionerError {
    /// No `AVAILABLE` vector index existed to reserve. The caller may
    /// retry after a reconcile cycle has had a chance to run.
    NoCapacity,

    /// A cloud call failed in a way retry is likely to resolve (timeout,
    /// throttling, connection reset).
    TransientCloud {
        /// The operation that failed, e.g. `"create_index"`.
        operation: String,
        /// Details from the underlying SDK error.
        details: String,
    },

    /// A cloud call failed in a way retrying will not fix (access denied,
    /// validation, malformed ARN).
    PermanentCloud {
        /// The operation that failed.
        operation: String,
        /// Details from the underlying SDK error.
        details: String,
    },

    /// The database and the remote resource view disagree (e.g. a
    /// `PROVISIONING` row vanished mid-finalize). Always logged at
    /// critical severity; the periodic sweep is the backstop for recovery.
    Inconsistency {
        /// What was being reconciled when the disagreement was found.
        context: String,
    },

    /// The caller attempted an operation an invariant forbids, e.g.
    /// deleting a document still referenced by a knowledge base.
    Conflict {
        /// Human-readable description of the violated invariant.
        reason: String,
    },

    /// The target entity does not exist for the calling tenant.
    NotFound {
        /// Kind of entity, e.g. `"knowledge_base"`.
        entity: String,
        /// Its id, rendered as a string.
        id: String,
    },

    /// Required configuration (credentials, ARNs, connection strings) is
    /// missing or malformed. Non-recoverable at runtime.
    Config {
        /// The setting that is missing or invalid.
        setting: String,
        /// Why it is invalid.
        reason: String,
    },

    /// A database operation failed for a reason not covered above.
    Database {
        /// The operation that failed.
        operation: String,
        /// Details from the underlying driver error.
        details: String,
    },
}

impl ProvisionerError {
    /// Machine-readable error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCapacity => "NO_CAPACITY",
            Self::TransientCloud { .. } => "TRANSIENT_CLOUD_ERROR",
            Self::PermanentCloud { .. } => "PERMANENT_CLOUD_ERROR",
            Self::Inconsistency { .. } => "INCONSISTENCY",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether the *caller* should retry the operation that produced this
    /// error (a cycle keeps running regardless of this value — it only
    /// governs whether a single request-facade call is worth repeating).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoCapacity | Self::TransientCloud { .. } | Self::Database { .. }
        )
    }
}

impl fmt::Display for ProvisionerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCapacity => write!(f, "no available vector index to reserve"),
            Self::TransientCloud { operation, details } => {
                write!(f, "transient error during '{operation}': {details}")
            }
            Self::PermanentCloud { operation, details } => {
                write!(f, "permanent error during '{operation}': {details}")
            }
            Self::Inconsistency { context } => {
                write!(f, "database/remote inconsistency: {context}")
            }
            Self::Conflict { reason } => write!(f, "conflict: {reason}"),
            Self::NotFound { entity, id } => write!(f, "{entity} '{id}' not found"),
            Self::Config { setting, reason } => {
                write!(f, "invalid configuration for '{setting}': {reason}")
            }
            Self::Database { operation, details } => {
                write!(f, "database error during '{operation}': {details}")
            }
        }
    }
}

impl std::error::Error for ProvisionerError {}

impl From<sqlx::Error> for ProvisionerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProvisionerError::NoCapacity.is_retryable());
        assert!(
            ProvisionerError::TransientCloud {
                operation: "create_index".into(),
                details: "throttled".into(),
            }
            .is_retryable()
        );
        assert!(
            !ProvisionerError::PermanentCloud {
                operation: "create_index".into(),
                details: "access denied".into(),
            }
            .is_retryable()
        );
        assert!(!ProvisionerError::Conflict { reason: "x".into() }.is_retryable());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ProvisionerError::NoCapacity.code(), "NO_CAPACITY");
        assert_eq!(
            ProvisionerError::NotFound {
                entity: "knowledge_base".into(),
                id: "7".into(),
            }
            .code(),
            "NOT_FOUND"
        );
        assert_eq!(
            ProvisionerError::Conflict { reason: "x".into() }.code(),
            "CONFLICT"
        );
    }

    #[test]
    fn display_includes_context() {
        let err = ProvisionerError::NotFound {
            entity: "knowledge_base".into(),
            id: "kb-1".into(),
        };
        assert_eq!(err.to_string(), "knowledge_base 'kb-1' not found");
    }
}
