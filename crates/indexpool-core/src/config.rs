// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use chrono::NaiveTime;

/// indexpool-core configuration.
///
/// Deliberately narrow: this crate does not load JWT, SMTP, admin-email, or
/// project-name settings. Those belong to the host application; loading
/// them here would tie this crate's `Config` to a surface it doesn't use.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// AWS region the vector-index service and queue live in.
    pub aws_region: String,
    /// ARN of the vector bucket new indexes are created in.
    pub vector_bucket_arn: String,
    /// Name of the vector bucket (used by delete/list calls that take a
    /// bucket name rather than an ARN).
    pub vector_bucket_name: String,
    /// Name of the object-store bucket uploaded files live in. Only used
    /// to echo `object_key` into queue messages; the bucket itself is out
    /// of this crate's scope.
    pub object_store_bucket: String,
    /// URL of the SQS queue the ingestion worker consumes.
    pub queue_url: String,
    /// Floor for the warm pool of `AVAILABLE` indexes.
    pub min_index_pool: u32,
    /// Upper bound on concurrently in-flight provisioning (and cleanup)
    /// tasks per reconciliation cycle.
    pub max_index_provisioner: u32,
    /// Minutes a `PROVISIONING` row may sit before the sweep treats it as
    /// stuck and a candidate for cleanup.
    pub time_threshold_minutes: i64,
    /// Dimension of the embeddings the vector index is created for.
    pub embedding_dimension: u32,
    /// Metadata keys excluded from the vector index's filterable set.
    pub non_filterable_metadata_keys: Vec<String>,
    /// Wall-clock time of day the scheduler runs its daily cleanup sweep.
    pub daily_cleanup_time: NaiveTime,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `INDEXPOOL_DATABASE_URL`
    /// - `INDEXPOOL_AWS_REGION`
    /// - `INDEXPOOL_VECTOR_BUCKET_ARN`
    /// - `INDEXPOOL_VECTOR_BUCKET_NAME`
    /// - `INDEXPOOL_OBJECT_STORE_BUCKET`
    /// - `INDEXPOOL_QUEUE_URL`
    ///
    /// Optional (with defaults):
    /// - `INDEXPOOL_MIN_INDEX_POOL` (default: 5)
    /// - `INDEXPOOL_MAX_INDEX_PROVISIONER` (default: 3)
    /// - `INDEXPOOL_TIME_THRESHOLD_MINUTES` (default: 30)
    /// - `INDEXPOOL_EMBEDDING_DIMENSION` (default: 1536)
    /// - `INDEXPOOL_NON_FILTERABLE_METADATA_KEYS` (comma-separated, default: empty)
    /// - `INDEXPOOL_DAILY_CLEANUP_TIME` (`HH:MM`, default: `08:03`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("INDEXPOOL_DATABASE_URL")?;
        let aws_region = required("INDEXPOOL_AWS_REGION")?;
        let vector_bucket_arn = required("INDEXPOOL_VECTOR_BUCKET_ARN")?;
        let vector_bucket_name = required("INDEXPOOL_VECTOR_BUCKET_NAME")?;
        let object_store_bucket = required("INDEXPOOL_OBJECT_STORE_BUCKET")?;
        let queue_url = required("INDEXPOOL_QUEUE_URL")?;

        let min_index_pool = parse_with_default("INDEXPOOL_MIN_INDEX_POOL", 5u32)?;
        let max_index_provisioner = parse_with_default("INDEXPOOL_MAX_INDEX_PROVISIONER", 3u32)?;
        let time_threshold_minutes =
            parse_with_default("INDEXPOOL_TIME_THRESHOLD_MINUTES", 30i64)?;
        let embedding_dimension = parse_with_default("INDEXPOOL_EMBEDDING_DIMENSION", 1536u32)?;

        let non_filterable_metadata_keys = std::env::var("INDEXPOOL_NON_FILTERABLE_METADATA_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let daily_cleanup_time = std::env::var("INDEXPOOL_DAILY_CLEANUP_TIME")
            .ok()
            .map(|raw| {
                NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|_| {
                    ConfigError::Invalid("INDEXPOOL_DAILY_CLEANUP_TIME", "must be HH:MM")
                })
            })
            .transpose()?
            .unwrap_or_else(|| NaiveTime::from_hms_opt(8, 3, 0).unwrap());

        if min_index_pool == 0 {
            return Err(ConfigError::Invalid(
                "INDEXPOOL_MIN_INDEX_POOL",
                "must be at least 1",
            ));
        }
        if max_index_provisioner == 0 {
            return Err(ConfigError::Invalid(
                "INDEXPOOL_MAX_INDEX_PROVISIONER",
                "must be at least 1",
            ));
        }

        Ok(Self {
            database_url,
            aws_region,
            vector_bucket_arn,
            vector_bucket_name,
            object_store_bucket,
            queue_url,
            min_index_pool,
            max_index_provisioner,
            time_threshold_minutes,
            embedding_dimension,
            non_filterable_metadata_keys,
            daily_cleanup_time,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_with_default<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a valid number")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_cleanup_time_parses_hh_mm() {
        let t = NaiveTime::parse_from_str("08:03", "%H:%M").unwrap();
        assert_eq!(t.format("%H:%M").to_string(), "08:03");
    }
}
