//! Error types for monsoon using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase. AWS SDK errors are flattened to
//! their display chain at the service boundary since the generic
//! `SdkError<E, R>` parameters would otherwise leak into every signature.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during object storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// Local filesystem configuration error.
    #[snafu(display("Local storage configuration error"))]
    LocalConfig { source: object_store::Error },

    /// Object key is not a valid object store path.
    #[snafu(display("Invalid object key: {key}"))]
    InvalidKey {
        key: String,
        source: object_store::path::Error,
    },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Raw bucket is empty.
    #[snafu(display("storage.raw_bucket cannot be empty"))]
    EmptyRawBucket,

    /// Results bucket is empty.
    #[snafu(display("storage.results_bucket cannot be empty"))]
    EmptyResultsBucket,

    /// Query database name is empty.
    #[snafu(display("query.database cannot be empty"))]
    EmptyQueryDatabase,

    /// Notification topic is empty.
    #[snafu(display("notify.topic_arn cannot be empty"))]
    EmptyTopicArn,

    /// Query output location points outside the results bucket.
    #[snafu(display(
        "query.output_location '{location}' is outside storage.results_bucket '{bucket}'"
    ))]
    OutputLocationOutsideResults { location: String, bucket: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Query Engine Errors ============

/// Errors from the interactive query engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueryError {
    /// Query engine API call failed.
    #[snafu(display("Query engine request failed: {message}"))]
    QueryApi { message: String },

    /// The start call did not return an execution id.
    #[snafu(display("Query engine returned no execution id"))]
    MissingExecutionId,

    /// The status call returned no execution record.
    #[snafu(display("Query engine returned no status for execution {id}"))]
    MissingExecution { id: String },

    /// The result location is absent or not an s3:// URL.
    #[snafu(display("Unexpected query result location: {location}"))]
    BadResultLocation { location: String },
}

// ============ Job Errors ============

/// Errors from crawler, ETL job, and managed training job services.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    /// Job service API call failed.
    #[snafu(display("Job service request failed: {message}"))]
    JobApi { message: String },

    /// Failed to assemble the training job specification.
    #[snafu(display("Invalid training job specification"))]
    JobSpec {
        source: aws_sdk_sagemaker::error::BuildError,
    },

    /// The status call returned no job record.
    #[snafu(display("Job service returned no status for job {name}"))]
    MissingJobStatus { name: String },
}

// ============ Provisioning Errors ============

/// Errors from infrastructure provisioning APIs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisionError {
    /// Provisioning API call failed.
    #[snafu(display("Provisioning request failed: {message}"))]
    ProvisionApi { message: String },

    /// No default VPC in the account.
    #[snafu(display("No default VPC found"))]
    NoDefaultVpc,

    /// Load balancers need at least two subnets.
    #[snafu(display("Not enough subnets found: need {need}, found {found}"))]
    NotEnoughSubnets { need: usize, found: usize },

    /// No default subnets and none supplied by the caller.
    #[snafu(display("No default subnets found and no subnet_ids provided"))]
    NoSubnets,

    /// Named security group does not exist in the VPC.
    #[snafu(display("Security group '{name}' not found"))]
    SecurityGroupNotFound { name: String },

    /// Named target group does not exist.
    #[snafu(display("Target group '{name}' not found"))]
    TargetGroupNotFound { name: String },

    /// Database instance exists but has no endpoint yet.
    #[snafu(display("Database instance '{id}' has no endpoint address"))]
    MissingEndpoint { id: String },
}

// ============ Database Errors ============

/// Errors from the relational database.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    /// Failed to connect to the database.
    #[snafu(display("Database connection failed for {host}"))]
    Connect { host: String, source: sqlx::Error },

    /// A DDL or DML statement failed.
    #[snafu(display("SQL statement failed"))]
    Sql { source: sqlx::Error },
}

// ============ CSV Errors ============

/// Errors parsing delimited text objects.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CsvError {
    /// Malformed delimited text.
    #[snafu(display("Failed to parse CSV record"))]
    CsvParse { source: csv::Error },

    /// Object has no header row.
    #[snafu(display("CSV object has no header row"))]
    NoHeader,
}

// ============ Notification Errors ============

/// Errors from the notification service.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NotifyError {
    /// Publish call failed.
    #[snafu(display("Notification publish failed: {message}"))]
    NotifyApi { message: String },
}

// ============ Adapter Error (top-level) ============

/// Top-level adapter errors that aggregate all error types.
///
/// Every adapter converts this into a `Failed` outcome at its boundary
/// rather than propagating it to the invoker (the notification adapter is
/// the deliberate exception).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AdapterError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    Storage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Query engine error.
    #[snafu(display("Query engine error"))]
    Query { source: QueryError },

    /// Job service error.
    #[snafu(display("Job service error"))]
    Job { source: JobError },

    /// Provisioning error.
    #[snafu(display("Provisioning error"))]
    Provision { source: ProvisionError },

    /// Database error.
    #[snafu(display("Database error"))]
    Database { source: DatabaseError },

    /// CSV parsing error.
    #[snafu(display("CSV error"))]
    Csv { source: CsvError },

    /// Notification error.
    #[snafu(display("Notification error"))]
    Notify { source: NotifyError },

    /// Poll loop gave up after the configured number of status checks.
    #[snafu(display("Operation still running after {attempts} status checks"))]
    PollExhausted { attempts: u32 },

    /// Shutdown was requested while waiting on an external operation.
    #[snafu(display("Cancelled while waiting for external operation"))]
    Cancelled,
}

impl AdapterError {
    /// Check if this error represents a "not found" condition on storage.
    pub fn is_not_found(&self) -> bool {
        match self {
            AdapterError::Storage { source } => source.is_not_found(),
            _ => false,
        }
    }

    /// Render the full error chain as a single human-readable message.
    ///
    /// Used to populate the `message` field of failure outcomes.
    pub fn chain(&self) -> String {
        use std::error::Error;
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}

impl From<crate::poll::PollError<AdapterError>> for AdapterError {
    fn from(err: crate::poll::PollError<AdapterError>) -> Self {
        use crate::poll::PollError;
        match err {
            PollError::Status { source } => source,
            PollError::Exhausted { attempts } => AdapterError::PollExhausted { attempts },
            PollError::Cancelled => AdapterError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_includes_sources() {
        let err = AdapterError::Query {
            source: QueryError::BadResultLocation {
                location: "http://not-s3".to_string(),
            },
        };
        let chain = err.chain();
        assert!(chain.starts_with("Query engine error"));
        assert!(chain.contains("http://not-s3"));
    }

    #[test]
    fn test_not_found_classification() {
        let err = AdapterError::Storage {
            source: StorageError::ObjectStore {
                source: object_store::Error::NotFound {
                    path: "processed/data.csv".to_string(),
                    source: "missing".into(),
                },
            },
        };
        assert!(err.is_not_found());

        let other = AdapterError::Cancelled;
        assert!(!other.is_not_found());
    }
}
