//! External service seams.
//!
//! Every managed service the pipeline talks to sits behind a trait so
//! adapters can be exercised against in-memory fakes. The AWS-backed
//! implementations live in the submodules and hold nothing but an SDK
//! client; all names and destinations come in as arguments.

mod athena;
mod glue;
mod mysql;
mod provision;
mod sagemaker;
mod sns;

pub use athena::AthenaQueryEngine;
pub use glue::GlueJobs;
pub use mysql::MySqlTableStore;
pub use provision::AwsInfrastructure;
pub use sagemaker::SageMakerJobs;
pub use sns::SnsNotifier;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::{DatabaseConfig, ServingConfig};
use crate::error::{DatabaseError, JobError, NotifyError, ProvisionError, QueryError};
use crate::outcome::Provisioned;
use crate::poll::StatusClass;

/// Opaque handle for one query execution.
///
/// Obtained from a start call and valid for exactly one poll sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status of a query execution.
#[derive(Debug, Clone)]
pub struct QueryStatus {
    pub class: StatusClass,
    /// Provider state name (SUCCEEDED, FAILED, CANCELLED, ...).
    pub state: String,
    /// Where the engine wrote the result object, if known.
    pub output_location: Option<String>,
    /// Failure reason, if the provider reported one.
    pub reason: Option<String>,
}

/// Interactive query engine: submit SQL, poll by execution id.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn start_query(
        &self,
        sql: &str,
        database: &str,
        output_location: &str,
    ) -> Result<QueryHandle, QueryError>;

    async fn query_status(&self, handle: &QueryHandle) -> Result<QueryStatus, QueryError>;
}

/// Result of a crawler start call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStart {
    /// This call started the crawler.
    Started,
    /// The crawler was already running; a recoverable alternate outcome.
    AlreadyRunning,
}

/// Catalog crawler service.
#[async_trait]
pub trait CrawlerService: Send + Sync {
    async fn start_crawler(&self, name: &str) -> Result<CrawlStart, JobError>;
}

/// Managed ETL job service (fire-and-forget job runs).
#[async_trait]
pub trait EtlJobService: Send + Sync {
    /// Start a job run; returns the run id.
    async fn start_job_run(
        &self,
        job_name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<String, JobError>;
}

/// Specification for a managed training/processing job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub role_arn: String,
    pub image_uri: String,
    pub entrypoint: Vec<String>,
    /// Object URL of the script mounted into the container.
    pub code_url: String,
    /// Object URL of the input data.
    pub input_url: String,
    /// Object URL prefix the job uploads its output to.
    pub output_url: String,
    pub instance_type: String,
    pub instance_count: i32,
    pub volume_gb: i32,
}

/// Status of a managed training/processing job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub class: StatusClass,
    /// Provider state name (Completed, Failed, Stopped, ...).
    pub state: String,
    /// Failure reason on non-success, if the provider reported one.
    pub failure_reason: Option<String>,
}

/// Managed training/processing job service.
#[async_trait]
pub trait TrainingJobService: Send + Sync {
    async fn create_job(&self, spec: &JobSpec) -> Result<(), JobError>;

    async fn job_status(&self, name: &str) -> Result<JobStatus, JobError>;
}

/// Notification service.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a message; returns the provider's message id.
    async fn publish(
        &self,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, NotifyError>;
}

/// Relational table store used by the bulk loader.
///
/// The endpoint host is an argument because it is only known after the
/// managed instance is described. All columns are text; rows are
/// inserted one statement at a time in input order with a single commit
/// at the end.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn ensure_database(&self, host: &str, database: &str) -> Result<(), DatabaseError>;

    async fn load_rows(
        &self,
        host: &str,
        database: &str,
        table: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<u64, DatabaseError>;
}

/// Identifiers of a newly created load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerInfo {
    pub arn: String,
    pub dns_name: String,
}

/// Infrastructure provisioning APIs.
///
/// Creation calls are idempotent-by-classification: a provider "already
/// exists" fault becomes `Provisioned::AlreadyExists`, every other error
/// stays an `Err`.
#[async_trait]
pub trait Infrastructure: Send + Sync {
    async fn create_db_instance(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Provisioned, ProvisionError>;

    /// Endpoint address of a database instance, `None` if the instance
    /// does not exist.
    async fn db_endpoint(&self, instance_id: &str) -> Result<Option<String>, ProvisionError>;

    /// Id of the account's default VPC, if any.
    async fn default_vpc(&self) -> Result<Option<String>, ProvisionError>;

    /// Subnet ids in a VPC.
    async fn vpc_subnets(&self, vpc_id: &str) -> Result<Vec<String>, ProvisionError>;

    /// Default-for-AZ subnet ids across the account.
    async fn default_subnets(&self) -> Result<Vec<String>, ProvisionError>;

    /// Security group id by name within a VPC, `None` if absent.
    async fn security_group_id(
        &self,
        name: &str,
        vpc_id: &str,
    ) -> Result<Option<String>, ProvisionError>;

    /// Target group ARN by name, `None` if absent.
    async fn target_group_arn(&self, name: &str) -> Result<Option<String>, ProvisionError>;

    async fn create_target_group(
        &self,
        config: &ServingConfig,
        vpc_id: &str,
    ) -> Result<Provisioned<String>, ProvisionError>;

    async fn create_load_balancer(
        &self,
        name: &str,
        subnet_ids: &[String],
        security_group_id: &str,
    ) -> Result<Provisioned<LoadBalancerInfo>, ProvisionError>;

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        port: i32,
        target_group_arn: &str,
    ) -> Result<Provisioned<String>, ProvisionError>;

    async fn create_auto_scaling_group(
        &self,
        config: &ServingConfig,
        subnet_ids_csv: &str,
    ) -> Result<Provisioned, ProvisionError>;
}

/// Render an SDK error with its full source chain.
///
/// The top-level `SdkError` display alone ("service error") hides the
/// fault code and message the provider returned.
pub(crate) fn sdk_error_message<E: std::error::Error>(err: &E) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
