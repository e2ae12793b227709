//! Configuration parsing and validation.
//!
//! Every bucket, key, table, job, and topic name the pipeline touches is
//! explicit configuration loaded at process start; adapters receive it as
//! arguments, never as ambient globals. Defaults reproduce the literal
//! values the pipeline stages agreed on out-of-band, so a config file only
//! needs to override what differs per deployment.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyQueryDatabaseSnafu, EmptyRawBucketSnafu, EmptyResultsBucketSnafu,
    EmptyTopicArnSnafu, EnvInterpolationSnafu, OutputLocationOutsideResultsSnafu, ReadFileSnafu,
    YamlParseSnafu,
};
use crate::poll::PollPolicy;

/// Main configuration structure for the pipeline runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub etl: EtlConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub serving: ServingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Object storage buckets shared by the pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding the raw and processed source data.
    #[serde(default = "default_raw_bucket")]
    pub raw_bucket: String,
    /// Bucket holding query results; every fixed-location key lives here.
    #[serde(default = "default_results_bucket")]
    pub results_bucket: String,
    /// Storage options (credentials, region, endpoint, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_bucket: default_raw_bucket(),
            results_bucket: default_results_bucket(),
            storage_options: HashMap::new(),
        }
    }
}

fn default_raw_bucket() -> String {
    "raw-data-sc171".to_string()
}

fn default_results_bucket() -> String {
    "myresult-sc171".to_string()
}

/// Ingestion trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Catalog crawler to start once processed data is present.
    #[serde(default = "default_crawler")]
    pub crawler: String,
    /// Source object name; the processed copy is expected under the prefix.
    #[serde(default = "default_source_object")]
    pub source_object: String,
    /// Prefix the ETL job writes processed objects under.
    #[serde(default = "default_processed_prefix")]
    pub processed_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            crawler: default_crawler(),
            source_object: default_source_object(),
            processed_prefix: default_processed_prefix(),
        }
    }
}

fn default_crawler() -> String {
    "data_crawler".to_string()
}

fn default_source_object() -> String {
    "airbnb_ratings_new.csv".to_string()
}

fn default_processed_prefix() -> String {
    "processed/".to_string()
}

/// ETL job trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Name of the managed ETL job to start.
    #[serde(default = "default_etl_job")]
    pub job_name: String,
    /// Passed to the job as `--input_path`.
    #[serde(default = "default_etl_input")]
    pub input_path: String,
    /// Passed to the job as `--output_path`.
    #[serde(default = "default_etl_input")]
    pub output_path: String,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            job_name: default_etl_job(),
            input_path: default_etl_input(),
            output_path: default_etl_input(),
        }
    }
}

fn default_etl_job() -> String {
    "etl_job".to_string()
}

fn default_etl_input() -> String {
    "s3://raw-data-sc171/airbnb_ratings_new.csv".to_string()
}

/// Query engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Catalog database the queries run against.
    #[serde(default = "default_query_database")]
    pub database: String,
    /// Where the engine writes raw result objects (s3:// URL).
    #[serde(default = "default_output_location")]
    pub output_location: String,
    /// Seconds between status checks.
    #[serde(default = "default_query_poll_secs")]
    pub poll_interval_secs: u64,
    /// Maximum status checks before giving up (unbounded when absent).
    #[serde(default)]
    pub max_polls: Option<u32>,
    /// Fixed key for the feature-extraction export.
    #[serde(default = "default_ml_data_key")]
    pub ml_data_key: String,
    /// Fixed key for the property insights aggregate.
    #[serde(default = "default_insights_key")]
    pub insights_key: String,
    /// Fixed key for the price range aggregate.
    #[serde(default = "default_price_range_key")]
    pub price_range_key: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            database: default_query_database(),
            output_location: default_output_location(),
            poll_interval_secs: default_query_poll_secs(),
            max_polls: None,
            ml_data_key: default_ml_data_key(),
            insights_key: default_insights_key(),
            price_range_key: default_price_range_key(),
        }
    }
}

fn default_query_database() -> String {
    "data_db".to_string()
}

fn default_output_location() -> String {
    "s3://myresult-sc171/".to_string()
}

fn default_query_poll_secs() -> u64 {
    2
}

fn default_ml_data_key() -> String {
    "ml_data.csv".to_string()
}

fn default_insights_key() -> String {
    "property_insights.csv".to_string()
}

fn default_price_range_key() -> String {
    "price_range.csv".to_string()
}

/// Managed training job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Job names are `<prefix>-<UTC timestamp>` so reruns never collide.
    #[serde(default = "default_job_prefix")]
    pub job_name_prefix: String,
    /// Execution role passed to the job service.
    #[serde(default)]
    pub role_arn: String,
    /// Container image running the training script.
    #[serde(default = "default_training_image")]
    pub image_uri: String,
    /// Container entrypoint.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: Vec<String>,
    /// Object URL of the training script.
    #[serde(default = "default_code_url")]
    pub code_url: String,
    /// Object URL of the training input data (the fixed query export).
    #[serde(default = "default_training_input")]
    pub input_url: String,
    /// Object URL prefix the fitted model is uploaded to.
    #[serde(default = "default_training_output")]
    pub output_url: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_instance_count")]
    pub instance_count: i32,
    #[serde(default = "default_volume_gb")]
    pub volume_gb: i32,
    /// Seconds between status checks.
    #[serde(default = "default_training_poll_secs")]
    pub poll_interval_secs: u64,
    /// Maximum status checks before giving up (unbounded when absent).
    #[serde(default)]
    pub max_polls: Option<u32>,
    /// Crawler to start over the model output once the job succeeds.
    #[serde(default)]
    pub model_crawler: Option<String>,
    /// Publish a notification when the job reaches a terminal state.
    #[serde(default)]
    pub notify_on_completion: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            job_name_prefix: default_job_prefix(),
            role_arn: String::new(),
            image_uri: default_training_image(),
            entrypoint: default_entrypoint(),
            code_url: default_code_url(),
            input_url: default_training_input(),
            output_url: default_training_output(),
            instance_type: default_instance_type(),
            instance_count: default_instance_count(),
            volume_gb: default_volume_gb(),
            poll_interval_secs: default_training_poll_secs(),
            max_polls: None,
            model_crawler: None,
            notify_on_completion: false,
        }
    }
}

fn default_job_prefix() -> String {
    "ml-process-job".to_string()
}

fn default_training_image() -> String {
    "683313688378.dkr.ecr.us-east-1.amazonaws.com/sagemaker-scikit-learn:1.2-1".to_string()
}

fn default_entrypoint() -> Vec<String> {
    vec![
        "python3".to_string(),
        "/opt/ml/processing/input/code/ml_code.py".to_string(),
    ]
}

fn default_code_url() -> String {
    "s3://my-code-sc171/ml_code.py".to_string()
}

fn default_training_input() -> String {
    "s3://myresult-sc171/ml_data.csv".to_string()
}

fn default_training_output() -> String {
    "s3://ml-model-sc171/".to_string()
}

fn default_instance_type() -> String {
    "ml.m5.large".to_string()
}

fn default_instance_count() -> i32 {
    1
}

fn default_volume_gb() -> i32 {
    20
}

fn default_training_poll_secs() -> u64 {
    30
}

/// Managed relational database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Managed instance identifier.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Database (schema) name created on first load.
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_engine")]
    pub engine: String,
    #[serde(default = "default_db_class")]
    pub instance_class: String,
    #[serde(default = "default_allocated_storage")]
    pub allocated_storage_gb: i32,
    /// Security group attached to a newly created instance.
    #[serde(default)]
    pub security_group_id: Option<String>,
    /// Subnet group for a newly created instance.
    #[serde(default = "default_subnet_group")]
    pub subnet_group: Option<String>,
    /// Table the property insights export loads into.
    #[serde(default = "default_insights_table")]
    pub insights_table: String,
    /// Table the price range export loads into.
    #[serde(default = "default_price_range_table")]
    pub price_range_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            db_name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            engine: default_db_engine(),
            instance_class: default_db_class(),
            allocated_storage_gb: default_allocated_storage(),
            security_group_id: None,
            subnet_group: default_subnet_group(),
            insights_table: default_insights_table(),
            price_range_table: default_price_range_table(),
        }
    }
}

fn default_instance_id() -> String {
    "myresult-db".to_string()
}

fn default_db_name() -> String {
    "myresult".to_string()
}

fn default_db_user() -> String {
    "admin".to_string()
}

fn default_db_engine() -> String {
    "mysql".to_string()
}

fn default_db_class() -> String {
    "db.t3.micro".to_string()
}

fn default_allocated_storage() -> i32 {
    20
}

fn default_subnet_group() -> Option<String> {
    Some("public-db-subnet-group".to_string())
}

fn default_insights_table() -> String {
    "property_insights".to_string()
}

fn default_price_range_table() -> String {
    "price_range".to_string()
}

/// Serving infrastructure (load balancer, target group, autoscaling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    #[serde(default = "default_load_balancer")]
    pub load_balancer: String,
    #[serde(default = "default_target_group")]
    pub target_group: String,
    /// Security group name looked up in the default VPC.
    #[serde(default = "default_serving_sg")]
    pub security_group: String,
    /// Listener port on the load balancer.
    #[serde(default = "default_listener_port")]
    pub listener_port: i32,
    /// Port the target group forwards to on instances.
    #[serde(default = "default_target_port")]
    pub target_port: i32,
    #[serde(default = "default_asg_name")]
    pub asg_name: String,
    #[serde(default = "default_launch_template")]
    pub launch_template: String,
    #[serde(default = "default_min_size")]
    pub min_size: i32,
    #[serde(default = "default_max_size")]
    pub max_size: i32,
    #[serde(default = "default_min_size")]
    pub desired_capacity: i32,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            load_balancer: default_load_balancer(),
            target_group: default_target_group(),
            security_group: default_serving_sg(),
            listener_port: default_listener_port(),
            target_port: default_target_port(),
            asg_name: default_asg_name(),
            launch_template: default_launch_template(),
            min_size: default_min_size(),
            max_size: default_max_size(),
            desired_capacity: default_min_size(),
        }
    }
}

fn default_load_balancer() -> String {
    "alm-ml-sc171".to_string()
}

fn default_target_group() -> String {
    "ml-tg-sc171".to_string()
}

fn default_serving_sg() -> String {
    "ml_sg".to_string()
}

fn default_listener_port() -> i32 {
    80
}

fn default_target_port() -> i32 {
    8000
}

fn default_asg_name() -> String {
    "asg_ml".to_string()
}

fn default_launch_template() -> String {
    "ml_web".to_string()
}

fn default_min_size() -> i32 {
    1
}

fn default_max_size() -> i32 {
    2
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Topic every pipeline notification is published to.
    #[serde(default)]
    pub topic_arn: String,
    /// Subject for the pipeline-complete notification.
    #[serde(default = "default_notify_subject")]
    pub subject: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            topic_arn: String::new(),
            subject: default_notify_subject(),
        }
    }
}

fn default_notify_subject() -> String {
    "CSV File Processed Successfully".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment
    /// variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            let result = vars::interpolate(&content);
            if !result.is_ok() {
                let error_msg = result.errors.join("\n");
                return EnvInterpolationSnafu { message: error_msg }.fail();
            }
            result.text
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.storage.raw_bucket.is_empty(), EmptyRawBucketSnafu);
        ensure!(
            !self.storage.results_bucket.is_empty(),
            EmptyResultsBucketSnafu
        );
        ensure!(!self.query.database.is_empty(), EmptyQueryDatabaseSnafu);
        // Query results are copied within the results bucket, so the
        // engine's output location must live there too.
        let results_url = format!("s3://{}", self.storage.results_bucket);
        ensure!(
            self.query
                .output_location
                .strip_prefix(&results_url)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
            OutputLocationOutsideResultsSnafu {
                location: self.query.output_location.as_str(),
                bucket: self.storage.results_bucket.as_str(),
            }
        );
        if self.training.notify_on_completion {
            ensure!(!self.notify.topic_arn.is_empty(), EmptyTopicArnSnafu);
        }
        Ok(())
    }

}

impl QueryConfig {
    /// Poll policy for query executions.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.poll_interval_secs), self.max_polls)
    }
}

impl TrainingConfig {
    /// Poll policy for training jobs.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.poll_interval_secs), self.max_polls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_pipeline_literals() {
        let config = Config::default();
        assert_eq!(config.storage.raw_bucket, "raw-data-sc171");
        assert_eq!(config.storage.results_bucket, "myresult-sc171");
        assert_eq!(config.ingest.crawler, "data_crawler");
        assert_eq!(config.ingest.processed_prefix, "processed/");
        assert_eq!(config.query.ml_data_key, "ml_data.csv");
        assert_eq!(config.query.poll_interval_secs, 2);
        assert_eq!(config.training.poll_interval_secs, 30);
        assert_eq!(config.database.insights_table, "property_insights");
        assert_eq!(config.serving.target_port, 8000);
        assert!(config.query.max_polls.is_none());
    }

    #[test]
    fn test_validate_ties_output_location_to_results_bucket() {
        let mut config = Config::default();
        config.storage.results_bucket = "other-results".to_string();
        assert!(config.validate().is_err());

        config.query.output_location = "s3://other-results/athena/".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
storage:
  raw_bucket: listings-raw
  results_bucket: listings-results

query:
  database: analytics
  poll_interval_secs: 5
  max_polls: 60

notify:
  topic_arn: arn:aws:sns:us-east-1:000000000000:query_result
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.raw_bucket, "listings-raw");
        assert_eq!(config.query.database, "analytics");
        assert_eq!(config.query.max_polls, Some(60));
        // untouched sections fall back to defaults
        assert_eq!(config.ingest.crawler, "data_crawler");
        assert_eq!(config.database.instance_id, "myresult-db");
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_empty_buckets() {
        let mut config = Config::default();
        config.storage.raw_bucket.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRawBucket)
        ));
    }

    #[test]
    fn test_notify_on_completion_requires_topic() {
        let mut config = Config::default();
        config.training.notify_on_completion = true;
        assert!(matches!(config.validate(), Err(ConfigError::EmptyTopicArn)));

        config.notify.topic_arn = "arn:aws:sns:us-east-1:000000000000:t".to_string();
        config.validate().unwrap();
    }
}
