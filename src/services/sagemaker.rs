//! SageMaker-backed training job service.
//!
//! The pipeline's "training job" is a managed processing job: the
//! container mounts the training script and the query export, fits the
//! model, and uploads the artifact to the output location at end of job.

use async_trait::async_trait;
use aws_sdk_sagemaker::Client;
use aws_sdk_sagemaker::types::{
    AppSpecification, ProcessingClusterConfig, ProcessingInput, ProcessingJobStatus,
    ProcessingOutput, ProcessingOutputConfig, ProcessingResources, ProcessingS3DataType,
    ProcessingS3Input, ProcessingS3InputMode, ProcessingS3Output, ProcessingS3UploadMode,
};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{JobApiSnafu, JobError, JobSpecSnafu, MissingJobStatusSnafu};
use crate::poll::StatusClass;

use super::{JobSpec, JobStatus, TrainingJobService, sdk_error_message};

const CODE_LOCAL_PATH: &str = "/opt/ml/processing/input/code/";
const INPUT_LOCAL_PATH: &str = "/opt/ml/processing/input/";
const OUTPUT_LOCAL_PATH: &str = "/opt/ml/processing/output/";

/// Training job implementation on aws-sdk-sagemaker.
#[derive(Debug, Clone)]
pub struct SageMakerJobs {
    client: Client,
}

impl SageMakerJobs {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn classify(status: &ProcessingJobStatus) -> StatusClass {
    match status {
        ProcessingJobStatus::Completed => StatusClass::Succeeded,
        ProcessingJobStatus::Failed => StatusClass::Failed,
        ProcessingJobStatus::Stopped => StatusClass::Cancelled,
        // IN_PROGRESS, STOPPING, and anything the SDK does not model yet
        _ => StatusClass::Running,
    }
}

fn s3_input(
    name: &str,
    s3_uri: &str,
    local_path: &str,
) -> Result<ProcessingInput, aws_sdk_sagemaker::error::BuildError> {
    Ok(ProcessingInput::builder()
        .input_name(name)
        .s3_input(
            ProcessingS3Input::builder()
                .s3_uri(s3_uri)
                .local_path(local_path)
                .s3_data_type(ProcessingS3DataType::S3Prefix)
                .s3_input_mode(ProcessingS3InputMode::File)
                .build()?,
        )
        .build()?)
}

#[async_trait]
impl TrainingJobService for SageMakerJobs {
    async fn create_job(&self, spec: &JobSpec) -> Result<(), JobError> {
        let app_spec = AppSpecification::builder()
            .image_uri(&spec.image_uri)
            .set_container_entrypoint(Some(spec.entrypoint.clone()))
            .build()
            .context(JobSpecSnafu)?;

        let resources = ProcessingResources::builder()
            .cluster_config(
                ProcessingClusterConfig::builder()
                    .instance_count(spec.instance_count)
                    .instance_type(spec.instance_type.as_str().into())
                    .volume_size_in_gb(spec.volume_gb)
                    .build()
                    .context(JobSpecSnafu)?,
            )
            .build()
            .context(JobSpecSnafu)?;

        let output_config = ProcessingOutputConfig::builder()
            .outputs(
                ProcessingOutput::builder()
                    .output_name("model-output")
                    .s3_output(
                        ProcessingS3Output::builder()
                            .s3_uri(&spec.output_url)
                            .local_path(OUTPUT_LOCAL_PATH)
                            .s3_upload_mode(ProcessingS3UploadMode::EndOfJob)
                            .build()
                            .context(JobSpecSnafu)?,
                    )
                    .build()
                    .context(JobSpecSnafu)?,
            )
            .build()
            .context(JobSpecSnafu)?;

        self.client
            .create_processing_job()
            .processing_job_name(&spec.name)
            .role_arn(&spec.role_arn)
            .app_specification(app_spec)
            .processing_resources(resources)
            .processing_inputs(
                s3_input("code", &spec.code_url, CODE_LOCAL_PATH).context(JobSpecSnafu)?,
            )
            .processing_inputs(
                s3_input("input-data", &spec.input_url, INPUT_LOCAL_PATH).context(JobSpecSnafu)?,
            )
            .processing_output_config(output_config)
            .send()
            .await
            .map_err(|err| {
                JobApiSnafu {
                    message: sdk_error_message(&err),
                }
                .build()
            })?;

        debug!("[sagemaker] created processing job '{}'", spec.name);
        Ok(())
    }

    async fn job_status(&self, name: &str) -> Result<JobStatus, JobError> {
        let response = self
            .client
            .describe_processing_job()
            .processing_job_name(name)
            .send()
            .await
            .map_err(|err| {
                JobApiSnafu {
                    message: sdk_error_message(&err),
                }
                .build()
            })?;

        let status = response
            .processing_job_status()
            .context(MissingJobStatusSnafu { name })?;

        Ok(JobStatus {
            class: classify(status),
            state: status.as_str().to_string(),
            failure_reason: response.failure_reason().map(str::to_string),
        })
    }
}
