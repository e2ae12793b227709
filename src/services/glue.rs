//! Glue-backed crawler and ETL job services.

use async_trait::async_trait;
use aws_sdk_glue::Client;
use snafu::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{JobApiSnafu, JobError, MissingJobStatusSnafu};

use super::{CrawlStart, CrawlerService, EtlJobService, sdk_error_message};

/// Crawler and ETL job implementation on aws-sdk-glue.
#[derive(Debug, Clone)]
pub struct GlueJobs {
    client: Client,
}

impl GlueJobs {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CrawlerService for GlueJobs {
    async fn start_crawler(&self, name: &str) -> Result<CrawlStart, JobError> {
        match self.client.start_crawler().name(name).send().await {
            Ok(_) => {
                debug!("[glue] started crawler '{}'", name);
                Ok(CrawlStart::Started)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_crawler_running_exception() {
                    warn!("[glue] crawler '{}' already running", name);
                    Ok(CrawlStart::AlreadyRunning)
                } else {
                    JobApiSnafu {
                        message: sdk_error_message(&service_err),
                    }
                    .fail()
                }
            }
        }
    }
}

#[async_trait]
impl EtlJobService for GlueJobs {
    async fn start_job_run(
        &self,
        job_name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<String, JobError> {
        let mut request = self.client.start_job_run().job_name(job_name);
        for (key, value) in arguments {
            request = request.arguments(key, value);
        }

        let response = request.send().await.map_err(|err| {
            JobApiSnafu {
                message: sdk_error_message(&err),
            }
            .build()
        })?;

        let run_id = response
            .job_run_id()
            .context(MissingJobStatusSnafu { name: job_name })?;
        debug!("[glue] started job run {} for '{}'", run_id, job_name);
        Ok(run_id.to_string())
    }
}
