//! ETL job trigger.
//!
//! Fire-and-forget: starts the managed ETL job with its input and output
//! paths and reports the run id. Waiting on the run is the crawler
//! trigger's problem, not this adapter's.

use snafu::prelude::*;
use std::collections::HashMap;
use tracing::info;

use crate::config::EtlConfig;
use crate::error::{AdapterError, JobSnafu};
use crate::outcome::Outcome;
use crate::services::EtlJobService;

pub async fn run(jobs: &dyn EtlJobService, config: &EtlConfig) -> Outcome {
    super::outcome_or_failure("etl", execute(jobs, config).await)
}

async fn execute(jobs: &dyn EtlJobService, config: &EtlConfig) -> Result<Outcome, AdapterError> {
    let arguments = HashMap::from([
        ("--input_path".to_string(), config.input_path.clone()),
        ("--output_path".to_string(), config.output_path.clone()),
    ]);

    let run_id = jobs
        .start_job_run(&config.job_name, &arguments)
        .await
        .context(JobSnafu)?;
    info!("[etl] started job '{}' run {}", config.job_name, run_id);

    Ok(
        Outcome::ok(format!("started ETL job '{}'", config.job_name))
            .with("job_name", config.job_name.as_str())
            .with("job_run_id", run_id),
    )
}
