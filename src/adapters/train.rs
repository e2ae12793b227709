//! Training adapter.
//!
//! Creates a managed training job under a timestamped name, waits for it
//! to reach a terminal state, then optionally crawls the model output and
//! publishes a completion notification. The notification is best-effort
//! here; a delivery failure never masks the job result.

use async_trait::async_trait;
use chrono::Utc;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{NotifyConfig, TrainingConfig};
use crate::error::{AdapterError, JobSnafu};
use crate::outcome::Outcome;
use crate::poll::{StatusClass, StatusSource, poll_until_terminal};
use crate::services::{CrawlStart, CrawlerService, JobSpec, JobStatus, Notifier, TrainingJobService};

const NOTIFY_SUBJECT: &str = "Training Job Status";

pub async fn run(
    jobs: &dyn TrainingJobService,
    crawler: &dyn CrawlerService,
    notifier: &dyn Notifier,
    config: &TrainingConfig,
    notify: &NotifyConfig,
    cancel: &CancellationToken,
) -> Outcome {
    super::outcome_or_failure(
        "train",
        execute(jobs, crawler, notifier, config, notify, cancel).await,
    )
}

struct JobStatusSource<'a> {
    jobs: &'a dyn TrainingJobService,
    name: String,
}

#[async_trait]
impl StatusSource for JobStatusSource<'_> {
    type Status = JobStatus;
    type Error = AdapterError;

    async fn fetch(&mut self) -> Result<(StatusClass, JobStatus), AdapterError> {
        let status = self.jobs.job_status(&self.name).await.context(JobSnafu)?;
        Ok((status.class, status))
    }
}

async fn execute(
    jobs: &dyn TrainingJobService,
    crawler: &dyn CrawlerService,
    notifier: &dyn Notifier,
    config: &TrainingConfig,
    notify: &NotifyConfig,
    cancel: &CancellationToken,
) -> Result<Outcome, AdapterError> {
    // Timestamped names keep reruns from colliding with earlier jobs.
    let job_name = format!(
        "{}-{}",
        config.job_name_prefix,
        Utc::now().format("%Y-%m-%d-%H-%M-%S")
    );

    let spec = JobSpec {
        name: job_name.clone(),
        role_arn: config.role_arn.clone(),
        image_uri: config.image_uri.clone(),
        entrypoint: config.entrypoint.clone(),
        code_url: config.code_url.clone(),
        input_url: config.input_url.clone(),
        output_url: config.output_url.clone(),
        instance_type: config.instance_type.clone(),
        instance_count: config.instance_count,
        volume_gb: config.volume_gb,
    };

    jobs.create_job(&spec).await.context(JobSnafu)?;
    info!("[train] created job '{}'", job_name);

    let mut source = JobStatusSource {
        jobs,
        name: job_name.clone(),
    };
    let terminal = poll_until_terminal(&mut source, config.poll_policy(), cancel).await?;
    info!(
        "[train] job '{}' finished in state {} after {} status checks",
        job_name, terminal.status.state, terminal.polls
    );

    if terminal.class == StatusClass::Succeeded {
        if let Some(model_crawler) = &config.model_crawler {
            match crawler
                .start_crawler(model_crawler)
                .await
                .context(JobSnafu)?
            {
                CrawlStart::Started => info!("[train] started crawler '{}'", model_crawler),
                CrawlStart::AlreadyRunning => {
                    info!("[train] crawler '{}' is already running", model_crawler)
                }
            }
        }

        publish(notifier, notify, config, &job_name, "completed", None).await;

        Ok(
            Outcome::ok(format!("training job '{job_name}' completed"))
                .with("job_name", job_name.as_str())
                .with("state", terminal.status.state.as_str())
                .with("polls", terminal.polls),
        )
    } else {
        publish(
            notifier,
            notify,
            config,
            &job_name,
            "failed",
            terminal.status.failure_reason.as_deref(),
        )
        .await;

        let mut outcome = Outcome::failed(format!(
            "training job '{}' finished in state {}",
            job_name, terminal.status.state
        ))
        .with("job_name", job_name.as_str())
        .with("state", terminal.status.state.as_str());
        if let Some(reason) = &terminal.status.failure_reason {
            outcome = outcome.with("reason", reason.as_str());
        }
        Ok(outcome)
    }
}

async fn publish(
    notifier: &dyn Notifier,
    notify: &NotifyConfig,
    config: &TrainingConfig,
    job_name: &str,
    verb: &str,
    reason: Option<&str>,
) {
    if !config.notify_on_completion {
        return;
    }
    let message = match reason {
        Some(reason) => format!("Training job {job_name} {verb}: {reason}"),
        None => format!("Training job {job_name} {verb}."),
    };
    if let Err(err) = notifier
        .publish(&notify.topic_arn, NOTIFY_SUBJECT, &message)
        .await
    {
        warn!("[train] completion notification failed: {err}");
    }
}
