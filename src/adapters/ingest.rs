//! Ingestion trigger.
//!
//! Checks that the ETL output landed under the processed prefix, then
//! starts the catalog crawler over it. A missing prefix or object is a
//! `not_found` outcome, not an error; a crawler that is already running
//! is `already_running`.

use snafu::prelude::*;
use tracing::info;

use crate::config::IngestConfig;
use crate::error::{AdapterError, JobSnafu, StorageSnafu};
use crate::outcome::Outcome;
use crate::services::{CrawlStart, CrawlerService};
use crate::storage::StorageProvider;

/// Overrides for one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Source object name; the processed copy is expected under the
    /// configured prefix.
    pub object: Option<String>,
}

pub async fn run(
    storage: &StorageProvider,
    crawler: &dyn CrawlerService,
    config: &IngestConfig,
    request: IngestRequest,
) -> Outcome {
    super::outcome_or_failure("ingest", execute(storage, crawler, config, request).await)
}

async fn execute(
    storage: &StorageProvider,
    crawler: &dyn CrawlerService,
    config: &IngestConfig,
    request: IngestRequest,
) -> Result<Outcome, AdapterError> {
    let object = request.object.as_deref().unwrap_or(&config.source_object);
    let key = format!("{}{}", config.processed_prefix, object);
    let object_url = format!("{}/{}", storage.url(), key);

    info!(
        "[ingest] checking for objects under '{}' in bucket '{}'",
        config.processed_prefix,
        storage.bucket()
    );
    let processed = storage
        .list(&config.processed_prefix)
        .await
        .context(StorageSnafu)?;
    if processed.is_empty() {
        return Ok(Outcome::not_found(format!(
            "no objects under '{}' in bucket '{}'",
            config.processed_prefix,
            storage.bucket()
        )));
    }
    info!("[ingest] found {} processed objects", processed.len());

    if !storage.exists(&key).await.context(StorageSnafu)? {
        return Ok(
            Outcome::not_found(format!("object does not exist: {object_url}"))
                .with("s3_path", object_url.as_str()),
        );
    }

    match crawler
        .start_crawler(&config.crawler)
        .await
        .context(JobSnafu)?
    {
        CrawlStart::Started => {
            info!("[ingest] started crawler '{}'", config.crawler);
            Ok(
                Outcome::ok(format!("started crawler '{}'", config.crawler))
                    .with("s3_path", object_url),
            )
        }
        CrawlStart::AlreadyRunning => {
            info!("[ingest] crawler '{}' is already running", config.crawler);
            Ok(
                Outcome::already_running(format!(
                    "crawler '{}' is already running",
                    config.crawler
                ))
                .with("s3_path", object_url),
            )
        }
    }
}
