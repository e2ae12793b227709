//! Result emptiness check.
//!
//! Reads the fixed insights export and reports whether it contains any
//! data rows. A missing object and an unparseable object both leave the
//! empty flag set; only the missing object gets a distinct status.

use snafu::prelude::*;
use tracing::warn;

use crate::config::QueryConfig;
use crate::error::{AdapterError, StorageSnafu};
use crate::outcome::Outcome;
use crate::storage::StorageProvider;

/// Overrides for one emptiness check.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub key: Option<String>,
}

pub async fn run(storage: &StorageProvider, config: &QueryConfig, request: CheckRequest) -> Outcome {
    super::outcome_or_failure("check", execute(storage, config, request).await)
}

async fn execute(
    storage: &StorageProvider,
    config: &QueryConfig,
    request: CheckRequest,
) -> Result<Outcome, AdapterError> {
    let key = request.key.as_deref().unwrap_or(&config.insights_key);

    let data = match storage.get(key).await {
        Ok(data) => data,
        Err(err) if err.is_not_found() => {
            return Ok(Outcome::not_found(format!(
                "object does not exist: {}/{}",
                storage.url(),
                key
            ))
            .with("csv_is_empty", true)
            .with("bucket", storage.bucket())
            .with("key", key));
        }
        Err(err) => return Err(err).context(StorageSnafu),
    };

    let empty = match super::parse_csv(&data) {
        Ok(csv) => csv.rows.is_empty(),
        Err(err) => {
            warn!("[check] could not parse '{}': {}", key, err);
            true
        }
    };

    let message = if empty {
        format!("'{key}' has no data rows")
    } else {
        format!("'{key}' contains data")
    };
    Ok(Outcome::ok(message)
        .with("csv_is_empty", empty)
        .with("bucket", storage.bucket())
        .with("key", key))
}
