//! Completion notification.
//!
//! The one adapter that propagates errors instead of folding them into a
//! failure outcome: a lost notification should surface as an invocation
//! error so the invoker's retry policy applies.

use snafu::prelude::*;
use tracing::info;

use crate::config::{NotifyConfig, QueryConfig, StorageConfig};
use crate::error::{AdapterError, NotifySnafu};
use crate::outcome::Outcome;
use crate::services::Notifier;

pub async fn run(
    notifier: &dyn Notifier,
    notify: &NotifyConfig,
    storage: &StorageConfig,
    query: &QueryConfig,
) -> Result<Outcome, AdapterError> {
    let message = format!(
        "The CSV file s3://{}/{} has been generated and contains content. Setup is complete.",
        storage.results_bucket, query.price_range_key
    );

    info!("[notify] publishing to {}", notify.topic_arn);
    let message_id = notifier
        .publish(&notify.topic_arn, &notify.subject, &message)
        .await
        .context(NotifySnafu)?;
    info!("[notify] published message {}", message_id);

    Ok(Outcome::ok("notification sent")
        .with("message_id", message_id)
        .with("topic_arn", notify.topic_arn.as_str()))
}
