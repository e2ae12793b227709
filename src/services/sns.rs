//! SNS-backed notifier.

use async_trait::async_trait;
use aws_sdk_sns::Client;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{NotifyApiSnafu, NotifyError};

use super::{Notifier, sdk_error_message};

/// Notifier implementation on aws-sdk-sns.
#[derive(Debug, Clone)]
pub struct SnsNotifier {
    client: Client,
}

impl SnsNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(
        &self,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, NotifyError> {
        let response = self
            .client
            .publish()
            .topic_arn(topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|err| {
                NotifyApiSnafu {
                    message: sdk_error_message(&err),
                }
                .build()
            })?;

        let message_id = response.message_id().unwrap_or_default().to_string();
        debug!("[sns] published message {} to {}", message_id, topic_arn);
        Ok(message_id)
    }
}
