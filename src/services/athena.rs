//! Athena-backed query engine.

use async_trait::async_trait;
use aws_sdk_athena::Client;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{MissingExecutionIdSnafu, MissingExecutionSnafu, QueryApiSnafu, QueryError};
use crate::poll::StatusClass;

use super::{QueryEngine, QueryHandle, QueryStatus, sdk_error_message};

/// Query engine implementation on aws-sdk-athena.
#[derive(Debug, Clone)]
pub struct AthenaQueryEngine {
    client: Client,
}

impl AthenaQueryEngine {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn classify(state: &QueryExecutionState) -> StatusClass {
    match state {
        QueryExecutionState::Succeeded => StatusClass::Succeeded,
        QueryExecutionState::Failed => StatusClass::Failed,
        QueryExecutionState::Cancelled => StatusClass::Cancelled,
        // QUEUED, RUNNING, and anything the SDK does not model yet
        _ => StatusClass::Running,
    }
}

#[async_trait]
impl QueryEngine for AthenaQueryEngine {
    async fn start_query(
        &self,
        sql: &str,
        database: &str,
        output_location: &str,
    ) -> Result<QueryHandle, QueryError> {
        let response = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(QueryExecutionContext::builder().database(database).build())
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .send()
            .await
            .map_err(|err| {
                QueryApiSnafu {
                    message: sdk_error_message(&err),
                }
                .build()
            })?;

        let id = response
            .query_execution_id()
            .context(MissingExecutionIdSnafu)?;
        debug!("[athena] started query execution {}", id);
        Ok(QueryHandle::new(id))
    }

    async fn query_status(&self, handle: &QueryHandle) -> Result<QueryStatus, QueryError> {
        let response = self
            .client
            .get_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|err| {
                QueryApiSnafu {
                    message: sdk_error_message(&err),
                }
                .build()
            })?;

        let execution = response.query_execution().context(MissingExecutionSnafu {
            id: handle.as_str(),
        })?;

        let state = execution
            .status()
            .and_then(|status| status.state())
            .cloned()
            .unwrap_or(QueryExecutionState::Queued);

        let reason = execution
            .status()
            .and_then(|status| status.state_change_reason())
            .map(str::to_string);

        let output_location = execution
            .result_configuration()
            .and_then(|rc| rc.output_location())
            .map(str::to_string);

        Ok(QueryStatus {
            class: classify(&state),
            state: state.as_str().to_string(),
            output_location,
            reason,
        })
    }
}
