//! [`QueryExecutor`] backed by the AWS SDK.

use aws_sdk_athena::operation::get_query_results::GetQueryResultsOutput;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};

use crate::{AthenaError, ExecutionStatus, QueryExecutor, QueryState, ResultPage};

/// Athena client bound to an S3 output location.
///
/// Authentication uses the standard AWS credential chain (env vars, IAM
/// role, `~/.aws/credentials`).
#[derive(Debug, Clone)]
pub struct AthenaExecutor {
    client: aws_sdk_athena::Client,
    output_location: String,
}

impl AthenaExecutor {
    /// Loads AWS configuration from the environment and builds a client.
    ///
    /// `output_location` is the `s3://` prefix Athena writes results to.
    pub async fn new(output_location: String, region: Option<String>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region));
        }

        let config = config_loader.load().await;

        Self::from_client(aws_sdk_athena::Client::new(&config), output_location)
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: aws_sdk_athena::Client, output_location: String) -> Self {
        Self {
            client,
            output_location,
        }
    }
}

const fn map_state(state: &QueryExecutionState) -> QueryState {
    match state {
        QueryExecutionState::Succeeded => QueryState::Succeeded,
        QueryExecutionState::Failed => QueryState::Failed,
        QueryExecutionState::Cancelled => QueryState::Cancelled,
        QueryExecutionState::Queued => QueryState::Queued,
        // Unrecognized states are treated as still in flight.
        _ => QueryState::Running,
    }
}

/// Converts one `GetQueryResults` response into a [`ResultPage`].
///
/// The first page of a SELECT starts with the column labels as a data
/// row; continuation pages do not.
fn page_from_output(output: &GetQueryResultsOutput, first_page: bool) -> ResultPage {
    let next_token = output.next_token().map(ToString::to_string);
    let Some(result_set) = output.result_set() else {
        return ResultPage {
            next_token,
            ..ResultPage::default()
        };
    };

    let columns = result_set
        .result_set_metadata()
        .map(|metadata| {
            metadata
                .column_info()
                .iter()
                .map(|column| column.name().to_string())
                .collect()
        })
        .unwrap_or_default();

    let rows = result_set
        .rows()
        .iter()
        .skip(usize::from(first_page))
        .map(|row| {
            row.data()
                .iter()
                .map(|datum| datum.var_char_value().map(ToString::to_string))
                .collect()
        })
        .collect();

    ResultPage {
        columns,
        rows,
        next_token,
    }
}

#[async_trait::async_trait]
impl QueryExecutor for AthenaExecutor {
    async fn start(&self, sql: &str, database: &str) -> Result<String, AthenaError> {
        let response = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(QueryExecutionContext::builder().database(database).build())
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(&self.output_location)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| AthenaError::Request {
                operation: "StartQueryExecution",
                source: Box::new(e),
            })?;

        response
            .query_execution_id()
            .map(ToString::to_string)
            .ok_or(AthenaError::MalformedResponse {
                operation: "StartQueryExecution",
                field: "QueryExecutionId",
            })
    }

    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus, AthenaError> {
        let response = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| AthenaError::Request {
                operation: "GetQueryExecution",
                source: Box::new(e),
            })?;

        let status = response
            .query_execution()
            .and_then(|execution| execution.status())
            .ok_or(AthenaError::MalformedResponse {
                operation: "GetQueryExecution",
                field: "QueryExecution.Status",
            })?;

        Ok(ExecutionStatus {
            state: status.state().map_or(QueryState::Queued, map_state),
            reason: status
                .state_change_reason()
                .or_else(|| status.athena_error().and_then(|e| e.error_message()))
                .map(ToString::to_string),
        })
    }

    async fn fetch(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, AthenaError> {
        let response = self
            .client
            .get_query_results()
            .query_execution_id(execution_id)
            .set_next_token(next_token.map(ToString::to_string))
            .send()
            .await
            .map_err(|e| AthenaError::Request {
                operation: "GetQueryResults",
                source: Box::new(e),
            })?;

        Ok(page_from_output(&response, next_token.is_none()))
    }

    async fn stop(&self, execution_id: &str) -> Result<(), AthenaError> {
        self.client
            .stop_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| AthenaError::Request {
                operation: "StopQueryExecution",
                source: Box::new(e),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_athena::types::{
        ColumnInfo, Datum, ResultSet as SdkResultSet, ResultSetMetadata, Row,
    };

    use super::*;

    #[test]
    fn maps_sdk_states() {
        assert_eq!(map_state(&QueryExecutionState::Queued), QueryState::Queued);
        assert_eq!(map_state(&QueryExecutionState::Running), QueryState::Running);
        assert_eq!(
            map_state(&QueryExecutionState::Succeeded),
            QueryState::Succeeded
        );
        assert_eq!(map_state(&QueryExecutionState::Failed), QueryState::Failed);
        assert_eq!(
            map_state(&QueryExecutionState::Cancelled),
            QueryState::Cancelled
        );
    }

    fn row(values: &[Option<&str>]) -> Row {
        values
            .iter()
            .fold(Row::builder(), |row, value| {
                row.data(Datum::builder().set_var_char_value(value.map(str::to_string)).build())
            })
            .build()
    }

    fn output(rows: Vec<Row>, next_token: Option<&str>) -> GetQueryResultsOutput {
        let metadata = ["objectid", "category"]
            .iter()
            .fold(ResultSetMetadata::builder(), |metadata, name| {
                metadata.column_info(
                    ColumnInfo::builder()
                        .name(*name)
                        .r#type("varchar")
                        .build()
                        .unwrap(),
                )
            })
            .build();

        GetQueryResultsOutput::builder()
            .result_set(
                SdkResultSet::builder()
                    .result_set_metadata(metadata)
                    .set_rows(Some(rows))
                    .build(),
            )
            .set_next_token(next_token.map(str::to_string))
            .build()
    }

    #[test]
    fn first_page_drops_header_row() {
        let response = output(
            vec![
                row(&[Some("objectid"), Some("category")]),
                row(&[Some("1"), Some("PS")]),
                row(&[Some("2"), None]),
            ],
            Some("page-2"),
        );

        let page = page_from_output(&response, true);

        assert_eq!(page.columns, vec!["objectid", "category"]);
        assert_eq!(
            page.rows,
            vec![
                vec![Some("1".to_string()), Some("PS".to_string())],
                vec![Some("2".to_string()), None],
            ]
        );
        assert_eq!(page.next_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn continuation_page_keeps_every_row() {
        let response = output(
            vec![row(&[Some("3"), Some("GBP")]), row(&[Some("4"), Some("PR")])],
            None,
        );

        let page = page_from_output(&response, false);

        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0][0].as_deref(), Some("3"));
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn missing_result_set_is_empty_page() {
        let response = GetQueryResultsOutput::builder().build();

        let page = page_from_output(&response, true);

        assert!(page.columns.is_empty());
        assert!(page.rows.is_empty());
    }

    #[test]
    fn unknown_state_keeps_polling() {
        let state = QueryExecutionState::from("PAUSED");
        assert!(!map_state(&state).is_terminal());
    }
}
