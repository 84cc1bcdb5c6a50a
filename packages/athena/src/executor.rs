//! The submit / poll / fetch protocol.

use std::time::Duration;

use crate::{AthenaError, QueryState};

/// Status snapshot of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    /// Current state.
    pub state: QueryState,
    /// Engine-provided explanation for the last state change.
    pub reason: Option<String>,
}

/// One page of query results.
///
/// Values are strings at the wire level; `None` is SQL `NULL`. Header rows
/// are never included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    /// Column labels, in row order.
    pub columns: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<Option<String>>>,
    /// Continuation token for the next page, if any.
    pub next_token: Option<String>,
}

/// All rows of a finished query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Column labels, in row order.
    pub columns: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<Option<String>>>,
}

/// A remote SQL engine reachable through a handle-based protocol.
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Submits `sql` against `database` and returns the execution handle.
    ///
    /// # Errors
    ///
    /// Returns [`AthenaError`] if the submission is rejected.
    async fn start(&self, sql: &str, database: &str) -> Result<String, AthenaError>;

    /// Reads the current state of an execution.
    ///
    /// # Errors
    ///
    /// Returns [`AthenaError`] if the status request fails.
    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus, AthenaError>;

    /// Fetches one page of results of a succeeded execution.
    ///
    /// # Errors
    ///
    /// Returns [`AthenaError`] if the fetch fails.
    async fn fetch(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, AthenaError>;

    /// Asks the engine to stop an execution.
    ///
    /// # Errors
    ///
    /// Returns [`AthenaError`] if the stop request fails.
    async fn stop(&self, execution_id: &str) -> Result<(), AthenaError>;
}

/// Poll loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Give up (and stop the query) after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Runs `sql` to completion and collects every result row.
///
/// Submits the query, then checks its status every `poll.interval`,
/// sleeping on the Tokio timer in between so other tasks keep running.
/// Once the query succeeds all result pages are fetched in order.
///
/// # Errors
///
/// * [`AthenaError::QueryFailed`] if the query ends `FAILED` or
///   `CANCELLED`, carrying the state and the engine's reason.
/// * [`AthenaError::TimedOut`] if `poll.timeout` elapses first. A stop
///   request is sent for the abandoned execution.
/// * Any error returned by the executor.
pub async fn run_query(
    executor: &dyn QueryExecutor,
    sql: &str,
    database: &str,
    poll: &PollConfig,
) -> Result<ResultSet, AthenaError> {
    let execution_id = executor.start(sql, database).await?;
    log::debug!("Submitted Athena query {execution_id}");

    let started = tokio::time::Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let status = executor.status(&execution_id).await?;
        log::trace!(
            "Athena query {execution_id} poll {attempts}: {}",
            status.state
        );

        match status.state {
            QueryState::Succeeded => break,
            QueryState::Failed | QueryState::Cancelled => {
                log::warn!(
                    "Athena query {execution_id} ended {}: {}",
                    status.state,
                    status.reason.as_deref().unwrap_or("no reason given")
                );
                return Err(AthenaError::QueryFailed {
                    execution_id,
                    state: status.state,
                    reason: status.reason,
                });
            }
            QueryState::Queued | QueryState::Running => {}
        }

        let waited = started.elapsed();
        if poll.timeout.is_some_and(|timeout| waited >= timeout) {
            if let Err(e) = executor.stop(&execution_id).await {
                log::warn!("Failed to stop timed-out Athena query {execution_id}: {e}");
            }
            return Err(AthenaError::TimedOut {
                execution_id,
                waited,
            });
        }

        tokio::time::sleep(poll.interval).await;
    }

    log::debug!(
        "Athena query {execution_id} succeeded after {attempts} polls ({:.1?})",
        started.elapsed()
    );

    let mut result = ResultSet::default();
    let mut next_token: Option<String> = None;
    loop {
        let page = executor
            .fetch(&execution_id, next_token.as_deref())
            .await?;
        if result.columns.is_empty() {
            result.columns = page.columns;
        }
        result.rows.extend(page.rows);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(result)
}
