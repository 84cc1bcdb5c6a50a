#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Remote parking proximity queries over AWS Athena.
//!
//! Athena runs SQL directly over the Parquet feature tables in S3. A query
//! is not a call/return: it is submitted, polled until it reaches a
//! terminal state, and then its results are fetched page by page. The
//! protocol lives in [`executor::run_query`] and talks to the engine
//! through the [`QueryExecutor`] trait, so the poll loop can be exercised
//! against a scripted executor in tests. [`client::AthenaExecutor`] is the
//! AWS SDK implementation.
//!
//! Polling sleeps on the Tokio timer between attempts, so any number of
//! queries can be outstanding without tying up a thread each.

pub mod client;
pub mod executor;
pub mod rows;
pub mod sql;

pub use client::AthenaExecutor;
pub use executor::{ExecutionStatus, PollConfig, QueryExecutor, ResultPage, ResultSet, run_query};
pub use rows::{parse_rows, to_raw_features};
pub use sql::{GeometryColumns, RemoteTable, build_nearby_sql};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle state of a query execution.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    /// Accepted, waiting for capacity.
    Queued,
    /// Executing.
    Running,
    /// Finished; results can be fetched.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped before completion.
    Cancelled,
}

impl QueryState {
    /// Whether no further transition can happen from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Errors that can occur while running a remote query.
#[derive(Debug, thiserror::Error)]
pub enum AthenaError {
    /// An Athena API call failed.
    #[error("Athena {operation} failed: {source}")]
    Request {
        /// API operation name.
        operation: &'static str,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A response was missing a field the protocol depends on.
    #[error("Athena {operation} response is missing {field}")]
    MalformedResponse {
        /// API operation name.
        operation: &'static str,
        /// The missing field.
        field: &'static str,
    },

    /// The query reached `FAILED` or `CANCELLED`.
    #[error(
        "Athena query {execution_id} finished with state {state}: {}",
        .reason.as_deref().unwrap_or("no reason given")
    )]
    QueryFailed {
        /// Execution handle.
        execution_id: String,
        /// Terminal state reported by the engine.
        state: QueryState,
        /// Engine-provided failure reason.
        reason: Option<String>,
    },

    /// The query did not reach a terminal state within the poll timeout.
    #[error("Athena query {execution_id} did not finish within {waited:?}")]
    TimedOut {
        /// Execution handle.
        execution_id: String,
        /// How long the poll loop waited.
        waited: Duration,
    },
}
