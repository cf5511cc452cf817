//! Custom error types for the engine.
//!
//! This module defines the primary error type, `TimeseriesError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures a query or a write can run into, from malformed
//! requests to failures of the external collaborators.
//!
//! ## Error Hierarchy
//!
//! `TimeseriesError` consolidates several families of errors:
//!
//! - **Request validation** (`Period`, `InvalidBucketWidth`, `InvalidAggregation`,
//!   `InvalidTimezone`, `InvalidDataState`, `InvalidInclusive`): the request itself is
//!   malformed. These are always raised before the sample store is touched.
//! - **Units** (`UndefinedUnit`, `Dimensionality`): a unit string is not known to the
//!   registry, or two units cannot be converted into each other.
//! - **Identities** (`UnknownIdentity`, `InvalidIdentityType`): column labels that do not
//!   resolve to a timeseries, or that cannot be parsed as the identity type in use.
//! - **Text input** (`InvalidTimestamp`, `Codec`): problems found while decoding CSV or
//!   JSON. Both carry the offending row (and column, where there is one).
//! - **Collaborators** (`Authorization`, `Store`, `Write`): failures reported by the
//!   authorization policy or the sample store. Authorization errors are passed through
//!   unchanged; store failures during a batch insert surface as `Write`.
//! - **`Config`**: an [`Engine`](crate::Engine) was built from settings that fail
//!   validation.
//! - **`FeatureNotEnabled`**: the caller used a codec that was not compiled in. This
//!   provides a clear message on how to enable it.
//!
//! By using `#[from]`, `TimeseriesError` can be created from the collaborator error
//! types, keeping the `?` operator usable throughout the engine.

use crate::auth::AuthorizationError;
use crate::config::ConfigError;
use crate::model::IdentityKind;
use crate::store::StoreError;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, TimeseriesError>;

#[derive(Error, Debug)]
pub enum TimeseriesError {
    #[error("Invalid period '{multiplier} {unit}': {reason}")]
    Period {
        unit: String,
        multiplier: i64,
        reason: String,
    },

    #[error("Undefined unit '{unit}'")]
    UndefinedUnit { unit: String },

    #[error("Cannot convert from '{from}' ({from_dimension}) to '{to}' ({to_dimension})")]
    Dimensionality {
        from: String,
        to: String,
        from_dimension: String,
        to_dimension: String,
    },

    #[error("Invalid bucket width {width}: must be a positive integer")]
    InvalidBucketWidth { width: i64 },

    #[error("Invalid aggregation '{aggregation}'. Must be one of: avg, sum, min, max, count")]
    InvalidAggregation { aggregation: String },

    #[error("Invalid timezone '{timezone}'")]
    InvalidTimezone { timezone: String },

    #[error("Invalid data state '{state}'")]
    InvalidDataState { state: String },

    #[error("Invalid inclusive mode '{mode}'. Must be one of: both, left, right, neither")]
    InvalidInclusive { mode: String },

    #[error("Unknown timeseries: {}", join_labels(.labels))]
    UnknownIdentity { labels: Vec<String> },

    #[error("Label '{label}' is not a valid timeseries {expected}")]
    InvalidIdentityType { label: String, expected: IdentityKind },

    #[error("Invalid timestamp '{value}'{}: {reason}", row_suffix(.row))]
    InvalidTimestamp {
        value: String,
        row: Option<usize>,
        reason: String,
    },

    #[error("Malformed input at row {row}{}: {message}", column_suffix(.column))]
    Codec {
        row: usize,
        column: Option<String>,
        message: String,
    },

    #[error("Batch write of {samples} samples failed: {source}")]
    Write {
        samples: usize,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("Sample store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

fn join_labels(labels: &[String]) -> String {
    labels.join(", ")
}

fn row_suffix(row: &Option<usize>) -> String {
    row.map(|r| format!(" at row {r}")).unwrap_or_default()
}

fn column_suffix(column: &Option<String>) -> String {
    column
        .as_deref()
        .map(|c| format!(", column '{c}'"))
        .unwrap_or_default()
}

impl TimeseriesError {
    pub(crate) fn period(unit: impl ToString, multiplier: i64, reason: impl Into<String>) -> Self {
        Self::Period {
            unit: unit.to_string(),
            multiplier,
            reason: reason.into(),
        }
    }

    pub(crate) fn codec(row: usize, column: Option<&str>, message: impl Into<String>) -> Self {
        Self::Codec {
            row,
            column: column.map(str::to_string),
            message: message.into(),
        }
    }
}
