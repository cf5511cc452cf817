//! Sample storage interface.
//!
//! The engine never talks to a database directly. Everything it needs from durable
//! storage goes through [`SampleStore`]: keyed `(association, timestamp) → value` storage
//! with insert-or-ignore writes, range reads and deletes, and aggregation pushed down to
//! a single calendar unit.
//!
//! [`MemoryStore`] is the bundled implementation, used by the tests and by embedders that
//! do not need persistence.

pub mod memory;

pub use memory::MemoryStore;

use crate::calendar::PeriodUnit;
use crate::model::{Aggregation, AssociationId, DataState, Sample, TimeWindow, TimeseriesId};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Failures reported by a [`SampleStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Association for timeseries {timeseries} in state {state} already exists")]
    UniqueViolation {
        timeseries: TimeseriesId,
        state: DataState,
    },

    #[error("Unknown association {0:?}")]
    UnknownAssociation(AssociationId),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Backend error: {0}")]
    Backend(String),
}

/// One partial aggregate pushed down by the store: the value of one association over one
/// calendar unit starting at `bucket`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateRow {
    pub association: AssociationId,
    pub bucket: DateTime<Utc>,
    pub value: f64,
}

/// Durable keyed storage of samples.
///
/// Implementations must be safe to share between threads; the engine holds them behind
/// an `Arc`.
pub trait SampleStore: Send + Sync {
    /// Looks up the association of `(timeseries, state)` without creating it.
    fn find_association(
        &self,
        timeseries: TimeseriesId,
        state: DataState,
    ) -> Result<Option<AssociationId>, StoreError>;

    /// Creates the association of `(timeseries, state)`.
    ///
    /// Returns [`StoreError::UniqueViolation`] if it already exists.
    fn create_association(
        &self,
        timeseries: TimeseriesId,
        state: DataState,
    ) -> Result<AssociationId, StoreError>;

    /// Inserts a batch, silently skipping samples whose `(association, timestamp)` is
    /// already stored. Returns the number of samples actually inserted.
    fn insert_or_ignore(&self, samples: &[Sample]) -> Result<usize, StoreError>;

    /// All samples of `associations` inside `window`, ordered by association then time.
    fn read_range(
        &self,
        associations: &[AssociationId],
        window: &TimeWindow,
    ) -> Result<Vec<Sample>, StoreError>;

    /// Removes the samples of `association` in `[start, end)`. Returns the number removed.
    fn delete_range(
        &self,
        association: AssociationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// The latest sample of `association` inside `window`.
    fn last_in(
        &self,
        association: AssociationId,
        window: &TimeWindow,
    ) -> Result<Option<Sample>, StoreError>;

    /// The earliest sample of `association` inside `window`.
    fn first_in(
        &self,
        association: AssociationId,
        window: &TimeWindow,
    ) -> Result<Option<Sample>, StoreError>;

    /// The latest sample strictly before `before`.
    fn last_before(
        &self,
        association: AssociationId,
        before: DateTime<Utc>,
    ) -> Result<Option<Sample>, StoreError> {
        let window = TimeWindow {
            start: None,
            end: Some(before),
            inclusive: crate::model::Inclusive::Left,
        };
        self.last_in(association, &window)
    }

    /// Aggregates the samples of `associations` in `[start, end)` into buckets of exactly
    /// one `unit`, with boundaries computed in `tz`.
    ///
    /// Buckets without samples are omitted. `Count` values are whole numbers.
    fn aggregate(
        &self,
        associations: &[AssociationId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: PeriodUnit,
        tz: Tz,
        aggregation: Aggregation,
    ) -> Result<Vec<AggregateRow>, StoreError>;
}
