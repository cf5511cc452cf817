//! Derived processes built on the query engine.
//!
//! - [`gapfill`]: dense, forward-filled series on a bucket grid
//! - [`energy`]: power to energy integration and meter readings to mean power
//! - [`completeness`]: observed versus expected sampling rate per bucket

pub mod completeness;
pub mod energy;
pub mod gapfill;

pub use completeness::{completeness, CompletenessReport, SeriesCompleteness};
pub use energy::{energy_to_power, power_to_energy};
pub use gapfill::{gap_fill, GapFillRequest};
