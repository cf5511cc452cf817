//! Core library for building-energy time-series.
//!
//! This library turns raw, irregularly sampled measurements into calendar-aligned,
//! timezone-correct and unit-converted aggregates. It is the backend core of an energy
//! monitoring platform and is used by both the HTTP service and batch tooling.
//!
//! # Layout
//!
//! - [`calendar`]: bucket boundaries for fixed and variable periods across DST
//! - [`units`]: the unit registry and conversions
//! - [`engine`]: the bucketing query engine ([`Engine`])
//! - [`ingest`]: ingestion and deletion
//! - [`process`]: gap-fill, power/energy and completeness
//! - [`codec`]: CSV and JSON encodings
//! - [`store`], [`identity`], [`auth`]: the collaborators the engine is built on
//!
//! Reads flow store → engine → codec or process → caller; writes flow caller → codec →
//! ingestion → store.

pub mod auth;
pub mod calendar;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod process;
pub mod store;
pub mod units;

pub use engine::Engine;
pub use error::{Result, TimeseriesError};
pub use frame::TimeFrame;
pub use ingest::Ingestor;
