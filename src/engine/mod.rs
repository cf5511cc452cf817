//! Bucketing query engine.
//!
//! [`Engine`] answers the four read queries (raw range, bucketed aggregates, first/last
//! value and summary statistics) by orchestrating the calendar, the sample store and
//! the unit registry. It holds no per-request state: every call is independent, and the
//! engine itself is immutable after construction and cheap to clone.
//!
//! # Validation order
//!
//! Every query validates the request, resolves identities, authorizes the actor and
//! prepares unit conversions before touching the sample store, so a bad request never
//! causes store traffic.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ems_timeseries::auth::{Actor, AllowAll};
//! use ems_timeseries::calendar::PeriodUnit;
//! use ems_timeseries::engine::{BucketRequest, Engine};
//! use ems_timeseries::identity::TimeseriesCatalog;
//! use ems_timeseries::model::{Aggregation, Timeseries, TimeseriesId};
//! use ems_timeseries::store::MemoryStore;
//! use chrono::{TimeZone, Utc};
//!
//! let catalog = TimeseriesCatalog::new().with([Timeseries::new(1, "meter")])?;
//! let engine = Engine::builder(Arc::new(MemoryStore::new()), Arc::new(catalog), Arc::new(AllowAll))
//!     .build()?;
//!
//! let request = BucketRequest::new(
//!     [TimeseriesId(1)],
//!     Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap(),
//! )
//! .every(1, PeriodUnit::Hour)
//! .aggregate(Aggregation::Count);
//!
//! let frame = engine.get_buckets(&Actor::new("doc"), &request)?;
//! assert_eq!(frame.len(), 24);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod query;
mod request;
mod resample;
mod stats;

pub use request::{BucketRequest, LastRequest, RawRequest, StatsRequest};
pub use stats::{LastValue, SeriesStats};

use crate::auth::{Action, Actor, Authorizer};
use crate::config::Settings;
use crate::error::{Result, TimeseriesError};
use crate::frame::TimeFrame;
use crate::identity::{self, IdentityResolver};
use crate::model::{AssociationId, DataState, LabelMode, ScopeId, Timeseries, TimeseriesKey};
use crate::store::SampleStore;
use crate::units::{self, Converter, UnitRegistry};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;

/// The bucketing query engine and its collaborators.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn SampleStore>,
    resolver: Arc<dyn IdentityResolver>,
    authorizer: Arc<dyn Authorizer>,
    units: Arc<UnitRegistry>,
    settings: Arc<Settings>,
    default_timezone: Tz,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("default_timezone", &self.default_timezone)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    store: Arc<dyn SampleStore>,
    resolver: Arc<dyn IdentityResolver>,
    authorizer: Arc<dyn Authorizer>,
    units: Option<Arc<UnitRegistry>>,
    settings: Settings,
}

impl EngineBuilder {
    /// Uses a custom unit registry instead of the built-in one.
    pub fn units(mut self, units: Arc<UnitRegistry>) -> Self {
        self.units = Some(units);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// # Errors
    ///
    /// - [`TimeseriesError::InvalidTimezone`] if the configured default timezone is unknown
    /// - [`TimeseriesError::Config`] if the settings fail [`Settings::validate`]
    pub fn build(self) -> Result<Engine> {
        let default_timezone = self
            .settings
            .timezone()
            .map_err(|_| TimeseriesError::InvalidTimezone {
                timezone: self.settings.engine.default_timezone.clone(),
            })?;
        self.settings.validate()?;
        Ok(Engine {
            store: self.store,
            resolver: self.resolver,
            authorizer: self.authorizer,
            units: self.units.unwrap_or_else(|| Arc::new(UnitRegistry::default())),
            settings: Arc::new(self.settings),
            default_timezone,
        })
    }
}

impl Engine {
    pub fn builder(
        store: Arc<dyn SampleStore>,
        resolver: Arc<dyn IdentityResolver>,
        authorizer: Arc<dyn Authorizer>,
    ) -> EngineBuilder {
        EngineBuilder {
            store,
            resolver,
            authorizer,
            units: None,
            settings: Settings::default(),
        }
    }

    pub fn store(&self) -> &dyn SampleStore {
        self.store.as_ref()
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_timezone
    }

    pub(crate) fn timezone(&self, requested: Option<Tz>) -> Tz {
        requested.unwrap_or(self.default_timezone)
    }

    /// Resolves `keys`, dropping duplicates and keeping request order.
    pub(crate) fn resolve(
        &self,
        keys: &[TimeseriesKey],
        scope: Option<ScopeId>,
    ) -> Result<Vec<Timeseries>> {
        let mut unique: Vec<TimeseriesKey> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(key) {
                unique.push(key.clone());
            }
        }
        identity::resolve_all(self.resolver.as_ref(), &unique, scope)
    }

    /// Resolves `keys` and checks `action` on each.
    pub(crate) fn authorized(
        &self,
        actor: &Actor,
        action: Action,
        keys: &[TimeseriesKey],
        scope: Option<ScopeId>,
    ) -> Result<Vec<Timeseries>> {
        let series = self.resolve(keys, scope)?;
        for timeseries in &series {
            self.authorizer.authorize(actor, action, timeseries)?;
        }
        Ok(series)
    }

    /// Association of an existing `(timeseries, state)` pair, without creating one.
    pub(crate) fn existing_association(
        &self,
        timeseries: &Timeseries,
        state: DataState,
    ) -> Result<Option<AssociationId>> {
        Ok(self.store.find_association(timeseries.id, state)?)
    }

    pub(crate) fn association(
        &self,
        timeseries: &Timeseries,
        state: DataState,
    ) -> Result<AssociationId> {
        identity::get_or_create_association(
            self.store.as_ref(),
            timeseries.id,
            state,
            self.settings.engine.association_retries,
        )
    }

    /// Prepares one converter per label found in `convert_to`.
    ///
    /// The source unit is `source` when given (the synthetic `count` unit), otherwise the
    /// native unit of the timeseries.
    pub(crate) fn conversion_plan(
        &self,
        series: &[Timeseries],
        labels: &[String],
        convert_to: &HashMap<String, String>,
        source: Option<&str>,
    ) -> Result<Vec<(String, Converter)>> {
        let mut plan = Vec::new();
        for (timeseries, label) in series.iter().zip(labels) {
            if let Some(target) = convert_to.get(label) {
                let from = source.or(timeseries.unit.as_deref()).unwrap_or("");
                plan.push((label.clone(), self.units.converter(from, target)?));
            }
        }
        Ok(plan)
    }
}

pub(crate) fn labels(series: &[Timeseries], mode: LabelMode) -> Vec<String> {
    series.iter().map(|t| t.label(mode)).collect()
}

pub(crate) fn apply_plan(frame: &mut TimeFrame, plan: &[(String, Converter)]) {
    for (label, converter) in plan {
        if let Some(column) = frame.column_mut(label) {
            units::convert_column_values(converter, &mut column.values, &mut column.kind);
        }
    }
}
