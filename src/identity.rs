//! Identity resolution.
//!
//! Column labels name timeseries either by id or by `(scope, name)`. [`IdentityResolver`]
//! turns such a key into a registered [`Timeseries`]; the engine then pairs it with a data
//! state to obtain the association that keys the stored samples.
//!
//! Association creation is race-safe: it is insert-then-re-read. Two writers that both
//! miss the lookup will both try to create; the loser gets
//! [`StoreError::UniqueViolation`] and simply re-reads the winner's row.

use crate::error::{Result, TimeseriesError};
use crate::model::{AssociationId, DataState, ScopeId, Timeseries, TimeseriesId, TimeseriesKey};
use crate::store::{SampleStore, StoreError};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

/// Maps a timeseries key to its registration.
pub trait IdentityResolver: Send + Sync {
    /// Returns `None` when nothing matches.
    fn resolve(
        &self,
        key: &TimeseriesKey,
        scope: Option<ScopeId>,
    ) -> std::result::Result<Option<Timeseries>, StoreError>;
}

/// In-memory registry of timeseries.
#[derive(Debug, Default)]
pub struct TimeseriesCatalog {
    entries: RwLock<HashMap<TimeseriesId, Timeseries>>,
}

impl TimeseriesCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timeseries. Ids are unique, and so are names within a scope.
    pub fn register(&self, timeseries: Timeseries) -> std::result::Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        if entries.contains_key(&timeseries.id) {
            return Err(StoreError::Backend(format!(
                "timeseries {} is already registered",
                timeseries.id
            )));
        }
        let clash = entries
            .values()
            .any(|t| t.scope == timeseries.scope && t.name == timeseries.name);
        if clash {
            return Err(StoreError::Backend(format!(
                "timeseries name '{}' is already used in this scope",
                timeseries.name
            )));
        }
        entries.insert(timeseries.id, timeseries);
        Ok(())
    }

    /// Builder-style registration of several timeseries.
    pub fn with(
        self,
        timeseries: impl IntoIterator<Item = Timeseries>,
    ) -> std::result::Result<Self, StoreError> {
        for t in timeseries {
            self.register(t)?;
        }
        Ok(self)
    }
}

impl IdentityResolver for TimeseriesCatalog {
    fn resolve(
        &self,
        key: &TimeseriesKey,
        scope: Option<ScopeId>,
    ) -> std::result::Result<Option<Timeseries>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(match key {
            TimeseriesKey::Id(id) => entries.get(id).cloned(),
            TimeseriesKey::Name(name) => entries
                .values()
                .find(|t| t.scope == scope && &t.name == name)
                .cloned(),
        })
    }
}

/// Resolves every key, failing with one error that lists all unresolved labels.
pub(crate) fn resolve_all(
    resolver: &dyn IdentityResolver,
    keys: &[TimeseriesKey],
    scope: Option<ScopeId>,
) -> Result<Vec<Timeseries>> {
    let mut found = Vec::with_capacity(keys.len());
    let mut missing = Vec::new();
    for key in keys {
        match resolver.resolve(key, scope)? {
            Some(timeseries) => found.push(timeseries),
            None => missing.push(key.label()),
        }
    }
    if missing.is_empty() {
        Ok(found)
    } else {
        Err(TimeseriesError::UnknownIdentity { labels: missing })
    }
}

/// Returns the association of `(timeseries, state)`, creating it if needed.
///
/// A [`StoreError::UniqueViolation`] on create means a concurrent writer won the race; the
/// row is re-read, up to `retries` times.
pub fn get_or_create_association(
    store: &dyn SampleStore,
    timeseries: TimeseriesId,
    state: DataState,
    retries: u32,
) -> Result<AssociationId> {
    for attempt in 0..=retries {
        if let Some(id) = store.find_association(timeseries, state)? {
            return Ok(id);
        }
        match store.create_association(timeseries, state) {
            Ok(id) => return Ok(id),
            Err(StoreError::UniqueViolation { .. }) => {
                warn!(
                    "Association for timeseries {} ({}) created concurrently, re-reading (attempt {})",
                    timeseries,
                    state,
                    attempt + 1
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Backend(format!(
        "association for timeseries {timeseries} ({state}) not readable after {} attempts",
        retries + 1
    ))
    .into())
}
