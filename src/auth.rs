//! Authorization seam.
//!
//! The policy engine itself lives outside this crate. The engine only asks one question,
//! through [`Authorizer`]: may this actor perform this action on this timeseries? A
//! rejection aborts the whole call before the sample store is touched.
//!
//! Two policies are bundled: [`AllowAll`] for trusted embedders and tests, and
//! [`StaticPolicy`], a fixed table of per-actor grants.

use crate::model::{Timeseries, TimeseriesId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// The principal on whose behalf a call is made.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Actor(pub String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// What the actor wants to do with a timeseries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
}

/// Opaque rejection returned by the policy. Passed to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthorizationError {
    pub message: String,
}

impl AuthorizationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Capability check invoked before any store access.
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` when `actor` may perform `action` on `timeseries`.
    fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        timeseries: &Timeseries,
    ) -> Result<(), AuthorizationError>;
}

/// Grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _: &Actor, _: Action, _: &Timeseries) -> Result<(), AuthorizationError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Target {
    Any,
    One(TimeseriesId),
}

/// A fixed table of grants, built up front.
///
/// ```
/// use ems_timeseries::auth::{Action, StaticPolicy};
/// use ems_timeseries::model::TimeseriesId;
///
/// let policy = StaticPolicy::new()
///     .grant_all("operator", Action::Read)
///     .grant("operator", Action::Write, TimeseriesId(7));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticPolicy {
    grants: HashMap<String, HashSet<(Action, Target)>>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `actor` to perform `action` on one timeseries.
    pub fn grant(mut self, actor: &str, action: Action, timeseries: TimeseriesId) -> Self {
        self.grants
            .entry(actor.to_string())
            .or_default()
            .insert((action, Target::One(timeseries)));
        self
    }

    /// Allows `actor` to perform `action` on every timeseries.
    pub fn grant_all(mut self, actor: &str, action: Action) -> Self {
        self.grants
            .entry(actor.to_string())
            .or_default()
            .insert((action, Target::Any));
        self
    }
}

impl Authorizer for StaticPolicy {
    fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        timeseries: &Timeseries,
    ) -> Result<(), AuthorizationError> {
        let allowed = self.grants.get(actor.name()).is_some_and(|grants| {
            grants.contains(&(action, Target::Any))
                || grants.contains(&(action, Target::One(timeseries.id)))
        });
        if allowed {
            Ok(())
        } else {
            Err(AuthorizationError::new(format!(
                "{} may not {} timeseries {}",
                actor.name(),
                match action {
                    Action::Read => "read",
                    Action::Write => "write",
                },
                timeseries.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_policy() {
        let policy = StaticPolicy::new()
            .grant_all("alice", Action::Read)
            .grant("alice", Action::Write, TimeseriesId(1));
        let alice = Actor::new("alice");
        let bob = Actor::new("bob");
        let one = Timeseries::new(1, "meter");
        let two = Timeseries::new(2, "boiler");

        assert!(policy.authorize(&alice, Action::Read, &two).is_ok());
        assert!(policy.authorize(&alice, Action::Write, &one).is_ok());
        let err = policy.authorize(&alice, Action::Write, &two).unwrap_err();
        assert_eq!(err.to_string(), "alice may not write timeseries 2");
        assert!(policy.authorize(&bob, Action::Read, &one).is_err());
    }

    #[test]
    fn test_allow_all() {
        let actor = Actor::new("anyone");
        assert!(AllowAll
            .authorize(&actor, Action::Write, &Timeseries::new(1, "x"))
            .is_ok());
    }
}
