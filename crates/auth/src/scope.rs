//! Scope-based authorization decisions.
//!
//! A route declares a [`ScopeRequirement`]; [`authorize`] decides
//! allow/deny against a validated [`Principal`]. Denials report the
//! required-but-absent scopes — the requirement itself is public, it is
//! encoded in the route.

use std::collections::HashSet;

use thiserror::Error;

use crate::validator::Principal;

/// Required scopes for an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeRequirement {
    /// Allowed iff the principal holds at least one of the scopes.
    Any(HashSet<String>),
    /// Allowed iff the principal holds every scope.
    All(HashSet<String>),
}

impl ScopeRequirement {
    /// Require a single scope.
    pub fn one(scope: impl Into<String>) -> Self {
        ScopeRequirement::All(std::iter::once(scope.into()).collect())
    }

    /// Require at least one of the given scopes.
    pub fn any_of(scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ScopeRequirement::Any(scopes.into_iter().map(Into::into).collect())
    }

    /// Require all of the given scopes.
    pub fn all_of(scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ScopeRequirement::All(scopes.into_iter().map(Into::into).collect())
    }

    /// The scopes named by this requirement, sorted for stable output.
    pub fn required(&self) -> Vec<String> {
        let set = match self {
            ScopeRequirement::Any(set) | ScopeRequirement::All(set) => set,
        };
        let mut scopes: Vec<String> = set.iter().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Check the requirement against a set of held scopes.
    pub fn check(&self, held: &HashSet<String>) -> Result<(), ScopeDenied> {
        let missing: Vec<String> = match self {
            ScopeRequirement::Any(set) => {
                if set.iter().any(|s| held.contains(s)) {
                    return Ok(());
                }
                self.required()
            }
            ScopeRequirement::All(set) => {
                if set.is_subset(held) {
                    return Ok(());
                }
                let mut missing: Vec<String> =
                    set.difference(held).cloned().collect();
                missing.sort();
                missing
            }
        };
        Err(ScopeDenied {
            required: self.required(),
            missing,
        })
    }
}

/// An authorization denial, carrying what the route requires.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("insufficient scope")]
pub struct ScopeDenied {
    /// Every scope the requirement names.
    pub required: Vec<String>,
    /// The required scopes the principal does not hold.
    pub missing: Vec<String>,
}

/// Decide whether `principal` satisfies `requirement`.
pub fn authorize(principal: &Principal, requirement: &ScopeRequirement) -> Result<(), ScopeDenied> {
    requirement.check(&principal.scopes)
}
