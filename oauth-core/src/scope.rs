//! Scope sets and the issuance policy applied when a request asks for more than allowed

use crate::error::OAuthError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A set of scope names.
///
/// Ordered so that the wire representation (space separated, or a JSON array inside
/// tokens) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a space-delimited scope parameter, ignoring repeated whitespace
    pub fn parse(value: &str) -> Self {
        value.split_whitespace().map(str::to_string).collect()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn intersection(&self, other: &ScopeSet) -> ScopeSet {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Scopes present in `self` but not in `other`
    pub fn difference(&self, other: &ScopeSet) -> ScopeSet {
        self.0.difference(&other.0).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        f.write_str(&joined)
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        )
    }
}

/// What to do when a token request asks for scopes beyond what is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopePolicy {
    /// Fail the request with `invalid_scope`
    #[default]
    Reject,
    /// Issue the intersection; fail only if nothing is left
    Narrow,
}

impl FromStr for ScopePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "narrow" => Ok(Self::Narrow),
            other => Err(format!("unknown scope policy '{other}'")),
        }
    }
}

impl ScopePolicy {
    /// Resolve the scopes to grant.
    ///
    /// `ceiling` is everything the grant may carry (client allowed scopes intersected with
    /// the resource owner's). An absent or empty request gets the whole ceiling.
    pub fn resolve(
        &self,
        requested: Option<&ScopeSet>,
        ceiling: &ScopeSet,
    ) -> Result<ScopeSet, OAuthError> {
        let requested = match requested {
            Some(requested) if !requested.is_empty() => requested,
            _ => {
                if ceiling.is_empty() {
                    return Err(OAuthError::InvalidScope(
                        "No scopes are allowed for this grant".to_string(),
                    ));
                }
                return Ok(ceiling.clone());
            }
        };

        match self {
            Self::Reject => {
                let excess = requested.difference(ceiling);
                if excess.is_empty() {
                    Ok(requested.clone())
                } else {
                    Err(OAuthError::InvalidScope(format!("Invalid scope: {excess}")))
                }
            }
            Self::Narrow => {
                let granted = requested.intersection(ceiling);
                if granted.is_empty() {
                    Err(OAuthError::InvalidScope(format!(
                        "Invalid scope: {}",
                        requested
                    )))
                } else {
                    Ok(granted)
                }
            }
        }
    }
}
