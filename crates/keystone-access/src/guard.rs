//! Transport-agnostic access decisions.

use crate::resolver::{EffectivePermissions, PermissionResolver};
use crate::{AccessError, AccessResult};
use keystone_core::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// How a multi-name requirement is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one name must be held.
    Any,
    /// Every name must be held.
    #[default]
    All,
}

/// Permission names an operation requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequirement {
    /// Required names.
    pub names: Vec<String>,
    /// Match mode.
    pub mode: MatchMode,
}

impl PermissionRequirement {
    /// Requires a single name.
    pub fn one(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
            mode: MatchMode::All,
        }
    }

    /// Requires at least one of `names`.
    pub fn any<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            mode: MatchMode::Any,
        }
    }

    /// Requires every one of `names`.
    pub fn all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            mode: MatchMode::All,
        }
    }
}

impl From<&str> for PermissionRequirement {
    fn from(name: &str) -> Self {
        Self::one(name)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Operation may proceed.
    Allow,
    /// Principal is known but lacks permissions.
    Deny {
        /// Names that would have satisfied the requirement.
        missing: Vec<String>,
    },
    /// No resolvable principal.
    Unauthenticated,
}

impl AccessDecision {
    /// Returns true for `Allow`.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Converts a non-allow decision into the matching error.
    pub fn into_result(self) -> AccessResult<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny { missing } => Err(AccessError::Forbidden { missing }),
            Self::Unauthenticated => Err(AccessError::Unauthenticated),
        }
    }
}

/// Decides a requirement against an already-resolved set.
///
/// An empty requirement allows any resolved principal.
#[must_use]
pub fn decide(held: &EffectivePermissions, requirement: &PermissionRequirement) -> AccessDecision {
    if held.is_all() || requirement.names.is_empty() {
        return AccessDecision::Allow;
    }

    let missing: Vec<String> = requirement
        .names
        .iter()
        .filter(|name| !held.contains(name))
        .cloned()
        .collect();

    let satisfied = match requirement.mode {
        MatchMode::All => missing.is_empty(),
        MatchMode::Any => missing.len() < requirement.names.len(),
    };

    if satisfied {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny { missing }
    }
}

/// Authorizes principals against permission requirements.
///
/// Pure with respect to permission state: it only reads through the
/// resolver.
#[derive(Clone)]
pub struct AccessGuard {
    resolver: Arc<PermissionResolver>,
}

impl AccessGuard {
    /// Creates a guard.
    pub fn new(resolver: Arc<PermissionResolver>) -> Self {
        Self { resolver }
    }

    /// Authorizes `principal` against `requirement`.
    ///
    /// A missing or unknown principal yields `Unauthenticated`, never `Deny`.
    /// Storage failures propagate.
    pub async fn authorize(
        &self,
        principal: Option<UserId>,
        requirement: &PermissionRequirement,
    ) -> AccessResult<AccessDecision> {
        let Some(user_id) = principal else {
            return Ok(AccessDecision::Unauthenticated);
        };

        let held = match self.resolver.resolve(user_id).await {
            Ok(held) => held,
            Err(AccessError::NotFound { .. }) => {
                debug!(%user_id, "Principal no longer exists");
                return Ok(AccessDecision::Unauthenticated);
            }
            Err(e) => return Err(e),
        };

        let decision = decide(&held, requirement);
        if let AccessDecision::Deny { ref missing } = decision {
            debug!(%user_id, ?missing, mode = ?requirement.mode, "Access denied");
        }
        Ok(decision)
    }

    /// Authorizes and converts a non-allow decision into an error.
    pub async fn require(
        &self,
        principal: Option<UserId>,
        requirement: &PermissionRequirement,
    ) -> AccessResult<()> {
        self.authorize(principal, requirement).await?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(names: &[&str]) -> EffectivePermissions {
        EffectivePermissions::Set(names.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_all_mode_lists_every_missing_name() {
        let req = PermissionRequirement::all(["read:users", "delete:users", "read:audit"]);
        let decision = decide(&held(&["read:users"]), &req);
        assert_eq!(
            decision,
            AccessDecision::Deny {
                missing: vec!["delete:users".into(), "read:audit".into()]
            }
        );
    }

    #[test]
    fn test_any_mode() {
        let req = PermissionRequirement::any(["read:audit", "manage:audit"]);
        assert!(decide(&held(&["manage:audit"]), &req).is_allowed());
        assert!(!decide(&held(&["read:users"]), &req).is_allowed());
    }

    #[test]
    fn test_admin_sentinel_allows_everything() {
        for req in [
            PermissionRequirement::one("unknown:thing"),
            PermissionRequirement::all(["a:b", "c:d"]),
            PermissionRequirement::any(Vec::<String>::new()),
        ] {
            assert!(decide(&EffectivePermissions::All, &req).is_allowed());
        }
    }

    #[test]
    fn test_empty_requirement_allows() {
        assert!(decide(&held(&[]), &PermissionRequirement::all(Vec::<String>::new())).is_allowed());
    }

    #[test]
    fn test_into_result() {
        assert!(AccessDecision::Allow.into_result().is_ok());
        assert!(matches!(
            AccessDecision::Unauthenticated.into_result(),
            Err(AccessError::Unauthenticated)
        ));
        assert!(matches!(
            AccessDecision::Deny { missing: vec!["x:y".into()] }.into_result(),
            Err(AccessError::Forbidden { .. })
        ));
    }
}
