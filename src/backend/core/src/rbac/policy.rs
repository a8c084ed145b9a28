//! Authorization decider.
//!
//! Two policies evaluated against already-aggregated data:
//!
//! - **Permission policy**: conjunctive. Every required `action:resource` key
//!   must be present in the effective set. An empty requirement grants.
//! - **Role policy**: disjunctive. The principal must hold at least one of the
//!   required roles. An empty requirement denies.
//!
//! Both take a `&Principal`, which only the authentication step (or the store)
//! can produce, so neither can run against an unauthenticated context. Denials
//! are always `Forbidden`, never `Unauthenticated`.

use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use super::aggregate::{aggregate, EffectivePermissions};
use super::models::{PermissionKey, PermissionKeyError, Principal};
use crate::auth::{AuthError, Forbidden};

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Which policy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Permission,
    Role,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Role => "role",
        }
    }
}

/// Diagnostic detail attached to a denial: what was asked for and what the
/// principal actually has. Only ever produced for an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub policy: PolicyKind,
    /// Required keys or role names, in the order the caller listed them.
    pub required: Vec<String>,
    /// Keys or role names the principal holds, sorted.
    pub available: Vec<String>,
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(Denial),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    fn record(&self, policy: PolicyKind) {
        let decision = if self.is_allowed() { "allow" } else { "deny" };
        counter!(
            "authz_decisions_total",
            "policy" => policy.as_str(),
            "decision" => decision
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pure checks
// ═══════════════════════════════════════════════════════════════════════════════

/// AND semantics: allow iff every required key is in `effective`.
pub fn check_permissions(
    effective: &EffectivePermissions,
    required: &[PermissionKey],
) -> PolicyDecision {
    if required.iter().all(|key| effective.contains(key)) {
        return PolicyDecision::Allow;
    }

    PolicyDecision::Deny(Denial {
        policy: PolicyKind::Permission,
        required: required.iter().map(ToString::to_string).collect(),
        available: effective.to_sorted_vec(),
    })
}

/// OR semantics: allow iff the principal holds at least one required role.
///
/// No role satisfies an empty requirement, so `required = []` denies.
pub fn check_roles<S: AsRef<str>>(principal: &Principal, required: &[S]) -> PolicyDecision {
    if required.iter().any(|role| principal.has_role(role.as_ref())) {
        return PolicyDecision::Allow;
    }

    let mut available: Vec<String> = principal.role_names().map(str::to_string).collect();
    available.sort();
    available.dedup();

    PolicyDecision::Deny(Denial {
        policy: PolicyKind::Role,
        required: required.iter().map(|r| r.as_ref().to_string()).collect(),
        available,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcement
// ═══════════════════════════════════════════════════════════════════════════════

/// Enforce the permission policy for an authenticated principal.
pub fn authorize_by_permission(
    principal: &Principal,
    required: &[PermissionKey],
) -> Result<(), AuthError> {
    let effective = aggregate(principal);
    let decision = check_permissions(&effective, required);
    decision.record(PolicyKind::Permission);

    match decision {
        PolicyDecision::Allow => {
            debug!(principal_id = %principal.id, required = required.len(), "Permission check passed");
            Ok(())
        }
        PolicyDecision::Deny(denial) => {
            warn!(
                principal_id = %principal.id,
                required = ?denial.required,
                "Permission denied"
            );
            Err(AuthError::Forbidden(Forbidden::InsufficientPermissions(denial)))
        }
    }
}

/// Enforce the role policy for an authenticated principal.
pub fn authorize_by_role<S: AsRef<str>>(
    principal: &Principal,
    required: &[S],
) -> Result<(), AuthError> {
    let decision = check_roles(principal, required);
    decision.record(PolicyKind::Role);

    match decision {
        PolicyDecision::Allow => {
            debug!(principal_id = %principal.id, "Role check passed");
            Ok(())
        }
        PolicyDecision::Deny(denial) => {
            warn!(
                principal_id = %principal.id,
                required = ?denial.required,
                "Role requirement not met"
            );
            Err(AuthError::Forbidden(Forbidden::InsufficientRole(denial)))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Requirement
// ═══════════════════════════════════════════════════════════════════════════════

/// What a protected operation demands of its caller. Callers pick the policy
/// explicitly; the permission and role checks are never conflated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any active, authenticated principal.
    Authenticated,
    /// Every listed permission key (conjunctive).
    AllPermissions(Vec<PermissionKey>),
    /// At least one listed role (disjunctive).
    AnyRole(Vec<String>),
}

impl Requirement {
    /// Build a permission requirement from wire-format keys.
    pub fn permissions<S: AsRef<str>>(keys: &[S]) -> Result<Self, PermissionKeyError> {
        PermissionKey::parse_all(keys).map(Self::AllPermissions)
    }

    pub fn any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyRole(roles.into_iter().map(Into::into).collect())
    }

    pub fn evaluate(&self, principal: &Principal) -> Result<(), AuthError> {
        match self {
            Self::Authenticated => Ok(()),
            Self::AllPermissions(keys) => authorize_by_permission(principal, keys),
            Self::AnyRole(roles) => authorize_by_role(principal, roles),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{Permission, Role};

    fn manager() -> Principal {
        let role = Role::new("Manager", "Manage users and view reports", 50).with_permissions(
            vec![
                Permission::new("read", "users"),
                Permission::new("update", "users"),
            ],
        );
        Principal::new("manager", "manager@example.com", "John Manager", "h")
            .with_roles(vec![role])
    }

    fn keys(raw: &[&str]) -> Vec<PermissionKey> {
        PermissionKey::parse_all(raw).unwrap()
    }

    #[test]
    fn test_empty_permission_requirement_grants() {
        let nobody = Principal::new("n", "n@example.com", "N", "h");
        assert!(authorize_by_permission(&nobody, &[]).is_ok());
    }

    #[test]
    fn test_empty_role_requirement_denies() {
        let p = manager();
        let empty: [&str; 0] = [];
        let err = authorize_by_role(&p, &empty).unwrap_err();
        assert!(matches!(
            err,
            AuthError::Forbidden(Forbidden::InsufficientRole(_))
        ));
    }

    #[test]
    fn test_permission_policy_is_conjunctive() {
        let p = manager();
        assert!(authorize_by_permission(&p, &keys(&["read:users", "update:users"])).is_ok());

        let err =
            authorize_by_permission(&p, &keys(&["read:users", "delete:users"])).unwrap_err();
        match err {
            AuthError::Forbidden(Forbidden::InsufficientPermissions(denial)) => {
                assert_eq!(denial.policy, PolicyKind::Permission);
                assert_eq!(denial.required, vec!["read:users", "delete:users"]);
                assert_eq!(denial.available, vec!["read:users", "update:users"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_role_policy_is_disjunctive() {
        let p = manager();
        assert!(authorize_by_role(&p, &["Admin", "Manager"]).is_ok());

        match authorize_by_role(&p, &["Admin", "HR"]).unwrap_err() {
            AuthError::Forbidden(Forbidden::InsufficientRole(denial)) => {
                assert_eq!(denial.required, vec!["Admin", "HR"]);
                assert_eq!(denial.available, vec!["Manager"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_role_name_does_not_satisfy_permission_policy() {
        // Holding a role called "read:users" grants nothing under the permission policy.
        let p = Principal::new("x", "x@example.com", "X", "h")
            .with_roles(vec![Role::new("read:users", "", 0)]);
        assert!(authorize_by_permission(&p, &keys(&["read:users"])).is_err());
        assert!(authorize_by_role(&p, &["read:users"]).is_ok());
    }

    #[test]
    fn test_check_permissions_pure() {
        let effective: EffectivePermissions = keys(&["read:audit"]).into_iter().collect();
        assert!(check_permissions(&effective, &keys(&["read:audit"])).is_allowed());
        assert!(check_permissions(&effective, &keys(&["read:users"])).is_denied());
    }

    #[test]
    fn test_requirement_builders() {
        assert!(Requirement::permissions(&["read:users", "oops"]).is_err());

        let req = Requirement::permissions(&["read:users"]).unwrap();
        assert_eq!(req, Requirement::AllPermissions(vec![PermissionKey::new("read", "users")]));

        let p = manager();
        assert!(req.evaluate(&p).is_ok());
        assert!(Requirement::Authenticated.evaluate(&p).is_ok());
        assert!(Requirement::any_role(["Admin"]).evaluate(&p).is_err());
        assert!(Requirement::any_role(Vec::<String>::new()).evaluate(&p).is_err());
    }
}
