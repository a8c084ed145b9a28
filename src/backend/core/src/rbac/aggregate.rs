//! Permission aggregation.
//!
//! Computes a principal's effective permission set in one pass over its
//! already-materialized roles. The store is never consulted here; everything
//! needed for a decision was loaded by the authentication step.

use std::collections::HashSet;

use super::models::{PermissionKey, Principal};

/// The union of permission keys across all of a principal's roles.
///
/// Membership is the only observable property: two permission rows with the
/// same `(action, resource)` collapse into one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePermissions {
    keys: HashSet<PermissionKey>,
}

impl EffectivePermissions {
    pub fn contains(&self, key: &PermissionKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionKey> {
        self.keys.iter()
    }

    /// Wire-format keys in lexical order, for stable diagnostics.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        keys.sort();
        keys
    }
}

impl FromIterator<PermissionKey> for EffectivePermissions {
    fn from_iter<I: IntoIterator<Item = PermissionKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Visit every permission of every role and collect the distinct keys.
/// A principal with no roles yields an empty set.
pub fn aggregate(principal: &Principal) -> EffectivePermissions {
    principal
        .roles
        .iter()
        .flat_map(|role| role.permissions.iter())
        .map(|permission| permission.key())
        .collect()
}
