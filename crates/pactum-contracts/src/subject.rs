//! Identity types: subjects, roles, and the role hierarchy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A role a subject may hold.
///
/// Wire names are the exact strings the policy rules test against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Employee,
    External,
    ContractAdmin,
    #[serde(rename = "CEO")]
    Ceo,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 4] = [Role::Employee, Role::External, Role::ContractAdmin, Role::Ceo];
}

/// Organizational department of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    #[serde(rename = "IT")]
    It,
    Sales,
}

/// The identity an authorization question is asked on behalf of.
///
/// Created on user selection and held in the identity channel for the
/// session. "Nobody selected yet" is modeled as `Option<Subject>::None`,
/// which is a legitimate policy input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    pub roles: Vec<Role>,
}

// ── Role hierarchy ────────────────────────────────────────────────────────────

/// Mapping from role to the roles it inherits.
///
/// Invariant: every role has an entry, even one that inherits nothing. The
/// downstream reachability computation in the policy rules requires a
/// complete node set, so constructors always seed all roles with an empty
/// list before applying inheritance edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleHierarchy(BTreeMap<Role, Vec<Role>>);

impl RoleHierarchy {
    /// A hierarchy where no role inherits anything.
    pub fn base() -> Self {
        Self(Role::ALL.iter().map(|role| (*role, Vec::new())).collect())
    }

    /// Build a hierarchy from inheritance edges on top of the complete base.
    pub fn with_inheritance(edges: impl IntoIterator<Item = (Role, Vec<Role>)>) -> Self {
        let mut hierarchy = Self::base();
        for (role, parents) in edges {
            hierarchy.0.insert(role, parents);
        }
        hierarchy
    }

    /// The roles directly inherited by `role`.
    pub fn inherited(&self, role: Role) -> &[Role] {
        self.0.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    /// All roles reachable from `roles` through inheritance, including the
    /// starting roles themselves.
    pub fn reachable(&self, roles: &[Role]) -> BTreeSet<Role> {
        let mut seen: BTreeSet<Role> = BTreeSet::new();
        let mut stack: Vec<Role> = roles.to_vec();
        while let Some(role) = stack.pop() {
            if seen.insert(role) {
                stack.extend(self.inherited(role).iter().copied());
            }
        }
        seen
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Role, &Vec<Role>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RoleHierarchy {
    /// The standard deployment hierarchy: CEO inherits Employee.
    fn default() -> Self {
        Self::with_inheritance([(Role::Ceo, vec![Role::Employee])])
    }
}
