//! Policy input/data documents, decisions, and entrypoints.
//!
//! `PolicyInput` is the request document sent to the engine per evaluation;
//! `PolicyData` is the engine's persistent context, set once per process.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::Contract;
use crate::error::{AuthzError, AuthzResult};
use crate::http::RequestAttributes;
use crate::subject::{RoleHierarchy, Subject};

// ── Actions and entrypoints ───────────────────────────────────────────────────

/// The domain action an authorization question concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// Named rule-sets inside the compiled policy module.
///
/// An entrypoint selects which rules run for a given question; the set is
/// fixed by the deployed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entrypoint {
    ContractValidSignature,
    ContractValidBody,
    ContractValidTitle,
    ContractValid,
    ContractAllowAction,
    ContractAvailableStates,
    FeatureAllow,
    HttpAllow,
}

impl Entrypoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entrypoint::ContractValidSignature => "contract/valid_signature",
            Entrypoint::ContractValidBody => "contract/valid_body",
            Entrypoint::ContractValidTitle => "contract/valid_title",
            Entrypoint::ContractValid => "contract/valid",
            Entrypoint::ContractAllowAction => "contract/allow_action",
            Entrypoint::ContractAvailableStates => "contract/available_states",
            Entrypoint::FeatureAllow => "feature/allow",
            Entrypoint::HttpAllow => "http/allow",
        }
    }
}

impl fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Policy input ──────────────────────────────────────────────────────────────

/// The before/after pair of resource snapshots.
///
/// Snapshots are opaque values: a contract document for domain actions, a
/// plain string for feature checks. Create has no `before`; read and delete
/// have no `after`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePair {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// The document sent to the engine for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourcePair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<RequestAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_query: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_body: Option<Value>,
}

impl PolicyInput {
    /// Input for a domain action on a contract pair.
    pub fn for_action(
        subject: Option<Subject>,
        action: Action,
        before: Option<&Contract>,
        after: Option<&Contract>,
    ) -> AuthzResult<Self> {
        Ok(Self {
            subject,
            action: Some(action),
            resource: Some(ResourcePair {
                before: before.map(to_snapshot).transpose()?,
                after: after.map(to_snapshot).transpose()?,
            }),
            ..Self::default()
        })
    }

    /// Input for a feature-access question. The feature name rides in
    /// `resource.after`; the subject may legitimately be absent.
    pub fn for_feature(subject: Option<Subject>, feature: &str) -> Self {
        Self {
            subject,
            resource: Some(ResourcePair {
                before: None,
                after: Some(Value::String(feature.to_string())),
            }),
            ..Self::default()
        }
    }
}

fn to_snapshot(contract: &Contract) -> AuthzResult<Value> {
    serde_json::to_value(contract).map_err(|e| AuthzError::Evaluation {
        reason: format!("failed to serialize resource snapshot: {}", e),
    })
}

// ── Field path mapping ────────────────────────────────────────────────────────

/// The fixed set of logical fields the policy rules read from an input
/// document. Each resolves to a dot-delimited path at startup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum LogicalField {
    BeforeResource,
    AfterResource,
    UserId,
    UserRoles,
    HttpHost,
    HttpMethod,
    HttpPath,
    HttpParsedBody,
    HttpParsedPath,
    HttpParsedQuery,
    Action,
}

impl LogicalField {
    pub const ALL: [LogicalField; 11] = [
        LogicalField::BeforeResource,
        LogicalField::AfterResource,
        LogicalField::UserId,
        LogicalField::UserRoles,
        LogicalField::HttpHost,
        LogicalField::HttpMethod,
        LogicalField::HttpPath,
        LogicalField::HttpParsedBody,
        LogicalField::HttpParsedPath,
        LogicalField::HttpParsedQuery,
        LogicalField::Action,
    ];

    /// The camelCase wire name, matching the serialized map key.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalField::BeforeResource => "beforeResource",
            LogicalField::AfterResource => "afterResource",
            LogicalField::UserId => "userId",
            LogicalField::UserRoles => "userRoles",
            LogicalField::HttpHost => "httpHost",
            LogicalField::HttpMethod => "httpMethod",
            LogicalField::HttpPath => "httpPath",
            LogicalField::HttpParsedBody => "httpParsedBody",
            LogicalField::HttpParsedPath => "httpParsedPath",
            LogicalField::HttpParsedQuery => "httpParsedQuery",
            LogicalField::Action => "action",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified mapping from logical field to the dot-delimited path(s) at which
/// it appears inside a fully populated `PolicyInput` document.
///
/// Each field maps to a *list* of candidate paths to support deployments
/// where the same module also runs behind an API gateway with a different
/// input shape; the client-side producer always yields exactly one path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPathMap(BTreeMap<LogicalField, Vec<String>>);

impl FieldPathMap {
    pub fn insert(&mut self, field: LogicalField, paths: Vec<String>) {
        self.0.insert(field, paths);
    }

    /// All candidate paths for `field`.
    pub fn resolve(&self, field: LogicalField) -> Option<&[String]> {
        self.0.get(&field).map(Vec::as_slice)
    }

    /// The first (client-side) path for `field`.
    pub fn primary(&self, field: LogicalField) -> Option<&str> {
        self.0.get(&field).and_then(|paths| paths.first()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LogicalField, &Vec<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Policy data ───────────────────────────────────────────────────────────────

/// Global, rarely-changing context handed to the engine alongside every
/// input: the role hierarchy and the verified field path mapping.
///
/// Built once at boot; immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyData {
    pub roles_hierarchy: RoleHierarchy,
    pub input_data_mapping: FieldPathMap,
}

// ── Decisions ─────────────────────────────────────────────────────────────────

/// The parsed result of one evaluation call.
///
/// The engine answers either a plain allow/deny or a set of allowed values
/// (e.g. the lifecycle states reachable from the current one). A missing or
/// unusable result is modeled as `Option<Decision>::None`; callers treat it
/// as deny wherever a boolean is expected and as the empty set wherever a
/// set is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    Allowed(bool),
    Values(Vec<String>),
}

impl Decision {
    /// Parse the raw `result` field of the first engine response record.
    ///
    /// `null` and unexpected shapes (string, number, object) are unusable
    /// and yield `None`.
    pub fn from_raw(raw: &Value) -> Option<Decision> {
        match raw {
            Value::Bool(allowed) => Some(Decision::Allowed(*allowed)),
            Value::Array(items) => Some(Decision::Values(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    /// The boolean reading of a decision. A value set is truthy regardless
    /// of its content; only `Allowed(false)` denies.
    pub fn is_truthy(&self) -> bool {
        match self {
            Decision::Allowed(allowed) => *allowed,
            Decision::Values(_) => true,
        }
    }

    /// The set reading of a decision. Booleans carry no values.
    pub fn values(&self) -> &[String] {
        match self {
            Decision::Allowed(_) => &[],
            Decision::Values(values) => values,
        }
    }
}

/// The boolean reading of an optional decision: null means deny.
pub fn decision_allows(decision: &Option<Decision>) -> bool {
    decision.as_ref().map(Decision::is_truthy).unwrap_or(false)
}
