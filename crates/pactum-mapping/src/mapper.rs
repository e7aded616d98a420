//! The domain-to-policy field-path mapper.
//!
//! Produces the [`FieldPathMap`] without hand-maintaining a single path
//! string. Hand-written paths would silently desynchronize from the
//! `PolicyInput` schema as it evolves; instead the paths are *discovered*:
//!
//! 1. Allocate one fresh, unique [`Marker`] per logical field.
//! 2. Build a representative input document with the marker sitting at each
//!    logical field's slot.
//! 3. Flatten the document into path → leaf value.
//! 4. For each field, find the single entry holding its marker. Zero or
//!    multiple matches is a fatal startup error: it means a field is not
//!    wired into the schema, or two fields collide on one path.
//!
//! Step 4 doubles as a self-test that the schema-to-mapping wiring is
//! correct before the application accepts any authorization request.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::{FieldPathMap, LogicalField, PolicyData};
use pactum_contracts::subject::RoleHierarchy;

use crate::flatten::flatten;

// ── Markers ───────────────────────────────────────────────────────────────────

/// A leaf placeholder that is unique by construction.
///
/// Each marker carries a freshly generated uuid, so two markers are never
/// equal even when their roles in the document are structurally identical.
/// This stands in for the reference identity the discovery relies on: a
/// marker found in the flattened document *is* the one that was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Marker(Value);

impl Marker {
    pub(crate) fn fresh() -> Self {
        Self(Value::String(format!("pactum-marker:{}", Uuid::new_v4())))
    }

    pub(crate) fn value(&self) -> &Value {
        &self.0
    }
}

pub(crate) fn fresh_markers() -> BTreeMap<LogicalField, Marker> {
    LogicalField::ALL.iter().map(|field| (*field, Marker::fresh())).collect()
}

// ── Representative document ───────────────────────────────────────────────────

/// A representative `PolicyInput` document with every logical field's slot
/// populated by its marker instead of real data.
///
/// The shape mirrors the serialized form of a fully populated
/// `PolicyInput`; `schema_sync` in the tests pins the two together.
pub(crate) fn representative_input(markers: &BTreeMap<LogicalField, Marker>) -> Value {
    let m = |field: LogicalField| markers[&field].value();

    json!({
        "subject": {
            "id": m(LogicalField::UserId),
            "roles": m(LogicalField::UserRoles),
        },
        "action": m(LogicalField::Action),
        "resource": {
            "before": m(LogicalField::BeforeResource),
            "after": m(LogicalField::AfterResource),
        },
        "attributes": {
            "request": {
                "http": {
                    "host": m(LogicalField::HttpHost),
                    "method": m(LogicalField::HttpMethod),
                    "path": m(LogicalField::HttpPath),
                }
            }
        },
        "parsed_body": m(LogicalField::HttpParsedBody),
        "parsed_path": m(LogicalField::HttpParsedPath),
        "parsed_query": m(LogicalField::HttpParsedQuery),
    })
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Find the single path in `flat` whose leaf is `marker`.
pub(crate) fn resolve_unique(
    flat: &BTreeMap<String, Value>,
    field: LogicalField,
    marker: &Marker,
) -> AuthzResult<String> {
    let mut matches = flat.iter().filter(|(_, leaf)| *leaf == marker.value());

    let first = matches.next();
    let second = matches.next();

    match (first, second) {
        (Some((path, _)), None) => Ok(path.clone()),
        (None, _) => Err(AuthzError::MappingResolution {
            field: field.to_string(),
            reason: "no path holds this field's marker; the field is not wired \
                     into the policy input schema"
                .to_string(),
        }),
        (Some((path, _)), Some((other, _))) => Err(AuthzError::MappingResolution {
            field: field.to_string(),
            reason: format!(
                "marker found at multiple paths ('{}', '{}'); the mapping is ambiguous",
                path, other
            ),
        }),
    }
}

pub(crate) fn resolve_all(markers: &BTreeMap<LogicalField, Marker>) -> AuthzResult<FieldPathMap> {
    let flat = flatten(&representative_input(markers));

    let mut map = FieldPathMap::default();
    for (field, marker) in markers {
        let path = resolve_unique(&flat, *field, marker)?;
        // Single-element list: the client-side producer yields exactly one
        // path per field; the list shape supports multi-source deployments.
        map.insert(*field, vec![path]);
    }
    Ok(map)
}

// ── Public entry points ───────────────────────────────────────────────────────

/// Discover the full field path map. Runs once per process start.
pub fn build_field_path_map() -> AuthzResult<FieldPathMap> {
    let map = resolve_all(&fresh_markers())?;
    info!(mapped_fields = map.len(), "field path map discovered");
    Ok(map)
}

/// Build the complete engine data context: the role hierarchy plus the
/// discovered field path map. The output feeds the policy data channel.
pub fn build_policy_data(roles_hierarchy: RoleHierarchy) -> AuthzResult<PolicyData> {
    Ok(PolicyData { roles_hierarchy, input_data_mapping: build_field_path_map()? })
}
