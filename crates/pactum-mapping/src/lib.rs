//! # pactum-mapping
//!
//! Builds the verified structural mapping between the Pactum domain model
//! and the flat field-path vocabulary the policy engine expects. See
//! [`mapper`] for the discovery algorithm; [`build_policy_data`] is the
//! one-shot startup producer whose output feeds the policy data channel.
//!
//! Anything beyond "day one" gets easier with this bridge in place; getting
//! past day one costs the discovery machinery below.

pub mod flatten;
pub mod mapper;

pub use flatten::flatten;
pub use mapper::{build_field_path_map, build_policy_data};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use pactum_contracts::contract::Contract;
    use pactum_contracts::error::AuthzError;
    use pactum_contracts::http::{HttpRequestAttributes, RequestAttributes};
    use pactum_contracts::policy::{
        Action, LogicalField, PolicyInput, ResourcePair,
    };
    use pactum_contracts::subject::{Department, Role, RoleHierarchy, Subject};

    use crate::flatten::flatten;
    use crate::mapper::{
        build_field_path_map, build_policy_data, fresh_markers, representative_input,
        resolve_all, resolve_unique, Marker,
    };

    // ── Round trip ───────────────────────────────────────────────────────────

    /// Every logical field resolves to a non-empty path, and looking that
    /// path up in the re-flattened representative document returns the
    /// exact marker originally assigned to the field.
    #[test]
    fn every_field_round_trips_through_its_resolved_path() {
        let markers = fresh_markers();
        let map = resolve_all(&markers).unwrap();
        let flat = flatten(&representative_input(&markers));

        for field in LogicalField::ALL {
            let paths = map.resolve(field).unwrap();
            assert_eq!(paths.len(), 1, "{} must yield exactly one path", field);
            assert!(!paths[0].is_empty());
            assert_eq!(
                flat.get(&paths[0]),
                Some(markers[&field].value()),
                "path for {} must hold its own marker",
                field
            );
        }
    }

    #[test]
    fn discovered_paths_match_the_input_schema() {
        let map = build_field_path_map().unwrap();

        assert_eq!(map.primary(LogicalField::BeforeResource), Some("resource.before"));
        assert_eq!(map.primary(LogicalField::AfterResource), Some("resource.after"));
        assert_eq!(map.primary(LogicalField::UserId), Some("subject.id"));
        assert_eq!(map.primary(LogicalField::UserRoles), Some("subject.roles"));
        assert_eq!(map.primary(LogicalField::HttpHost), Some("attributes.request.http.host"));
        assert_eq!(map.primary(LogicalField::HttpMethod), Some("attributes.request.http.method"));
        assert_eq!(map.primary(LogicalField::HttpPath), Some("attributes.request.http.path"));
        assert_eq!(map.primary(LogicalField::HttpParsedBody), Some("parsed_body"));
        assert_eq!(map.primary(LogicalField::HttpParsedPath), Some("parsed_path"));
        assert_eq!(map.primary(LogicalField::HttpParsedQuery), Some("parsed_query"));
        assert_eq!(map.primary(LogicalField::Action), Some("action"));
    }

    // ── Uniqueness ───────────────────────────────────────────────────────────

    /// Two fresh markers are never equal, even though their roles in the
    /// document are structurally identical placeholders.
    #[test]
    fn fresh_markers_are_pairwise_distinct() {
        let markers = fresh_markers();
        let values: Vec<_> = markers.values().collect();
        for (i, a) in values.iter().enumerate() {
            for b in &values[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    /// Structurally similar fields must not resolve to each other's path.
    #[test]
    fn sibling_placeholders_do_not_cross_match() {
        let markers = fresh_markers();
        let map = resolve_all(&markers).unwrap();
        assert_ne!(
            map.primary(LogicalField::BeforeResource),
            map.primary(LogicalField::AfterResource)
        );
    }

    /// Reusing one marker instance for two fields makes resolution
    /// ambiguous and must fail at startup.
    #[test]
    fn shared_marker_instance_fails_resolution() {
        let mut markers = fresh_markers();
        let shared = markers[&LogicalField::BeforeResource].clone();
        markers.insert(LogicalField::AfterResource, shared);

        let err = resolve_all(&markers).unwrap_err();
        assert!(matches!(err, AuthzError::MappingResolution { .. }));
    }

    /// A marker that never made it into the document must fail resolution
    /// with a missing-field error rather than map to an arbitrary path.
    #[test]
    fn unwired_marker_fails_resolution() {
        let flat: BTreeMap<_, _> = flatten(&json!({ "subject": { "id": "real-data" } }));
        let err =
            resolve_unique(&flat, LogicalField::UserId, &Marker::fresh()).unwrap_err();
        match err {
            AuthzError::MappingResolution { field, reason } => {
                assert_eq!(field, "userId");
                assert!(reason.contains("not wired"));
            }
            other => panic!("expected MappingResolution, got {:?}", other),
        }
    }

    // ── Schema sync ──────────────────────────────────────────────────────────

    /// The representative document is hand-shaped; this test pins it to the
    /// typed schema. Every discovered path must exist in the serialized
    /// form of a fully populated `PolicyInput` fixture, either as a leaf or
    /// as a sub-document prefix.
    #[test]
    fn discovered_paths_exist_in_a_serialized_typed_fixture() {
        let contract = Contract::draft("u-1", "fixture");
        let fixture = PolicyInput {
            subject: Some(Subject {
                id: "u-1".to_string(),
                name: "Fixture Person".to_string(),
                department: Some(Department::It),
                roles: vec![Role::Employee],
            }),
            action: Some(Action::Update),
            resource: Some(ResourcePair {
                before: Some(serde_json::to_value(&contract).unwrap()),
                after: Some(serde_json::to_value(&contract).unwrap()),
            }),
            attributes: Some(RequestAttributes::for_http(HttpRequestAttributes {
                host: "app.local".to_string(),
                method: "PUT".to_string(),
                path: "/api/contracts/1".to_string(),
                headers: [("accept".to_string(), "application/json".to_string())].into(),
                protocol: Some("http:".to_string()),
            })),
            parsed_path: Some(vec!["api".to_string(), "contracts".to_string()]),
            parsed_query: Some([("expand".to_string(), vec!["all".to_string()])].into()),
            parsed_body: Some(json!({ "title": "fixture" })),
        };

        let flat = flatten(&serde_json::to_value(&fixture).unwrap());
        let map = build_field_path_map().unwrap();

        for field in LogicalField::ALL {
            let path = map.primary(field).unwrap();
            let present = flat
                .keys()
                .any(|key| key == path || key.starts_with(&format!("{}.", path)));
            assert!(present, "path '{}' for {} is absent from the typed schema", path, field);
        }
    }

    // ── Policy data producer ─────────────────────────────────────────────────

    #[test]
    fn policy_data_carries_hierarchy_and_mapping() {
        let data = build_policy_data(RoleHierarchy::default()).unwrap();
        assert_eq!(data.roles_hierarchy, RoleHierarchy::default());
        assert_eq!(data.input_data_mapping.len(), LogicalField::ALL.len());
    }
}
