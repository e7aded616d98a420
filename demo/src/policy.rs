//! A hand-written compiled policy module for the demo.
//!
//! Stands in for the binary artifact a real deployment fetches at startup.
//! The rules read their inputs exclusively through the field path mapping
//! carried in the data context, exactly the way the deployed module does —
//! nothing here touches the input document by literal path.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{json, Value};

use pactum_contracts::contract::{Contract, LifecycleState};
use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::{Entrypoint, LogicalField, PolicyData};
use pactum_contracts::subject::Role;
use pactum_engine::{CompiledPolicy, ModuleLoader};

/// Loads the in-process demo module.
pub struct DemoModuleLoader;

#[async_trait]
impl ModuleLoader for DemoModuleLoader {
    async fn load(&self) -> AuthzResult<Box<dyn CompiledPolicy>> {
        Ok(Box::new(DemoPolicy { data: None }))
    }
}

/// The demo rule-set.
pub struct DemoPolicy {
    data: Option<PolicyData>,
}

impl CompiledPolicy for DemoPolicy {
    fn set_data(&mut self, data: &Value) -> AuthzResult<()> {
        self.data = Some(serde_json::from_value(data.clone()).map_err(|e| {
            AuthzError::Evaluation { reason: format!("unusable data context: {}", e) }
        })?);
        Ok(())
    }

    fn evaluate(&mut self, input: &Value, entrypoint: Entrypoint) -> AuthzResult<Value> {
        let data = self.data.as_ref().ok_or_else(|| AuthzError::Evaluation {
            reason: "no data context applied before evaluation".to_string(),
        })?;
        let rules = Rules { data, input };

        let result = match entrypoint {
            Entrypoint::FeatureAllow => json!(rules.feature_allow()),
            Entrypoint::HttpAllow => json!(rules.http_allow()),
            Entrypoint::ContractAllowAction => json!(rules.allow_action()),
            Entrypoint::ContractAvailableStates => json!(rules.available_states()),
            Entrypoint::ContractValidTitle => json!(rules.valid_title()),
            Entrypoint::ContractValidBody => json!(rules.valid_body()),
            Entrypoint::ContractValidSignature => json!(rules.valid_signature()),
            Entrypoint::ContractValid => {
                json!(rules.valid_title() && rules.valid_body() && rules.valid_signature())
            }
        };
        Ok(json!([{ "result": result }]))
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

struct Rules<'a> {
    data: &'a PolicyData,
    input: &'a Value,
}

impl Rules<'_> {
    /// Read a logical field through the mapping.
    fn field(&self, field: LogicalField) -> Option<&Value> {
        let path = self.data.input_data_mapping.primary(field)?;
        lookup(self.input, path)
    }

    fn str_field(&self, field: LogicalField) -> Option<&str> {
        self.field(field).and_then(Value::as_str)
    }

    fn contract_field(&self, field: LogicalField) -> Option<Contract> {
        self.field(field).and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    fn reachable_roles(&self) -> BTreeSet<Role> {
        let held: Vec<Role> = self
            .field(LogicalField::UserRoles)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        self.data.roles_hierarchy.reachable(&held)
    }

    fn has_role(&self, role: Role) -> bool {
        self.reachable_roles().contains(&role)
    }

    // ── feature/allow ────────────────────────────────────────────────────────

    fn feature_allow(&self) -> bool {
        let Some(feature) = self.str_field(LogicalField::AfterResource) else {
            return false;
        };
        match feature {
            "contracts" => self.has_role(Role::Employee),
            "administration" => self.has_role(Role::ContractAdmin),
            _ => false,
        }
    }

    // ── http/allow ───────────────────────────────────────────────────────────

    fn http_allow(&self) -> bool {
        let method = self.str_field(LogicalField::HttpMethod).unwrap_or_default();
        let segments: Vec<String> = self
            .field(LogicalField::HttpParsedPath)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        if segments.first().map(String::as_str) != Some("api")
            || segments.get(1).map(String::as_str) != Some("contracts")
        {
            return false;
        }

        match method {
            "GET" => {
                let author_scoped = self
                    .field(LogicalField::HttpParsedQuery)
                    .and_then(|query| query.get("author"))
                    .is_some();
                let item_request = segments.len() > 2;
                if item_request || author_scoped {
                    self.has_role(Role::Employee)
                } else {
                    // The unrestricted listing exposes everyone's drafts.
                    self.has_role(Role::ContractAdmin)
                }
            }
            "POST" | "PUT" | "DELETE" => self.has_role(Role::Employee),
            _ => false,
        }
    }

    // ── contract/allow_action ────────────────────────────────────────────────

    fn allow_action(&self) -> bool {
        let action = self.str_field(LogicalField::Action).unwrap_or_default();
        match action {
            "Create" | "Read" => self.has_role(Role::Employee),
            "Update" => {
                let Some(before) = self.contract_field(LogicalField::BeforeResource) else {
                    return false;
                };
                // Signed and archived contracts are immutable.
                before.lifecycle_state == LifecycleState::Draft && self.owns(&before)
                    || self.has_role(Role::ContractAdmin)
            }
            "Delete" => {
                let Some(before) = self.contract_field(LogicalField::BeforeResource) else {
                    return false;
                };
                before.lifecycle_state == LifecycleState::Draft && self.owns(&before)
                    || self.has_role(Role::ContractAdmin)
            }
            _ => false,
        }
    }

    fn owns(&self, contract: &Contract) -> bool {
        self.str_field(LogicalField::UserId) == Some(contract.author.as_str())
            && self.has_role(Role::Employee)
    }

    // ── contract/available_states ────────────────────────────────────────────

    fn available_states(&self) -> Vec<&'static str> {
        if !self.has_role(Role::Employee) {
            return Vec::new();
        }
        let Some(before) = self.contract_field(LogicalField::BeforeResource) else {
            return Vec::new();
        };
        match before.lifecycle_state {
            LifecycleState::Draft => {
                if !before.body.is_empty() && !before.signature.is_empty() {
                    vec!["Draft", "Signed"]
                } else {
                    vec!["Draft"]
                }
            }
            LifecycleState::Signed => vec!["Signed", "Archived"],
            LifecycleState::Archived => vec!["Archived"],
        }
    }

    // ── contract/valid_* ─────────────────────────────────────────────────────

    fn after(&self) -> Option<Contract> {
        self.contract_field(LogicalField::AfterResource)
    }

    fn valid_title(&self) -> bool {
        self.after().map(|c| !c.title.is_empty()).unwrap_or(false)
    }

    fn valid_body(&self) -> bool {
        self.after().map(|c| !c.body.is_empty()).unwrap_or(false)
    }

    /// An empty signature is fine (nothing signed yet); a present one
    /// requires a body to sign.
    fn valid_signature(&self) -> bool {
        self.after()
            .map(|c| c.signature.is_empty() || !c.body.is_empty())
            .unwrap_or(false)
    }
}

/// Walk a dot-delimited path through a JSON document.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
