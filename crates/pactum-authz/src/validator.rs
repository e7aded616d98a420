//! Per-field validation against the contract rules.
//!
//! A form field is valid when the engine would accept the contract with the
//! proposed value substituted in. The validator builds the before/after pair
//! itself: `before` is the contract as it stands, `after` is the same
//! contract with just the one field replaced.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use pactum_contracts::contract::Contract;
use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::{decision_allows, Entrypoint, PolicyInput, ResourcePair};
use pactum_engine::PolicyEvaluationService;

/// The editable text fields of a contract form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractField {
    Title,
    Body,
    Signature,
}

impl ContractField {
    fn apply(&self, contract: &mut Contract, value: &str) {
        match self {
            ContractField::Title => contract.title = value.to_string(),
            ContractField::Body => contract.body = value.to_string(),
            ContractField::Signature => contract.signature = value.to_string(),
        }
    }

    /// The rule-set that governs this field.
    pub fn entrypoint(&self) -> Entrypoint {
        match self {
            ContractField::Title => Entrypoint::ContractValidTitle,
            ContractField::Body => Entrypoint::ContractValidBody,
            ContractField::Signature => Entrypoint::ContractValidSignature,
        }
    }
}

impl fmt::Display for ContractField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractField::Title => "title",
            ContractField::Body => "body",
            ContractField::Signature => "signature",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValidation {
    Valid,
    Invalid,
}

/// Validates proposed values for one field of the contract under edit.
pub struct FieldValidator {
    field: ContractField,
    entrypoint: Entrypoint,
    contract: watch::Receiver<Option<Contract>>,
    evaluation: Arc<PolicyEvaluationService>,
}

impl FieldValidator {
    /// A validator with an explicit rule-set, for deployments where one
    /// entrypoint covers several fields.
    pub fn new(
        field: ContractField,
        entrypoint: Entrypoint,
        contract: watch::Receiver<Option<Contract>>,
        evaluation: Arc<PolicyEvaluationService>,
    ) -> Self {
        Self { field, entrypoint, contract, evaluation }
    }

    /// A validator bound to the field's own rule-set.
    pub fn for_field(
        field: ContractField,
        contract: watch::Receiver<Option<Contract>>,
        evaluation: Arc<PolicyEvaluationService>,
    ) -> Self {
        Self::new(field, field.entrypoint(), contract, evaluation)
    }

    /// Check `proposed` against the current contract. Suspends until the
    /// contract stream has produced a value.
    pub async fn validate(&self, proposed: &str) -> AuthzResult<FieldValidation> {
        let mut rx = self.contract.clone();
        let current = rx
            .wait_for(|contract| contract.is_some())
            .await
            .map_err(|_| AuthzError::InvalidRequest {
                reason: format!(
                    "contract stream closed before validating field '{}'",
                    self.field
                ),
            })?
            .clone();
        let Some(current) = current else {
            return Err(AuthzError::InvalidRequest {
                reason: "contract stream yielded no value".to_string(),
            });
        };

        let mut after = current.clone();
        self.field.apply(&mut after, proposed);

        let to_snapshot = |contract: &Contract| {
            serde_json::to_value(contract).map_err(|e| AuthzError::Evaluation {
                reason: format!("failed to serialize contract snapshot: {}", e),
            })
        };
        let input = PolicyInput {
            resource: Some(ResourcePair {
                before: Some(to_snapshot(&current)?),
                after: Some(to_snapshot(&after)?),
            }),
            ..PolicyInput::default()
        };

        let label = format!("form field validation ({})", self.field);
        let decision = self.evaluation.evaluate(&input, self.entrypoint, &label).await?;
        Ok(if decision_allows(&decision) {
            FieldValidation::Valid
        } else {
            FieldValidation::Invalid
        })
    }
}
