//! The evaluation service: rendezvous of module, data, and input.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::{Decision, Entrypoint, PolicyInput};

use crate::channel::PolicyDataChannel;
use crate::runtime::PolicyRuntime;

/// Combines the lazily-loaded module and the data channel into one
/// evaluation call per external request.
pub struct PolicyEvaluationService {
    runtime: Arc<PolicyRuntime>,
    data: Arc<PolicyDataChannel>,
}

impl PolicyEvaluationService {
    pub fn new(runtime: Arc<PolicyRuntime>, data: Arc<PolicyDataChannel>) -> Self {
        Self { runtime, data }
    }

    /// Evaluate `input` against the rule-set named by `entrypoint`.
    ///
    /// Suspends on whichever of module load and data-channel first-write is
    /// slower, then performs exactly one engine call: the data context is
    /// re-applied immediately before the evaluation that uses it, under a
    /// lock so concurrent invocations never interleave the pair.
    ///
    /// Returns `Ok(None)` when the engine produced no usable result for
    /// this entrypoint/input combination. That is a valid outcome, logged
    /// as a warning; callers treat it as deny wherever a boolean is
    /// expected and as the empty set wherever a set is expected.
    ///
    /// `audit_label` is a hint about the calling logic, carried into the
    /// evaluation log for traceability.
    pub async fn evaluate(
        &self,
        input: &PolicyInput,
        entrypoint: Entrypoint,
        audit_label: &str,
    ) -> AuthzResult<Option<Decision>> {
        let (handle, data) = tokio::join!(self.runtime.handle(), self.data.current());
        let handle = handle?;

        let input_value = serde_json::to_value(input).map_err(|e| AuthzError::Evaluation {
            reason: format!("failed to serialize policy input: {}", e),
        })?;
        let data_value =
            serde_json::to_value(data.as_ref()).map_err(|e| AuthzError::Evaluation {
                reason: format!("failed to serialize policy data: {}", e),
            })?;

        let response = {
            let mut policy = handle.lock().await;
            policy.set_data(&data_value)?;
            policy.evaluate(&input_value, entrypoint)?
        };

        // The response is a sequence of result records; the first record's
        // `result` field is the decision.
        let raw = response
            .as_array()
            .and_then(|records| records.first())
            .and_then(|record| record.get("result"))
            .cloned()
            .unwrap_or(Value::Null);

        match Decision::from_raw(&raw) {
            Some(decision) => {
                info!(
                    entrypoint = %entrypoint,
                    audit = audit_label,
                    input = %input_value,
                    result = ?decision,
                    "policy evaluation"
                );
                Ok(Some(decision))
            }
            None => {
                warn!(
                    entrypoint = %entrypoint,
                    audit = audit_label,
                    input = %input_value,
                    "policy evaluation produced no usable result"
                );
                Ok(None)
            }
        }
    }
}
