//! The authorization orchestrator: one-shot questions and live decision
//! streams over the evaluation service.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::error;

use async_trait::async_trait;

use pactum_contracts::contract::{Contract, LifecycleState};
use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::{
    decision_allows, Action, Entrypoint, PolicyInput, ResourcePair,
};
use pactum_contracts::subject::Subject;
use pactum_engine::PolicyEvaluationService;

use crate::config::AuthzConfig;
use crate::identity::IdentityChannel;
use crate::pipeline::{spawn_decision_pipeline, CombinedInput, PipelineOptions};

/// Every lifecycle state paired with whether a transition to it is allowed
/// right now. Order follows [`LifecycleState::ALL`].
pub type StateAvailability = Vec<(LifecycleState, bool)>;

/// Front door for authorization questions.
///
/// One-shot queries (`feature_access`, `can_delete`) resolve a single
/// decision; stream queries (`allow_action`, `available_states`) spawn a
/// pipeline that keeps the decision current as its inputs move.
pub struct AuthorizationOrchestrator {
    evaluation: Arc<PolicyEvaluationService>,
    identity: IdentityChannel,
    config: AuthzConfig,
}

impl AuthorizationOrchestrator {
    pub fn new(
        evaluation: Arc<PolicyEvaluationService>,
        identity: IdentityChannel,
        config: AuthzConfig,
    ) -> Self {
        Self { evaluation, identity, config }
    }

    pub fn identity(&self) -> &IdentityChannel {
        &self.identity
    }

    // ── One-shot questions ───────────────────────────────────────────────────

    /// May the current session see `feature`?
    ///
    /// Runs with whatever identity is present right now — an anonymous
    /// session gets the anonymous answer, not an error.
    pub async fn feature_access(&self, feature: &str) -> AuthzResult<bool> {
        if feature.is_empty() {
            return Err(AuthzError::InvalidRequest {
                reason: "feature name is not provided".to_string(),
            });
        }
        let subject = self.identity.latest();
        let label = format!(
            "can user {} access feature {}",
            subject.as_ref().map(|s| s.id.as_str()).unwrap_or("<anonymous>"),
            feature
        );
        let input = PolicyInput::for_feature(subject, feature);
        let decision =
            self.evaluation.evaluate(&input, Entrypoint::FeatureAllow, &label).await?;
        Ok(decision_allows(&decision))
    }

    /// May the signed-in subject delete `contract`? Waits for sign-in.
    pub async fn can_delete(&self, contract: &Contract) -> AuthzResult<bool> {
        let subject = self.identity.wait_for_identity().await;
        let label = format!("can user {} delete contract {}", subject.id, contract.id);
        let input =
            PolicyInput::for_action(Some(subject), Action::Delete, Some(contract), None)?;
        let decision = self
            .evaluation
            .evaluate(&input, Entrypoint::ContractAllowAction, &label)
            .await?;
        Ok(decision_allows(&decision))
    }

    // ── Decision streams ─────────────────────────────────────────────────────

    /// Live decision: is `action` allowed for the current before/after pair
    /// and identity? A null engine result reads as deny.
    pub fn allow_action(
        &self,
        action: Action,
        entrypoint: Entrypoint,
        before: watch::Receiver<Option<Value>>,
        after: watch::Receiver<Option<Value>>,
    ) -> watch::Receiver<Option<bool>> {
        let sources = ActionSources { before, after, identity: self.identity.watch() };
        let evaluation = Arc::clone(&self.evaluation);

        spawn_decision_pipeline(
            sources,
            PipelineOptions::debounce(self.config.debounce_window()),
            move |snapshot: ActionSnapshot| {
                let evaluation = Arc::clone(&evaluation);
                async move {
                    let input = PolicyInput {
                        subject: snapshot.subject,
                        action: Some(action),
                        resource: Some(ResourcePair {
                            before: snapshot.before,
                            after: snapshot.after,
                        }),
                        ..PolicyInput::default()
                    };
                    let label = format!("live allow-action check ({})", entrypoint);
                    match evaluation.evaluate(&input, entrypoint, &label).await {
                        Ok(decision) => Some(decision_allows(&decision)),
                        Err(e) => {
                            error!(error = %e, "allow-action evaluation failed");
                            None
                        }
                    }
                }
            },
        )
    }

    /// Live availability of every lifecycle state for the contract under
    /// edit. Emits nothing until an identity is present.
    ///
    /// Re-evaluations are filtered through [`states_snapshot_equivalent`]:
    /// the governing transition rules read only the *emptiness* of body and
    /// signature, so pure content edits cannot change the answer and are
    /// not re-asked.
    pub fn available_states(
        &self,
        contract: watch::Receiver<Option<Contract>>,
    ) -> watch::Receiver<Option<StateAvailability>> {
        let sources = StateSources { contract, identity: self.identity.watch() };
        let evaluation = Arc::clone(&self.evaluation);
        let options = PipelineOptions::debounce(self.config.debounce_window())
            .with_equivalence(states_snapshot_equivalent);

        spawn_decision_pipeline(sources, options, move |snapshot: StateSnapshot| {
            let evaluation = Arc::clone(&evaluation);
            async move {
                let (Some(contract), Some(subject)) = (snapshot.contract, snapshot.subject)
                else {
                    return None;
                };
                let before = match serde_json::to_value(&contract) {
                    Ok(value) => value,
                    Err(e) => {
                        error!(error = %e, "failed to serialize contract snapshot");
                        return None;
                    }
                };
                let label = format!("available states for contract {}", contract.id);
                let input = PolicyInput {
                    subject: Some(subject),
                    resource: Some(ResourcePair {
                        before: Some(before),
                        // The transition rules only look at the current
                        // state; the proposed side is an empty document.
                        after: Some(Value::Object(Default::default())),
                    }),
                    ..PolicyInput::default()
                };
                match evaluation
                    .evaluate(&input, Entrypoint::ContractAvailableStates, &label)
                    .await
                {
                    Ok(decision) => {
                        let allowed: &[String] =
                            decision.as_ref().map(|d| d.values()).unwrap_or(&[]);
                        Some(render_state_availability(allowed))
                    }
                    Err(e) => {
                        error!(error = %e, "available-states evaluation failed");
                        None
                    }
                }
            }
        })
    }
}

/// Map the engine's allowed-state names onto the full, ordered state list.
/// A null decision renders as all-disabled rather than no emission.
fn render_state_availability(allowed: &[String]) -> StateAvailability {
    LifecycleState::ALL
        .iter()
        .map(|state| (*state, allowed.iter().any(|name| name == state_name(*state))))
        .collect()
}

fn state_name(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Draft => "Draft",
        LifecycleState::Signed => "Signed",
        LifecycleState::Archived => "Archived",
    }
}

// ── Combined inputs ───────────────────────────────────────────────────────────

struct ActionSources {
    before: watch::Receiver<Option<Value>>,
    after: watch::Receiver<Option<Value>>,
    identity: watch::Receiver<Option<Subject>>,
}

#[derive(Clone)]
struct ActionSnapshot {
    before: Option<Value>,
    after: Option<Value>,
    subject: Option<Subject>,
}

#[async_trait]
impl CombinedInput for ActionSources {
    type Snapshot = ActionSnapshot;

    async fn changed(&mut self) -> bool {
        tokio::select! {
            changed = self.before.changed() => changed.is_ok(),
            changed = self.after.changed() => changed.is_ok(),
            changed = self.identity.changed() => changed.is_ok(),
        }
    }

    fn snapshot(&self) -> ActionSnapshot {
        ActionSnapshot {
            before: self.before.borrow().clone(),
            after: self.after.borrow().clone(),
            subject: self.identity.borrow().clone(),
        }
    }
}

struct StateSources {
    contract: watch::Receiver<Option<Contract>>,
    identity: watch::Receiver<Option<Subject>>,
}

#[derive(Clone)]
struct StateSnapshot {
    contract: Option<Contract>,
    subject: Option<Subject>,
}

#[async_trait]
impl CombinedInput for StateSources {
    type Snapshot = StateSnapshot;

    async fn changed(&mut self) -> bool {
        tokio::select! {
            changed = self.contract.changed() => changed.is_ok(),
            changed = self.identity.changed() => changed.is_ok(),
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            contract: self.contract.borrow().clone(),
            subject: self.identity.borrow().clone(),
        }
    }
}

/// Two snapshots yield the same availability answer when the subject, the
/// lifecycle state, and the *emptiness* of body and signature all match.
/// The transition rules never read the text itself, so a keystroke in a
/// non-empty body cannot flip any state.
fn states_snapshot_equivalent(previous: &StateSnapshot, current: &StateSnapshot) -> bool {
    let state = |s: &StateSnapshot| s.contract.as_ref().map(|c| c.lifecycle_state);
    let body_empty = |s: &StateSnapshot| {
        s.contract.as_ref().map(|c| c.body.is_empty()).unwrap_or(true)
    };
    let signature_empty = |s: &StateSnapshot| {
        s.contract.as_ref().map(|c| c.signature.is_empty()).unwrap_or(true)
    };

    previous.subject == current.subject
        && state(previous) == state(current)
        && body_empty(previous) == body_empty(current)
        && signature_empty(previous) == signature_empty(current)
}

#[cfg(test)]
mod tests {
    use pactum_contracts::contract::{Contract, LifecycleState};

    use super::{render_state_availability, states_snapshot_equivalent, StateSnapshot};

    fn snapshot(contract: Option<Contract>) -> StateSnapshot {
        StateSnapshot { contract, subject: None }
    }

    #[test]
    fn rendering_preserves_state_order() {
        let availability =
            render_state_availability(&["Signed".to_string(), "Draft".to_string()]);
        assert_eq!(
            availability,
            vec![
                (LifecycleState::Draft, true),
                (LifecycleState::Signed, true),
                (LifecycleState::Archived, false),
            ]
        );
    }

    #[test]
    fn null_decision_renders_all_disabled() {
        let availability = render_state_availability(&[]);
        assert!(availability.iter().all(|(_, enabled)| !enabled));
        assert_eq!(availability.len(), LifecycleState::ALL.len());
    }

    #[test]
    fn content_edits_in_a_nonempty_body_are_equivalent() {
        let mut a = Contract::draft("u-1", "t");
        a.body = "hello".to_string();
        let mut b = a.clone();
        b.body = "hello world".to_string();
        assert!(states_snapshot_equivalent(&snapshot(Some(a)), &snapshot(Some(b))));
    }

    #[test]
    fn emptiness_flips_break_equivalence() {
        let mut a = Contract::draft("u-1", "t");
        a.body = "hello".to_string();
        let mut b = a.clone();
        b.body = String::new();
        assert!(!states_snapshot_equivalent(&snapshot(Some(a)), &snapshot(Some(b))));
    }

    #[test]
    fn lifecycle_change_breaks_equivalence() {
        let a = Contract::draft("u-1", "t");
        let mut b = a.clone();
        b.lifecycle_state = LifecycleState::Signed;
        assert!(!states_snapshot_equivalent(&snapshot(Some(a)), &snapshot(Some(b))));
    }
}
