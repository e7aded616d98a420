//! The contract service: backend CRUD behind policy decisions.

use std::sync::Arc;

use http::Method;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use pactum_contracts::contract::Contract;
use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::policy::{decision_allows, Action, Entrypoint, PolicyInput};
use pactum_engine::PolicyEvaluationService;

use crate::enforcement::{OutboundRequest, Transport};
use crate::identity::IdentityChannel;

/// CRUD over the contract collection.
///
/// The transport handed in is expected to be the policy-enforced one, so
/// every request below is subject to `http/allow` before it leaves. On top
/// of that, `update` pre-checks the domain rule the backend would apply on
/// receipt, and `contracts` degrades its scope to the caller's own
/// contracts when the unrestricted listing would be blocked.
pub struct ContractService {
    transport: Arc<dyn Transport>,
    evaluation: Arc<PolicyEvaluationService>,
    identity: IdentityChannel,
    collection: Url,
}

impl ContractService {
    /// `collection` is the contract collection endpoint, e.g.
    /// `http://backend.local/api/contracts`.
    pub fn new(
        transport: Arc<dyn Transport>,
        evaluation: Arc<PolicyEvaluationService>,
        identity: IdentityChannel,
        collection: Url,
    ) -> Self {
        Self { transport, evaluation, identity, collection }
    }

    fn item_url(&self, id: Uuid) -> AuthzResult<Url> {
        let raw = format!("{}/{}", self.collection.as_str().trim_end_matches('/'), id);
        Url::parse(&raw).map_err(|e| AuthzError::InvalidRequest {
            reason: format!("malformed contract url '{}': {}", raw, e),
        })
    }

    /// List the contracts visible to the signed-in subject.
    ///
    /// Asks `http/allow` whether the unrestricted listing would pass; when
    /// it would not, the request is scoped to the subject's own contracts
    /// instead of failing. Transport trouble degrades to an empty list —
    /// a broken backend must not take the whole view down.
    pub async fn contracts(&self) -> Vec<Contract> {
        let subject = self.identity.wait_for_identity().await;

        let unrestricted = OutboundRequest::new(Method::GET, self.collection.clone());
        let input = unrestricted.to_policy_input(Some(subject.clone()));
        let all_allowed = match self
            .evaluation
            .evaluate(&input, Entrypoint::HttpAllow, "contract listing scope probe")
            .await
        {
            Ok(decision) => decision_allows(&decision),
            Err(e) => {
                warn!(error = %e, "listing scope probe failed; using author scope");
                false
            }
        };

        let request = if all_allowed {
            unrestricted
        } else {
            let mut url = self.collection.clone();
            url.query_pairs_mut().append_pair("author", &subject.id);
            OutboundRequest::new(Method::GET, url)
        };

        match self.transport.send(request).await.and_then(|response| response.json()) {
            Ok(contracts) => contracts,
            Err(e) => {
                warn!(error = %e, "contract listing failed; showing empty list");
                Vec::new()
            }
        }
    }

    pub async fn contract(&self, id: Uuid) -> AuthzResult<Contract> {
        let request = OutboundRequest::new(Method::GET, self.item_url(id)?);
        self.transport.send(request).await?.json()
    }

    /// Create a fresh draft authored by the signed-in subject.
    pub async fn create(&self, title: &str) -> AuthzResult<Contract> {
        let subject = self.identity.wait_for_identity().await;
        let draft = Contract::draft(subject.id, title);
        let body = serde_json::to_value(&draft).map_err(|e| AuthzError::Transport {
            reason: format!("failed to encode contract: {}", e),
        })?;
        let request = OutboundRequest::new(Method::POST, self.collection.clone())
            .with_json_body(body);
        self.transport.send(request).await?.json()
    }

    pub async fn delete(&self, id: Uuid) -> AuthzResult<()> {
        let request = OutboundRequest::new(Method::DELETE, self.item_url(id)?);
        self.transport.send(request).await?;
        Ok(())
    }

    /// Persist `contract`, but only after the same `allow_action` rule the
    /// backend applies has accepted the update here. A denial returns
    /// [`AuthzError::DeniedByPolicy`] and the backend is never contacted
    /// with the write.
    pub async fn update(&self, contract: &Contract) -> AuthzResult<Contract> {
        let before = self.contract(contract.id).await?;
        let subject = self.identity.wait_for_identity().await;

        let input = PolicyInput::for_action(
            Some(subject),
            Action::Update,
            Some(&before),
            Some(contract),
        )?;
        let decision = self
            .evaluation
            .evaluate(
                &input,
                Entrypoint::ContractAllowAction,
                "contract update pre-check",
            )
            .await?;
        if !decision_allows(&decision) {
            return Err(AuthzError::DeniedByPolicy {
                reason: format!("update of contract {} was rejected", contract.id),
            });
        }

        let body = serde_json::to_value(contract).map_err(|e| AuthzError::Transport {
            reason: format!("failed to encode contract: {}", e),
        })?;
        let request = OutboundRequest::new(Method::PUT, self.item_url(contract.id)?)
            .with_json_body(body);
        self.transport.send(request).await?.json()
    }
}
