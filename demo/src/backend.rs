//! An in-memory contract backend for the demo.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use pactum_authz::{OutboundRequest, Transport, TransportResponse};
use pactum_contracts::contract::{Contract, LifecycleState};
use pactum_contracts::error::{AuthzError, AuthzResult};

/// Routes `/api/contracts` requests against an in-process map.
pub struct InMemoryContractApi {
    contracts: Mutex<BTreeMap<Uuid, Contract>>,
}

impl InMemoryContractApi {
    /// A backend pre-seeded with a few contracts in different states.
    pub fn seeded() -> Arc<Self> {
        let mut contracts = BTreeMap::new();

        let mut office_lease = Contract::draft("alice", "Office lease");
        office_lease.body = "The tenant leases floor 3 for 24 months.".to_string();
        contracts.insert(office_lease.id, office_lease);

        let mut supply_deal = Contract::draft("alice", "Supply agreement");
        supply_deal.body = "Quarterly delivery of 500 units.".to_string();
        supply_deal.signature = "Jane Doe".to_string();
        supply_deal.lifecycle_state = LifecycleState::Signed;
        contracts.insert(supply_deal.id, supply_deal);

        let bob_draft = Contract::draft("bob", "Consulting engagement");
        contracts.insert(bob_draft.id, bob_draft);

        Arc::new(Self { contracts: Mutex::new(contracts) })
    }

    pub fn signed_contract_of(&self, author: &str) -> Option<Contract> {
        self.contracts
            .lock()
            .expect("backend lock poisoned")
            .values()
            .find(|contract| {
                contract.author == author
                    && contract.lifecycle_state == LifecycleState::Signed
            })
            .cloned()
    }

    fn decode(body: &Option<Value>) -> AuthzResult<Contract> {
        let body = body.as_ref().ok_or_else(|| AuthzError::Transport {
            reason: "request body missing (400)".to_string(),
        })?;
        serde_json::from_value(body.clone()).map_err(|e| AuthzError::Transport {
            reason: format!("malformed contract body (400): {}", e),
        })
    }
}

fn parse_id(raw: &str) -> AuthzResult<Uuid> {
    raw.parse().map_err(|_| AuthzError::Transport {
        reason: format!("'{}' is not a contract id (400)", raw),
    })
}

fn not_found(id: Uuid) -> AuthzError {
    AuthzError::Transport { reason: format!("contract {} not found (404)", id) }
}

#[async_trait]
impl Transport for InMemoryContractApi {
    async fn send(&self, request: OutboundRequest) -> AuthzResult<TransportResponse> {
        let path = request.url.path().to_string();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut contracts = self.contracts.lock().expect("backend lock poisoned");

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["api", "contracts"]) => {
                let author = request
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "author")
                    .map(|(_, value)| value.into_owned());
                let listed: Vec<&Contract> = contracts
                    .values()
                    .filter(|contract| {
                        author.as_deref().map(|a| contract.author == a).unwrap_or(true)
                    })
                    .collect();
                Ok(TransportResponse::ok(json!(listed)))
            }
            ("GET", ["api", "contracts", id]) => {
                let id = parse_id(id)?;
                let contract = contracts.get(&id).ok_or_else(|| not_found(id))?;
                Ok(TransportResponse::ok(json!(contract)))
            }
            ("POST", ["api", "contracts"]) => {
                let contract = Self::decode(&request.body)?;
                let response = TransportResponse::ok(json!(&contract));
                contracts.insert(contract.id, contract);
                Ok(response)
            }
            ("PUT", ["api", "contracts", id]) => {
                let id = parse_id(id)?;
                if !contracts.contains_key(&id) {
                    return Err(not_found(id));
                }
                let contract = Self::decode(&request.body)?;
                let response = TransportResponse::ok(json!(&contract));
                contracts.insert(id, contract);
                Ok(response)
            }
            ("DELETE", ["api", "contracts", id]) => {
                let id = parse_id(id)?;
                contracts.remove(&id).ok_or_else(|| not_found(id))?;
                Ok(TransportResponse::ok(Value::Null))
            }
            _ => Err(AuthzError::Transport {
                reason: format!("no route for {} {} (404)", request.method, path),
            }),
        }
    }
}
