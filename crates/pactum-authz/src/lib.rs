//! # pactum-authz
//!
//! The authorization orchestration layer of Pactum: the identity channel,
//! the debounced decision pipelines, the [`AuthorizationOrchestrator`]
//! answering one-shot and live questions, per-field contract validation,
//! the policy-enforced transport, and the contract service that routes all
//! backend CRUD through those decisions.

pub mod config;
pub mod enforcement;
pub mod identity;
pub mod orchestrator;
pub mod pipeline;
pub mod store;
pub mod validator;

pub use config::AuthzConfig;
pub use enforcement::{
    OutboundRequest, PolicyEnforcedTransport, Transport, TransportResponse,
};
pub use identity::IdentityChannel;
pub use orchestrator::{AuthorizationOrchestrator, StateAvailability};
pub use pipeline::{spawn_decision_pipeline, CombinedInput, PipelineOptions};
pub use store::ContractService;
pub use validator::{ContractField, FieldValidation, FieldValidator};

// ── Tests ─────────────────────────────────────────────────────────────────────
