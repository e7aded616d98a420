//! Error types for the Pactum authorization pipeline.
//!
//! All fallible operations return `AuthzResult<T>`. The enum is `Clone`
//! because the one-time engine load outcome is cached and replayed to every
//! waiter, success or failure alike.

use thiserror::Error;

/// The unified error type for the Pactum crates.
#[derive(Debug, Clone, Error)]
pub enum AuthzError {
    /// The compiled policy module could not be fetched or instantiated.
    ///
    /// Fatal for the process: every pending and future evaluation receives
    /// this same error, since no authorization decision can be made without
    /// a loaded module.
    #[error("failed to load compiled policy module: {reason}")]
    EngineLoad { reason: String },

    /// The engine rejected an evaluation call, or an input document could
    /// not be serialized for it.
    #[error("policy evaluation failed: {reason}")]
    Evaluation { reason: String },

    /// A logical field could not be resolved to exactly one path in the
    /// representative input document.
    ///
    /// Fatal at startup: it indicates a broken contract between the domain
    /// model shape and the expected policy input schema, so initialization
    /// must abort rather than run with a partial mapping.
    #[error("field path mapping failed for '{field}': {reason}")]
    MappingResolution { field: String, reason: String },

    /// The backend transport failed (network, serialization, bad status).
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// An outbound request was denied by the http/allow entrypoint.
    ///
    /// The 403-equivalent produced by the policy-enforced transport.
    #[error("{method} {url} blocked by PolicyEnforcedTransport (status 403)")]
    RequestBlocked { method: String, url: String },

    /// A write operation was rejected by a policy decision.
    ///
    /// Distinct from `Transport` so callers can tell "rejected by rule"
    /// apart from "network broke".
    #[error("denied by policy: {reason}")]
    DeniedByPolicy { reason: String },

    /// The caller asked an authorization question that cannot be formed.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Convenience alias used throughout the Pactum crates.
pub type AuthzResult<T> = Result<T, AuthzError>;
