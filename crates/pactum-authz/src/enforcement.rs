//! Outbound requests and the policy-enforced transport.
//!
//! Every backend call flows through a [`Transport`]. The
//! [`PolicyEnforcedTransport`] wraps a plain transport and asks the
//! `http/allow` entrypoint before letting a request out; a denial surfaces
//! as [`AuthzError::RequestBlocked`], the client-side analogue of a 403.
//! Static asset paths are exempt — the policy module itself arrives over
//! one of those requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use pactum_contracts::error::{AuthzError, AuthzResult};
use pactum_contracts::http::{HttpRequestAttributes, RequestAttributes};
use pactum_contracts::policy::{decision_allows, Entrypoint, PolicyInput};
use pactum_contracts::subject::Subject;
use pactum_engine::PolicyEvaluationService;

use crate::config::AuthzConfig;
use crate::identity::IdentityChannel;

// ── Requests and responses ────────────────────────────────────────────────────

/// An outbound backend request, before enforcement.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    /// Header names are kept lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: BTreeMap::new(), body: None }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self.body = Some(body);
        self
    }

    fn body_is_json(&self) -> bool {
        match self.headers.get("content-type") {
            Some(content_type) => {
                content_type.to_ascii_lowercase().contains("application/json")
            }
            // A structured body with no declared content type is sent as
            // JSON by this transport.
            None => true,
        }
    }

    /// The policy input describing this request: raw http attributes plus
    /// the parsed path segments, query multimap, and JSON body the rules
    /// match against.
    pub fn to_policy_input(&self, subject: Option<Subject>) -> PolicyInput {
        let parsed_path: Vec<String> = self
            .url
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        let mut parsed_query: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in self.url.query_pairs() {
            parsed_query.entry(key.into_owned()).or_default().push(value.into_owned());
        }

        let parsed_body = if self.body_is_json() { self.body.clone() } else { None };

        PolicyInput {
            subject,
            attributes: Some(RequestAttributes::for_http(HttpRequestAttributes {
                host: self.url.host_str().unwrap_or_default().to_string(),
                method: self.method.to_string(),
                path: self.url.path().to_string(),
                headers: self.headers.clone(),
                protocol: Some(format!("{}:", self.url.scheme())),
            })),
            parsed_path: Some(parsed_path),
            parsed_query: Some(parsed_query),
            parsed_body,
            ..PolicyInput::default()
        }
    }
}

/// A backend response with its body already decoded to JSON.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TransportResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: StatusCode::OK, body }
    }

    /// Decode the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> AuthzResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| AuthzError::Transport {
            reason: format!("failed to decode response body: {}", e),
        })
    }
}

/// The seam to the actual backend (or an in-memory double in tests).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> AuthzResult<TransportResponse>;
}

// ── Enforcement ───────────────────────────────────────────────────────────────

/// A transport decorator that consults the engine before every send.
pub struct PolicyEnforcedTransport {
    inner: Arc<dyn Transport>,
    evaluation: Arc<PolicyEvaluationService>,
    identity: IdentityChannel,
    config: AuthzConfig,
}

impl PolicyEnforcedTransport {
    pub fn new(
        inner: Arc<dyn Transport>,
        evaluation: Arc<PolicyEvaluationService>,
        identity: IdentityChannel,
        config: &AuthzConfig,
    ) -> Self {
        Self { inner, evaluation, identity, config: config.clone() }
    }
}

#[async_trait]
impl Transport for PolicyEnforcedTransport {
    async fn send(&self, request: OutboundRequest) -> AuthzResult<TransportResponse> {
        if self.config.is_exempt(request.url.path()) {
            debug!(path = request.url.path(), "request exempt from policy enforcement");
            return self.inner.send(request).await;
        }

        let input = request.to_policy_input(self.identity.latest());
        let decision = self
            .evaluation
            .evaluate(&input, Entrypoint::HttpAllow, "outbound request enforcement")
            .await?;

        if decision_allows(&decision) {
            self.inner.send(request).await
        } else {
            warn!(
                method = %request.method,
                url = %request.url,
                "outbound request blocked by policy"
            );
            Err(AuthzError::RequestBlocked {
                method: request.method.to_string(),
                url: request.url.to_string(),
            })
        }
    }
}
