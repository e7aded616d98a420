//! HTTP attributes carried inside a policy input.
//!
//! The shapes replicate the subset of Envoy's external-authorization
//! `CheckRequest` that the http/allow rules read, so a decision made here in
//! the client matches what an API gateway running the same compiled module
//! would decide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level `attributes` sub-document of a policy input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AttributedRequest>,
}

/// The `attributes.request` wrapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributedRequest {
    pub http: HttpRequestAttributes,
}

/// The `attributes.request.http` sub-document: the raw transport view of an
/// outbound request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestAttributes {
    pub host: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl RequestAttributes {
    pub fn for_http(http: HttpRequestAttributes) -> Self {
        Self { request: Some(AttributedRequest { http }) }
    }
}
