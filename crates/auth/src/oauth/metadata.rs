//! OAuth 2.0 Protected Resource Metadata (RFC 9728).
//!
//! MCP clients fetch this document to find the authorization server that
//! issues tokens for the endpoint. [`metadata_router`] serves it at the
//! well-known path, at the path-suffixed form for the `/mcp` resource, and
//! under the resource itself where some clients look first.

use axum::{Json, response::IntoResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-known path of the metadata document.
pub const METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// OAuth 2.0 Protected Resource Metadata ([RFC 9728](https://datatracker.ietf.org/doc/html/rfc9728)).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The resource identifier, the public URL of the MCP endpoint.
    pub resource: String,

    /// Authorization server(s) that can issue tokens for this resource.
    ///
    /// MUST contain at least one entry.
    pub authorization_servers: Vec<String>,

    /// Scopes supported by this resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Bearer token methods supported (e.g., `["header"]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,

    /// URL of the resource documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

impl ProtectedResourceMetadata {
    /// Metadata for `resource` whose tokens come from `issuer`.
    ///
    /// Authorization server identifiers are advertised without the trailing
    /// slash some issuers put in their `iss` claim.
    pub fn new(resource: impl Into<String>, issuer: &str) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![issuer.trim_end_matches('/').to_string()],
            scopes_supported: Some(Vec::new()),
            bearer_methods_supported: Some(vec!["header".into()]),
            resource_documentation: None,
        }
    }
}

/// Create an axum [`Router`](axum::Router) that serves the Protected Resource
/// Metadata as `application/json` at [`METADATA_PATH`],
/// `{METADATA_PATH}/mcp` and `/mcp{METADATA_PATH}`.
pub fn metadata_router(metadata: ProtectedResourceMetadata) -> axum::Router {
    let metadata = Arc::new(metadata);
    let handler = move || {
        let metadata = metadata.clone();
        async move { Json(metadata.as_ref().clone()).into_response() }
    };
    axum::Router::new()
        .route(METADATA_PATH, axum::routing::get(handler.clone()))
        .route(&format!("{METADATA_PATH}/mcp"), axum::routing::get(handler.clone()))
        .route(&format!("/mcp{METADATA_PATH}"), axum::routing::get(handler))
}
