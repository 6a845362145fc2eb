//! Authorization-server front for MCP clients.
//!
//! Clients discover the authorization server through this origin. The
//! issuer's discovery documents are served with the authorization and token
//! endpoints pointing back here; `/authorize` forces the API audience onto
//! the upstream request so issued tokens carry an audience the verifier
//! trusts; `/oauth/token` is passed through unchanged.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::{HeaderMap, StatusCode, header};
use serde_json::{Value, json};

/// Scopes added to every upstream authorization request.
pub const REQUIRED_SCOPES: [&str; 2] = ["openid", "offline_access"];

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Issuer base URL, without trailing slash.
    pub issuer: String,
    /// `scheme://authority` clients reach this server at.
    pub public_origin: String,
    /// Audience forced onto every authorization request.
    pub audience: String,
    /// `resource` sent upstream when the client names neither a resource
    /// nor an audience.
    pub default_resource: String,
}

impl ProxyConfig {
    pub fn new(
        issuer: &str,
        public_origin: &str,
        audience: impl Into<String>,
        default_resource: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.trim_end_matches('/').to_string(),
            public_origin: public_origin.trim_end_matches('/').to_string(),
            audience: audience.into(),
            default_resource: default_resource.into(),
        }
    }
}

struct ProxyState {
    config: ProxyConfig,
    client: reqwest::Client,
}

/// Routes for discovery (both document kinds, with and without the `/mcp`
/// suffix), `/authorize` and `/oauth/token`. All are public.
pub fn authorization_proxy_router(config: ProxyConfig) -> Router {
    let state = Arc::new(ProxyState {
        config,
        client: reqwest::Client::new(),
    });
    Router::new()
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route("/.well-known/openid-configuration/mcp", get(openid_configuration))
        .route("/.well-known/oauth-authorization-server", get(authorization_server))
        .route(
            "/.well-known/oauth-authorization-server/mcp",
            get(authorization_server),
        )
        .route("/authorize", get(authorize))
        .route("/oauth/token", post(token))
        .with_state(state)
}

async fn openid_configuration(State(state): State<Arc<ProxyState>>) -> Response {
    discovery(&state, "openid-configuration").await
}

async fn authorization_server(State(state): State<Arc<ProxyState>>) -> Response {
    discovery(&state, "oauth-authorization-server").await
}

async fn discovery(state: &ProxyState, document: &str) -> Response {
    let url = format!("{}/.well-known/{document}", state.config.issuer);
    let fetched = async {
        state
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    };
    match fetched.await {
        Ok(mut doc) => {
            if rewrite_endpoints(&mut doc, &state.config.public_origin) {
                Json(doc).into_response()
            } else {
                tracing::warn!(%url, "discovery document is not a JSON object");
                upstream_unavailable()
            }
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "discovery fetch failed");
            upstream_unavailable()
        }
    }
}

/// Point the authorization and token endpoints at `origin`. Other fields,
/// the registration endpoint included, stay as the issuer published them.
fn rewrite_endpoints(doc: &mut Value, origin: &str) -> bool {
    let Some(fields) = doc.as_object_mut() else {
        return false;
    };
    fields.insert(
        "authorization_endpoint".into(),
        json!(format!("{origin}/authorize")),
    );
    fields.insert("token_endpoint".into(), json!(format!("{origin}/oauth/token")));
    true
}

async fn authorize(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let params = authorize_params(&state.config, query);
    let base = format!("{}/authorize", state.config.issuer);
    match reqwest::Url::parse_with_params(&base, &params) {
        Ok(url) => {
            tracing::debug!(audience = %state.config.audience, "redirecting authorization request");
            (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
        }
        Err(e) => {
            tracing::error!(%base, error = %e, "cannot build upstream authorization URL");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "server_error" })),
            )
                .into_response()
        }
    }
}

/// Query for the upstream authorization request.
///
/// A repeated parameter keeps its last value. `resource` falls back to the
/// client's `audience`, then to the configured default; `audience` is
/// always replaced; [`REQUIRED_SCOPES`] are appended to the requested ones.
fn authorize_params(config: &ProxyConfig, query: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::with_capacity(query.len() + 3);
    for (key, value) in query {
        set(&mut params, &key, value);
    }

    let given = |params: &[(String, String)], key: &str| {
        params
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    };
    let resource = given(&params, "resource")
        .or_else(|| given(&params, "audience"))
        .unwrap_or_else(|| config.default_resource.clone());

    let mut scopes: Vec<&str> = Vec::new();
    let requested = given(&params, "scope").unwrap_or_default();
    for scope in requested.split_whitespace().chain(REQUIRED_SCOPES) {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    let scope = scopes.join(" ");

    set(&mut params, "audience", config.audience.clone());
    set(&mut params, "resource", resource);
    set(&mut params, "scope", scope);
    params
}

fn set(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => params.push((key.to_string(), value)),
    }
}

async fn token(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = format!("{}/oauth/token", state.config.issuer);
    let mut request = state.client.post(&url).body(body);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type.clone());
    }

    let upstream = match request.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(%url, error = %e, "token request failed");
            return upstream_unavailable();
        }
    };
    let status = upstream.status();
    match upstream.bytes().await {
        Ok(body) => {
            tracing::debug!(status = status.as_u16(), "token response relayed");
            (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "token response unreadable");
            upstream_unavailable()
        }
    }
}

fn upstream_unavailable() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "upstream_unavailable" })),
    )
        .into_response()
}
