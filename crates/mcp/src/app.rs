//! HTTP application: the authenticated MCP endpoint plus public routes.

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use dlmcp_auth::jwt::{KeySource, MultiAudienceVerifier};
use dlmcp_auth::oauth::{
    ProtectedResourceMetadata, ProxyConfig, ResourceServerConfig, authorization_proxy_router,
    metadata_router,
};
use dlmcp_auth::{AuthLayer, BearerAuth};
use dlmcp_documents::DocumentStore;
use dlmcp_filesystem::Sandbox;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use serde_json::{Value, json};

use crate::config::ServerConfig;
use crate::server::DlServer;

/// Build the router.
///
/// `/mcp` requires a bearer token accepted by `verifier`; unauthenticated
/// requests get a 401 pointing at the resource metadata. The metadata
/// documents, the authorization proxy and `/healthz` are public.
pub fn router<K: KeySource>(
    config: &ServerConfig,
    verifier: MultiAudienceVerifier<K>,
    sandbox: Sandbox,
    documents: DocumentStore,
) -> Router {
    let documents = Arc::new(documents);
    let service = StreamableHttpService::new(
        move || Ok(DlServer::new(sandbox.clone(), documents.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let resource_server =
        ResourceServerConfig::for_metadata(&config.public_origin, config.scope.clone());
    let mut metadata = ProtectedResourceMetadata::new(&config.public_url, &config.trust.issuer);
    metadata.scopes_supported = Some(config.scopes());
    let proxy = ProxyConfig::new(
        &config.trust.issuer,
        &config.public_origin,
        config.authorize_audience.clone(),
        config.public_url.clone(),
    );

    Router::new()
        .nest_service("/mcp", service)
        .layer(AuthLayer::new(BearerAuth::new(verifier)).with_resource_server(resource_server))
        .merge(metadata_router(metadata))
        .merge(authorization_proxy_router(proxy))
        .route("/healthz", get(healthz))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use axum::body::{Body, to_bytes};
    use clap::Parser;
    use dlmcp_auth::jwt::StaticKey;
    use http::{Request, StatusCode, header};
    use jsonwebtoken::{Algorithm, DecodingKey};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (TempDir, Router) {
        let tmp = TempDir::new().unwrap();
        let cli = Cli::try_parse_from([
            "dlmcp",
            "--issuer",
            "https://tenant.auth.example.com/",
            "--public-url",
            "https://mcp.example.com/mcp",
            "--scope",
            "files",
            "--sandbox-root",
            tmp.path().to_str().unwrap(),
        ])
        .unwrap();
        let config = ServerConfig::from_cli(cli).unwrap();
        let mut trust = config.trust.clone();
        trust.algorithms = vec![Algorithm::HS256];
        let verifier = MultiAudienceVerifier::with_key_source(
            trust,
            StaticKey(DecodingKey::from_secret(b"secret")),
        )
        .unwrap();
        let sandbox = Sandbox::new(&config.sandbox_root).unwrap();
        let router = router(&config, verifier, sandbox, DocumentStore::demo());
        (tmp, router)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn mcp_requires_bearer_token() {
        let (_tmp, app) = app();
        let response = app
            .oneshot(
                Request::post("/mcp")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Bearer resource_metadata="));
        assert!(challenge.contains(
            "resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
        ));
        assert!(challenge.contains("scope=\"files\""));
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_without_detail() {
        let (_tmp, app) = app();
        let response = app
            .oneshot(
                Request::post("/mcp")
                    .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Bearer error=\"invalid_token\", resource_metadata="));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"invalid_token");
    }

    #[tokio::test]
    async fn metadata_is_public() {
        for path in [
            "/.well-known/oauth-protected-resource",
            "/.well-known/oauth-protected-resource/mcp",
            "/mcp/.well-known/oauth-protected-resource",
        ] {
            let (_tmp, app) = app();
            let response = app
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
            let metadata = body_json(response).await;
            assert_eq!(metadata["resource"], "https://mcp.example.com/mcp");
            assert_eq!(
                metadata["authorization_servers"],
                json!(["https://tenant.auth.example.com"])
            );
            assert_eq!(metadata["scopes_supported"], json!(["files"]));
            assert_eq!(metadata["bearer_methods_supported"], json!(["header"]));
        }
    }

    #[tokio::test]
    async fn authorize_is_public_and_forces_audience() {
        let (_tmp, app) = app();
        let response = app
            .oneshot(
                Request::get("/authorize?client_id=abc&audience=other")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://tenant.auth.example.com/authorize?"));
        assert!(location.contains("audience=mcp-api"));
        assert!(location.contains("resource=other"));
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let (_tmp, app) = app();
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }
}
