//! # dlmcp-auth
//!
//! Bearer authentication for the dlmcp MCP endpoint.
//!
//! [`AuthLayer`] runs an [`Authenticator`] in front of the MCP service. On
//! success the claims are inserted into the request extensions; otherwise
//! the request ends in a 401. With a
//! [`ResourceServerConfig`](oauth::ResourceServerConfig) the 401 carries a
//! `WWW-Authenticate` challenge pointing at the resource metadata, with
//! `error="invalid_token"` when a token was presented and refused.
//!
//! With the `jwt` feature (on by default), [`jwt::MultiAudienceVerifier`]
//! verifies bearer tokens against a JWKS endpoint for an ordered set of
//! trusted audiences.
//!
//! # Example
//!
//! ```rust,ignore
//! use dlmcp_auth::{AuthLayer, BearerAuth};
//! use dlmcp_auth::jwt::{MultiAudienceVerifier, TrustConfig};
//! use dlmcp_auth::oauth::ResourceServerConfig;
//!
//! let verifier = MultiAudienceVerifier::from_config(trust_config)?;
//! let rs_config = ResourceServerConfig {
//!     resource_metadata_url:
//!         "https://mcp.example.com/.well-known/oauth-protected-resource".into(),
//!     default_scope: None,
//! };
//!
//! let app = axum::Router::new()
//!     .nest_service("/mcp", service)
//!     .layer(AuthLayer::new(BearerAuth::new(verifier)).with_resource_server(rs_config));
//! ```

mod bearer;

pub mod oauth;

#[cfg(feature = "jwt")]
pub mod jwt;

pub use bearer::BearerAuth;

use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::{Request, StatusCode};
use oauth::{ResourceServerConfig, www_authenticate_401};
use std::task::{Context, Poll};

/// Why a request was not authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No usable credentials were presented.
    Missing,
    /// Credentials were presented and refused. The text becomes the
    /// response body, so it must not carry internal detail.
    Invalid(String),
}

/// Authenticates a request from its head.
///
/// On success, `Claims` is inserted into `http::Extensions`.
pub trait Authenticator: Clone + Send + Sync + 'static {
    type Claims: Clone + Send + Sync + 'static;

    fn authenticate(
        &self,
        parts: &http::request::Parts,
    ) -> impl Future<Output = Result<Self::Claims, Rejection>> + Send;
}

/// Validates a credential string such as a bearer token.
///
/// Wrapped in [`BearerAuth`], which pulls the credential out of the
/// `Authorization` header. The error's `Display` text becomes the body of
/// the 401 response.
pub trait Validator: Clone + Send + Sync + 'static {
    type Claims: Clone + Send + Sync + 'static;
    type Error: std::fmt::Display + Send;

    fn validate(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<Self::Claims, Self::Error>> + Send;
}

/// Tower [`Layer`](tower::Layer) that applies [`AuthService`].
#[derive(Clone)]
pub struct AuthLayer<A> {
    authenticator: A,
    resource_server: Option<ResourceServerConfig>,
}

impl<A> AuthLayer<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            resource_server: None,
        }
    }

    /// Add `WWW-Authenticate` challenges to 401 responses.
    pub fn with_resource_server(mut self, config: ResourceServerConfig) -> Self {
        self.resource_server = Some(config);
        self
    }
}

impl<A, S> tower::Layer<S> for AuthLayer<A>
where
    A: Clone,
{
    type Service = AuthService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            authenticator: self.authenticator.clone(),
            resource_server: self.resource_server.clone(),
            inner,
        }
    }
}

/// Tower service that authenticates requests before forwarding them.
#[derive(Clone)]
pub struct AuthService<A, S> {
    authenticator: A,
    resource_server: Option<ResourceServerConfig>,
    inner: S,
}

impl<A, S, B> tower::Service<Request<B>> for AuthService<A, S>
where
    A: Authenticator,
    S: tower::Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let resource_server = self.resource_server.clone();
        // The clone may not be ready; keep the polled service for this call.
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            match authenticator.authenticate(&parts).await {
                Ok(claims) => {
                    let mut req = Request::from_parts(parts, body);
                    req.extensions_mut().insert(claims);
                    inner.call(req).await
                }
                Err(rejection) => {
                    match &rejection {
                        Rejection::Missing => {
                            tracing::debug!(path = parts.uri.path(), "request without credentials")
                        }
                        Rejection::Invalid(reason) => {
                            tracing::info!(path = parts.uri.path(), reason, "credentials rejected")
                        }
                    }
                    Ok(unauthorized(rejection, resource_server.as_ref()))
                }
            }
        })
    }
}

fn unauthorized(rejection: Rejection, resource_server: Option<&ResourceServerConfig>) -> Response {
    let (error, body) = match rejection {
        Rejection::Missing => (None, "missing bearer token".to_string()),
        Rejection::Invalid(reason) => (Some("invalid_token"), reason),
    };
    let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
    if let Some(config) = resource_server {
        match www_authenticate_401(config, error) {
            Ok(challenge) => {
                response
                    .headers_mut()
                    .insert(http::header::WWW_AUTHENTICATE, challenge);
            }
            Err(e) => tracing::error!(error = %e, "unrepresentable WWW-Authenticate challenge"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ResourceServerConfig {
        ResourceServerConfig::for_metadata("https://mcp.example.com", Some("files".into()))
    }

    fn challenge(response: &Response) -> &str {
        response.headers()[http::header::WWW_AUTHENTICATE]
            .to_str()
            .unwrap()
    }

    #[test]
    fn missing_credentials_get_bare_challenge() {
        let response = unauthorized(Rejection::Missing, Some(&config()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!challenge(&response).contains("error="));
        assert!(challenge(&response).contains("scope=\"files\""));
    }

    #[test]
    fn refused_token_is_flagged_invalid() {
        let response = unauthorized(Rejection::Invalid("invalid_token".into()), Some(&config()));
        assert!(challenge(&response).starts_with("Bearer error=\"invalid_token\", "));
    }

    #[test]
    fn no_challenge_without_resource_server() {
        let response = unauthorized(Rejection::Missing, None);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(http::header::WWW_AUTHENTICATE).is_none());
    }
}
