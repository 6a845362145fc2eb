//! OAuth 2.1 resource server support.
//!
//! - **Protected Resource Metadata** ([RFC 9728](https://datatracker.ietf.org/doc/html/rfc9728)):
//!   served at `/.well-known/oauth-protected-resource` so MCP clients can
//!   discover the authorization server that issues tokens for this endpoint.
//!
//! - **Authorization proxy** (`proxy` feature): discovery documents,
//!   `/authorize` and `/oauth/token` fronting the issuer so that clients
//!   obtain tokens for the API audience.
//!
//! - **Challenge headers**: 401 responses with `WWW-Authenticate` headers
//!   per [RFC 6750](https://datatracker.ietf.org/doc/html/rfc6750).
//!
//! # Example
//!
//! ```rust,ignore
//! use dlmcp_auth::{AuthLayer, BearerAuth};
//! use dlmcp_auth::oauth::{ProtectedResourceMetadata, ResourceServerConfig, metadata_router};
//!
//! let metadata = ProtectedResourceMetadata::new(
//!     "https://mcp.example.com/mcp",
//!     "https://tenant.auth.example.com/",
//! );
//! let rs_config = ResourceServerConfig::for_metadata("https://mcp.example.com", None);
//!
//! let app = axum::Router::new()
//!     .nest_service("/mcp", mcp_service)
//!     .layer(AuthLayer::new(BearerAuth::new(verifier)).with_resource_server(rs_config))
//!     .merge(metadata_router(metadata));
//! ```

mod error;
mod metadata;
#[cfg(feature = "proxy")]
mod proxy;

pub use error::{ResourceServerConfig, www_authenticate_401};
pub use metadata::{METADATA_PATH, ProtectedResourceMetadata, metadata_router};
#[cfg(feature = "proxy")]
pub use proxy::{ProxyConfig, REQUIRED_SCOPES, authorization_proxy_router};
