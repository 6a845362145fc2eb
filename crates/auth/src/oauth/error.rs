//! OAuth 2.1 challenge responses for the MCP resource server.
//!
//! Builds `WWW-Authenticate` headers as required by
//! [RFC 6750 §3](https://datatracker.ietf.org/doc/html/rfc6750#section-3) and
//! the [MCP Authorization specification](https://modelcontextprotocol.io/specification/draft/basic/authorization).

use http::HeaderValue;
use http::header::InvalidHeaderValue;

use super::metadata::METADATA_PATH;

/// Configuration for an MCP server acting as an OAuth 2.1 resource server.
///
/// Used to generate `WWW-Authenticate` headers in 401 responses.
#[derive(Clone, Debug)]
pub struct ResourceServerConfig {
    /// URL to the Protected Resource Metadata document (RFC 9728).
    ///
    /// Included as `resource_metadata="..."` in `WWW-Authenticate` headers.
    pub resource_metadata_url: String,
    /// Default scopes to include in 401 `WWW-Authenticate` challenges.
    pub default_scope: Option<String>,
}

impl ResourceServerConfig {
    /// Point challenges at the metadata document served from `origin`.
    pub fn for_metadata(origin: &str, default_scope: Option<String>) -> Self {
        Self {
            resource_metadata_url: format!("{}{METADATA_PATH}", origin.trim_end_matches('/')),
            default_scope,
        }
    }
}

/// Build a `WWW-Authenticate` header value for a 401 Unauthorized response.
///
/// Format: `Bearer [error="<code>", ]resource_metadata="<url>"[, scope="<scopes>"]`.
/// `error` is set when a token was presented and refused (RFC 6750 §3.1);
/// a request without credentials gets a bare challenge.
pub fn www_authenticate_401(
    config: &ResourceServerConfig,
    error: Option<&str>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut value = String::from("Bearer ");
    if let Some(code) = error {
        value.push_str(&format!("error=\"{code}\", "));
    }
    value.push_str(&format!(
        "resource_metadata=\"{}\"",
        config.resource_metadata_url
    ));
    if let Some(ref scope) = config.default_scope {
        value.push_str(&format!(", scope=\"{scope}\""));
    }
    HeaderValue::from_str(&value)
}
