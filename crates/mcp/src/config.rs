//! Startup configuration.
//!
//! Every setting is a CLI flag with an environment-variable fallback. The
//! parsed [`Cli`] is validated once into an immutable [`ServerConfig`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, builder::BoolishValueParser};
use dlmcp_auth::jwt::TrustConfig;
use thiserror::Error;

/// Audience trusted ahead of the public URL when none are configured.
pub const DEFAULT_AUDIENCE: &str = "mcp-api";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("issuer must not be empty")]
    EmptyIssuer,
    #[error("public URL must be an absolute http(s) URL: {0}")]
    InvalidPublicUrl(String),
}

/// DL MCP server: document search and sandboxed filesystem tools behind
/// bearer-token authentication.
#[derive(Parser, Debug)]
#[command(name = "dlmcp", version, about)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "DLMCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "DLMCP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Public URL of the MCP endpoint, advertised as the protected resource.
    #[arg(long, env = "DLMCP_PUBLIC_URL", default_value = "http://localhost:8000/mcp")]
    pub public_url: String,

    /// Expected token issuer, compared verbatim.
    #[arg(long, env = "DLMCP_ISSUER")]
    pub issuer: String,

    /// JWKS endpoint [default: <issuer>/.well-known/jwks.json]
    #[arg(long, env = "DLMCP_JWKS_URL")]
    pub jwks_url: Option<String>,

    /// Trusted audience, repeatable or comma-separated
    /// [default: mcp-api, then the public URL]
    #[arg(long = "audience", env = "DLMCP_AUDIENCES", value_delimiter = ',')]
    pub audiences: Vec<String>,

    /// Development only: also accept the audiences a token names itself.
    #[arg(
        long,
        env = "DLMCP_ALLOW_DYNAMIC_AUDIENCE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub allow_dynamic_audience: bool,

    /// Log the unverified claims of every presented token.
    #[arg(
        long,
        env = "DLMCP_LOG_CLAIMS",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub log_claims: bool,

    /// Seconds a fetched JWKS is reused before refetching.
    #[arg(long, env = "DLMCP_JWKS_TTL_SECS", default_value_t = 300)]
    pub jwks_ttl_secs: u64,

    /// Directory all filesystem tools are confined to.
    #[arg(long, env = "DLMCP_SANDBOX_ROOT")]
    pub sandbox_root: PathBuf,

    /// Scope advertised in challenges and resource metadata.
    #[arg(long, env = "DLMCP_SCOPE")]
    pub scope: Option<String>,

    /// Audience forced onto authorization requests passing through
    /// `/authorize` [default: the first trusted audience]
    #[arg(long, env = "DLMCP_AUTHORIZE_AUDIENCE")]
    pub authorize_audience: Option<String>,
}

/// Validated, immutable server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
    /// `scheme://authority` of [`public_url`](Self::public_url).
    pub public_origin: String,
    pub trust: TrustConfig,
    pub sandbox_root: PathBuf,
    pub scope: Option<String>,
    /// Audience the authorization proxy requests tokens for.
    pub authorize_audience: String,
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.issuer.trim().is_empty() {
            return Err(ConfigError::EmptyIssuer);
        }
        let public_origin = origin_of(&cli.public_url)?;

        let jwks_url = cli
            .jwks_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| {
                format!("{}/.well-known/jwks.json", cli.issuer.trim_end_matches('/'))
            });

        let mut audiences: Vec<String> = Vec::new();
        for aud in cli.audiences.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            if !audiences.iter().any(|known| known == aud) {
                audiences.push(aud.to_string());
            }
        }
        if audiences.is_empty() {
            audiences = vec![DEFAULT_AUDIENCE.to_string(), cli.public_url.clone()];
        }

        let authorize_audience = cli
            .authorize_audience
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| audiences[0].clone());

        let mut trust = TrustConfig::new(cli.issuer, jwks_url, audiences);
        trust.allow_dynamic_audience = cli.allow_dynamic_audience;
        trust.log_claims = cli.log_claims;
        trust.jwks_ttl = Duration::from_secs(cli.jwks_ttl_secs);

        Ok(Self {
            host: cli.host,
            port: cli.port,
            public_url: cli.public_url,
            public_origin,
            trust,
            sandbox_root: cli.sandbox_root,
            scope: cli.scope.filter(|s| !s.trim().is_empty()),
            authorize_audience,
        })
    }

    /// Scopes listed in [`scope`](Self::scope).
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

fn origin_of(url: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidPublicUrl(url.to_string());
    let uri: http::Uri = url.parse().map_err(|_| invalid())?;
    let scheme = uri.scheme_str().filter(|s| matches!(*s, "http" | "https"));
    match (scheme, uri.authority()) {
        (Some(scheme), Some(authority)) => Ok(format!("{scheme}://{authority}")),
        _ => Err(invalid()),
    }
}
