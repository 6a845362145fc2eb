//! Multi-audience JWT verification.
//!
//! A token is accepted when it verifies (signature, issuer, expiry) for any
//! audience in an ordered trusted set. In development, the verifier can be
//! told to also try the audience values the token claims for itself; every
//! acceptance through that path is logged at warn level so it is easy to
//! spot and switch off.
//!
//! ```rust,ignore
//! use dlmcp_auth::jwt::{MultiAudienceVerifier, TrustConfig};
//!
//! let verifier = MultiAudienceVerifier::from_config(TrustConfig::new(
//!     "https://tenant.auth.example.com/",
//!     "https://tenant.auth.example.com/.well-known/jwks.json",
//!     vec!["mcp-api".into(), "https://mcp.example.com/mcp".into()],
//! ))?;
//! let authorized = verifier.authorize(token).await?;
//! ```

pub mod claims;
pub mod jwks;

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;

use crate::Validator;
use claims::peek_claims;
pub use claims::TokenClaims;
pub use jwks::{DEFAULT_JWKS_TTL, JwksCache, KeySource, MIN_REFRESH_INTERVAL, StaticKey};

/// Errors from token verification.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Not a dot-separated token at all.
    #[error("malformed token")]
    Malformed,
    /// Signature, issuer, audience, expiry or encoding check failed.
    #[error("JWT validation failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("JWT missing kid header")]
    MissingKid,
    #[error("no matching key for kid: {0}")]
    UnknownKid(String),
    #[error("failed to fetch JWKS: {0}")]
    Jwks(#[source] reqwest::Error),
    /// Nothing was attempted.
    #[error("token verification failed")]
    Rejected,
}

impl VerifyError {
    /// Stable error code for logs and protocol mapping.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::Malformed => "malformed_token",
            _ => "verification_failed",
        }
    }
}

/// Rejection returned to HTTP callers; the cause is only logged.
#[derive(Error, Debug, Clone, Copy)]
#[error("invalid_token")]
pub struct InvalidToken;

/// Trust settings fixed at startup.
#[derive(Clone, Debug)]
pub struct TrustConfig {
    /// Expected `iss`, compared verbatim (a trailing slash matters).
    pub issuer: String,
    pub jwks_url: String,
    /// Trusted audiences; order only affects logging.
    pub audiences: Vec<String>,
    /// Development only: also accept the audiences a token names itself.
    pub allow_dynamic_audience: bool,
    /// Log the unverified claims of every presented token.
    pub log_claims: bool,
    pub algorithms: Vec<Algorithm>,
    pub jwks_ttl: Duration,
}

impl TrustConfig {
    pub fn new(
        issuer: impl Into<String>,
        jwks_url: impl Into<String>,
        audiences: Vec<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_url: jwks_url.into(),
            audiences,
            allow_dynamic_audience: false,
            log_claims: false,
            algorithms: vec![Algorithm::RS256],
            jwks_ttl: DEFAULT_JWKS_TTL,
        }
    }
}

/// Which path accepted the token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudienceSource {
    Trusted,
    /// The token's own `aud` claim, accepted because dynamic audiences are on.
    DevFallback,
}

/// Claims of a verified token.
#[derive(Clone, Debug)]
pub struct VerifiedClaims {
    pub sub: String,
    pub iss: Option<String>,
    pub aud: Option<Vec<String>>,
    pub azp: Option<String>,
    pub scope: Vec<String>,
    pub iat: Option<u64>,
    pub exp: Option<u64>,
}

/// A verified token bound to the audience that matched.
#[derive(Clone, Debug)]
pub struct Authorized {
    pub claims: VerifiedClaims,
    pub audience: String,
    pub source: AudienceSource,
}

/// Result of [`MultiAudienceVerifier::authorize`].
pub type VerificationOutcome = Result<Authorized, VerifyError>;

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iss: Option<String>,
    aud: Option<Audience>,
    azp: Option<String>,
    scope: Option<String>,
    iat: Option<u64>,
    exp: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::Single(s) => vec![s],
            Audience::Multiple(v) => v,
        }
    }
}

impl From<RawClaims> for VerifiedClaims {
    fn from(claims: RawClaims) -> Self {
        VerifiedClaims {
            sub: claims.sub.unwrap_or_default(),
            iss: claims.iss,
            aud: claims.aud.map(Audience::into_vec),
            azp: claims.azp,
            scope: claims
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            iat: claims.iat,
            exp: claims.exp,
        }
    }
}

struct VerifierInner<K> {
    keys: K,
    audiences: Vec<String>,
    allow_dynamic_audience: bool,
    log_claims: bool,
    /// Issuer, algorithms and required claims; the audience is filled in
    /// per attempt on a copy.
    base: Validation,
}

/// Verifies bearer tokens against an ordered set of trusted audiences.
pub struct MultiAudienceVerifier<K = JwksCache> {
    inner: Arc<VerifierInner<K>>,
}

impl<K> Clone for MultiAudienceVerifier<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Configuration problems detected when building a verifier.
#[derive(Error, Debug)]
pub enum TrustConfigError {
    #[error("at least one trusted audience is required")]
    NoAudiences,
    #[error("at least one signing algorithm is required")]
    NoAlgorithms,
}

impl MultiAudienceVerifier<JwksCache> {
    /// Build a verifier that fetches keys from `config.jwks_url`.
    pub fn from_config(config: TrustConfig) -> Result<Self, TrustConfigError> {
        let keys = JwksCache::new(config.jwks_url.clone(), config.jwks_ttl);
        Self::with_key_source(config, keys)
    }
}

impl<K: KeySource> MultiAudienceVerifier<K> {
    pub fn with_key_source(config: TrustConfig, keys: K) -> Result<Self, TrustConfigError> {
        if config.audiences.is_empty() {
            return Err(TrustConfigError::NoAudiences);
        }
        let Some(&first_alg) = config.algorithms.first() else {
            return Err(TrustConfigError::NoAlgorithms);
        };

        let mut base = Validation::new(first_alg);
        base.algorithms = config.algorithms.clone();
        base.set_issuer(&[&config.issuer]);
        base.set_required_spec_claims(&["exp", "iss", "aud"]);

        Ok(Self {
            inner: Arc::new(VerifierInner {
                keys,
                audiences: config.audiences,
                allow_dynamic_audience: config.allow_dynamic_audience,
                log_claims: config.log_claims,
                base,
            }),
        })
    }

    /// Decide whether `token` is accepted and for which audience.
    pub async fn authorize(&self, token: &str) -> VerificationOutcome {
        let token = token.trim();
        if token.split('.').count() < 2 {
            tracing::warn!("bearer token rejected: malformed");
            return Err(VerifyError::Malformed);
        }

        let inner = &self.inner;
        let peeked = if inner.log_claims || inner.allow_dynamic_audience {
            peek_claims(token)
        } else {
            None
        };
        if inner.log_claims {
            log_unverified(peeked.as_ref());
        }

        let header = decode_header(token).inspect_err(|e| {
            tracing::warn!(error = %e, "bearer token rejected: bad header");
        })?;
        let key = inner
            .keys
            .decoding_key(header.kid.as_deref())
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "bearer token rejected: no signing key"))?;

        let trusted = inner.audiences.iter().map(String::as_str);
        let mut last_err = match first_verified(token, &key, &inner.base, trusted) {
            Ok((claims, audience)) => {
                if audience == inner.audiences[0] {
                    tracing::info!(audience, sub = %claims.sub, "token accepted");
                } else {
                    tracing::info!(audience, sub = %claims.sub, "token accepted (resource-style audience)");
                }
                return Ok(Authorized {
                    claims,
                    audience: audience.to_string(),
                    source: AudienceSource::Trusted,
                });
            }
            Err(err) => err,
        };

        if inner.allow_dynamic_audience {
            let claimed = peeked.as_ref().map(TokenClaims::audiences).unwrap_or_default();
            let candidates = claimed
                .iter()
                .map(String::as_str)
                .filter(|aud| !inner.audiences.iter().any(|t| t == aud));
            match first_verified(token, &key, &inner.base, candidates) {
                Ok((claims, audience)) => {
                    tracing::warn!(
                        audience,
                        sub = %claims.sub,
                        dev_fallback = true,
                        "DEV-ONLY: token accepted for its own audience; disable dynamic audiences in production"
                    );
                    return Ok(Authorized {
                        claims,
                        audience: audience.to_string(),
                        source: AudienceSource::DevFallback,
                    });
                }
                Err(err) => last_err = err.or(last_err),
            }
        }

        let err = last_err.unwrap_or(VerifyError::Rejected);
        tracing::warn!(error = %err, code = err.code(), "bearer token rejected");
        Err(err)
    }
}

/// Try each candidate audience in order and return the first verified claim
/// set together with its audience, or the last error (`None` if there were
/// no candidates).
fn first_verified<'a>(
    token: &str,
    key: &DecodingKey,
    base: &Validation,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Result<(VerifiedClaims, &'a str), Option<VerifyError>> {
    let mut last_err = None;
    for audience in candidates {
        let mut validation = base.clone();
        validation.set_audience(&[audience]);
        match decode::<RawClaims>(token, key, &validation) {
            Ok(TokenData { claims, .. }) => return Ok((claims.into(), audience)),
            Err(e) => {
                tracing::debug!(audience, error = %e, "verification attempt failed");
                last_err = Some(VerifyError::Jwt(e));
            }
        }
    }
    Err(last_err)
}

fn log_unverified(claims: Option<&TokenClaims>) {
    let Some(c) = claims else {
        tracing::info!("token claims: no diagnostic available");
        return;
    };
    tracing::info!(
        iss = ?c.iss,
        aud = ?c.aud,
        azp = ?c.azp,
        sub = ?c.sub,
        scope = ?c.scope,
        iat = ?c.iat,
        exp = ?c.exp,
        "token claims (unverified)"
    );
}

impl<K: KeySource> Validator for MultiAudienceVerifier<K> {
    type Claims = Authorized;
    type Error = InvalidToken;

    async fn validate(&self, token: &str) -> Result<Authorized, InvalidToken> {
        self.authorize(token).await.map_err(|_| InvalidToken)
    }
}

#[cfg(test)]
mod tests;
