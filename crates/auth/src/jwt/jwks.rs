//! Signing key sources.
//!
//! [`JwksCache`] fetches the issuer's JWK set and keeps it for a bounded TTL,
//! refreshing early when a token names a `kid` the cached set lacks (key
//! rotation). Early refreshes are rate limited by
//! [`MIN_REFRESH_INTERVAL`], so unknown kids cannot drive a fetch per request.
//! [`StaticKey`] serves a single fixed key.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{DecodingKey, jwk::JwkSet};
use tokio::sync::RwLock;

use super::VerifyError;

/// Default lifetime of a fetched JWK set.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(300);

/// No early refresh for an unknown `kid` within this long of the last fetch.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Where the verifier gets the key for a token's `kid`.
pub trait KeySource: Send + Sync + 'static {
    fn decoding_key(
        &self,
        kid: Option<&str>,
    ) -> impl Future<Output = Result<DecodingKey, VerifyError>> + Send;
}

/// A single key used for every token regardless of `kid`.
#[derive(Clone)]
pub struct StaticKey(pub DecodingKey);

impl KeySource for StaticKey {
    async fn decoding_key(&self, _kid: Option<&str>) -> Result<DecodingKey, VerifyError> {
        Ok(self.0.clone())
    }
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

enum Lookup {
    Found(Result<DecodingKey, VerifyError>),
    /// Fresh set without the kid, fetched too recently to refetch.
    Unknown,
    Refresh,
}

/// JWK set fetched from a JWKS endpoint and cached by TTL.
#[derive(Clone)]
pub struct JwksCache {
    inner: Arc<JwksCacheInner>,
}

struct JwksCacheInner {
    url: String,
    ttl: Duration,
    client: reqwest::Client,
    cached: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    /// Create an empty cache; the first lookup fetches.
    pub fn new(url: impl Into<String>, ttl: Duration) -> Self {
        Self::with_state(url.into(), ttl, None)
    }

    #[cfg(test)]
    pub(crate) fn preloaded(
        url: impl Into<String>,
        ttl: Duration,
        keys: JwkSet,
        fetched_at: Instant,
    ) -> Self {
        let cached = CachedKeys { keys, fetched_at };
        Self::with_state(url.into(), ttl, Some(cached))
    }

    fn with_state(url: String, ttl: Duration, cached: Option<CachedKeys>) -> Self {
        Self {
            inner: Arc::new(JwksCacheInner {
                url,
                ttl,
                client: reqwest::Client::new(),
                cached: RwLock::new(cached),
            }),
        }
    }

    /// Fetch the JWK set and replace the cached copy.
    pub async fn refresh(&self) -> Result<(), VerifyError> {
        let keys = fetch_jwks(&self.inner.client, &self.inner.url).await?;
        tracing::debug!(url = %self.inner.url, keys = keys.keys.len(), "fetched JWKS");
        *self.inner.cached.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    async fn lookup(&self, kid: &str) -> Lookup {
        let cached = self.inner.cached.read().await;
        let Some(cached) = cached.as_ref().filter(|c| c.is_fresh(self.inner.ttl)) else {
            return Lookup::Refresh;
        };
        match cached.keys.find(kid) {
            Some(jwk) => Lookup::Found(DecodingKey::from_jwk(jwk).map_err(VerifyError::from)),
            None if cached.fetched_at.elapsed() < MIN_REFRESH_INTERVAL => Lookup::Unknown,
            None => Lookup::Refresh,
        }
    }
}

impl KeySource for JwksCache {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, VerifyError> {
        let kid = kid.ok_or(VerifyError::MissingKid)?;
        match self.lookup(kid).await {
            Lookup::Found(key) => return key,
            Lookup::Unknown => {
                tracing::debug!(kid, "unknown kid within refresh interval");
                return Err(VerifyError::UnknownKid(kid.to_string()));
            }
            Lookup::Refresh => {}
        }

        // Stale set or unknown kid: refresh once, no retry.
        self.refresh().await?;
        match self.lookup(kid).await {
            Lookup::Found(key) => key,
            Lookup::Unknown | Lookup::Refresh => Err(VerifyError::UnknownKid(kid.to_string())),
        }
    }
}

async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<JwkSet, VerifyError> {
    let resp = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(VerifyError::Jwks)?;
    resp.json::<JwkSet>().await.map_err(VerifyError::Jwks)
}
