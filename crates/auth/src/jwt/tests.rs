use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tracing_subscriber::layer::SubscriberExt;

use super::*;

const SECRET: &[u8] = b"dlmcp-test-secret";
const ISSUER: &str = "https://tenant.auth.example.com/";
const API: &str = "mcp-api";
const RESOURCE: &str = "https://mcp.example.com/mcp";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn mint(claims: Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test".into());
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

fn token_for(aud: Value) -> String {
    mint(json!({
        "iss": ISSUER,
        "aud": aud,
        "sub": "user-1",
        "scope": "read write",
        "iat": now(),
        "exp": now() + 3600,
    }))
}

/// Key source that counts lookups.
#[derive(Clone)]
struct CountingKey {
    calls: Arc<AtomicUsize>,
}

impl KeySource for CountingKey {
    async fn decoding_key(&self, _kid: Option<&str>) -> Result<DecodingKey, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DecodingKey::from_secret(SECRET))
    }
}

fn config(allow_dynamic_audience: bool) -> TrustConfig {
    let mut config = TrustConfig::new(ISSUER, "unused", vec![API.into(), RESOURCE.into()]);
    config.algorithms = vec![Algorithm::HS256];
    config.allow_dynamic_audience = allow_dynamic_audience;
    config
}

fn verifier(allow_dynamic_audience: bool) -> MultiAudienceVerifier<StaticKey> {
    MultiAudienceVerifier::with_key_source(
        config(allow_dynamic_audience),
        StaticKey(DecodingKey::from_secret(SECRET)),
    )
    .unwrap()
}

/// Records level and fields of every event.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(tracing::Level, String)>>>);

struct FieldText(String);

impl tracing::field::Visit for FieldText {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Captured {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut fields = FieldText(String::new());
        event.record(&mut fields);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), fields.0));
    }
}

impl Captured {
    fn has_dev_fallback_warning(&self) -> bool {
        self.0
            .lock()
            .unwrap()
            .iter()
            .any(|(level, text)| *level == tracing::Level::WARN && text.contains("dev_fallback=true"))
    }
}

#[tokio::test]
async fn accepts_primary_audience() {
    let authorized = verifier(false).authorize(&token_for(json!(API))).await.unwrap();
    assert_eq!(authorized.audience, API);
    assert_eq!(authorized.source, AudienceSource::Trusted);
    assert_eq!(authorized.claims.sub, "user-1");
    assert_eq!(authorized.claims.scope, vec!["read", "write"]);
}

#[tokio::test]
async fn accepts_resource_audience_bound_to_it() {
    let authorized = verifier(false)
        .authorize(&token_for(json!([RESOURCE, "other"])))
        .await
        .unwrap();
    assert_eq!(authorized.audience, RESOURCE);
    assert_eq!(authorized.source, AudienceSource::Trusted);
}

#[tokio::test]
async fn first_trusted_audience_wins() {
    let authorized = verifier(false)
        .authorize(&token_for(json!([RESOURCE, API])))
        .await
        .unwrap();
    assert_eq!(authorized.audience, API);
}

#[tokio::test]
async fn rejects_untrusted_audience_without_relaxation() {
    let err = verifier(false)
        .authorize(&token_for(json!("someone-else")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "verification_failed");
    assert!(matches!(err, VerifyError::Jwt(_)));
}

#[tokio::test]
async fn relaxation_accepts_self_claimed_audience_with_warning() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::registry().with(captured.clone()),
    );

    let authorized = verifier(true)
        .authorize(&token_for(json!(["someone-else"])))
        .await
        .unwrap();
    assert_eq!(authorized.audience, "someone-else");
    assert_eq!(authorized.source, AudienceSource::DevFallback);
    assert!(captured.has_dev_fallback_warning());
}

#[tokio::test]
async fn trusted_accept_emits_no_fallback_warning() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::registry().with(captured.clone()),
    );

    verifier(true).authorize(&token_for(json!(RESOURCE))).await.unwrap();
    assert!(!captured.has_dev_fallback_warning());
}

#[tokio::test]
async fn relaxation_does_not_bypass_signature() {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test".into());
    let forged = encode(
        &header,
        &json!({"iss": ISSUER, "aud": "anything", "exp": now() + 3600}),
        &EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap();
    let err = verifier(true).authorize(&forged).await.unwrap_err();
    assert_eq!(err.code(), "verification_failed");
}

#[tokio::test]
async fn missing_audience_skips_fallback() {
    let token = mint(json!({"iss": ISSUER, "sub": "u", "exp": now() + 3600}));
    let err = verifier(true).authorize(&token).await.unwrap_err();
    assert!(matches!(err, VerifyError::Jwt(_)), "{err:?}");
}

#[tokio::test]
async fn rejects_expired_token() {
    let token = mint(json!({"iss": ISSUER, "aud": API, "exp": now() - 3600}));
    let err = verifier(true).authorize(&token).await.unwrap_err();
    let VerifyError::Jwt(e) = err else {
        panic!("expected a JWT error");
    };
    assert!(matches!(e.kind(), ErrorKind::ExpiredSignature), "{e:?}");
}

#[tokio::test]
async fn rejects_wrong_issuer() {
    let token = mint(json!({
        "iss": "https://tenant.auth.example.com",
        "aud": API,
        "exp": now() + 3600,
    }));
    let err = verifier(false).authorize(&token).await.unwrap_err();
    let VerifyError::Jwt(e) = err else {
        panic!("expected a JWT error");
    };
    assert!(matches!(e.kind(), ErrorKind::InvalidIssuer), "{e:?}");
}

#[tokio::test]
async fn malformed_token_never_reaches_key_source() {
    let calls = Arc::new(AtomicUsize::new(0));
    let verifier =
        MultiAudienceVerifier::with_key_source(config(true), CountingKey { calls: calls.clone() })
            .unwrap();

    for token in ["", "   ", "no-dots-here"] {
        let err = verifier.authorize(token).await.unwrap_err();
        assert_eq!(err.code(), "malformed_token");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    verifier.authorize(&token_for(json!(API))).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn validator_hides_cause() {
    let err = verifier(false).validate("garbage").await.unwrap_err();
    assert_eq!(err.to_string(), "invalid_token");
}

#[test]
fn empty_audience_set_is_rejected() {
    let mut config = config(false);
    config.audiences.clear();
    let result =
        MultiAudienceVerifier::with_key_source(config, StaticKey(DecodingKey::from_secret(SECRET)));
    assert!(matches!(result, Err(TrustConfigError::NoAudiences)));
}
