//! Unverified peeking at token payloads.
//!
//! Nothing here checks a signature. The decoded claims feed diagnostics and
//! the development audience fallback, never an authorization decision.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

/// Payload claims of a bearer token, decoded without verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub iss: Option<String>,
    /// `None` when the token has no `aud` claim.
    pub aud: Option<Vec<String>>,
    pub azp: Option<String>,
    pub sub: Option<String>,
    pub scope: Option<String>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Audience values the token claims for itself, in token order.
    pub fn audiences(&self) -> &[String] {
        self.aud.as_deref().unwrap_or_default()
    }
}

/// Decode the payload segment of `token` without verifying it.
///
/// Returns `None` for anything that is not a dot-separated token with a
/// base64url JSON object as its second segment.
pub fn peek_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let Value::Object(map) = serde_json::from_slice::<Value>(&bytes).ok()? else {
        return None;
    };

    let text = |key: &str| map.get(key).and_then(Value::as_str).map(String::from);
    let timestamp = |key: &str| {
        map.get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    };

    Some(TokenClaims {
        iss: text("iss"),
        aud: map.get("aud").and_then(audience_list),
        azp: text("azp"),
        sub: text("sub"),
        scope: text("scope"),
        iat: timestamp("iat"),
        exp: timestamp("exp"),
    })
}

/// `aud` may be a string or an array; other JSON values are stringified.
fn audience_list(value: &Value) -> Option<Vec<String>> {
    let stringify = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match value {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().map(stringify).collect()),
        other => Some(vec![stringify(other)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn single_audience() {
        let claims = peek_claims(&token_with(
            r#"{"iss":"https://issuer/","aud":"mcp-api","sub":"u1","exp":1700000000}"#,
        ))
        .unwrap();
        assert_eq!(claims.iss.as_deref(), Some("https://issuer/"));
        assert_eq!(claims.audiences(), ["mcp-api"]);
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.scope, None);
    }

    #[test]
    fn audience_set_keeps_order() {
        let claims = peek_claims(&token_with(r#"{"aud":["b","a",3]}"#)).unwrap();
        assert_eq!(claims.audiences(), ["b", "a", "3"]);
    }

    #[test]
    fn missing_audience_has_no_candidates() {
        let claims = peek_claims(&token_with(r#"{"sub":"u1","iat":1.5}"#)).unwrap();
        assert_eq!(claims.aud, None);
        assert!(claims.audiences().is_empty());
        assert_eq!(claims.iat, Some(1));
    }

    #[test]
    fn garbage_degrades_to_none() {
        assert_eq!(peek_claims(""), None);
        assert_eq!(peek_claims("onlyone"), None);
        assert_eq!(peek_claims("a.!!!.c"), None);
        assert_eq!(peek_claims(&token_with("[1,2]")), None);
    }

    #[test]
    fn tolerates_padding() {
        let padded = format!("h.{}==.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"x"}"#));
        assert_eq!(peek_claims(&padded).unwrap().sub.as_deref(), Some("x"));
    }
}
