//! Bearer token authentication.
//!
//! Extracts a Bearer token from the `Authorization` header and delegates
//! validation to a [`Validator`](crate::Validator).
//!
//! ```rust,ignore
//! use dlmcp_auth::{AuthLayer, BearerAuth};
//!
//! let app = axum::Router::new()
//!     .nest_service("/mcp", service)
//!     .layer(AuthLayer::new(BearerAuth::new(verifier)));
//! ```

use crate::{Authenticator, Rejection, Validator};

/// Bearer token authenticator.
///
/// Extracts the token from `Authorization: Bearer <token>` and passes it
/// to the inner [`Validator`].
#[derive(Clone)]
pub struct BearerAuth<V> {
    validator: V,
}

impl<V> BearerAuth<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }
}

/// Pull the credential out of an `Authorization` header value.
///
/// The scheme name is matched case-insensitively (RFC 7235 §2.1).
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl<V> Authenticator for BearerAuth<V>
where
    V: Validator,
{
    type Claims = V::Claims;

    async fn authenticate(&self, parts: &http::request::Parts) -> Result<Self::Claims, Rejection> {
        // A malformed header counts as no credentials at all.
        let token = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(Rejection::Missing)?;

        self.validator
            .validate(token)
            .await
            .map_err(|e| Rejection::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Fixed;

    impl Validator for Fixed {
        type Claims = String;
        type Error = &'static str;

        async fn validate(&self, credential: &str) -> Result<String, &'static str> {
            if credential == "good" {
                Ok("alice".into())
            } else {
                Err("invalid_token")
            }
        }
    }

    fn parts(authorization: Option<&str>) -> http::request::Parts {
        let mut builder = http::Request::get("/mcp");
        if let Some(value) = authorization {
            builder = builder.header(http::header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn distinguishes_missing_from_refused() {
        let auth = BearerAuth::new(Fixed);
        assert_eq!(auth.authenticate(&parts(None)).await, Err(Rejection::Missing));
        assert_eq!(
            auth.authenticate(&parts(Some("Basic abc"))).await,
            Err(Rejection::Missing)
        );
        assert_eq!(
            auth.authenticate(&parts(Some("Bearer bad"))).await,
            Err(Rejection::Invalid("invalid_token".into()))
        );
        assert_eq!(
            auth.authenticate(&parts(Some("Bearer good"))).await,
            Ok("alice".to_string())
        );
    }

    #[test]
    fn extracts_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer   "), None);
    }
}
