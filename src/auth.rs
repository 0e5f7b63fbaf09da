//! Identity subject resolution.
//!
//! Token verification itself happens upstream (the hosting auth layer or a
//! fronting proxy). Verified claims arrive as a JSON document in the
//! `x-verified-claims` header, are parsed into [`Claims`] by the middleware,
//! and handlers extract the registered `sub` claim through
//! [`AuthenticatedUser`]. An authenticated session is assumed always to carry
//! a subject; its absence is unexpected and yields 401 without retry.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Header carrying the verified token claims, set by the upstream verifier
pub const VERIFIED_CLAIMS_HEADER: &str = "x-verified-claims";

/// Errors resolving the request identity
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Request carries no verified claims")]
    MissingClaims,

    #[error("Verified claims carry no subject")]
    MissingSubject,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        warn!(error = %self, "Rejected unauthenticated request");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": self.to_string(),
                "code": "UNAUTHORIZED",
            })),
        )
            .into_response()
    }
}

/// Verified token claims attached to the request
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Claims {
    /// Registered subject claim, the stable user identifier
    #[serde(default)]
    pub sub: Option<String>,
    /// Remaining claims, kept opaque
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// The subject identifier, required for every authenticated session
    pub fn subject(&self) -> Result<&str, AuthError> {
        self.sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)
    }
}

/// The authenticated caller, resolved from the request's verified claims
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub subject: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or(AuthError::MissingClaims)?;

        Ok(AuthenticatedUser {
            subject: claims.subject()?.to_string(),
        })
    }
}

/// Parse the verified-claims header into request extensions.
///
/// Requests without the header pass through without claims; the extractor
/// rejects them when a handler requires authentication.
pub async fn verified_claims_middleware(
    mut request: axum::extract::Request,
    next: Next,
) -> Response {
    if let Some(raw) = request.headers().get(VERIFIED_CLAIMS_HEADER) {
        match raw
            .to_str()
            .ok()
            .and_then(|s| serde_json::from_str::<Claims>(s).ok())
        {
            Some(claims) => {
                request.extensions_mut().insert(claims);
            }
            None => {
                warn!("Discarded malformed verified-claims header");
            }
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn test_claims_subject_present() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "00u1abcd",
            "iss": "https://dev-1.okta.com",
            "email": "ann@example.com"
        }))
        .unwrap();

        assert_eq!(claims.subject().unwrap(), "00u1abcd");
        assert!(claims.extra.contains_key("iss"));
    }

    #[test]
    fn test_claims_subject_missing_or_empty() {
        let absent: Claims = serde_json::from_value(serde_json::json!({ "iss": "x" })).unwrap();
        assert!(matches!(absent.subject(), Err(AuthError::MissingSubject)));

        let empty: Claims = serde_json::from_value(serde_json::json!({ "sub": "" })).unwrap();
        assert!(matches!(empty.subject(), Err(AuthError::MissingSubject)));
    }

    #[tokio::test]
    async fn test_extractor_resolves_subject_from_extensions() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();
        parts.extensions.insert(Claims {
            sub: Some("00u1abcd".to_string()),
            extra: Default::default(),
        });

        let user = AuthenticatedUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.subject, "00u1abcd");
    }

    #[tokio::test]
    async fn test_extractor_rejects_missing_claims() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();

        let result = AuthenticatedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingClaims)));
    }
}
