use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::{errors::TransportError, AppState};

/// Externally supplied accept/reject predicate for the MCP endpoint.
pub type RequestGuard = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

pub fn guard<F>(predicate: F) -> RequestGuard
where
    F: Fn(&Request) -> bool + Send + Sync + 'static,
{
    Arc::new(predicate)
}

/// Accepts requests carrying `Authorization: Bearer <token>`.
pub fn bearer_token(token: impl Into<String>) -> RequestGuard {
    let expected: Arc<str> = Arc::from(token.into());
    guard(move |request| {
        request
            .headers()
            .typed_get::<Authorization<Bearer>>()
            .is_some_and(|auth| auth.token() == expected.as_ref())
    })
}

pub async fn require_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, TransportError> {
    if let Some(guard) = state.guard.as_ref() {
        if !guard(&request) {
            return Err(TransportError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::header};

    use super::*;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/mcp").method("POST");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).expect("request build")
    }

    #[test]
    fn bearer_token_accepts_matching_token() {
        let guard = bearer_token("token-1234567890ab");
        assert!(guard(&request_with_auth(Some("Bearer token-1234567890ab"))));
    }

    #[test]
    fn bearer_token_rejects_missing_or_wrong_token() {
        let guard = bearer_token("token-1234567890ab");
        assert!(!guard(&request_with_auth(None)));
        assert!(!guard(&request_with_auth(Some("Bearer nope"))));
        assert!(!guard(&request_with_auth(Some("Basic dXNlcjpwYXNz"))));
    }
}
