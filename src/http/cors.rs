//! Origin enforcement and CORS preflight
//!
//! Runs ahead of routing: disallowed origins stop with 403, `OPTIONS` stops
//! with 204 on any path, everything else continues with CORS headers attached.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{config::CorsPolicy, errors::TransportError, AppState};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const DEFAULT_ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
pub const DEFAULT_ALLOWED_HEADERS: &str = "Content-Type, Authorization, Mcp-Session-Id";
pub const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

/// Outcome of evaluating a request's `Origin` against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// Wildcard policy; `origin_present` controls `Allow-Origin: *`.
    Any { origin_present: bool },
    /// Allow-list policy and an allowed origin, echoed back.
    Allowed(HeaderValue),
    /// Allow-list policy and no `Origin` header: leave the response alone.
    SameOrigin,
    Rejected,
}

pub fn evaluate_origin(policy: &CorsPolicy, headers: &HeaderMap) -> OriginDecision {
    let origin = headers.get(header::ORIGIN);
    match policy {
        CorsPolicy::Any => OriginDecision::Any {
            origin_present: origin.is_some(),
        },
        CorsPolicy::AllowList(allowed) => match origin {
            None => OriginDecision::SameOrigin,
            Some(value) => match value.to_str() {
                Ok(origin) if allowed.contains(origin) => OriginDecision::Allowed(value.clone()),
                _ => OriginDecision::Rejected,
            },
        },
    }
}

fn apply_origin_headers(decision: &OriginDecision, headers: &mut HeaderMap) {
    match decision {
        OriginDecision::Any { origin_present } => {
            if *origin_present {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
                headers.append(header::VARY, HeaderValue::from_static("Origin"));
            }
            headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(SESSION_ID_HEADER),
            );
        }
        OriginDecision::Allowed(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(SESSION_ID_HEADER),
            );
        }
        OriginDecision::SameOrigin | OriginDecision::Rejected => {}
    }
}

fn preflight_response(
    policy: &CorsPolicy,
    decision: &OriginDecision,
    request_headers: &HeaderMap,
) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    apply_origin_headers(decision, headers);

    let methods = request_headers
        .get(header::ACCESS_CONTROL_REQUEST_METHOD)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_METHODS));
    let allowed_headers = request_headers
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));

    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed_headers);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
    );
    if matches!(policy, CorsPolicy::AllowList(_)) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }

    response
}

pub async fn enforce_cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let decision = evaluate_origin(&state.cors, request.headers());
    if decision == OriginDecision::Rejected {
        return TransportError::Forbidden.into_response();
    }

    if request.method() == Method::OPTIONS {
        return preflight_response(&state.cors, &decision, request.headers());
    }

    let mut response = next.run(request).await;
    apply_origin_headers(&decision, response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_origin(origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(origin) = origin {
            headers.insert(
                header::ORIGIN,
                HeaderValue::from_str(origin).expect("valid origin"),
            );
        }
        headers
    }

    #[test]
    fn allow_list_rejects_unknown_origin() {
        let policy = CorsPolicy::allow_list(["https://good.example"]);
        let decision = evaluate_origin(&policy, &headers_with_origin(Some("https://evil.example")));
        assert_eq!(decision, OriginDecision::Rejected);
    }

    #[test]
    fn allow_list_passes_requests_without_origin() {
        let policy = CorsPolicy::allow_list(["https://good.example"]);
        let decision = evaluate_origin(&policy, &headers_with_origin(None));
        assert_eq!(decision, OriginDecision::SameOrigin);

        let mut headers = HeaderMap::new();
        apply_origin_headers(&decision, &mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn allow_list_echoes_allowed_origin_with_credentials() {
        let policy = CorsPolicy::allow_list(["https://good.example"]);
        let decision = evaluate_origin(&policy, &headers_with_origin(Some("https://good.example")));

        let mut headers = HeaderMap::new();
        apply_origin_headers(&decision, &mut headers);

        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("https://good.example"))
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some(&HeaderValue::from_static("true"))
        );
    }

    #[test]
    fn wildcard_without_origin_only_exposes_session_header() {
        let decision = evaluate_origin(&CorsPolicy::Any, &headers_with_origin(None));

        let mut headers = HeaderMap::new();
        apply_origin_headers(&decision, &mut headers);

        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS),
            Some(&HeaderValue::from_static(SESSION_ID_HEADER))
        );
    }

    #[test]
    fn preflight_echoes_requested_headers() {
        let mut request_headers = headers_with_origin(Some("https://any.example"));
        request_headers.insert(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("x-custom"),
        );
        let decision = evaluate_origin(&CorsPolicy::Any, &request_headers);

        let response = preflight_response(&CorsPolicy::Any, &decision, &request_headers);

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_HEADERS),
            Some(&HeaderValue::from_static("x-custom"))
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_METHODS),
            Some(&HeaderValue::from_static(DEFAULT_ALLOWED_METHODS))
        );
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .is_none());
    }
}
