//! HTTPS enforcement and security headers (spec §4.1 policies 1-2).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use http::{header, HeaderValue};

use crate::api::state::AppState;

const CSP: &str = "default-src 'self'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none'";

pub async fn enforce_https_and_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.config.environment.is_production() && !request_is_secure(&request, state.config.trust_forwarded_proto) {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        let uri = request.uri();
        return Redirect::permanent(&format!("https://{host}{uri}")).into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CSP),
    );
    response
}

fn request_is_secure(request: &Request, trust_forwarded_proto: bool) -> bool {
    if trust_forwarded_proto {
        if let Some(proto) = request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
        {
            return proto.eq_ignore_ascii_case("https");
        }
    }
    request.uri().scheme_str() == Some("https")
}
