//! Double-submit-cookie CSRF protection (spec §4.1 policy 7).

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use http::Method;
use subtle::ConstantTimeEq;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::api::state::AppState;
use crate::error::{ApiError, CsrfErrorCode};

pub const COOKIE_NAME: &str = "csrf_token";
const HEADER_NAMES: [&str; 2] = ["x-csrf-token", "csrf-token"];
const COOKIE_MAX_AGE_SECONDS: i64 = 60 * 60;

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `GET /csrf-token`: issue a cookie + the same value in the JSON body.
pub async fn issue_csrf_token(
    State(state): State<AppState>,
    cookies: Cookies,
) -> impl IntoResponse {
    let token = generate_token();

    let mut cookie = Cookie::new(COOKIE_NAME, token.clone());
    cookie.set_http_only(false);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(Some(tower_cookies::cookie::time::Duration::seconds(
        COOKIE_MAX_AGE_SECONDS,
    )));
    cookie.set_secure(state.config.environment.is_production());

    cookies.add(cookie);

    Json(serde_json::json!({ "csrfToken": token }))
}

/// Enforces the double-submit check on any non-safe method. Mount only on routes that
/// need it — `GET /csrf-token`, `GET /health`, and the read-only catalogue/model routes
/// are never wrapped in this layer.
pub async fn require_csrf(cookies: Cookies, request: Request, next: Next) -> Response {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(request).await;
    }

    let Some(cookie_value) = cookies.get(COOKIE_NAME).map(|c| c.value().to_string()) else {
        return ApiError::Csrf {
            code: CsrfErrorCode::CookieMissing,
        }
        .into_response();
    };

    let header_value = HEADER_NAMES.iter().find_map(|name| {
        request
            .headers()
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let Some(header_value) = header_value else {
        return ApiError::Csrf {
            code: CsrfErrorCode::HeaderMissing,
        }
        .into_response();
    };

    if cookie_value.as_bytes().ct_eq(header_value.as_bytes()).unwrap_u8() != 1 {
        return ApiError::Csrf {
            code: CsrfErrorCode::TokenMismatch,
        }
        .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, routing::post, Router};
    use http::{Request, StatusCode};
    use tower::ServiceExt;
    use tower_cookies::CookieManagerLayer;

    use super::*;

    fn protected_router() -> Router {
        Router::new()
            .route("/protected", post(|| async { StatusCode::OK }))
            .route_layer(axum::middleware::from_fn(require_csrf))
            .layer(CookieManagerLayer::new())
    }

    #[tokio::test]
    async fn rejects_missing_cookie() {
        let response = protected_router()
            .oneshot(
                Request::post("/protected")
                    .header("x-csrf-token", "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let response = protected_router()
            .oneshot(
                Request::post("/protected")
                    .header("cookie", format!("{COOKIE_NAME}=abc"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rejects_mismatched_token() {
        let response = protected_router()
            .oneshot(
                Request::post("/protected")
                    .header("cookie", format!("{COOKIE_NAME}=abc"))
                    .header("x-csrf-token", "xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn accepts_matching_cookie_and_header() {
        let response = protected_router()
            .oneshot(
                Request::post("/protected")
                    .header("cookie", format!("{COOKIE_NAME}=abc"))
                    .header("x-csrf-token", "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn safe_methods_bypass_the_check() {
        let router = Router::new()
            .route("/protected", axum::routing::get(|| async { StatusCode::OK }))
            .route_layer(axum::middleware::from_fn(require_csrf))
            .layer(CookieManagerLayer::new());

        let response = router
            .oneshot(Request::get("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/'));
    }
}
