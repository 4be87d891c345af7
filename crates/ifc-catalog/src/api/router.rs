//! Route composition and the middleware stack (spec §4.1, §6).

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::MakeRequestUuid,
    sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
    ServiceBuilderExt,
};

use crate::api::state::AppState;
use crate::api::{buildings, csrf, health, models, rate_limit, security, upload};
use crate::config::DynAppConfig;

fn cors_layer(config: &DynAppConfig) -> CorsLayer {
    let allow_origin = if config.cors_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(config.cors_origins.clone())
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(!config.cors_origins.is_empty())
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::header::AUTHORIZATION,
            http::HeaderName::from_static("x-csrf-token"),
        ])
}

/// Builds the `/api/v1` router.
///
/// Layer order (outermost to innermost, i.e. the order a request actually passes
/// through): metrics, so every request is counted even ones rejected deeper in the
/// stack; HTTPS enforcement / security headers (spec §4.1 policies 1-2), so an insecure
/// request is redirected before compression, cookie parsing, CORS or the global rate
/// limiter ever run; then the rest of the `tower-http` stack; routes and their
/// route-scoped layers (CSRF, the upload-specific rate limit) are innermost.
pub fn new_router(
    state: AppState,
    metrics_layer: axum_prometheus::PrometheusMetricLayer<'static>,
) -> Router {
    let public_routes = Router::new()
        .route("/csrf-token", get(csrf::issue_csrf_token))
        .route("/health", get(health::health))
        .route("/upload/status/{task_id}", get(upload::upload_status))
        .route("/buildings", get(buildings::list_buildings))
        .route("/buildings/{id}", get(buildings::get_building))
        .route(
            "/models/{filename}",
            get(models::stream_model).options(models::preflight_model),
        );

    // `/upload/request` carries its own, stricter rate limit on top of the global one
    // (spec §4.1 policy 4), so it gets its own sub-router rather than sharing one with
    // the other CSRF-protected mutation routes. The rate limiter sits outside (runs
    // before) the CSRF check, so a throttled client is rejected without ever reaching
    // — and without its request being charged against — the CSRF layer: policy 4 before
    // policy 7.
    let upload_request_route = Router::new()
        .route("/upload/request", post(upload::request_upload))
        .route_layer(middleware::from_fn(csrf::require_csrf))
        .route_layer(rate_limit::upload_layer(state.config));

    let other_protected_routes = Router::new()
        .route("/upload/complete", post(upload::complete_upload))
        .route("/buildings/{id}", delete(buildings::delete_building))
        .route_layer(middleware::from_fn(csrf::require_csrf));

    let api_v1 = Router::new()
        .merge(public_routes)
        .merge(upload_request_route)
        .merge(other_protected_routes);

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(
            ServiceBuilder::new()
                .set_x_request_id(MakeRequestUuid)
                .layer(SetSensitiveHeadersLayer::new([http::header::AUTHORIZATION]))
                .layer(CompressionLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.config.request_timeout()))
                .layer(CatchPanicLayer::new())
                .layer(CookieManagerLayer::new())
                .layer(cors_layer(state.config))
                .layer(rate_limit::global_layer(state.config))
                .propagate_x_request_id(),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security::enforce_https_and_headers,
        ))
        .layer(metrics_layer)
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves (spec §5 graceful shutdown).
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e).context("error running HTTP server"))
}
