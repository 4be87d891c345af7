//! Prometheus metrics: an HTTP-level layer plus a standalone exporter endpoint bound
//! on its own port, separate from the public API listener.

use axum::{routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;

/// Installs the Prometheus recorder, returning the layer to attach to the public
/// router and a future that serves `/metrics` on `metrics_port` until the process
/// shuts down.
pub fn get_axum_layer_and_install_recorder(
    metrics_port: u16,
) -> anyhow::Result<(PrometheusMetricLayer<'static>, impl std::future::Future<Output = ()>)> {
    let (metric_layer, metric_handle) = PrometheusMetricLayer::pair();

    let metrics_app = Router::new().route(
        "/metrics",
        get(move || {
            let metric_handle = metric_handle.clone();
            async move { metric_handle.render() }
        }),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], metrics_port));

    let serve_future = async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, %addr, "failed to bind metrics listener");
                return;
            }
        };
        if let Err(err) = axum::serve(listener, metrics_app).await {
            tracing::error!(error = %err, "metrics server exited");
        }
    };

    Ok((metric_layer, serve_future))
}
