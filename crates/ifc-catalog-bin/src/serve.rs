use std::sync::Arc;

use anyhow::anyhow;
use ifc_catalog::{
    api::{router, state::AppState},
    implementations::postgres::PostgresCatalog,
    metrics, service,
    service::cache::QueryCache,
    service::storage::ObjectStore,
    CONFIG,
};

pub(crate) async fn serve() -> anyhow::Result<()> {
    let db = PostgresCatalog::connect(&CONFIG).await?;
    let storage = ObjectStore::from_config(&CONFIG).await?;
    let broker = service::broker::RedisBroker::connect(&CONFIG).await?;

    // Reuses the broker's own Redis client rather than opening a second connection
    // (spec §4.3 advisory cache).
    let cache = QueryCache::new(
        broker.connection_manager(),
        CONFIG.query_cache_enabled,
        CONFIG.query_cache_ttl(),
    );

    let state = AppState {
        db,
        storage,
        broker: Arc::new(broker),
        cache,
        config: &CONFIG,
    };

    let bind_addr = format!("{}:{}", CONFIG.bind_host, CONFIG.listen_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow!(e).context(format!("failed to bind to address: {bind_addr}")))?;

    let (metrics_layer, metrics_future) =
        metrics::get_axum_layer_and_install_recorder(CONFIG.metrics_port).map_err(|e| {
            anyhow!(e).context(format!(
                "failed to start metrics server on port: {}",
                CONFIG.metrics_port
            ))
        })?;

    let app = router::new_router(state, metrics_layer);

    tokio::select!(
        err = router::serve(listener, app, shutdown_signal(CONFIG.shutdown_grace_period())) => {
            if let Err(err) = err {
                tracing::error!(error = ?err, "service failed");
            }
        }
        () = metrics_future => tracing::error!("metrics server exited"),
    );

    Ok(())
}

/// Resolves on `SIGTERM`/`SIGINT`, which starts `axum::serve`'s graceful drain of
/// in-flight requests. A watchdog is armed at the same moment that force-exits the
/// process if the drain still hasn't finished after `grace_period` (spec §5).
async fn shutdown_signal(grace_period: std::time::Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }

    tokio::spawn(async move {
        tokio::time::sleep(grace_period).await;
        tracing::error!("shutdown grace period exceeded, forcing exit");
        std::process::exit(1);
    });
}
