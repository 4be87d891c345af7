mod serve;

use ifc_catalog::logging::RedactedUrl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ifc_catalog::logging::init_tracing(&ifc_catalog::CONFIG.log_level, ifc_catalog::CONFIG.log_format);

    let database_url = url::Url::parse(&ifc_catalog::CONFIG.database_url).map(RedactedUrl::new);
    let broker_url = url::Url::parse(&ifc_catalog::CONFIG.broker_url).map(RedactedUrl::new);

    tracing::info!(
        port = ifc_catalog::CONFIG.listen_port,
        metrics_port = ifc_catalog::CONFIG.metrics_port,
        database_url = %database_url.as_ref().map_or_else(|_| "<invalid>".to_string(), ToString::to_string),
        broker_url = %broker_url.as_ref().map_or_else(|_| "<invalid>".to_string(), ToString::to_string),
        "starting ifc-catalog"
    );

    serve::serve().await
}
