//! Environment-driven configuration for the service.
#![allow(clippy::struct_excessive_bools)]

use std::{sync::LazyLock, time::Duration};

use http::HeaderValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use veil::Redact;

pub static CONFIG: LazyLock<DynAppConfig> = LazyLock::new(get_config);

fn get_config() -> DynAppConfig {
    let defaults = figment::providers::Serialized::defaults(DynAppConfig::default());

    #[cfg(not(test))]
    let prefix = "IFC_CATALOG__";
    #[cfg(test)]
    let prefix = "IFC_CATALOG_TEST__";

    let env = figment::providers::Env::prefixed(prefix).split("__");

    figment::Figment::from(defaults)
        .merge(env)
        .extract()
        .expect("valid configuration")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Json,
}

#[derive(Clone, Serialize, Deserialize, Redact)]
pub struct DynAppConfig {
    // ------------- SERVER -------------
    pub environment: Environment,
    pub bind_host: String,
    pub listen_port: u16,
    pub metrics_port: u16,
    /// Whether a trusted reverse proxy's `X-Forwarded-Proto` header should be honoured
    /// when deciding whether a request arrived over HTTPS.
    pub trust_forwarded_proto: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    pub request_timeout_seconds: u64,
    pub shutdown_grace_period_seconds: u64,

    // ------------- DATABASE -------------
    #[redact]
    pub database_url: String,
    pub db_pool_max_connections: u32,
    pub db_pool_idle_timeout_seconds: u64,
    pub db_pool_acquire_timeout_seconds: u64,

    // ------------- OBJECT STORAGE -------------
    pub s3_endpoint: Option<String>,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_access_key_id: Option<String>,
    #[redact]
    pub s3_secret_access_key: Option<String>,
    pub s3_force_path_style: bool,

    // ------------- UPLOAD -------------
    pub max_file_size_mb: u64,
    pub presigned_url_expiry_seconds: u64,
    /// Development-mode behaviour (§9 open question #1): unconditionally mark every
    /// non-deleted `IfcFile` as deleted on each new `/upload/request`. Left enabled by
    /// default to preserve the source's documented behaviour; a production deployment
    /// should set this to `false` once per-user/session scoping exists.
    pub single_file_replacement_policy: bool,

    // ------------- RATE LIMITING -------------
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub upload_rate_limit_max_requests: u32,

    // ------------- CORS -------------
    #[serde(
        deserialize_with = "deserialize_origins",
        serialize_with = "serialize_origins"
    )]
    pub cors_origins: Vec<HeaderValue>,

    // ------------- BROKER (Celery / Redis) -------------
    #[redact]
    pub broker_url: String,
    pub broker_reconnect_max_retries: u32,
    pub task_poll_interval_ms: u64,

    // ------------- ADVISORY QUERY CACHE -------------
    pub query_cache_enabled: bool,
    pub query_cache_ttl_seconds: u64,
}

impl Default for DynAppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_host: "0.0.0.0".to_string(),
            listen_port: 8080,
            metrics_port: 9090,
            trust_forwarded_proto: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            request_timeout_seconds: 30,
            shutdown_grace_period_seconds: 10,

            database_url: "postgres://localhost/ifc_catalog".to_string(),
            db_pool_max_connections: 20,
            db_pool_idle_timeout_seconds: 30,
            db_pool_acquire_timeout_seconds: 2,

            s3_endpoint: None,
            s3_bucket: "ifc-uploads".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_force_path_style: true,

            max_file_size_mb: 100,
            presigned_url_expiry_seconds: 900,
            single_file_replacement_policy: true,

            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 300,
            upload_rate_limit_max_requests: 20,

            cors_origins: Vec::new(),

            broker_url: "redis://localhost:6379".to_string(),
            broker_reconnect_max_retries: 3,
            task_poll_interval_ms: 500,

            query_cache_enabled: true,
            query_cache_ttl_seconds: 300,
        }
    }
}

impl DynAppConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_seconds)
    }

    #[must_use]
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    #[must_use]
    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_seconds)
    }
}

fn deserialize_origins<'de, D>(deserializer: D) -> std::result::Result<Vec<HeaderValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect())
}

fn serialize_origins<S>(
    origins: &[HeaderValue],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let joined = origins
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    serializer.serialize_str(&joined)
}
