use std::sync::Arc;

use crate::config::DynAppConfig;
use crate::implementations::postgres::PostgresCatalog;
use crate::service::broker::TaskBroker;
use crate::service::cache::QueryCache;
use crate::service::storage::ObjectStore;

/// Everything a handler needs, cloned cheaply per request (axum `State` extractor).
#[derive(Clone)]
pub struct AppState {
    pub db: PostgresCatalog,
    pub storage: ObjectStore,
    pub broker: Arc<dyn TaskBroker>,
    pub cache: QueryCache,
    pub config: &'static DynAppConfig,
}
