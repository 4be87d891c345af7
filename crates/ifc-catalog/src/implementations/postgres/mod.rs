//! PostGIS-backed persistence for uploaded files and their extracted building
//! anchors.

pub mod buildings;
pub mod dbutils;
pub mod ifc_files;

use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgPool};

use crate::config::DynAppConfig;

#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub async fn connect(config: &DynAppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_pool_max_connections)
            .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
            .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bounded liveness probe for the health endpoint.
    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
