//! Environment-driven storage configuration.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::StoreError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Postgres connection settings, read from the environment.
///
/// `DATABASE_URL` is required; `DATABASE_MAX_CONNECTIONS` is optional and
/// falls back to a small pool suitable for a single service instance.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PgStoreConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::storage("DATABASE_URL is not set"))?;
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        Ok(Self {
            database_url,
            max_connections,
        })
    }

    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;
        tracing::info!(max_connections = self.max_connections, "connected to Postgres");
        Ok(pool)
    }
}
