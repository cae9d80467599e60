use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{BackingStore, StoreError};

/// Postgres relational store
///
/// Exposes only an authentication check to the gateway; the pool is handed
/// to whoever needs it once that check has passed.
pub struct RelationalStore {
    database_url: String,
    pool: OnceLock<PgPool>,
}

impl RelationalStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: OnceLock::new(),
        }
    }

    /// Connection pool, if authentication has succeeded
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.get()
    }

    /// Open the pool and run a trivial query with the configured credentials.
    pub async fn authenticate(&self) -> Result<(), StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&self.database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        let _ = self.pool.set(pool);
        Ok(())
    }
}

#[async_trait]
impl BackingStore for RelationalStore {
    fn name(&self) -> &'static str {
        "Postgres"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.authenticate().await
    }
}
