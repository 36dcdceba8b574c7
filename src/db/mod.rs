//! PostgreSQL pool shared by the store and the lock table

pub mod schema;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Every in-flight operation holds one connection for its whole
    /// transaction, so `max_connections` caps engine concurrency.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the unique index on ledger references exists. Without it
    /// keyed events are no longer at-most-once.
    pub async fn ledger_guard_present(&self) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE indexname = $1)")
            .bind(schema::REFERENCE_INDEX)
            .fetch_one(&self.pool)
            .await
    }
}

/// Test pool from `DATABASE_URL`; `None` when unset or unreachable
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let db = Database::connect(&url, 8).await.ok()?;
    schema::ensure_schema(db.pool()).await.ok()?;
    Some(db.pool.clone())
}
