//! Lock table in the shared PostgreSQL store
//!
//! Acquire is a single upsert that only overwrites an expired row, so two
//! processes racing for the same key cannot both win. Expiry is evaluated
//! with the database clock.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{LockKey, LockService, LockToken};

pub struct PgLockService {
    pool: PgPool,
}

impl PgLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockService for PgLockService {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn acquire(&self, key: &LockKey, ttl: Duration) -> Option<LockToken> {
        let token = LockToken::generate();
        let result = sqlx::query(
            "INSERT INTO locks_tb (lock_key, token, expires_at)
             VALUES ($1, $2, now() + make_interval(secs => $3))
             ON CONFLICT (lock_key) DO UPDATE
                SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                WHERE locks_tb.expires_at < now()",
        )
        .bind(key.as_str())
        .bind(token.as_str())
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) if r.rows_affected() == 1 => Some(token),
            Ok(_) => None,
            Err(e) => {
                // fail closed: an unreachable lock table must not let writers through
                tracing::error!(key = %key, error = %e, "Lock acquire failed");
                None
            }
        }
    }

    async fn release(&self, key: &LockKey, token: &LockToken) -> bool {
        let result = sqlx::query("DELETE FROM locks_tb WHERE lock_key = $1 AND token = $2")
            .bind(key.as_str())
            .bind(token.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(r) => r.rows_affected() == 1,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Lock release failed, TTL will reclaim it");
                false
            }
        }
    }
}
