//! In-process lock table
//!
//! Same contract as the PostgreSQL lock table, scoped to one process. Each
//! entry carries its own expiry; an expired entry is taken over atomically
//! under the DashMap shard lock.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{LockKey, LockService, LockToken};
use crate::logging::LOCK_TARGET;

struct Held {
    token: LockToken,
    expires_at: Instant,
}

pub struct MemoryLockService {
    locks: DashMap<String, Held>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Number of live (unexpired) locks
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.locks.iter().filter(|e| e.expires_at > now).count()
    }
}

impl Default for MemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn acquire(&self, key: &LockKey, ttl: Duration) -> Option<LockToken> {
        let now = Instant::now();
        let token = LockToken::generate();
        let held = Held {
            token: token.clone(),
            expires_at: now + ttl,
        };

        match self.locks.entry(key.as_str().to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().expires_at > now {
                    return None;
                }
                tracing::debug!(target: LOCK_TARGET, key = %key, "Taking over expired lock");
                e.insert(held);
            }
            Entry::Vacant(v) => {
                v.insert(held);
            }
        }
        Some(token)
    }

    async fn release(&self, key: &LockKey, token: &LockToken) -> bool {
        self.locks
            .remove_if(key.as_str(), |_, held| held.token == *token)
            .is_some()
    }
}
