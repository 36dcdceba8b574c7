use std::time::Duration;

use async_trait::async_trait;

use super::{LockKey, LockService, LockToken};

/// Lock service that never refuses. Selected only by `lock.backend: none`;
/// row locks in the store still serialise writers, but duplicate requests are
/// no longer rejected up front.
pub struct NoopLockService;

impl NoopLockService {
    pub fn new() -> Self {
        tracing::warn!("Advisory locking DISABLED (lock.backend: none). Development only.");
        Self
    }
}

#[async_trait]
impl LockService for NoopLockService {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn acquire(&self, _key: &LockKey, _ttl: Duration) -> Option<LockToken> {
        Some(LockToken::generate())
    }

    async fn release(&self, _key: &LockKey, _token: &LockToken) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::OpClass;

    #[tokio::test]
    async fn test_always_grants() {
        let svc = NoopLockService::new();
        let key = LockKey::new(OpClass::Wallet, "x");
        let ttl = Duration::from_secs(1);
        assert!(svc.acquire(&key, ttl).await.is_some());
        assert!(svc.acquire(&key, ttl).await.is_some());
    }
}
