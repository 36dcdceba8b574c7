//! Advisory Lock Service
//!
//! Per-(operation class, actor) mutual exclusion with a TTL, shared by every
//! engine process that talks to the same store.
//!
//! ```text
//! acquire("market_buy:<actor>", 5s) ──▶ Some(token)   held until release or TTL
//! acquire("market_buy:<actor>", 5s) ──▶ None          caller gets LockContention
//! release(key, token)               ──▶ true          compare-and-delete
//! release(key, stale_token)         ──▶ false         never frees someone else's lock
//! ```

#[cfg(feature = "memory-store")]
pub mod memory;
pub mod noop;
pub mod postgres;

#[cfg(feature = "memory-store")]
pub use memory::MemoryLockService;
pub use noop::NoopLockService;
pub use postgres::PgLockService;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Operation classes. Two operations of the same class for the same actor
/// never run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    MarketBuy,
    MarketSell,
    MarketCancel,
    PlatformBuy,
    FeedCow,
    HarvestFarm,
    Staking,
    Wallet,
    GoldExchange,
    AdminGrant,
    Referral,
    Account,
}

impl OpClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpClass::MarketBuy => "market_buy",
            OpClass::MarketSell => "market_sell",
            OpClass::MarketCancel => "market_cancel",
            OpClass::PlatformBuy => "platform_buy",
            OpClass::FeedCow => "feed_cow",
            OpClass::HarvestFarm => "harvest_farm",
            OpClass::Staking => "staking",
            OpClass::Wallet => "wallet",
            OpClass::GoldExchange => "gold_exchange",
            OpClass::AdminGrant => "admin_grant",
            OpClass::Referral => "referral",
            OpClass::Account => "account",
        }
    }
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"<class>:<subject>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(class: OpClass, subject: impl fmt::Display) -> Self {
        Self(format!("{}:{}", class.as_str(), subject))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque proof of ownership (ULID, unique per acquisition)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Take the lock if free or expired. `None` on contention or backend
    /// failure (fail closed).
    async fn acquire(&self, key: &LockKey, ttl: Duration) -> Option<LockToken>;

    /// Delete the lock only if `token` still owns it
    async fn release(&self, key: &LockKey, token: &LockToken) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = LockKey::new(OpClass::MarketBuy, "abc");
        assert_eq!(key.as_str(), "market_buy:abc");
        assert_eq!(
            LockKey::new(OpClass::GoldExchange, 7).to_string(),
            "gold_exchange:7"
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }
}
