//! Economy services
//!
//! Every state-changing operation follows the same control flow:
//!
//! ```text
//! guarded(class, actor)            advisory lock, panic guard, release always
//!                                  (ad rewards: contained(), panic guard only)
//!   └─ coordinator.begin()         deadline = lock TTL - margin
//!        ├─ idempotency record     keyed flows only, first write
//!        ├─ lock rows              listing → actors → cows → inventory → stakes
//!        ├─ BalanceMutator / PairwiseTradeResolver / RollUpResolver
//!        └─ coordinator.finish()   commit | rollback | Timeout
//! ```
//!
//! - [`market`] - P2P listings, gold shop, gold swap, platform sales
//! - [`farm`] - feeding and harvesting
//! - [`rewards`] - ad-network reward callbacks
//! - [`staking`] - in-app staking
//! - [`wallet`] - deposits and withdrawals
//! - [`admin`] - minting grants
//! - [`account`] - login, referrer binding, root admin seeding

pub mod account;
pub mod admin;
pub mod farm;
pub mod market;
pub mod rewards;
pub mod staking;
pub mod wallet;

#[cfg(all(test, feature = "memory-store"))]
mod integration_tests;

pub use account::AccountService;
pub use admin::AdminService;
pub use farm::FarmService;
pub use market::{GoldShopItem, MarketService, PlatformItem, PlatformReceipt};
pub use rewards::{AdCallback, RewardOutcome, RewardService};
pub use staking::StakingService;
pub use wallet::WalletService;

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::auth::{CallbackValidator, EthSignatureVerifier, SignatureVerifier};
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, EconomyConfig, LockBackend, StorageBackend};
use crate::coordinator::TxCoordinator;
use crate::db::{Database, schema};
use crate::domain::Actor;
use crate::error::EconomyError;
use crate::lock::{LockKey, LockService, NoopLockService, OpClass, PgLockService};
use crate::logging::LOCK_TARGET;
use crate::store::{PgStore, Store};

/// Shared handles every service runs against
pub struct EngineContext {
    pub store: Arc<dyn Store>,
    pub locks: Arc<dyn LockService>,
    pub coordinator: TxCoordinator,
    pub clock: Arc<dyn Clock>,
    pub economy: EconomyConfig,
    pub lock_ttl: Duration,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<dyn LockService>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Result<Self, EconomyError> {
        let lock_ttl = Duration::from_millis(config.lock.ttl_ms);
        let margin = Duration::from_millis(config.lock.deadline_margin_ms);
        let coordinator = TxCoordinator::new(store.clone(), lock_ttl, margin)?;
        Ok(Self {
            store,
            locks,
            coordinator,
            clock,
            economy: config.economy.clone(),
            lock_ttl,
        })
    }

    /// Run `op` under the advisory lock `"<class>:<subject>"`.
    ///
    /// The lock is released on every path, including a panic inside `op`,
    /// which is logged and surfaced as `Internal`.
    pub async fn guarded<T, F>(
        &self,
        class: OpClass,
        subject: impl Display,
        op: F,
    ) -> Result<T, EconomyError>
    where
        F: Future<Output = Result<T, EconomyError>>,
    {
        let key = LockKey::new(class, subject);
        let Some(token) = self.locks.acquire(&key, self.lock_ttl).await else {
            debug!(target: LOCK_TARGET, key = %key, "Advisory lock busy");
            return Err(EconomyError::LockContention);
        };

        debug!(target: LOCK_TARGET, key = %key, token = token.as_str(), "Advisory lock acquired");

        let outcome = AssertUnwindSafe(op).catch_unwind().await;

        if self.locks.release(&key, &token).await {
            debug!(target: LOCK_TARGET, key = %key, "Advisory lock released");
        } else {
            warn!(key = %key, "Advisory lock was not held at release");
        }

        settle_panic(&key, outcome)
    }

    /// Run `op` without an advisory lock, converting a panic to `Internal`.
    ///
    /// For keyed flows that serialize on the ledger reference and row locks
    /// alone, where a busy lock would turn a duplicate into `LockContention`.
    pub async fn contained<T, F>(&self, label: impl Display, op: F) -> Result<T, EconomyError>
    where
        F: Future<Output = Result<T, EconomyError>>,
    {
        let outcome = AssertUnwindSafe(op).catch_unwind().await;
        settle_panic(&label, outcome)
    }
}

fn settle_panic<T>(
    label: &dyn Display,
    outcome: std::thread::Result<Result<T, EconomyError>>,
) -> Result<T, EconomyError> {
    match outcome {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(key = %label, panic = %message, "Operation panicked");
            Err(EconomyError::Internal("unexpected fault".to_string()))
        }
    }
}

/// The full operation surface
pub struct Economy {
    pub market: MarketService,
    pub farm: FarmService,
    pub rewards: RewardService,
    pub staking: StakingService,
    pub wallet: WalletService,
    pub admin: AdminService,
    pub account: AccountService,
    ctx: Arc<EngineContext>,
}

impl Economy {
    pub fn new(
        ctx: Arc<EngineContext>,
        verifier: Arc<dyn SignatureVerifier>,
        callbacks: Option<CallbackValidator>,
        root_wallet: Option<String>,
    ) -> Self {
        if callbacks.is_none() {
            warn!("Ad network secret not configured, reward callbacks will be rejected");
        }
        Self {
            market: MarketService::new(ctx.clone()),
            farm: FarmService::new(ctx.clone()),
            rewards: RewardService::new(ctx.clone(), callbacks),
            staking: StakingService::new(ctx.clone()),
            wallet: WalletService::new(ctx.clone()),
            admin: AdminService::new(ctx.clone()),
            account: AccountService::new(ctx.clone(), verifier, root_wallet),
            ctx,
        }
    }

    /// Wire backends from configuration. Connects and prepares PostgreSQL
    /// when either the store or the lock service lives there.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let needs_pg = config.storage == StorageBackend::Postgres
            || config.lock.backend == LockBackend::Postgres;
        let database = if needs_pg {
            let url = config
                .postgres_url
                .as_deref()
                .context("postgres_url or DATABASE_URL is required")?;
            let db = Database::connect(url, config.postgres_max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            schema::ensure_schema(db.pool()).await?;
            if !db.ledger_guard_present().await? {
                bail!("ledger reference index {} is missing", schema::REFERENCE_INDEX);
            }
            Some(db)
        } else {
            None
        };

        let store: Arc<dyn Store> = match (config.storage, &database) {
            (StorageBackend::Postgres, Some(db)) => Arc::new(PgStore::new(db.pool().clone())),
            (StorageBackend::Postgres, None) => bail!("storage: postgres without a database"),
            (StorageBackend::Memory, _) => memory_store()?,
        };

        let locks: Arc<dyn LockService> = match (config.lock.backend, &database) {
            (LockBackend::Postgres, Some(db)) => Arc::new(PgLockService::new(db.pool().clone())),
            (LockBackend::Postgres, None) => bail!("lock.backend: postgres without a database"),
            (LockBackend::Memory, _) => memory_locks()?,
            (LockBackend::None, _) => Arc::new(NoopLockService::new()),
        };

        info!(
            store = store.name(),
            locks = locks.name(),
            ttl_ms = config.lock.ttl_ms,
            margin_ms = config.lock.deadline_margin_ms,
            "Economy engine wired"
        );

        let ctx = EngineContext::new(store, locks, Arc::new(SystemClock), config)?;
        let callbacks = CallbackValidator::new(&config.ad_network_secret).ok();
        Ok(Self::new(
            Arc::new(ctx),
            Arc::new(EthSignatureVerifier),
            callbacks,
            config.root_wallet.clone(),
        ))
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub async fn health_check(&self) -> Result<(), EconomyError> {
        self.ctx.store.health_check().await
    }

    /// Seed the configured root wallet as admin; no-op without one
    pub async fn seed_root_admin(&self) -> Result<Option<Actor>, EconomyError> {
        match self.account.root_wallet() {
            Some(wallet) => {
                let wallet = wallet.to_string();
                self.account.seed_root_admin(&wallet).await.map(Some)
            }
            None => Ok(None),
        }
    }
}

#[cfg(feature = "memory-store")]
fn memory_store() -> anyhow::Result<Arc<dyn Store>> {
    Ok(Arc::new(crate::store::MemoryStore::new()))
}

#[cfg(not(feature = "memory-store"))]
fn memory_store() -> anyhow::Result<Arc<dyn Store>> {
    bail!("storage: memory requires the `memory-store` feature")
}

#[cfg(feature = "memory-store")]
fn memory_locks() -> anyhow::Result<Arc<dyn LockService>> {
    Ok(Arc::new(crate::lock::MemoryLockService::new()))
}

#[cfg(not(feature = "memory-store"))]
fn memory_locks() -> anyhow::Result<Arc<dyn LockService>> {
    bail!("lock.backend: memory requires the `memory-store` feature")
}
