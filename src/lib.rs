//! CashCow Economy - transactional economy engine
//!
//! Balances, inventory, productive assets, a P2P marketplace and a referral
//! roll-up, kept consistent under concurrent, duplicate and slow requests.
//!
//! # Modules
//!
//! - [`domain`] - Row types: actors, inventory, cows, listings, stakes, ledger
//! - [`error`] - `EconomyError` taxonomy
//! - [`lock`] - Advisory lock service (`"<class>:<actor>"` keys with TTL)
//! - [`store`] - Storage seam with explicit row locks (PostgreSQL, in-memory)
//! - [`coordinator`] - Transaction deadline strictly inside the lock TTL
//! - [`idempotency`] - First-write ledger reference for keyed events
//! - [`balance`] - The only code that changes balances and counters
//! - [`trade`] - Pairwise trade resolver (canonical two-actor locking)
//! - [`referral`] - Referral roll-up resolver
//! - [`auth`] - Wallet signature and callback HMAC verification
//! - [`services`] - Operations: market, farm, rewards, staking, wallet, admin, account
//! - [`config`] / [`logging`] / [`db`] / [`clock`] - Ambient plumbing

// Data model - must be first!
pub mod domain;
pub mod error;

// Concurrency and persistence seams
pub mod clock;
pub mod coordinator;
pub mod db;
pub mod idempotency;
pub mod lock;
pub mod store;

// Economy logic
pub mod balance;
pub mod referral;
pub mod trade;

pub mod auth;
pub mod services;

pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use balance::BalanceMutator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use coordinator::TxCoordinator;
pub use domain::{
    Actor, ActorId, Cow, CowKind, Currency, GrantItem, Inventory, LedgerCategory, LedgerEntry,
    Listing, ListingStatus, Resource, Role, Stake, StakeKind,
};
pub use error::EconomyError;
pub use idempotency::{IdempotencyLedger, ReferenceScope};
pub use lock::{LockKey, LockService, OpClass};
pub use referral::RollUpResolver;
pub use services::{Economy, EngineContext};
pub use store::{Store, StoreTx};
pub use trade::{PairwiseTradeResolver, TradeReceipt};
