//! Storage access layer
//!
//! Every read that precedes a write goes through a `lock_*` method, which
//! takes a row-level exclusive lock held until `commit`/`rollback`. Callers
//! must take row locks in the global order:
//!
//! ```text
//! listing → actors (ActorId order) → cows (id order) → inventory → stakes → ledger reference
//! ```
//!
//! Plain (non-`lock_`) reads on a transaction see committed data plus the
//! transaction's own writes and never block.

#[cfg(feature = "memory-store")]
pub mod memory;
pub mod postgres;
mod rows;

#[cfg(feature = "memory-store")]
pub use memory::{Latency, MemoryStore};
pub use postgres::PgStore;
pub(crate) use rows::{StagedInventory, lock_actor, lock_or_create_inventory, save_inventory};

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Actor, ActorId, Cow, Inventory, LedgerEntry, Listing, Stake};
use crate::error::EconomyError;

pub type StoreResult<T> = Result<T, EconomyError>;

/// Entry point: open transactions and serve read-only queries
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a transaction. `budget` is the time left before the caller's
    /// deadline; backends that can enforce it server-side do so.
    async fn begin(&self, budget: Duration) -> StoreResult<Box<dyn StoreTx>>;

    async fn health_check(&self) -> StoreResult<()>;

    async fn actor(&self, id: ActorId) -> StoreResult<Option<Actor>>;
    async fn actor_by_wallet(&self, wallet: &str) -> StoreResult<Option<Actor>>;
    async fn inventory(&self, owner: ActorId) -> StoreResult<Option<Inventory>>;
    async fn cows(&self, owner: ActorId) -> StoreResult<Vec<Cow>>;
    async fn listing(&self, id: Uuid) -> StoreResult<Option<Listing>>;
    async fn open_listings(&self) -> StoreResult<Vec<Listing>>;
    async fn stakes(&self, owner: ActorId) -> StoreResult<Vec<Stake>>;
    /// Ledger entries of one actor, oldest first
    async fn ledger(&self, actor: ActorId) -> StoreResult<Vec<LedgerEntry>>;
    async fn ledger_by_reference(&self, reference: &str) -> StoreResult<Option<LedgerEntry>>;
}

/// One open transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait StoreTx: Send {
    // === Actors ===
    async fn lock_actor(&mut self, id: ActorId) -> StoreResult<Option<Actor>>;
    async fn lock_actor_by_wallet(&mut self, wallet: &str) -> StoreResult<Option<Actor>>;
    async fn insert_actor(&mut self, actor: &Actor) -> StoreResult<()>;
    async fn update_actor(&mut self, actor: &Actor) -> StoreResult<()>;
    /// Non-locking read of the weak referrer back-reference
    async fn referrer_of(&mut self, id: ActorId) -> StoreResult<Option<ActorId>>;

    // === Inventory ===
    async fn lock_inventory(&mut self, owner: ActorId) -> StoreResult<Option<Inventory>>;
    async fn insert_inventory(&mut self, inventory: &Inventory) -> StoreResult<()>;
    async fn update_inventory(&mut self, inventory: &Inventory) -> StoreResult<()>;

    // === Cows ===
    async fn lock_cow(&mut self, owner: ActorId, id: Uuid) -> StoreResult<Option<Cow>>;
    /// All cows of `owner`, locked in id order, returned oldest first
    async fn lock_cows(&mut self, owner: ActorId) -> StoreResult<Vec<Cow>>;
    /// Non-locking count
    async fn count_cows(&mut self, owner: ActorId) -> StoreResult<i64>;
    async fn insert_cow(&mut self, cow: &Cow) -> StoreResult<()>;
    async fn update_cow(&mut self, cow: &Cow) -> StoreResult<()>;

    // === Listings ===
    async fn lock_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>>;
    async fn insert_listing(&mut self, listing: &Listing) -> StoreResult<()>;
    async fn update_listing(&mut self, listing: &Listing) -> StoreResult<()>;

    // === Stakes ===
    async fn lock_stakes(&mut self, owner: ActorId) -> StoreResult<Vec<Stake>>;
    async fn insert_stake(&mut self, stake: &Stake) -> StoreResult<()>;
    async fn update_stake(&mut self, stake: &Stake) -> StoreResult<()>;

    // === Ledger ===
    /// Append an entry. A second entry with the same reference fails with
    /// `DuplicateEvent`; a concurrent one blocks until the first transaction
    /// ends.
    async fn insert_ledger(&mut self, entry: &LedgerEntry) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
