//! In-process store with real row-lock semantics
//!
//! Committed rows live in DashMaps. Each row key has a gate (an async mutex)
//! that a transaction holds from `lock_*` until commit/rollback, so two
//! transactions touching the same row serialise exactly like `FOR UPDATE`.
//! Writes are buffered in the transaction and published on commit, before
//! the gates are released. Dropping a transaction discards its writes.
//!
//! Ledger references use the same gates: a second insert of a reference
//! waits for the first transaction, then fails with `DuplicateEvent` if the
//! first one committed.
//!
//! [`Latency`] stretches `begin` and `commit` to reproduce a slow database.
//! A commit cancelled during its delay publishes nothing.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreResult, StoreTx};
use crate::domain::{
    Actor, ActorId, Cow, Inventory, LedgerEntry, Listing, ListingStatus, Stake,
    normalize_wallet,
};
use crate::error::EconomyError;

struct Table<K, V> {
    rows: DashMap<K, V>,
    gates: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Table<K, V> {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.rows.get(key).map(|r| r.value().clone())
    }

    fn gate(&self, key: &K) -> Arc<Mutex<()>> {
        self.gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn filter(&self, pred: impl Fn(&V) -> bool) -> Vec<V> {
        self.rows
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }
}

struct Tables {
    actors: Table<ActorId, Actor>,
    wallets: Table<String, ActorId>,
    inventories: Table<ActorId, Inventory>,
    cows: Table<Uuid, Cow>,
    listings: Table<Uuid, Listing>,
    /// Gate is per owner: locking stakes locks all of an owner's positions
    stakes: Table<ActorId, Vec<Stake>>,
    references: Table<String, Uuid>,
    ledger: DashMap<u64, LedgerEntry>,
    ledger_seq: AtomicU64,
}

/// Artificial delays, zero by default
#[derive(Debug, Clone, Copy, Default)]
pub struct Latency {
    /// Before a transaction is handed out
    pub begin: Duration,
    /// Before a commit publishes its writes
    pub commit: Duration,
}

/// Shared handle; clones see the same data
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Tables>,
    latency: Latency,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            latency: Latency::default(),
            tables: Arc::new(Tables {
                actors: Table::new(),
                wallets: Table::new(),
                inventories: Table::new(),
                cows: Table::new(),
                listings: Table::new(),
                stakes: Table::new(),
                references: Table::new(),
                ledger: DashMap::new(),
                ledger_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Same data, with `latency` applied to transactions opened through
    /// the returned handle
    pub fn with_latency(&self, latency: Latency) -> Self {
        Self {
            tables: self.tables.clone(),
            latency,
        }
    }

    // === Fixture loading (bypasses row locks) ===

    pub fn put_actor(&self, actor: Actor) {
        self.tables
            .wallets
            .rows
            .insert(actor.wallet_address.clone(), actor.id);
        self.tables.actors.rows.insert(actor.id, actor);
    }

    pub fn put_inventory(&self, inventory: Inventory) {
        self.tables.inventories.rows.insert(inventory.owner, inventory);
    }

    pub fn put_cow(&self, cow: Cow) {
        self.tables.cows.rows.insert(cow.id, cow);
    }

    pub fn put_listing(&self, listing: Listing) {
        self.tables.listings.rows.insert(listing.id, listing);
    }

    /// Every committed actor
    pub fn all_actors(&self) -> Vec<Actor> {
        self.tables.actors.filter(|_| true)
    }

    /// Number of committed ledger entries
    pub fn ledger_len(&self) -> usize {
        self.tables.ledger.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self, _budget: Duration) -> StoreResult<Box<dyn StoreTx>> {
        if !self.latency.begin.is_zero() {
            tokio::time::sleep(self.latency.begin).await;
        }
        Ok(Box::new(MemoryTx::new(self.tables.clone(), self.latency.commit)))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn actor(&self, id: ActorId) -> StoreResult<Option<Actor>> {
        Ok(self.tables.actors.get(&id))
    }

    async fn actor_by_wallet(&self, wallet: &str) -> StoreResult<Option<Actor>> {
        let wallet = normalize_wallet(wallet);
        Ok(self
            .tables
            .wallets
            .get(&wallet)
            .and_then(|id| self.tables.actors.get(&id)))
    }

    async fn inventory(&self, owner: ActorId) -> StoreResult<Option<Inventory>> {
        Ok(self.tables.inventories.get(&owner))
    }

    async fn cows(&self, owner: ActorId) -> StoreResult<Vec<Cow>> {
        let mut cows = self.tables.cows.filter(|c| c.owner == owner);
        cows.sort_by_key(|c| (c.created_at, c.id));
        Ok(cows)
    }

    async fn listing(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.tables.listings.get(&id))
    }

    async fn open_listings(&self) -> StoreResult<Vec<Listing>> {
        let mut open = self
            .tables
            .listings
            .filter(|l| l.status == ListingStatus::Open);
        open.sort_by_key(|l| std::cmp::Reverse(l.created_at));
        Ok(open)
    }

    async fn stakes(&self, owner: ActorId) -> StoreResult<Vec<Stake>> {
        Ok(self.tables.stakes.get(&owner).unwrap_or_default())
    }

    async fn ledger(&self, actor: ActorId) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<(u64, LedgerEntry)> = self
            .tables
            .ledger
            .iter()
            .filter(|e| e.value().actor == actor)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, e)| e).collect())
    }

    async fn ledger_by_reference(&self, reference: &str) -> StoreResult<Option<LedgerEntry>> {
        let Some(id) = self.tables.references.get(&reference.to_string()) else {
            return Ok(None);
        };
        Ok(self
            .tables
            .ledger
            .iter()
            .find(|e| e.value().id == id)
            .map(|e| e.value().clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Actor(ActorId),
    Wallet(String),
    Inventory(ActorId),
    Cow(Uuid),
    Listing(Uuid),
    Stakes(ActorId),
    Reference(String),
}

struct MemoryTx {
    tables: Arc<Tables>,
    commit_delay: Duration,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    actors: HashMap<ActorId, Actor>,
    inventories: HashMap<ActorId, Inventory>,
    cows: HashMap<Uuid, Cow>,
    listings: HashMap<Uuid, Listing>,
    stakes: HashMap<ActorId, Vec<Stake>>,
    ledger: Vec<LedgerEntry>,
    references: HashSet<String>,
}

impl MemoryTx {
    fn new(tables: Arc<Tables>, commit_delay: Duration) -> Self {
        Self {
            tables,
            commit_delay,
            held: HashMap::new(),
            actors: HashMap::new(),
            inventories: HashMap::new(),
            cows: HashMap::new(),
            listings: HashMap::new(),
            stakes: HashMap::new(),
            ledger: Vec::new(),
            references: HashSet::new(),
        }
    }

    /// Wait for the row gate unless this transaction already holds it
    async fn hold(&mut self, key: RowKey, gate: Arc<Mutex<()>>) {
        if self.held.contains_key(&key) {
            return;
        }
        let guard = gate.lock_owned().await;
        self.held.insert(key, guard);
    }

    fn ensure_held(&self, key: &RowKey, buffered: bool) -> StoreResult<()> {
        if buffered || self.held.contains_key(key) {
            Ok(())
        } else {
            Err(EconomyError::Internal(format!(
                "write to {key:?} without row lock"
            )))
        }
    }

    fn current_actor(&self, id: ActorId) -> Option<Actor> {
        self.actors
            .get(&id)
            .cloned()
            .or_else(|| self.tables.actors.get(&id))
    }

    fn current_stakes(&self, owner: ActorId) -> Vec<Stake> {
        self.stakes
            .get(&owner)
            .cloned()
            .or_else(|| self.tables.stakes.get(&owner))
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_actor(&mut self, id: ActorId) -> StoreResult<Option<Actor>> {
        let gate = self.tables.actors.gate(&id);
        self.hold(RowKey::Actor(id), gate).await;
        Ok(self.current_actor(id))
    }

    async fn lock_actor_by_wallet(&mut self, wallet: &str) -> StoreResult<Option<Actor>> {
        let wallet = normalize_wallet(wallet);
        let gate = self.tables.wallets.gate(&wallet);
        self.hold(RowKey::Wallet(wallet.clone()), gate).await;

        let pending = self
            .actors
            .values()
            .find(|a| a.wallet_address == wallet)
            .map(|a| a.id);
        match pending.or_else(|| self.tables.wallets.get(&wallet)) {
            Some(id) => self.lock_actor(id).await,
            None => Ok(None),
        }
    }

    async fn insert_actor(&mut self, actor: &Actor) -> StoreResult<()> {
        let taken = self.tables.actors.rows.contains_key(&actor.id)
            || self.actors.contains_key(&actor.id)
            || self
                .tables
                .wallets
                .get(&actor.wallet_address)
                .is_some_and(|id| id != actor.id)
            || self
                .actors
                .values()
                .any(|a| a.wallet_address == actor.wallet_address);
        if taken {
            return Err(EconomyError::DuplicateEvent);
        }
        self.actors.insert(actor.id, actor.clone());
        Ok(())
    }

    async fn update_actor(&mut self, actor: &Actor) -> StoreResult<()> {
        self.ensure_held(
            &RowKey::Actor(actor.id),
            self.actors.contains_key(&actor.id),
        )?;
        self.actors.insert(actor.id, actor.clone());
        Ok(())
    }

    async fn referrer_of(&mut self, id: ActorId) -> StoreResult<Option<ActorId>> {
        Ok(self.current_actor(id).and_then(|a| a.referrer_id))
    }

    async fn lock_inventory(&mut self, owner: ActorId) -> StoreResult<Option<Inventory>> {
        let gate = self.tables.inventories.gate(&owner);
        self.hold(RowKey::Inventory(owner), gate).await;
        Ok(self
            .inventories
            .get(&owner)
            .cloned()
            .or_else(|| self.tables.inventories.get(&owner)))
    }

    async fn insert_inventory(&mut self, inventory: &Inventory) -> StoreResult<()> {
        if self.tables.inventories.rows.contains_key(&inventory.owner)
            || self.inventories.contains_key(&inventory.owner)
        {
            return Err(EconomyError::DuplicateEvent);
        }
        self.inventories.insert(inventory.owner, inventory.clone());
        Ok(())
    }

    async fn update_inventory(&mut self, inventory: &Inventory) -> StoreResult<()> {
        self.ensure_held(
            &RowKey::Inventory(inventory.owner),
            self.inventories.contains_key(&inventory.owner),
        )?;
        self.inventories.insert(inventory.owner, inventory.clone());
        Ok(())
    }

    async fn lock_cow(&mut self, owner: ActorId, id: Uuid) -> StoreResult<Option<Cow>> {
        let gate = self.tables.cows.gate(&id);
        self.hold(RowKey::Cow(id), gate).await;
        let cow = self
            .cows
            .get(&id)
            .cloned()
            .or_else(|| self.tables.cows.get(&id));
        Ok(cow.filter(|c| c.owner == owner))
    }

    async fn lock_cows(&mut self, owner: ActorId) -> StoreResult<Vec<Cow>> {
        let mut ids: Vec<Uuid> = self
            .tables
            .cows
            .filter(|c| c.owner == owner)
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        for id in &ids {
            let gate = self.tables.cows.gate(id);
            self.hold(RowKey::Cow(*id), gate).await;
        }

        let mut cows: Vec<Cow> = ids
            .iter()
            .filter_map(|id| {
                self.cows
                    .get(id)
                    .cloned()
                    .or_else(|| self.tables.cows.get(id))
            })
            .collect();
        cows.extend(
            self.cows
                .values()
                .filter(|c| c.owner == owner && !ids.contains(&c.id))
                .cloned(),
        );
        cows.sort_by_key(|c| (c.created_at, c.id));
        Ok(cows)
    }

    async fn count_cows(&mut self, owner: ActorId) -> StoreResult<i64> {
        let committed = self.tables.cows.filter(|c| c.owner == owner);
        let added = self
            .cows
            .values()
            .filter(|c| c.owner == owner && !self.tables.cows.rows.contains_key(&c.id))
            .count();
        Ok((committed.len() + added) as i64)
    }

    async fn insert_cow(&mut self, cow: &Cow) -> StoreResult<()> {
        self.cows.insert(cow.id, cow.clone());
        Ok(())
    }

    async fn update_cow(&mut self, cow: &Cow) -> StoreResult<()> {
        self.ensure_held(&RowKey::Cow(cow.id), self.cows.contains_key(&cow.id))?;
        self.cows.insert(cow.id, cow.clone());
        Ok(())
    }

    async fn lock_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>> {
        let gate = self.tables.listings.gate(&id);
        self.hold(RowKey::Listing(id), gate).await;
        Ok(self
            .listings
            .get(&id)
            .cloned()
            .or_else(|| self.tables.listings.get(&id)))
    }

    async fn insert_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        self.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn update_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        self.ensure_held(
            &RowKey::Listing(listing.id),
            self.listings.contains_key(&listing.id),
        )?;
        self.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn lock_stakes(&mut self, owner: ActorId) -> StoreResult<Vec<Stake>> {
        let gate = self.tables.stakes.gate(&owner);
        self.hold(RowKey::Stakes(owner), gate).await;
        Ok(self.current_stakes(owner))
    }

    async fn insert_stake(&mut self, stake: &Stake) -> StoreResult<()> {
        self.ensure_held(&RowKey::Stakes(stake.owner), false)?;
        let mut stakes = self.current_stakes(stake.owner);
        if stakes.iter().any(|s| s.kind == stake.kind) {
            return Err(EconomyError::DuplicateEvent);
        }
        stakes.push(stake.clone());
        self.stakes.insert(stake.owner, stakes);
        Ok(())
    }

    async fn update_stake(&mut self, stake: &Stake) -> StoreResult<()> {
        self.ensure_held(&RowKey::Stakes(stake.owner), false)?;
        let mut stakes = self.current_stakes(stake.owner);
        let Some(slot) = stakes.iter_mut().find(|s| s.id == stake.id) else {
            return Err(EconomyError::not_found(format!("stake {}", stake.id)));
        };
        *slot = stake.clone();
        self.stakes.insert(stake.owner, stakes);
        Ok(())
    }

    async fn insert_ledger(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        if let Some(reference) = &entry.reference {
            if self.references.contains(reference) {
                return Err(EconomyError::DuplicateEvent);
            }
            let gate = self.tables.references.gate(reference);
            self.hold(RowKey::Reference(reference.clone()), gate).await;
            if self.tables.references.rows.contains_key(reference) {
                return Err(EconomyError::DuplicateEvent);
            }
            self.references.insert(reference.clone());
        }
        self.ledger.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        let MemoryTx {
            tables,
            commit_delay: _,
            held,
            actors,
            inventories,
            cows,
            listings,
            stakes,
            ledger,
            references: _,
        } = *self;

        for (id, actor) in actors {
            tables.wallets.rows.insert(actor.wallet_address.clone(), id);
            tables.actors.rows.insert(id, actor);
        }
        for (owner, inventory) in inventories {
            tables.inventories.rows.insert(owner, inventory);
        }
        for (id, cow) in cows {
            tables.cows.rows.insert(id, cow);
        }
        for (id, listing) in listings {
            tables.listings.rows.insert(id, listing);
        }
        for (owner, positions) in stakes {
            tables.stakes.rows.insert(owner, positions);
        }
        for entry in ledger {
            if let Some(reference) = &entry.reference {
                tables.references.rows.insert(reference.clone(), entry.id);
            }
            let seq = tables.ledger_seq.fetch_add(1, Ordering::SeqCst);
            tables.ledger.insert(seq, entry);
        }

        // publish before letting waiters in
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
