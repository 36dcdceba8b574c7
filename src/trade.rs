//! Pairwise Trade Resolver
//!
//! Settles one marketplace purchase inside the caller's transaction:
//!
//! ```text
//! 1. lock listing            → must exist and be OPEN
//! 2. buyer != seller
//! 3. lock buyer + seller     → canonical ActorId order (no A↔B deadlock)
//! 4. buyer.usdt >= price
//! 5. debit buyer, credit seller, credit buyer inventory (created on first
//!    use), listing → SOLD, one MARKET_BUY ledger entry keyed `buy:<listing>`
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::balance::BalanceMutator;
use crate::domain::{
    Actor, ActorId, Currency, LedgerCategory, LedgerEntry, ListingStatus, Resource, canonical_pair,
};
use crate::error::EconomyError;
use crate::store::{StoreTx, lock_or_create_inventory, save_inventory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
    pub listing_id: Uuid,
    pub buyer: ActorId,
    pub seller: ActorId,
    pub item: Resource,
    pub quantity: i64,
    pub price: Decimal,
}

pub struct PairwiseTradeResolver;

impl PairwiseTradeResolver {
    pub async fn execute(
        tx: &mut dyn StoreTx,
        buyer_id: ActorId,
        listing_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TradeReceipt, EconomyError> {
        // 1. listing row first
        let mut listing = tx
            .lock_listing(listing_id)
            .await?
            .ok_or_else(|| EconomyError::not_found(format!("listing {listing_id}")))?;
        listing.ensure_open()?;

        // 2.
        if listing.seller == buyer_id {
            return Err(EconomyError::invalid_state("cannot buy your own listing"));
        }

        // 3.
        let (mut buyer, mut seller) = Self::lock_parties(tx, buyer_id, listing.seller).await?;

        // 4.
        if buyer.usdt_balance < listing.price {
            return Err(EconomyError::InsufficientBalance);
        }

        // 5.
        let paid = BalanceMutator::debit(&mut buyer, Currency::Usdt, listing.price)?;
        BalanceMutator::credit(&mut seller, Currency::Usdt, paid)?;
        buyer.updated_at = now;
        seller.updated_at = now;
        tx.update_actor(&buyer).await?;
        tx.update_actor(&seller).await?;

        let mut inventory = lock_or_create_inventory(tx, buyer_id).await?;
        BalanceMutator::adjust_resource(&mut inventory, listing.item, listing.quantity)?;
        save_inventory(tx, &inventory).await?;

        listing.status = listing.status.transition(ListingStatus::Sold)?;
        tx.update_listing(&listing).await?;

        let entry = LedgerEntry::new(buyer_id, LedgerCategory::MarketBuy, paid, Currency::Usdt, now)
            .with_reference(format!("buy:{listing_id}"));
        tx.insert_ledger(&entry).await?;

        info!(
            listing = %listing_id,
            buyer = %buyer_id,
            seller = %listing.seller,
            price = %paid,
            "Listing sold"
        );

        Ok(TradeReceipt {
            listing_id,
            buyer: buyer_id,
            seller: listing.seller,
            item: listing.item,
            quantity: listing.quantity,
            price: paid,
        })
    }

    /// Lock two distinct actors in canonical order; returns (a, b) in call order
    pub async fn lock_parties(
        tx: &mut dyn StoreTx,
        a: ActorId,
        b: ActorId,
    ) -> Result<(Actor, Actor), EconomyError> {
        let (first_id, second_id) = canonical_pair(a, b);
        let first = tx
            .lock_actor(first_id)
            .await?
            .ok_or_else(|| EconomyError::not_found(format!("actor {first_id}")))?;
        let second = tx
            .lock_actor(second_id)
            .await?
            .ok_or_else(|| EconomyError::not_found(format!("actor {second_id}")))?;

        if first.id == a {
            Ok((first, second))
        } else {
            Ok((second, first))
        }
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::domain::Listing;
    use crate::store::{MemoryStore, Store};
    use std::time::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn fixture(store: &MemoryStore, usdt: &str) -> Actor {
        let mut actor = Actor::new(&format!("0x{}", Uuid::new_v4().simple()), None, Utc::now());
        actor.usdt_balance = dec(usdt);
        store.put_actor(actor.clone());
        actor
    }

    async fn buy(store: &MemoryStore, buyer: ActorId, listing: Uuid) -> Result<TradeReceipt, EconomyError> {
        let mut tx = store.begin(Duration::from_secs(4)).await?;
        match PairwiseTradeResolver::execute(tx.as_mut(), buyer, listing, Utc::now()).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    #[tokio::test]
    async fn test_buy_moves_funds_and_goods() {
        let store = MemoryStore::new();
        let buyer = fixture(&store, "100");
        let seller = fixture(&store, "100");
        let listing = Listing::open(seller.id, Resource::Grass, 5, dec("40"), Utc::now());
        store.put_listing(listing.clone());

        let receipt = buy(&store, buyer.id, listing.id).await.unwrap();
        assert_eq!(receipt.price, dec("40"));

        let buyer_after = store.actor(buyer.id).await.unwrap().unwrap();
        let seller_after = store.actor(seller.id).await.unwrap().unwrap();
        assert_eq!(buyer_after.usdt_balance, dec("60"));
        assert_eq!(seller_after.usdt_balance, dec("140"));

        // inventory created on first purchase
        let inventory = store.inventory(buyer.id).await.unwrap().unwrap();
        assert_eq!(inventory.grass, 5);

        let sold = store.listing(listing.id).await.unwrap().unwrap();
        assert_eq!(sold.status, ListingStatus::Sold);

        let ledger = store.ledger(buyer.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].category, LedgerCategory::MarketBuy);
        assert_eq!(ledger[0].amount, dec("40"));
        assert_eq!(ledger[0].reference, Some(format!("buy:{}", listing.id)));
    }

    #[tokio::test]
    async fn test_buy_adds_to_existing_inventory() {
        let store = MemoryStore::new();
        let buyer = fixture(&store, "100");
        let seller = fixture(&store, "0");
        let mut held = crate::domain::Inventory::empty(buyer.id);
        held.milk = 4;
        held.grass = 2;
        store.put_inventory(held);
        let listing = Listing::open(seller.id, Resource::Milk, 3, dec("9"), Utc::now());
        store.put_listing(listing.clone());

        buy(&store, buyer.id, listing.id).await.unwrap();

        let inventory = store.inventory(buyer.id).await.unwrap().unwrap();
        assert_eq!((inventory.milk, inventory.grass), (7, 2));
    }

    #[tokio::test]
    async fn test_rebuy_is_invalid_state() {
        let store = MemoryStore::new();
        let buyer = fixture(&store, "100");
        let seller = fixture(&store, "0");
        let listing = Listing::open(seller.id, Resource::Milk, 1, dec("10"), Utc::now());
        store.put_listing(listing.clone());

        buy(&store, buyer.id, listing.id).await.unwrap();
        let err = buy(&store, buyer.id, listing.id).await.unwrap_err();
        assert!(matches!(err, EconomyError::InvalidState(_)));
        assert_eq!(
            store.actor(buyer.id).await.unwrap().unwrap().usdt_balance,
            dec("90")
        );
    }

    #[tokio::test]
    async fn test_self_trade_and_missing_listing() {
        let store = MemoryStore::new();
        let seller = fixture(&store, "100");
        let listing = Listing::open(seller.id, Resource::Grass, 1, dec("1"), Utc::now());
        store.put_listing(listing.clone());

        let err = buy(&store, seller.id, listing.id).await.unwrap_err();
        assert!(matches!(err, EconomyError::InvalidState(_)));

        let err = buy(&store, seller.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EconomyError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_insufficient_balance_changes_nothing() {
        let store = MemoryStore::new();
        let buyer = fixture(&store, "39.99");
        let seller = fixture(&store, "0");
        let listing = Listing::open(seller.id, Resource::Grass, 5, dec("40"), Utc::now());
        store.put_listing(listing.clone());

        let err = buy(&store, buyer.id, listing.id).await.unwrap_err();
        assert_eq!(err, EconomyError::InsufficientBalance);
        assert_eq!(
            store.listing(listing.id).await.unwrap().unwrap().status,
            ListingStatus::Open
        );
        assert!(store.inventory(buyer.id).await.unwrap().is_none());
        assert_eq!(store.ledger_len(), 0);
    }

    #[tokio::test]
    async fn test_lock_parties_preserves_call_order() {
        let store = MemoryStore::new();
        let a = fixture(&store, "1");
        let b = fixture(&store, "2");

        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();
        let (x, y) = PairwiseTradeResolver::lock_parties(tx.as_mut(), a.id, b.id)
            .await
            .unwrap();
        assert_eq!((x.id, y.id), (a.id, b.id));
        tx.rollback().await.unwrap();

        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();
        let (x, y) = PairwiseTradeResolver::lock_parties(tx.as_mut(), b.id, a.id)
            .await
            .unwrap();
        assert_eq!((x.id, y.id), (b.id, a.id));
    }
}
