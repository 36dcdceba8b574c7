//! Market Service
//!
//! P2P listings (escrowed out of the seller's inventory on creation), the
//! gold shop, gold → token swaps and platform sales with the 70/20/10
//! revenue split and referral roll-up.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::timeout_at;
use tracing::info;
use uuid::Uuid;

use super::EngineContext;
use crate::balance::BalanceMutator;
use crate::config::EconomyConfig;
use crate::domain::money::{BALANCE_DP, require_positive, to_balance_scale};
use crate::domain::{
    ActorId, Cow, CowKind, Currency, LedgerCategory, LedgerEntry, LedgerUnit,
    Listing, ListingStatus, Resource,
};
use crate::error::EconomyError;
use crate::lock::OpClass;
use crate::referral::RollUpResolver;
use crate::store::{StoreTx, lock_actor, lock_or_create_inventory, save_inventory};
use crate::trade::{PairwiseTradeResolver, TradeReceipt};

/// Upper bound on assets minted by a single purchase
pub const MAX_PURCHASE_QUANTITY: i64 = 100;

/// Items sold for gold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoldShopItem {
    Grass,
    BabyCow,
    Cow,
    Land,
    /// Counts as daily care for standard cows
    Vitamin,
}

impl GoldShopItem {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoldShopItem::Grass => "GRASS",
            GoldShopItem::BabyCow => "BABY_COW",
            GoldShopItem::Cow => "COW",
            GoldShopItem::Land => "LAND",
            GoldShopItem::Vitamin => "VITAMIN",
        }
    }

    pub fn unit_price(&self, economy: &EconomyConfig) -> Decimal {
        let catalog = &economy.gold_catalog;
        match self {
            GoldShopItem::Grass => catalog.grass,
            GoldShopItem::BabyCow => catalog.baby_cow,
            GoldShopItem::Cow => catalog.cow,
            GoldShopItem::Land => catalog.land,
            GoldShopItem::Vitamin => catalog.vitamin,
        }
    }
}

impl FromStr for GoldShopItem {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRASS" => Ok(GoldShopItem::Grass),
            "BABY_COW" => Ok(GoldShopItem::BabyCow),
            "COW" => Ok(GoldShopItem::Cow),
            "LAND" => Ok(GoldShopItem::Land),
            "VITAMIN" => Ok(GoldShopItem::Vitamin),
            other => Err(EconomyError::validation(format!("unknown shop item: {other}"))),
        }
    }
}

/// Items sold by the platform for USDT or COW tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformItem {
    Cow,
    Grass,
}

impl PlatformItem {
    pub fn unit_price(&self, economy: &EconomyConfig) -> Decimal {
        match self {
            PlatformItem::Cow => economy.platform_catalog.cow,
            PlatformItem::Grass => economy.platform_catalog.grass,
        }
    }
}

impl FromStr for PlatformItem {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COW" => Ok(PlatformItem::Cow),
            "GRASS" => Ok(PlatformItem::Grass),
            other => Err(EconomyError::validation(format!("unknown platform item: {other}"))),
        }
    }
}

/// Where a platform payment went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformReceipt {
    pub currency: Currency,
    pub paid: Decimal,
    pub lp: Decimal,
    pub referral: Decimal,
    pub dev: Decimal,
    /// `None` when the referral share rolled up to the treasury
    pub upline: Option<ActorId>,
}

pub struct MarketService {
    ctx: Arc<EngineContext>,
}

impl MarketService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    // ============================================================
    // P2P LISTINGS
    // ============================================================

    pub async fn create_listing(
        &self,
        seller: ActorId,
        item: Resource,
        quantity: i64,
        price: Decimal,
    ) -> Result<Listing, EconomyError> {
        if quantity <= 0 {
            return Err(EconomyError::validation("quantity must be greater than zero"));
        }
        let eco = &self.ctx.economy;
        if price < eco.min_listing_price || price > eco.max_listing_price {
            return Err(EconomyError::validation(format!(
                "price must be between {} and {} USDT",
                eco.min_listing_price, eco.max_listing_price
            )));
        }
        // prices settle against 2 dp balances
        require_positive(price, BALANCE_DP)?;

        let ctx = &self.ctx;
        ctx.guarded(OpClass::MarketSell, seller, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::create_listing_in_tx(tx.store(), seller, item, quantity, price, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn create_listing_in_tx(
        tx: &mut dyn StoreTx,
        seller: ActorId,
        item: Resource,
        quantity: i64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Listing, EconomyError> {
        let mut inventory = tx
            .lock_inventory(seller)
            .await?
            .ok_or_else(|| EconomyError::not_found("inventory"))?;
        BalanceMutator::adjust_resource(&mut inventory, item, -quantity)?;
        tx.update_inventory(&inventory).await?;

        let listing = Listing::open(seller, item, quantity, price, now);
        tx.insert_listing(&listing).await?;

        let entry = LedgerEntry::new(seller, LedgerCategory::MarketSell, price, Currency::Usdt, now)
            .with_reference(format!("sell:{}", listing.id));
        tx.insert_ledger(&entry).await?;

        info!(listing = %listing.id, actor = %seller, item = %item, quantity, price = %price, "Listing created");
        Ok(listing)
    }

    pub async fn buy_listing(
        &self,
        buyer: ActorId,
        listing_id: Uuid,
    ) -> Result<TradeReceipt, EconomyError> {
        let ctx = &self.ctx;
        ctx.guarded(OpClass::MarketBuy, buyer, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                PairwiseTradeResolver::execute(tx.store(), buyer, listing_id, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    /// Seller withdraws an open listing; the escrowed goods come back
    pub async fn cancel_listing(
        &self,
        seller: ActorId,
        listing_id: Uuid,
    ) -> Result<Listing, EconomyError> {
        let ctx = &self.ctx;
        ctx.guarded(OpClass::MarketCancel, seller, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::cancel_listing_in_tx(tx.store(), seller, listing_id, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn cancel_listing_in_tx(
        tx: &mut dyn StoreTx,
        seller: ActorId,
        listing_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Listing, EconomyError> {
        let mut listing = tx
            .lock_listing(listing_id)
            .await?
            .ok_or_else(|| EconomyError::not_found(format!("listing {listing_id}")))?;
        if listing.seller != seller {
            return Err(EconomyError::invalid_state("only the seller can cancel a listing"));
        }
        listing.status = listing.status.transition(ListingStatus::Cancelled)?;

        let mut inventory = lock_or_create_inventory(tx, seller).await?;
        BalanceMutator::adjust_resource(&mut inventory, listing.item, listing.quantity)?;
        save_inventory(tx, &inventory).await?;
        tx.update_listing(&listing).await?;

        let entry = LedgerEntry::new(
            seller,
            LedgerCategory::MarketCancel,
            Decimal::from(listing.quantity),
            listing.item,
            now,
        )
        .with_reference(format!("cancel:{listing_id}"));
        tx.insert_ledger(&entry).await?;

        info!(listing = %listing_id, actor = %seller, "Listing cancelled");
        Ok(listing)
    }

    pub async fn open_listings(&self) -> Result<Vec<Listing>, EconomyError> {
        self.ctx.store.open_listings().await
    }

    // ============================================================
    // GOLD ECONOMY
    // ============================================================

    /// Returns the gold credited
    pub async fn sell_milk_for_gold(
        &self,
        actor: ActorId,
        quantity: i64,
    ) -> Result<Decimal, EconomyError> {
        if quantity <= 0 {
            return Err(EconomyError::validation("quantity must be greater than zero"));
        }
        let ctx = &self.ctx;
        ctx.guarded(OpClass::GoldExchange, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::sell_milk_in_tx(tx.store(), &ctx.economy, actor, quantity, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn sell_milk_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        actor_id: ActorId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EconomyError> {
        let mut actor = lock_actor(tx, actor_id).await?;
        let mut inventory = tx
            .lock_inventory(actor_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("inventory"))?;

        BalanceMutator::adjust_resource(&mut inventory, Resource::Milk, -quantity)?;
        let gold = BalanceMutator::credit(
            &mut actor,
            Currency::Gold,
            economy.milk_gold_price * Decimal::from(quantity),
        )?;
        actor.updated_at = now;
        tx.update_actor(&actor).await?;
        tx.update_inventory(&inventory).await?;

        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::SellMilkGold, gold, Currency::Gold, now))
            .await?;
        tx.insert_ledger(&LedgerEntry::new(
            actor_id,
            LedgerCategory::SellMilkGold,
            Decimal::from(quantity),
            Resource::Milk,
            now,
        ))
        .await?;

        info!(actor = %actor_id, milk = quantity, gold = %gold, "Milk sold for gold");
        Ok(gold)
    }

    /// Returns the gold spent
    pub async fn buy_with_gold(
        &self,
        actor: ActorId,
        item: GoldShopItem,
        quantity: i64,
    ) -> Result<Decimal, EconomyError> {
        if quantity <= 0 || quantity > MAX_PURCHASE_QUANTITY {
            return Err(EconomyError::validation(format!(
                "quantity must be between 1 and {MAX_PURCHASE_QUANTITY}"
            )));
        }
        let ctx = &self.ctx;
        ctx.guarded(OpClass::GoldExchange, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::buy_with_gold_in_tx(tx.store(), &ctx.economy, actor, item, quantity, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn buy_with_gold_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        actor_id: ActorId,
        item: GoldShopItem,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EconomyError> {
        let total = item
            .unit_price(economy)
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| EconomyError::validation("price overflow"))?;

        let mut actor = lock_actor(tx, actor_id).await?;
        let spent = BalanceMutator::debit(&mut actor, Currency::Gold, total)?;
        if item == GoldShopItem::Vitamin {
            actor.last_ad_watched_at = Some(now);
        }
        actor.updated_at = now;
        tx.update_actor(&actor).await?;

        let delivered = match item {
            GoldShopItem::Grass => {
                let mut inventory = lock_or_create_inventory(tx, actor_id).await?;
                BalanceMutator::adjust_resource(&mut inventory, Resource::Grass, quantity)?;
                save_inventory(tx, &inventory).await?;
                Some(LedgerUnit::from(Resource::Grass))
            }
            GoldShopItem::Land => {
                let mut inventory = lock_or_create_inventory(tx, actor_id).await?;
                BalanceMutator::add_land_slots(&mut inventory, quantity)?;
                save_inventory(tx, &inventory).await?;
                Some(LedgerUnit::LandSlot)
            }
            GoldShopItem::BabyCow | GoldShopItem::Cow => {
                mint_cows(tx, actor_id, quantity, economy.cow_lifespan_months, now).await?;
                Some(LedgerUnit::Cow)
            }
            GoldShopItem::Vitamin => None,
        };

        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::BuyItemGold, spent, Currency::Gold, now))
            .await?;
        if let Some(unit) = delivered {
            tx.insert_ledger(&LedgerEntry::new(
                actor_id,
                LedgerCategory::BuyItemGold,
                Decimal::from(quantity),
                unit,
                now,
            ))
            .await?;
        }

        info!(actor = %actor_id, item = item.as_str(), quantity, gold = %spent, "Gold shop purchase");
        Ok(spent)
    }

    /// Convert gold into COW tokens or USDT; returns the amount credited
    pub async fn swap_gold(
        &self,
        actor: ActorId,
        gold: Decimal,
        target: Currency,
    ) -> Result<Decimal, EconomyError> {
        let gold = require_positive(gold, BALANCE_DP)?;
        let rate = match target {
            Currency::Token => self.ctx.economy.gold_per_token,
            Currency::Usdt => self.ctx.economy.gold_per_usdt,
            Currency::Gold => return Err(EconomyError::validation("cannot swap gold into gold")),
        };
        let credited = to_balance_scale(gold / rate);
        if credited.is_zero() {
            return Err(EconomyError::validation(format!(
                "at least {rate} gold is needed per 1 {target}, minimum swap is 0.01"
            )));
        }

        let ctx = &self.ctx;
        ctx.guarded(OpClass::GoldExchange, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::swap_gold_in_tx(tx.store(), actor, gold, credited, target, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn swap_gold_in_tx(
        tx: &mut dyn StoreTx,
        actor_id: ActorId,
        gold: Decimal,
        credited: Decimal,
        target: Currency,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EconomyError> {
        let mut actor = lock_actor(tx, actor_id).await?;
        let spent = BalanceMutator::debit(&mut actor, Currency::Gold, gold)?;
        let credited = BalanceMutator::credit(&mut actor, target, credited)?;
        actor.updated_at = now;
        tx.update_actor(&actor).await?;

        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::GoldSwap, spent, Currency::Gold, now))
            .await?;
        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::GoldSwap, credited, target, now))
            .await?;

        info!(actor = %actor_id, gold = %spent, target = %target, credited = %credited, "Gold swapped");
        Ok(credited)
    }

    // ============================================================
    // PLATFORM SALES
    // ============================================================

    pub async fn buy_from_platform(
        &self,
        buyer: ActorId,
        item: PlatformItem,
        quantity: i64,
        currency: Currency,
    ) -> Result<PlatformReceipt, EconomyError> {
        if currency == Currency::Gold {
            return Err(EconomyError::validation("platform items are paid in USDT or COW"));
        }
        if quantity <= 0 || quantity > MAX_PURCHASE_QUANTITY {
            return Err(EconomyError::validation(format!(
                "quantity must be between 1 and {MAX_PURCHASE_QUANTITY}"
            )));
        }
        let ctx = &self.ctx;
        ctx.guarded(OpClass::PlatformBuy, buyer, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::platform_buy_in_tx(tx.store(), &ctx.economy, buyer, item, quantity, currency, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn platform_buy_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        buyer_id: ActorId,
        item: PlatformItem,
        quantity: i64,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<PlatformReceipt, EconomyError> {
        let price = item
            .unit_price(economy)
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| EconomyError::validation("price overflow"))?;

        // referral graph reads are non-locking, so resolve before taking row locks
        let upline = RollUpResolver::resolve(tx, buyer_id, economy.referral_max_depth)
            .await?
            .filter(|id| *id != buyer_id);

        let (mut buyer, mut upline_actor) = match upline {
            Some(upline_id) => {
                let (buyer, upline) = PairwiseTradeResolver::lock_parties(tx, buyer_id, upline_id).await?;
                (buyer, Some(upline))
            }
            None => (lock_actor(tx, buyer_id).await?, None),
        };

        let paid = BalanceMutator::debit(&mut buyer, currency, price)?;
        buyer.updated_at = now;
        tx.update_actor(&buyer).await?;

        match item {
            PlatformItem::Cow => {
                mint_cows(tx, buyer_id, quantity, economy.cow_lifespan_months, now).await?;
            }
            PlatformItem::Grass => {
                let mut inventory = lock_or_create_inventory(tx, buyer_id).await?;
                BalanceMutator::adjust_resource(&mut inventory, Resource::Grass, quantity)?;
                save_inventory(tx, &inventory).await?;
            }
        }

        // 70 / 20 / 10, rounding remainder goes to the dev treasury
        let lp = to_balance_scale(paid * economy.lp_share);
        let referral = to_balance_scale(paid * economy.referral_share);
        let dev = paid - lp - referral;

        tx.insert_ledger(&LedgerEntry::new(buyer_id, LedgerCategory::PlatformBuy, paid, currency, now))
            .await?;
        tx.insert_ledger(&LedgerEntry::new(buyer_id, LedgerCategory::TreasuryLpBuyback, lp, currency, now))
            .await?;
        tx.insert_ledger(&LedgerEntry::new(buyer_id, LedgerCategory::TreasuryDevFee, dev, currency, now))
            .await?;

        match upline_actor.as_mut() {
            Some(upline) => {
                let bonus = BalanceMutator::credit(upline, currency, referral)?;
                upline.updated_at = now;
                tx.update_actor(upline).await?;
                tx.insert_ledger(&LedgerEntry::new(upline.id, LedgerCategory::ReferralBonus, bonus, currency, now))
                    .await?;
            }
            None => {
                tx.insert_ledger(&LedgerEntry::new(
                    buyer_id,
                    LedgerCategory::TreasuryReferral,
                    referral,
                    currency,
                    now,
                ))
                .await?;
            }
        }

        info!(
            actor = %buyer_id,
            item = ?item,
            quantity,
            paid = %paid,
            currency = %currency,
            upline = ?upline,
            "Platform purchase"
        );

        Ok(PlatformReceipt {
            currency,
            paid,
            lp,
            referral,
            dev,
            upline,
        })
    }
}

// ============================================================
// MINTING
// ============================================================

pub(crate) async fn mint_cows(
    tx: &mut dyn StoreTx,
    owner: ActorId,
    quantity: i64,
    lifespan_months: u32,
    now: DateTime<Utc>,
) -> Result<(), EconomyError> {
    for _ in 0..quantity {
        tx.insert_cow(&Cow::new(owner, CowKind::Standard, lifespan_months, now))
            .await?;
    }
    Ok(())
}
