//! End-to-end service tests against `MemoryStore`

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use super::*;
use crate::auth::signature::wallet_sign;
use crate::clock::ManualClock;
use crate::config::StorageBackend;
use crate::domain::{
    Actor, ActorId, Cow, CowKind, Currency, GrantItem, Inventory, LedgerCategory, LedgerUnit,
    Listing, ListingStatus, Resource, Role, StakeKind,
};
use crate::lock::MemoryLockService;
use crate::store::{MemoryStore, Store};

const SECRET: &str = "test-ad-secret";
const ROOT: &str = "0x00000000000000000000000000000000000000aa";

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

struct Harness {
    economy: Economy,
    store: MemoryStore,
    locks: Arc<MemoryLockService>,
    clock: Arc<ManualClock>,
    callbacks: CallbackValidator,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let locks = Arc::new(MemoryLockService::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()));
        let config = AppConfig {
            storage: StorageBackend::Memory,
            ..AppConfig::default()
        };
        let ctx = EngineContext::new(Arc::new(store.clone()), locks.clone(), clock.clone(), &config).unwrap();
        let callbacks = CallbackValidator::new(SECRET).unwrap();
        let economy = Economy::new(
            Arc::new(ctx),
            Arc::new(EthSignatureVerifier),
            Some(callbacks.clone()),
            Some(ROOT.to_string()),
        );
        Self {
            economy,
            store,
            locks,
            clock,
            callbacks,
        }
    }

    /// Registered actor with the given USDT and gold, starter inventory
    fn actor(&self, wallet: &str, usdt: &str, gold: &str) -> Actor {
        let mut actor = Actor::new(wallet, None, self.clock.now());
        actor.usdt_balance = dec(usdt);
        actor.gold_balance = dec(gold);
        self.store.put_actor(actor.clone());
        self.store.put_inventory(Inventory::starter(actor.id));
        actor
    }

    fn inventory(&self, owner: ActorId, grass: i64, milk: i64) {
        let mut inventory = Inventory::starter(owner);
        inventory.grass = grass;
        inventory.milk = milk;
        self.store.put_inventory(inventory);
    }

    fn cow(&self, owner: ActorId, happiness: i32) -> Cow {
        let mut cow = Cow::new(owner, CowKind::Standard, 3, self.clock.now());
        cow.happiness = happiness;
        self.store.put_cow(cow.clone());
        cow
    }

    async fn fetch(&self, id: ActorId) -> Actor {
        self.store.actor(id).await.unwrap().unwrap()
    }

    async fn inv(&self, id: ActorId) -> Inventory {
        self.store.inventory(id).await.unwrap().unwrap()
    }

    async fn categories(&self, id: ActorId) -> Vec<LedgerCategory> {
        self.store
            .ledger(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.category)
            .collect()
    }

    fn callback(&self, user: ActorId, event: &str) -> AdCallback {
        let raw = format!(r#"{{"user_id":"{user}","event_id":"{event}"}}"#).into_bytes();
        AdCallback {
            signature: self.callbacks.sign(&raw),
            raw,
            user_id: user.to_string(),
            event_id: event.to_string(),
        }
    }
}

// ============================================================
// MARKET
// ============================================================

#[tokio::test]
async fn test_buy_then_rebuy_scenario() {
    let h = Harness::new();
    let seller = h.actor("0xseller", "100", "0");
    let buyer = h.actor("0xbuyer", "100", "0");
    h.inventory(seller.id, 5, 0);

    let listing = h
        .economy
        .market
        .create_listing(seller.id, Resource::Grass, 5, dec("40"))
        .await
        .unwrap();
    assert_eq!(h.inv(seller.id).await.grass, 0);

    let receipt = h.economy.market.buy_listing(buyer.id, listing.id).await.unwrap();
    assert_eq!(receipt.price, dec("40"));
    assert_eq!(h.fetch(buyer.id).await.usdt_balance, dec("60"));
    assert_eq!(h.fetch(seller.id).await.usdt_balance, dec("140"));
    assert_eq!(h.inv(buyer.id).await.grass, 5);

    let again = h.economy.market.buy_listing(buyer.id, listing.id).await;
    assert!(matches!(again, Err(EconomyError::InvalidState(_))));
    assert_eq!(h.fetch(buyer.id).await.usdt_balance, dec("60"));
    assert_eq!(h.categories(buyer.id).await, vec![LedgerCategory::MarketBuy]);
    assert_eq!(h.locks.held_count(), 0);
}

#[tokio::test]
async fn test_listing_escrow_and_cancel() {
    let h = Harness::new();
    let seller = h.actor("0xseller", "0", "0");
    let other = h.actor("0xother", "0", "0");
    h.inventory(seller.id, 0, 8);

    let listing = h
        .economy
        .market
        .create_listing(seller.id, Resource::Milk, 6, dec("12.5"))
        .await
        .unwrap();
    assert_eq!(h.inv(seller.id).await.milk, 2);
    assert_eq!(h.economy.market.open_listings().await.unwrap().len(), 1);

    let denied = h.economy.market.cancel_listing(other.id, listing.id).await;
    assert!(matches!(denied, Err(EconomyError::InvalidState(_))));

    let cancelled = h.economy.market.cancel_listing(seller.id, listing.id).await.unwrap();
    assert_eq!(cancelled.status, ListingStatus::Cancelled);
    assert_eq!(h.inv(seller.id).await.milk, 8);
    assert!(h.economy.market.open_listings().await.unwrap().is_empty());

    // terminal
    let twice = h.economy.market.cancel_listing(seller.id, listing.id).await;
    assert!(matches!(twice, Err(EconomyError::InvalidState(_))));
}

#[tokio::test]
async fn test_create_listing_validation() {
    let h = Harness::new();
    let seller = h.actor("0xseller", "0", "0");
    h.inventory(seller.id, 3, 0);
    let market = &h.economy.market;

    let short = market.create_listing(seller.id, Resource::Grass, 4, dec("1")).await;
    assert_eq!(short, Err(EconomyError::InsufficientBalance));
    assert_eq!(h.inv(seller.id).await.grass, 3);

    let zero_qty = market.create_listing(seller.id, Resource::Grass, 0, dec("1")).await;
    assert!(matches!(zero_qty, Err(EconomyError::ValidationError(_))));

    let too_cheap = market.create_listing(seller.id, Resource::Grass, 1, dec("0.001")).await;
    assert!(matches!(too_cheap, Err(EconomyError::ValidationError(_))));

    let too_dear = market.create_listing(seller.id, Resource::Grass, 1, dec("10000.01")).await;
    assert!(matches!(too_dear, Err(EconomyError::ValidationError(_))));

    let sub_cent = market.create_listing(seller.id, Resource::Grass, 1, dec("1.005")).await;
    assert!(matches!(sub_cent, Err(EconomyError::ValidationError(_))));
}

#[tokio::test]
async fn test_buy_unaffordable_listing_changes_nothing() {
    let h = Harness::new();
    let seller = h.actor("0xseller", "0", "0");
    let buyer = h.actor("0xbuyer", "10", "0");
    let listing = Listing::open(seller.id, Resource::Grass, 2, dec("10.01"), h.clock.now());
    h.store.put_listing(listing.clone());

    let result = h.economy.market.buy_listing(buyer.id, listing.id).await;
    assert_eq!(result, Err(EconomyError::InsufficientBalance));
    assert_eq!(h.fetch(buyer.id).await.usdt_balance, dec("10"));
    assert_eq!(h.store.listing(listing.id).await.unwrap().unwrap().status, ListingStatus::Open);
    assert_eq!(h.store.ledger_len(), 0);
}

#[tokio::test]
async fn test_gold_economy() {
    let h = Harness::new();
    let farmer = h.actor("0xfarmer", "0", "0");
    h.inventory(farmer.id, 0, 10);
    let market = &h.economy.market;

    assert_eq!(market.sell_milk_for_gold(farmer.id, 4).await, Ok(dec("20")));
    assert_eq!(h.inv(farmer.id).await.milk, 6);
    assert_eq!(
        market.sell_milk_for_gold(farmer.id, 7).await,
        Err(EconomyError::InsufficientBalance)
    );

    assert_eq!(market.buy_with_gold(farmer.id, GoldShopItem::Grass, 2).await, Ok(dec("20")));
    let after = h.fetch(farmer.id).await;
    assert_eq!(after.gold_balance, Decimal::ZERO);
    assert_eq!(h.inv(farmer.id).await.grass, 2);

    assert_eq!(
        market.buy_with_gold(farmer.id, GoldShopItem::Vitamin, 1).await,
        Err(EconomyError::InsufficientBalance)
    );
    assert!(h.fetch(farmer.id).await.last_ad_watched_at.is_none());
}

#[tokio::test]
async fn test_gold_shop_cows_and_vitamin() {
    let h = Harness::new();
    let farmer = h.actor("0xfarmer", "0", "5000");
    let market = &h.economy.market;

    market.buy_with_gold(farmer.id, GoldShopItem::BabyCow, 2).await.unwrap();
    market.buy_with_gold(farmer.id, GoldShopItem::Land, 1).await.unwrap();
    market.buy_with_gold(farmer.id, GoldShopItem::Vitamin, 1).await.unwrap();

    let cows = h.store.cows(farmer.id).await.unwrap();
    assert_eq!(cows.len(), 2);
    assert!(cows.iter().all(|c| c.kind == CowKind::Standard));
    assert_eq!(h.inv(farmer.id).await.land_slots, 2);

    let after = h.fetch(farmer.id).await;
    assert_eq!(after.gold_balance, dec("2950"));
    assert_eq!(after.last_ad_watched_at, Some(h.clock.now()));

    let too_many = market.buy_with_gold(farmer.id, GoldShopItem::Grass, 101).await;
    assert!(matches!(too_many, Err(EconomyError::ValidationError(_))));
}

#[tokio::test]
async fn test_swap_gold() {
    let h = Harness::new();
    let actor = h.actor("0xswap", "0", "250");
    let market = &h.economy.market;

    assert_eq!(market.swap_gold(actor.id, dec("250"), Currency::Token).await, Ok(dec("2.5")));
    let after = h.fetch(actor.id).await;
    assert_eq!(after.gold_balance, Decimal::ZERO);
    assert_eq!(after.token_balance, dec("2.5"));

    // 50 gold is 0.005 USDT, below one cent
    let dust = market.swap_gold(actor.id, dec("50"), Currency::Usdt).await;
    assert!(matches!(dust, Err(EconomyError::ValidationError(_))));

    let gold = market.swap_gold(actor.id, dec("1"), Currency::Gold).await;
    assert!(matches!(gold, Err(EconomyError::ValidationError(_))));
}

#[tokio::test]
async fn test_platform_buy_pays_eligible_upline() {
    let h = Harness::new();
    let grandparent = h.actor("0xgrand", "0", "0");
    h.cow(grandparent.id, 100);
    let mut parent = Actor::new("0xparent", Some(grandparent.id), h.clock.now());
    parent.usdt_balance = Decimal::ZERO;
    h.store.put_actor(parent.clone());
    let mut buyer = Actor::new("0xbuyer", Some(parent.id), h.clock.now());
    buyer.usdt_balance = dec("25");
    h.store.put_actor(buyer.clone());

    let receipt = h
        .economy
        .market
        .buy_from_platform(buyer.id, PlatformItem::Cow, 2, Currency::Usdt)
        .await
        .unwrap();

    assert_eq!(receipt.paid, dec("20"));
    assert_eq!(receipt.lp, dec("14"));
    assert_eq!(receipt.referral, dec("4"));
    assert_eq!(receipt.dev, dec("2"));
    // parent owns no cow, so the share rolls up
    assert_eq!(receipt.upline, Some(grandparent.id));

    assert_eq!(h.fetch(buyer.id).await.usdt_balance, dec("5"));
    assert_eq!(h.fetch(grandparent.id).await.usdt_balance, dec("4"));
    assert_eq!(h.fetch(parent.id).await.usdt_balance, Decimal::ZERO);
    assert_eq!(h.store.cows(buyer.id).await.unwrap().len(), 2);
    assert_eq!(h.categories(grandparent.id).await, vec![LedgerCategory::ReferralBonus]);
}

#[tokio::test]
async fn test_platform_buy_without_upline_goes_to_treasury() {
    let h = Harness::new();
    let buyer = h.actor("0xbuyer", "0", "0");
    let mut funded = h.fetch(buyer.id).await;
    funded.token_balance = dec("1");
    h.store.put_actor(funded);

    let receipt = h
        .economy
        .market
        .buy_from_platform(buyer.id, PlatformItem::Grass, 3, Currency::Token)
        .await
        .unwrap();
    assert_eq!(receipt.paid, dec("0.3"));
    assert_eq!(receipt.upline, None);
    // remainder of the rounded shares lands in dev
    assert_eq!(receipt.lp + receipt.referral + receipt.dev, receipt.paid);
    assert_eq!(h.inv(buyer.id).await.grass, 3);

    let categories = h.categories(buyer.id).await;
    assert!(categories.contains(&LedgerCategory::TreasuryReferral));
    assert!(categories.contains(&LedgerCategory::TreasuryLpBuyback));
    assert!(categories.contains(&LedgerCategory::TreasuryDevFee));

    let gold = h
        .economy
        .market
        .buy_from_platform(buyer.id, PlatformItem::Grass, 1, Currency::Gold)
        .await;
    assert!(matches!(gold, Err(EconomyError::ValidationError(_))));
}

// ============================================================
// FARM
// ============================================================

#[tokio::test]
async fn test_feed_cow() {
    let h = Harness::new();
    let owner = h.actor("0xowner", "0", "0");
    h.inventory(owner.id, 1, 0);
    let cow = h.cow(owner.id, 90);

    let fed = h.economy.farm.feed_cow(owner.id, cow.id).await.unwrap();
    assert_eq!(fed.happiness, 100);
    assert_eq!(fed.last_fed_at, Some(h.clock.now()));
    assert_eq!(h.inv(owner.id).await.grass, 0);

    let full = h.economy.farm.feed_cow(owner.id, cow.id).await;
    assert!(matches!(full, Err(EconomyError::InsufficientBalance) | Err(EconomyError::InvalidState(_))));

    h.inventory(owner.id, 1, 0);
    let full = h.economy.farm.feed_cow(owner.id, cow.id).await;
    assert!(matches!(full, Err(EconomyError::InvalidState(_))));
    assert_eq!(h.inv(owner.id).await.grass, 1);

    let stranger = h.actor("0xstranger", "0", "0");
    let missing = h.economy.farm.feed_cow(stranger.id, cow.id).await;
    assert!(matches!(missing, Err(EconomyError::ResourceNotFound(_))));
}

#[tokio::test]
async fn test_harvest_requires_care_and_time() {
    let h = Harness::new();
    let owner = h.actor("0xowner", "0", "0");
    h.cow(owner.id, 100);
    h.cow(owner.id, 40);

    h.clock.advance(Duration::hours(3));
    let neglected = h.economy.farm.harvest(owner.id).await;
    assert!(matches!(neglected, Err(EconomyError::InvalidState(_))));
    assert_eq!(h.inv(owner.id).await.milk, 0);

    let mut cared = h.fetch(owner.id).await;
    cared.last_ad_watched_at = Some(h.clock.now());
    h.store.put_actor(cared);

    let report = h.economy.farm.harvest(owner.id).await.unwrap();
    // 3h x level 1, the unhappy cow yields half (rounded down)
    assert_eq!(report.milk, 3 + 1);
    assert_eq!(report.cows_harvested, 2);
    assert_eq!(h.inv(owner.id).await.milk, 4);

    let cows = h.store.cows(owner.id).await.unwrap();
    let mut happiness: Vec<i32> = cows.iter().map(|c| c.happiness).collect();
    happiness.sort();
    assert_eq!(happiness, vec![38, 98]);

    let early = h.economy.farm.harvest(owner.id).await;
    assert!(matches!(early, Err(EconomyError::InvalidState(_))));
}

// ============================================================
// REWARDS
// ============================================================

#[tokio::test]
async fn test_ad_callback_boosts_then_falls_back_to_grass() {
    let h = Harness::new();
    let viewer = h.actor("0xviewer", "0", "0");
    let cow = h.cow(viewer.id, 70);

    let first = h.economy.rewards.process_ad_callback(&h.callback(viewer.id, "evt-1")).await;
    assert_eq!(first, Ok(RewardOutcome::CowBoosted { cow: cow.id, happiness: 100 }));

    let second = h.economy.rewards.process_ad_callback(&h.callback(viewer.id, "evt-2")).await;
    assert_eq!(second, Ok(RewardOutcome::GrassGranted { grass: 5 }));

    let after = h.fetch(viewer.id).await;
    assert_eq!(after.gold_balance, dec("20"));
    assert_eq!(after.daily_ad_count, 2);
    assert_eq!(after.last_ad_watched_at, Some(h.clock.now()));
    assert_eq!(h.inv(viewer.id).await.grass, 5);
}

#[tokio::test]
async fn test_ad_callback_replay_and_forgery() {
    let h = Harness::new();
    let viewer = h.actor("0xviewer", "0", "0");
    let callback = h.callback(viewer.id, "evt-replay");

    h.economy.rewards.process_ad_callback(&callback).await.unwrap();
    let replay = h.economy.rewards.process_ad_callback(&callback).await;
    assert_eq!(replay, Err(EconomyError::DuplicateEvent));
    assert_eq!(h.fetch(viewer.id).await.gold_balance, dec("10"));
    assert!(h.store.ledger_by_reference("ad:evt-replay").await.unwrap().is_some());

    let mut forged = h.callback(viewer.id, "evt-forged");
    forged.raw = br#"{"user_id":"someone-else"}"#.to_vec();
    let rejected = h.economy.rewards.process_ad_callback(&forged).await.unwrap_err();
    assert!(matches!(rejected, EconomyError::ValidationError(_)));
    assert_eq!(rejected.public_message(), EconomyError::DuplicateEvent.public_message());
}

#[tokio::test]
async fn test_ad_callback_daily_limit_rolls_back() {
    let h = Harness::new();
    let mut viewer = h.actor("0xviewer", "0", "0");
    viewer.daily_ad_count = 50;
    viewer.last_ad_date = Some(h.clock.now().date_naive());
    h.store.put_actor(viewer.clone());

    let limited = h.economy.rewards.process_ad_callback(&h.callback(viewer.id, "evt-limit")).await;
    assert!(matches!(limited, Err(EconomyError::InvalidState(_))));
    assert_eq!(h.store.ledger_len(), 0);

    // the counter resets on the next UTC day and the event id was never consumed
    h.clock.advance(Duration::days(1));
    let next_day = h.economy.rewards.process_ad_callback(&h.callback(viewer.id, "evt-limit")).await;
    assert!(next_day.is_ok());
    assert_eq!(h.fetch(viewer.id).await.daily_ad_count, 1);
}

// ============================================================
// STAKING / WALLET / ADMIN
// ============================================================

#[tokio::test]
async fn test_stake_and_claim() {
    let h = Harness::new();
    let staker = h.actor("0xstaker", "0", "20000");
    h.inventory(staker.id, 0, 100);
    let staking = &h.economy.staking;

    staking.stake(staker.id, StakeKind::Milk, dec("100")).await.unwrap();
    staking.stake(staker.id, StakeKind::Gold, dec("20000")).await.unwrap();
    assert_eq!(h.inv(staker.id).await.milk, 0);
    assert_eq!(h.fetch(staker.id).await.gold_balance, Decimal::ZERO);

    let early = staking.claim(staker.id).await;
    assert!(matches!(early, Err(EconomyError::InvalidState(_))));

    h.clock.advance(Duration::hours(2));
    let paid = staking.claim(staker.id).await.unwrap();
    // 100 milk / 10 x 2h, 20000 gold / 10000 x 2h
    assert_eq!(paid.gold, dec("20"));
    assert_eq!(paid.milk, 4);
    assert_eq!(h.fetch(staker.id).await.gold_balance, dec("20"));
    assert_eq!(h.inv(staker.id).await.milk, 4);

    let fractional = staking.stake(staker.id, StakeKind::Milk, dec("1.5")).await;
    assert!(matches!(fractional, Err(EconomyError::ValidationError(_))));
}

#[tokio::test]
async fn test_deposit_reference_is_idempotent() {
    let h = Harness::new();
    let actor = h.actor("0xdepositor", "0", "0");
    let wallet = &h.economy.wallet;

    wallet.deposit(actor.id, Currency::Usdt, dec("50"), Some("0xtxhash")).await.unwrap();
    let replay = wallet.deposit(actor.id, Currency::Usdt, dec("50"), Some("0xtxhash")).await;
    assert_eq!(replay, Err(EconomyError::DuplicateEvent));
    assert_eq!(h.fetch(actor.id).await.usdt_balance, dec("50"));
    assert!(h.store.ledger_by_reference("deposit:0xtxhash").await.unwrap().is_some());

    assert_eq!(wallet.withdraw(actor.id, Currency::Usdt, dec("20")).await, Ok(dec("20")));
    assert_eq!(
        wallet.withdraw(actor.id, Currency::Usdt, dec("30.01")).await,
        Err(EconomyError::InsufficientBalance)
    );
    assert_eq!(h.fetch(actor.id).await.usdt_balance, dec("30"));

    let gold = wallet.deposit(actor.id, Currency::Gold, dec("1"), None).await;
    assert!(matches!(gold, Err(EconomyError::ValidationError(_))));
}

#[tokio::test]
async fn test_admin_grant() {
    let h = Harness::new();
    let mut admin = h.actor("0xadmin", "0", "0");
    admin.role = Role::Admin;
    h.store.put_actor(admin.clone());
    let player = h.actor("0xPlayer", "0", "0");
    let admin_svc = &h.economy.admin;

    let denied = admin_svc.grant(player.id, "0xadmin", GrantItem::Gold, dec("1")).await;
    assert!(matches!(denied, Err(EconomyError::InvalidState(_))));

    admin_svc.grant(admin.id, "0XPLAYER", GrantItem::Gold, dec("150")).await.unwrap();
    admin_svc.grant(admin.id, "0xplayer", GrantItem::Land, dec("2")).await.unwrap();
    assert_eq!(h.fetch(player.id).await.gold_balance, dec("150"));
    assert_eq!(h.inv(player.id).await.land_slots, 3);

    let ledger = h.store.ledger(player.id).await.unwrap();
    assert_eq!(ledger[0].category, LedgerCategory::AdminTransfer(GrantItem::Gold));
    assert_eq!(ledger[1].unit, LedgerUnit::LandSlot);

    let partial = admin_svc.grant(admin.id, "0xplayer", GrantItem::Grass, dec("1.5")).await;
    assert!(matches!(partial, Err(EconomyError::ValidationError(_))));
    let unknown = admin_svc.grant(admin.id, "0xnobody", GrantItem::Gold, dec("1")).await;
    assert!(matches!(unknown, Err(EconomyError::ResourceNotFound(_))));
}

// ============================================================
// ACCOUNT
// ============================================================

#[tokio::test]
async fn test_login_registers_under_root_then_rotates_nonce() {
    let h = Harness::new();
    let root = h.economy.seed_root_admin().await.unwrap().unwrap();
    assert_eq!(root.role, Role::Admin);

    let message = "Sign in: nonce 1";
    let (address, signature) = wallet_sign(11, message);
    let first = h.economy.account.login(&address, message, &signature, None).await.unwrap();
    assert!(first.is_new);
    assert_eq!(first.actor.referrer_id, Some(root.id));
    assert!(h.inv(first.actor.id).await.has_barn);

    let second = h.economy.account.login(&address, message, &signature, None).await.unwrap();
    assert!(!second.is_new);
    assert_eq!(second.actor.id, first.actor.id);
    assert_ne!(second.actor.nonce, first.actor.nonce);

    let (_, wrong) = wallet_sign(12, message);
    let forged = h.economy.account.login(&address, message, &wrong, None).await;
    assert!(matches!(forged, Err(EconomyError::ValidationError(_))));
}

#[tokio::test]
async fn test_login_uses_given_referrer() {
    let h = Harness::new();
    let sponsor = h.actor("0xsponsor", "0", "0");
    let message = "Sign in: nonce 2";
    let (address, signature) = wallet_sign(21, message);

    let outcome = h
        .economy
        .account
        .login(&address, message, &signature, Some("0xSPONSOR"))
        .await
        .unwrap();
    assert_eq!(outcome.actor.referrer_id, Some(sponsor.id));
}

#[tokio::test]
async fn test_bind_referrer_rules() {
    let h = Harness::new();
    let a = h.actor("0xa", "0", "0");
    let b = h.actor("0xb", "0", "0");
    let account = &h.economy.account;

    let bound = account.bind_referrer(b.id, "0xa").await.unwrap();
    assert_eq!(bound.referrer_id, Some(a.id));

    // set once
    let again = account.bind_referrer(b.id, "0xa").await;
    assert!(matches!(again, Err(EconomyError::InvalidState(_))));

    // a -> b -> a would close a cycle
    let cycle = account.bind_referrer(a.id, "0xb").await;
    assert_eq!(cycle, Err(EconomyError::invalid_state("referral cycle")));

    let own = account.bind_referrer(a.id, "0xa").await;
    assert_eq!(own, Err(EconomyError::invalid_state("cannot refer yourself")));
}

#[tokio::test]
async fn test_seed_root_admin_is_idempotent() {
    let h = Harness::new();
    let player = h.actor(ROOT, "0", "0");
    assert_eq!(player.role, Role::F2p);

    let upgraded = h.economy.seed_root_admin().await.unwrap().unwrap();
    assert_eq!(upgraded.id, player.id);
    assert_eq!(upgraded.role, Role::Admin);

    let again = h.economy.seed_root_admin().await.unwrap().unwrap();
    assert_eq!(again.id, player.id);
    assert_eq!(h.store.all_actors().len(), 1);
}
