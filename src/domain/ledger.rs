//! Append-only ledger entries

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::actor::ActorId;
use super::money::LedgerUnit;

/// What an administrator may mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantItem {
    Gold,
    Usdt,
    Token,
    Grass,
    Milk,
    Land,
}

impl GrantItem {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantItem::Gold => "GOLD",
            GrantItem::Usdt => "USDT",
            GrantItem::Token => "COW",
            GrantItem::Grass => "GRASS",
            GrantItem::Milk => "MILK",
            GrantItem::Land => "LAND",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "GOLD" => Some(GrantItem::Gold),
            "USDT" => Some(GrantItem::Usdt),
            "COW" | "TOKEN" => Some(GrantItem::Token),
            "GRASS" => Some(GrantItem::Grass),
            "MILK" => Some(GrantItem::Milk),
            "LAND" => Some(GrantItem::Land),
            _ => None,
        }
    }
}

/// Ledger entry category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerCategory {
    MarketSell,
    MarketBuy,
    MarketCancel,
    SellMilkGold,
    BuyItemGold,
    GoldSwap,
    PlatformBuy,
    TreasuryLpBuyback,
    TreasuryDevFee,
    ReferralBonus,
    TreasuryReferral,
    FeedCow,
    HarvestMilk,
    AdReward,
    AdRewardGrass,
    Stake,
    StakeReward,
    Deposit,
    Withdraw,
    AdminTransfer(GrantItem),
}

const ADMIN_PREFIX: &str = "ADMIN_TRANSFER_";

impl LedgerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerCategory::MarketSell => "MARKET_SELL",
            LedgerCategory::MarketBuy => "MARKET_BUY",
            LedgerCategory::MarketCancel => "MARKET_CANCEL",
            LedgerCategory::SellMilkGold => "SELL_MILK_GOLD",
            LedgerCategory::BuyItemGold => "BUY_ITEM_GOLD",
            LedgerCategory::GoldSwap => "GOLD_SWAP",
            LedgerCategory::PlatformBuy => "PLATFORM_BUY",
            LedgerCategory::TreasuryLpBuyback => "TREASURY_LP_BUYBACK",
            LedgerCategory::TreasuryDevFee => "TREASURY_DEV_FEE",
            LedgerCategory::ReferralBonus => "REFERRAL_BONUS",
            LedgerCategory::TreasuryReferral => "TREASURY_REFERRAL",
            LedgerCategory::FeedCow => "FEED_COW",
            LedgerCategory::HarvestMilk => "HARVEST_MILK",
            LedgerCategory::AdReward => "AD_REWARD",
            LedgerCategory::AdRewardGrass => "AD_REWARD_GRASS",
            LedgerCategory::Stake => "STAKE",
            LedgerCategory::StakeReward => "STAKE_REWARD",
            LedgerCategory::Deposit => "DEPOSIT",
            LedgerCategory::Withdraw => "WITHDRAW",
            LedgerCategory::AdminTransfer(item) => match item {
                GrantItem::Gold => "ADMIN_TRANSFER_GOLD",
                GrantItem::Usdt => "ADMIN_TRANSFER_USDT",
                GrantItem::Token => "ADMIN_TRANSFER_COW",
                GrantItem::Grass => "ADMIN_TRANSFER_GRASS",
                GrantItem::Milk => "ADMIN_TRANSFER_MILK",
                GrantItem::Land => "ADMIN_TRANSFER_LAND",
            },
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        if let Some(item) = tag.strip_prefix(ADMIN_PREFIX) {
            return GrantItem::from_tag(item).map(LedgerCategory::AdminTransfer);
        }
        let category = match tag {
            "MARKET_SELL" => LedgerCategory::MarketSell,
            "MARKET_BUY" => LedgerCategory::MarketBuy,
            "MARKET_CANCEL" => LedgerCategory::MarketCancel,
            "SELL_MILK_GOLD" => LedgerCategory::SellMilkGold,
            "BUY_ITEM_GOLD" => LedgerCategory::BuyItemGold,
            "GOLD_SWAP" => LedgerCategory::GoldSwap,
            "PLATFORM_BUY" => LedgerCategory::PlatformBuy,
            "TREASURY_LP_BUYBACK" => LedgerCategory::TreasuryLpBuyback,
            "TREASURY_DEV_FEE" => LedgerCategory::TreasuryDevFee,
            "REFERRAL_BONUS" => LedgerCategory::ReferralBonus,
            "TREASURY_REFERRAL" => LedgerCategory::TreasuryReferral,
            "FEED_COW" => LedgerCategory::FeedCow,
            "HARVEST_MILK" => LedgerCategory::HarvestMilk,
            "AD_REWARD" => LedgerCategory::AdReward,
            "AD_REWARD_GRASS" => LedgerCategory::AdRewardGrass,
            "STAKE" => LedgerCategory::Stake,
            "STAKE_REWARD" => LedgerCategory::StakeReward,
            "DEPOSIT" => LedgerCategory::Deposit,
            "WITHDRAW" => LedgerCategory::Withdraw,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for LedgerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry status. The engine only ever writes `Success`; the column exists
/// for externally settled flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Success => "SUCCESS",
            TxStatus::Failed => "FAILED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PENDING" => Some(TxStatus::Pending),
            "SUCCESS" => Some(TxStatus::Success),
            "FAILED" => Some(TxStatus::Failed),
            _ => None,
        }
    }
}

/// Immutable ledger row. `reference` is unique when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub actor: ActorId,
    pub category: LedgerCategory,
    /// Magnitude; the category and unit say which way it moved
    pub amount: Decimal,
    pub unit: LedgerUnit,
    pub status: TxStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        actor: ActorId,
        category: LedgerCategory,
        amount: Decimal,
        unit: impl Into<LedgerUnit>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            category,
            amount,
            unit: unit.into(),
            status: TxStatus::Success,
            reference: None,
            created_at: now,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}
