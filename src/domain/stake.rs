//! In-app staking positions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::actor::ActorId;

const SECONDS_PER_HOUR: i64 = 3600;

/// Staked asset. One position per (owner, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StakeKind {
    Gold,
    Milk,
}

impl StakeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakeKind::Gold => "GOLD",
            StakeKind::Milk => "MILK",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "GOLD" => Some(StakeKind::Gold),
            "MILK" => Some(StakeKind::Milk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stake {
    pub id: Uuid,
    pub owner: ActorId,
    pub kind: StakeKind,
    pub amount: Decimal,
    pub staked_at: DateTime<Utc>,
    pub last_claimed_at: DateTime<Utc>,
}

impl Stake {
    pub fn new(owner: ActorId, kind: StakeKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            kind,
            amount: Decimal::ZERO,
            staked_at: now,
            last_claimed_at: now,
        }
    }

    /// Hours since the last claim as an exact decimal, `None` below one hour
    pub fn claimable_hours(&self, now: DateTime<Utc>) -> Option<Decimal> {
        let secs = now.signed_duration_since(self.last_claimed_at).num_seconds();
        if secs < SECONDS_PER_HOUR {
            return None;
        }
        Some(Decimal::from(secs) / Decimal::from(SECONDS_PER_HOUR))
    }

    /// Raw (unrounded) yield: `amount / divisor * hours`
    pub fn accrued(&self, divisor: Decimal, now: DateTime<Utc>) -> Option<Decimal> {
        if divisor <= Decimal::ZERO {
            return None;
        }
        let hours = self.claimable_hours(now)?;
        self.amount
            .checked_div(divisor)
            .and_then(|rate| rate.checked_mul(hours))
    }
}
