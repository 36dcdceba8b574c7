//! Actor (user account) model

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Currency;
use crate::error::EconomyError;

/// Opaque actor identifier
///
/// `Ord` follows the UUID byte order, which equals the lexicographic order of
/// the lowercase hyphenated string form. Canonical row-lock ordering relies on
/// this being a strict total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActorId {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(ActorId)
            .map_err(|_| EconomyError::validation(format!("invalid actor id: {s}")))
    }
}

/// Order two distinct actors for row locking: (first, second)
#[inline]
pub fn canonical_pair(a: ActorId, b: ActorId) -> (ActorId, ActorId) {
    match a.cmp(&b) {
        Ordering::Greater => (b, a),
        _ => (a, b),
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    F2p,
    Privileged,
    Admin,
}

impl Role {
    /// Storage tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::F2p => "F2P",
            Role::Privileged => "SULTAN",
            Role::Admin => "ADMIN",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "F2P" => Some(Role::F2p),
            "SULTAN" => Some(Role::Privileged),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalise a wallet address for storage and lookup
pub fn normalize_wallet(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// User account with its three balances
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: ActorId,
    pub wallet_address: String,
    pub role: Role,
    pub token_balance: Decimal,
    pub gold_balance: Decimal,
    pub usdt_balance: Decimal,
    pub daily_ad_count: i32,
    pub last_ad_date: Option<NaiveDate>,
    /// Last time the owner cared for standard cows (ad watched or vitamin bought)
    pub last_ad_watched_at: Option<DateTime<Utc>>,
    pub nonce: String,
    pub referrer_id: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Actor {
    /// Fresh F2P account with zero balances
    pub fn new(wallet_address: &str, referrer_id: Option<ActorId>, now: DateTime<Utc>) -> Self {
        Self {
            id: ActorId::new(),
            wallet_address: normalize_wallet(wallet_address),
            role: Role::F2p,
            token_balance: Decimal::ZERO,
            gold_balance: Decimal::ZERO,
            usdt_balance: Decimal::ZERO,
            daily_ad_count: 0,
            last_ad_date: None,
            last_ad_watched_at: None,
            nonce: Uuid::new_v4().to_string(),
            referrer_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn balance(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Token => self.token_balance,
            Currency::Gold => self.gold_balance,
            Currency::Usdt => self.usdt_balance,
        }
    }

    /// Raw balance slot. Mutations go through `balance::BalanceMutator`.
    pub(crate) fn balance_mut(&mut self, currency: Currency) -> &mut Decimal {
        match currency {
            Currency::Token => &mut self.token_balance,
            Currency::Gold => &mut self.gold_balance,
            Currency::Usdt => &mut self.usdt_balance,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Care window for standard cows
    pub fn has_recent_care(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.last_ad_watched_at
            .is_some_and(|at| now.signed_duration_since(at) <= window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_pair_is_order_independent() {
        let a = ActorId::new();
        let b = ActorId::new();
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));

        let (first, second) = canonical_pair(a, b);
        assert!(first < second);
    }

    #[test]
    fn test_actor_id_order_matches_string_order() {
        for _ in 0..64 {
            let a = ActorId::new();
            let b = ActorId::new();
            assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
        }
    }

    #[test]
    fn test_role_tags() {
        for role in [Role::F2p, Role::Privileged, Role::Admin] {
            assert_eq!(Role::from_tag(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_tag("GOD"), None);
    }

    #[test]
    fn test_new_actor_defaults() {
        let now = Utc::now();
        let actor = Actor::new("  0xABCdef  ", None, now);
        assert_eq!(actor.wallet_address, "0xabcdef");
        assert_eq!(actor.role, Role::F2p);
        assert_eq!(actor.balance(Currency::Usdt), Decimal::ZERO);
        assert!(!actor.is_deleted());
    }

    #[test]
    fn test_recent_care_window() {
        let now = Utc::now();
        let mut actor = Actor::new("0x1", None, now);
        let day = chrono::Duration::hours(24);
        assert!(!actor.has_recent_care(now, day));

        actor.last_ad_watched_at = Some(now - chrono::Duration::hours(23));
        assert!(actor.has_recent_care(now, day));

        actor.last_ad_watched_at = Some(now - chrono::Duration::hours(25));
        assert!(!actor.has_recent_care(now, day));
    }
}
