//! Marketplace listing and its state machine
//!
//! ```text
//! OPEN ──buy──▶ SOLD        (terminal)
//!   └──cancel──▶ CANCELLED  (terminal)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::actor::ActorId;
use super::money::Resource;
use crate::error::EconomyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Open,
    Sold,
    Cancelled,
}

impl ListingStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ListingStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Open => "OPEN",
            ListingStatus::Sold => "SOLD",
            ListingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "OPEN" => Some(ListingStatus::Open),
            "SOLD" => Some(ListingStatus::Sold),
            "CANCELLED" => Some(ListingStatus::Cancelled),
            _ => None,
        }
    }

    /// Validate a transition. Only `Open` has outgoing edges.
    pub fn transition(self, to: ListingStatus) -> Result<ListingStatus, EconomyError> {
        match (self, to) {
            (ListingStatus::Open, ListingStatus::Sold)
            | (ListingStatus::Open, ListingStatus::Cancelled) => Ok(to),
            (from, to) => Err(EconomyError::invalid_state(format!(
                "listing is {from}, cannot become {to}"
            ))),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: Uuid,
    pub seller: ActorId,
    pub item: Resource,
    pub quantity: i64,
    /// Price in USDT for the whole lot
    pub price: Decimal,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn open(
        seller: ActorId,
        item: Resource,
        quantity: i64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seller,
            item,
            quantity,
            price,
            status: ListingStatus::Open,
            created_at: now,
        }
    }

    /// Fails with `InvalidState` unless the listing is still open
    pub fn ensure_open(&self) -> Result<(), EconomyError> {
        if self.status == ListingStatus::Open {
            Ok(())
        } else {
            Err(EconomyError::invalid_state(format!(
                "listing {} is {}",
                self.id, self.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_transitions() {
        assert_eq!(
            ListingStatus::Open.transition(ListingStatus::Sold).unwrap(),
            ListingStatus::Sold
        );
        assert_eq!(
            ListingStatus::Open
                .transition(ListingStatus::Cancelled)
                .unwrap(),
            ListingStatus::Cancelled
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [ListingStatus::Sold, ListingStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in [
                ListingStatus::Open,
                ListingStatus::Sold,
                ListingStatus::Cancelled,
            ] {
                assert!(matches!(
                    from.transition(to),
                    Err(EconomyError::InvalidState(_))
                ));
            }
        }
        assert!(!ListingStatus::Open.is_terminal());
    }

    #[test]
    fn test_ensure_open() {
        let mut listing = Listing::open(
            ActorId::new(),
            Resource::Grass,
            5,
            Decimal::new(40, 0),
            Utc::now(),
        );
        assert!(listing.ensure_open().is_ok());
        listing.status = ListingStatus::Sold;
        assert!(matches!(
            listing.ensure_open(),
            Err(EconomyError::InvalidState(_))
        ));
    }
}
