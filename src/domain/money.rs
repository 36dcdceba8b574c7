//! Currencies, resources and exact decimal helpers
//!
//! Balances live in `NUMERIC(18,2)` columns and listing prices in
//! `NUMERIC(18,4)`. All arithmetic uses `rust_decimal::Decimal`; results are
//! rounded toward zero so the engine can never mint a fraction of a cent.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::EconomyError;

/// Scale of balance columns
pub const BALANCE_DP: u32 = 2;

/// Round a balance amount to storage scale, toward zero
#[inline]
pub fn to_balance_scale(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(BALANCE_DP, RoundingStrategy::ToZero)
}

/// Require a strictly positive amount with no more than `max_dp` decimals
pub fn require_positive(amount: Decimal, max_dp: u32) -> Result<Decimal, EconomyError> {
    if amount <= Decimal::ZERO {
        return Err(EconomyError::validation("amount must be greater than zero"));
    }
    if amount.normalize().scale() > max_dp {
        return Err(EconomyError::validation(format!(
            "amount has more than {max_dp} decimal places"
        )));
    }
    Ok(amount)
}

/// The three account balances every actor carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Primary reward token ("COW points")
    Token,
    /// Soft in-app currency
    Gold,
    /// Stable-value balance
    Usdt,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Token => "COW",
            Currency::Gold => "GOLD",
            Currency::Usdt => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COW" | "TOKEN" | "COW_TOKEN" => Ok(Currency::Token),
            "GOLD" => Ok(Currency::Gold),
            "USDT" => Ok(Currency::Usdt),
            other => Err(EconomyError::validation(format!("unknown currency: {other}"))),
        }
    }
}

/// Fungible inventory resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Resource {
    Grass,
    Milk,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Grass => "GRASS",
            Resource::Milk => "MILK",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRASS" => Ok(Resource::Grass),
            "MILK" => Ok(Resource::Milk),
            other => Err(EconomyError::validation(format!("unknown resource: {other}"))),
        }
    }
}

/// Unit tag written on ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerUnit {
    Currency(Currency),
    Resource(Resource),
    LandSlot,
    Cow,
    Happiness,
}

impl LedgerUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerUnit::Currency(c) => c.as_str(),
            LedgerUnit::Resource(r) => r.as_str(),
            LedgerUnit::LandSlot => "LAND",
            LedgerUnit::Cow => "COW_ASSET",
            LedgerUnit::Happiness => "HAPPINESS",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "LAND" => Some(LedgerUnit::LandSlot),
            "COW_ASSET" => Some(LedgerUnit::Cow),
            "HAPPINESS" => Some(LedgerUnit::Happiness),
            other => Currency::from_str(other)
                .map(LedgerUnit::Currency)
                .or_else(|_| Resource::from_str(other).map(LedgerUnit::Resource))
                .ok(),
        }
    }
}

impl From<Currency> for LedgerUnit {
    fn from(c: Currency) -> Self {
        LedgerUnit::Currency(c)
    }
}

impl From<Resource> for LedgerUnit {
    fn from(r: Resource) -> Self {
        LedgerUnit::Resource(r)
    }
}

impl fmt::Display for LedgerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_balance_scale_rounds_toward_zero() {
        assert_eq!(to_balance_scale(dec("1.239")), dec("1.23"));
        assert_eq!(to_balance_scale(dec("0.009")), dec("0.00"));
        assert_eq!(to_balance_scale(dec("-1.239")), dec("-1.23"));
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive(dec("0.01"), 2).is_ok());
        assert!(require_positive(dec("0"), 2).is_err());
        assert!(require_positive(dec("-5"), 2).is_err());
        assert!(require_positive(dec("0.001"), 2).is_err());
        // trailing zeros are not extra precision
        assert!(require_positive(dec("1.5000"), 2).is_ok());
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("usdt".parse::<Currency>().unwrap(), Currency::Usdt);
        assert_eq!("COW".parse::<Currency>().unwrap(), Currency::Token);
        assert_eq!("cow_token".parse::<Currency>().unwrap(), Currency::Token);
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn test_ledger_unit_tags() {
        for unit in [
            LedgerUnit::Currency(Currency::Gold),
            LedgerUnit::Resource(Resource::Milk),
            LedgerUnit::LandSlot,
            LedgerUnit::Cow,
            LedgerUnit::Happiness,
        ] {
            assert_eq!(LedgerUnit::parse(unit.as_str()), Some(unit));
        }
        assert_eq!(LedgerUnit::parse("???"), None);
    }
}
