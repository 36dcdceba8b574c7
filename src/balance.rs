//! BALANCE MUTATOR - the only code that changes balances and counters
//!
//! Operates on rows the caller has already locked. Nothing here does I/O;
//! the caller persists the row afterwards in the same transaction.
//!
//! # Invariants:
//! - Currency balances never go below zero
//! - Deltas are rounded to storage scale (2 dp) toward zero before applying,
//!   and the rounded delta is returned so both sides of a transfer and the
//!   ledger record the same amount
//! - Resource counters use checked `i64` arithmetic
//!
//! # Usage:
//! ```ignore
//! let mut buyer = tx.lock_actor(buyer_id).await?.ok_or(...)?;
//! let paid = BalanceMutator::debit(&mut buyer, Currency::Usdt, price)?;
//! BalanceMutator::credit(&mut seller, Currency::Usdt, paid)?;
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::money::to_balance_scale;
use crate::domain::{Actor, Currency, Inventory, Resource};
use crate::error::EconomyError;

pub struct BalanceMutator;

impl BalanceMutator {
    // ============================================================
    // CURRENCY BALANCES
    // ============================================================

    /// Apply a signed delta; returns the delta actually applied
    pub fn apply(
        actor: &mut Actor,
        currency: Currency,
        delta: Decimal,
    ) -> Result<Decimal, EconomyError> {
        let delta = to_balance_scale(delta);
        let slot = actor.balance_mut(currency);
        let next = slot
            .checked_add(delta)
            .ok_or_else(|| EconomyError::validation("balance overflow"))?;
        if next < Decimal::ZERO {
            return Err(EconomyError::InsufficientBalance);
        }
        *slot = next;
        Ok(delta)
    }

    pub fn credit(
        actor: &mut Actor,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, EconomyError> {
        if amount < Decimal::ZERO {
            return Err(EconomyError::validation("credit amount must not be negative"));
        }
        Self::apply(actor, currency, amount)
    }

    /// Returns the (positive) amount removed
    pub fn debit(
        actor: &mut Actor,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, EconomyError> {
        if amount < Decimal::ZERO {
            return Err(EconomyError::validation("debit amount must not be negative"));
        }
        Self::apply(actor, currency, -amount).map(|d| -d)
    }

    // ============================================================
    // RESOURCE COUNTERS
    // ============================================================

    /// Apply a signed delta to a resource counter; returns the new count
    pub fn adjust_resource(
        inventory: &mut Inventory,
        resource: Resource,
        delta: i64,
    ) -> Result<i64, EconomyError> {
        let slot = inventory.count_mut(resource);
        let next = slot
            .checked_add(delta)
            .ok_or_else(|| EconomyError::validation("resource counter overflow"))?;
        if next < 0 {
            return Err(EconomyError::InsufficientBalance);
        }
        *slot = next;
        Ok(next)
    }

    pub fn add_land_slots(inventory: &mut Inventory, slots: i64) -> Result<i64, EconomyError> {
        if slots <= 0 {
            return Err(EconomyError::validation("land slots must be positive"));
        }
        inventory.land_slots = inventory
            .land_slots
            .checked_add(slots)
            .ok_or_else(|| EconomyError::validation("land slot overflow"))?;
        Ok(inventory.land_slots)
    }

    // ============================================================
    // DAILY COUNTER
    // ============================================================

    /// Reset the counter on a new UTC day, then take one unit.
    /// Fails with `InvalidState` once `limit` is reached.
    pub fn take_daily_slot(
        actor: &mut Actor,
        today: NaiveDate,
        limit: i32,
    ) -> Result<i32, EconomyError> {
        if actor.last_ad_date != Some(today) {
            actor.daily_ad_count = 0;
            actor.last_ad_date = Some(today);
        }
        if actor.daily_ad_count >= limit {
            return Err(EconomyError::invalid_state(format!(
                "daily limit of {limit} reached"
            )));
        }
        actor.daily_ad_count += 1;
        Ok(actor.daily_ad_count)
    }
}
