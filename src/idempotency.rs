//! Idempotency Ledger
//!
//! Keyed flows write their ledger row FIRST, before any balance change. The
//! unique index on `reference` then decides which of several concurrent
//! duplicates proceeds: the loser gets `DuplicateEvent` and its whole
//! transaction is rolled back, so a replayed event can never credit twice.
//!
//! External ids are stored as `<scope>:<id>` so an ad event id and a deposit
//! reference never share a key space.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{ActorId, LedgerCategory, LedgerEntry, LedgerUnit};
use crate::error::EconomyError;
use crate::store::StoreTx;

/// Maximum stored length of a reference (column is VARCHAR(128))
pub const MAX_REFERENCE_LEN: usize = 128;

/// Key space of an externally supplied id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceScope {
    AdEvent,
    Deposit,
}

impl ReferenceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceScope::AdEvent => "ad",
            ReferenceScope::Deposit => "deposit",
        }
    }

    /// Stored reference for `external`; validated with the prefix included
    pub fn reference(&self, external: &str) -> Result<String, EconomyError> {
        if external.trim().is_empty() {
            return Err(EconomyError::validation("empty event reference"));
        }
        let reference = format!("{}:{external}", self.as_str());
        IdempotencyLedger::validate_reference(&reference)?;
        Ok(reference)
    }
}

pub struct IdempotencyLedger;

impl IdempotencyLedger {
    pub fn validate_reference(reference: &str) -> Result<(), EconomyError> {
        if reference.trim().is_empty() {
            return Err(EconomyError::validation("empty event reference"));
        }
        if reference.len() > MAX_REFERENCE_LEN {
            return Err(EconomyError::validation("event reference too long"));
        }
        Ok(())
    }

    /// Append the keyed entry. Must be the first write of the transaction.
    pub async fn record(
        tx: &mut dyn StoreTx,
        reference: &str,
        actor: ActorId,
        category: LedgerCategory,
        amount: Decimal,
        unit: impl Into<LedgerUnit>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, EconomyError> {
        Self::validate_reference(reference)?;
        let entry = LedgerEntry::new(actor, category, amount, unit, now).with_reference(reference);
        match tx.insert_ledger(&entry).await {
            Ok(()) => Ok(entry),
            Err(EconomyError::DuplicateEvent) => {
                tracing::info!(reference, actor = %actor, "Duplicate event rejected");
                Err(EconomyError::DuplicateEvent)
            }
            Err(e) => Err(e),
        }
    }
}
