//! Wallet Service: external deposits and withdrawals of COW tokens and USDT

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::timeout_at;
use tracing::info;

use super::EngineContext;
use crate::balance::BalanceMutator;
use crate::domain::money::{BALANCE_DP, require_positive};
use crate::domain::{ActorId, Currency, LedgerCategory, LedgerEntry};
use crate::error::EconomyError;
use crate::idempotency::{IdempotencyLedger, ReferenceScope};
use crate::lock::OpClass;
use crate::store::{StoreTx, lock_actor};

fn external_currency(currency: Currency) -> Result<Currency, EconomyError> {
    match currency {
        Currency::Token | Currency::Usdt => Ok(currency),
        Currency::Gold => Err(EconomyError::validation("gold cannot leave or enter the game")),
    }
}

pub struct WalletService {
    ctx: Arc<EngineContext>,
}

impl WalletService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Credit an external deposit. With a `reference` (e.g. the on-chain tx
    /// hash) a replay is rejected with `DuplicateEvent`.
    pub async fn deposit(
        &self,
        actor: ActorId,
        currency: Currency,
        amount: Decimal,
        reference: Option<&str>,
    ) -> Result<Decimal, EconomyError> {
        let currency = external_currency(currency)?;
        let amount = require_positive(amount, BALANCE_DP)?;
        let reference = reference
            .map(|r| ReferenceScope::Deposit.reference(r))
            .transpose()?;
        let reference = reference.as_deref();

        let ctx = &self.ctx;
        ctx.guarded(OpClass::Wallet, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::deposit_in_tx(tx.store(), actor, currency, amount, reference, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn deposit_in_tx(
        tx: &mut dyn StoreTx,
        actor_id: ActorId,
        currency: Currency,
        amount: Decimal,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EconomyError> {
        match reference {
            Some(reference) => {
                IdempotencyLedger::record(tx, reference, actor_id, LedgerCategory::Deposit, amount, currency, now)
                    .await?;
            }
            None => {
                tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::Deposit, amount, currency, now))
                    .await?;
            }
        }

        let mut actor = lock_actor(tx, actor_id).await?;
        let credited = BalanceMutator::credit(&mut actor, currency, amount)?;
        actor.updated_at = now;
        tx.update_actor(&actor).await?;

        info!(actor = %actor_id, currency = %currency, amount = %credited, reference = ?reference, "Deposit credited");
        Ok(credited)
    }

    pub async fn withdraw(
        &self,
        actor: ActorId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, EconomyError> {
        let currency = external_currency(currency)?;
        let amount = require_positive(amount, BALANCE_DP)?;

        let ctx = &self.ctx;
        ctx.guarded(OpClass::Wallet, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::withdraw_in_tx(tx.store(), actor, currency, amount, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn withdraw_in_tx(
        tx: &mut dyn StoreTx,
        actor_id: ActorId,
        currency: Currency,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EconomyError> {
        let mut actor = lock_actor(tx, actor_id).await?;
        let debited = BalanceMutator::debit(&mut actor, currency, amount)?;
        actor.updated_at = now;
        tx.update_actor(&actor).await?;
        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::Withdraw, debited, currency, now))
            .await?;

        info!(actor = %actor_id, currency = %currency, amount = %debited, "Withdrawal debited");
        Ok(debited)
    }
}
