//! Staking Service
//!
//! In-app staking of GOLD (yields milk) and MILK (yields gold). Yield accrues
//! per hour on the principal and is paid out on `claim`, or settled
//! automatically before new principal is added.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::time::timeout_at;
use tracing::{debug, info};

use super::EngineContext;
use crate::balance::BalanceMutator;
use crate::config::EconomyConfig;
use crate::domain::money::{BALANCE_DP, require_positive, to_balance_scale};
use crate::domain::{
    Actor, ActorId, Currency, LedgerCategory, LedgerEntry, LedgerUnit, Resource, Stake, StakeKind,
};
use crate::error::EconomyError;
use crate::lock::OpClass;
use crate::store::{StagedInventory, StoreTx, lock_actor, lock_or_create_inventory, save_inventory};

/// Yield paid by one settlement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeYield {
    pub milk: i64,
    pub gold: Decimal,
}

impl StakeYield {
    pub fn is_empty(&self) -> bool {
        self.milk == 0 && self.gold.is_zero()
    }
}

fn stake_unit(kind: StakeKind) -> LedgerUnit {
    match kind {
        StakeKind::Gold => Currency::Gold.into(),
        StakeKind::Milk => Resource::Milk.into(),
    }
}

pub struct StakingService {
    ctx: Arc<EngineContext>,
}

impl StakingService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Add principal. GOLD comes from the balance, MILK from the inventory
    /// in whole units.
    pub async fn stake(
        &self,
        actor: ActorId,
        kind: StakeKind,
        amount: Decimal,
    ) -> Result<Stake, EconomyError> {
        let max_dp = match kind {
            StakeKind::Gold => BALANCE_DP,
            StakeKind::Milk => 0,
        };
        let amount = require_positive(amount, max_dp)?;

        let ctx = &self.ctx;
        ctx.guarded(OpClass::Staking, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::stake_in_tx(tx.store(), &ctx.economy, actor, kind, amount, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn stake_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        actor_id: ActorId,
        kind: StakeKind,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Stake, EconomyError> {
        let mut actor = lock_actor(tx, actor_id).await?;
        let mut inventory = lock_or_create_inventory(tx, actor_id).await?;
        let mut stakes = tx.lock_stakes(actor_id).await?;

        let settled = settle(tx, economy, &mut actor, &mut inventory, &mut stakes, now).await?;

        match kind {
            StakeKind::Gold => {
                BalanceMutator::debit(&mut actor, Currency::Gold, amount)?;
            }
            StakeKind::Milk => {
                let milk = amount
                    .to_i64()
                    .ok_or_else(|| EconomyError::validation("milk amount out of range"))?;
                BalanceMutator::adjust_resource(&mut inventory, Resource::Milk, -milk)?;
            }
        }
        actor.updated_at = now;
        tx.update_actor(&actor).await?;
        save_inventory(tx, &inventory).await?;

        let stake = match stakes.into_iter().find(|s| s.kind == kind) {
            Some(mut stake) => {
                stake.amount += amount;
                // new principal starts accruing now
                stake.last_claimed_at = now;
                tx.update_stake(&stake).await?;
                stake
            }
            None => {
                let mut stake = Stake::new(actor_id, kind, now);
                stake.amount = amount;
                tx.insert_stake(&stake).await?;
                stake
            }
        };

        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::Stake, amount, stake_unit(kind), now))
            .await?;

        info!(
            actor = %actor_id,
            kind = %kind.as_str(),
            amount = %amount,
            principal = %stake.amount,
            settled_milk = settled.milk,
            settled_gold = %settled.gold,
            "Staked"
        );
        Ok(stake)
    }

    /// Pay out yield on every stake with at least one hour elapsed
    pub async fn claim(&self, actor: ActorId) -> Result<StakeYield, EconomyError> {
        let ctx = &self.ctx;
        ctx.guarded(OpClass::Staking, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::claim_in_tx(tx.store(), &ctx.economy, actor, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn claim_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        actor_id: ActorId,
        now: DateTime<Utc>,
    ) -> Result<StakeYield, EconomyError> {
        let mut actor = lock_actor(tx, actor_id).await?;
        let mut inventory = lock_or_create_inventory(tx, actor_id).await?;
        let mut stakes = tx.lock_stakes(actor_id).await?;

        let paid = settle(tx, economy, &mut actor, &mut inventory, &mut stakes, now).await?;
        if paid.is_empty() {
            return Err(EconomyError::invalid_state("no staking rewards to claim yet"));
        }
        actor.updated_at = now;
        tx.update_actor(&actor).await?;
        save_inventory(tx, &inventory).await?;

        info!(actor = %actor_id, milk = paid.milk, gold = %paid.gold, "Staking rewards claimed");
        Ok(paid)
    }
}

/// Credit accrued yield on locked rows and advance each paying stake's
/// claim time. Stakes whose yield rounds to nothing keep accruing.
/// The caller persists `actor` and `inventory`.
async fn settle(
    tx: &mut dyn StoreTx,
    economy: &EconomyConfig,
    actor: &mut Actor,
    inventory: &mut StagedInventory,
    stakes: &mut [Stake],
    now: DateTime<Utc>,
) -> Result<StakeYield, EconomyError> {
    let mut total = StakeYield::default();
    for stake in stakes.iter_mut() {
        let divisor = match stake.kind {
            StakeKind::Gold => economy.stake_gold_divisor,
            StakeKind::Milk => economy.stake_milk_divisor,
        };
        let Some(accrued) = stake.accrued(divisor, now) else {
            continue;
        };

        let (amount, unit) = match stake.kind {
            StakeKind::Gold => {
                let milk = accrued.floor().to_i64().unwrap_or(0);
                if milk <= 0 {
                    continue;
                }
                BalanceMutator::adjust_resource(inventory, Resource::Milk, milk)?;
                total.milk += milk;
                (Decimal::from(milk), LedgerUnit::from(Resource::Milk))
            }
            StakeKind::Milk => {
                let gold = to_balance_scale(accrued);
                if gold.is_zero() {
                    continue;
                }
                let gold = BalanceMutator::credit(actor, Currency::Gold, gold)?;
                total.gold += gold;
                (gold, LedgerUnit::from(Currency::Gold))
            }
        };

        stake.last_claimed_at = now;
        tx.update_stake(stake).await?;
        tx.insert_ledger(&LedgerEntry::new(actor.id, LedgerCategory::StakeReward, amount, unit, now))
            .await?;
        debug!(actor = %actor.id, stake = %stake.id, amount = %amount, unit = %unit, "Stake yield settled");
    }
    Ok(total)
}
