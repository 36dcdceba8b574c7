//! Farm Service: feeding and harvesting

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::time::timeout_at;
use tracing::{debug, info};
use uuid::Uuid;

use super::EngineContext;
use crate::balance::BalanceMutator;
use crate::config::EconomyConfig;
use crate::domain::{ActorId, Cow, LedgerCategory, LedgerEntry, Resource};
use crate::error::EconomyError;
use crate::lock::OpClass;
use crate::store::{StoreTx, lock_actor, lock_or_create_inventory, save_inventory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub milk: i64,
    pub cows_harvested: usize,
    /// Standard cows skipped for lack of care in the window
    pub cows_neglected: usize,
}

pub struct FarmService {
    ctx: Arc<EngineContext>,
}

impl FarmService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Spend one grass on a cow; returns the cow after feeding
    pub async fn feed_cow(&self, owner: ActorId, cow_id: Uuid) -> Result<Cow, EconomyError> {
        let ctx = &self.ctx;
        ctx.guarded(OpClass::FeedCow, owner, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::feed_in_tx(tx.store(), &ctx.economy, owner, cow_id, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn feed_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        owner: ActorId,
        cow_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Cow, EconomyError> {
        let mut cow = tx
            .lock_cow(owner, cow_id)
            .await?
            .ok_or_else(|| EconomyError::not_found(format!("cow {cow_id}")))?;
        let mut inventory = tx
            .lock_inventory(owner)
            .await?
            .ok_or_else(|| EconomyError::not_found("inventory"))?;

        if inventory.count(Resource::Grass) < 1 {
            return Err(EconomyError::InsufficientBalance);
        }
        if cow.is_fully_happy() {
            return Err(EconomyError::invalid_state("cow is already at full happiness"));
        }

        BalanceMutator::adjust_resource(&mut inventory, Resource::Grass, -1)?;
        cow.add_happiness(economy.feed_happiness_boost);
        cow.last_fed_at = Some(now);
        tx.update_inventory(&inventory).await?;
        tx.update_cow(&cow).await?;

        let entry = LedgerEntry::new(owner, LedgerCategory::FeedCow, Decimal::ONE, Resource::Grass, now);
        tx.insert_ledger(&entry).await?;

        info!(actor = %owner, cow = %cow_id, happiness = cow.happiness, "Cow fed");
        Ok(cow)
    }

    pub async fn harvest(&self, owner: ActorId) -> Result<HarvestReport, EconomyError> {
        let ctx = &self.ctx;
        ctx.guarded(OpClass::HarvestFarm, owner, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::harvest_in_tx(tx.store(), &ctx.economy, owner, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn harvest_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        owner: ActorId,
        now: DateTime<Utc>,
    ) -> Result<HarvestReport, EconomyError> {
        let actor = lock_actor(tx, owner).await?;
        let cows = tx.lock_cows(owner).await?;
        let cared = actor.has_recent_care(now, Duration::hours(economy.care_window_hours));

        let mut report = HarvestReport {
            milk: 0,
            cows_harvested: 0,
            cows_neglected: 0,
        };
        for mut cow in cows {
            if cow.kind.needs_daily_care() && !cared {
                report.cows_neglected += 1;
                continue;
            }
            let Some(milk) = milk_yield(&cow, economy, now) else {
                continue;
            };
            cow.last_harvested_at = Some(now);
            cow.add_happiness(-economy.harvest_happiness_cost);
            tx.update_cow(&cow).await?;

            debug!(actor = %owner, cow = %cow.id, milk, "Cow harvested");
            report.milk = report
                .milk
                .checked_add(milk)
                .ok_or_else(|| EconomyError::validation("harvest overflow"))?;
            report.cows_harvested += 1;
        }

        if report.milk == 0 {
            let reason = if report.cows_neglected > 0 {
                "nothing to harvest; standard cows need daily care"
            } else {
                "nothing to harvest yet"
            };
            return Err(EconomyError::invalid_state(reason));
        }

        let mut inventory = lock_or_create_inventory(tx, owner).await?;
        BalanceMutator::adjust_resource(&mut inventory, Resource::Milk, report.milk)?;
        save_inventory(tx, &inventory).await?;

        let entry = LedgerEntry::new(
            owner,
            LedgerCategory::HarvestMilk,
            Decimal::from(report.milk),
            Resource::Milk,
            now,
        );
        tx.insert_ledger(&entry).await?;

        info!(
            actor = %owner,
            milk = report.milk,
            cows = report.cows_harvested,
            neglected = report.cows_neglected,
            "Farm harvested"
        );
        Ok(report)
    }
}

/// Milk ready on one cow: whole hours since the last harvest times level,
/// halved (rounded down) while unhappy. `None` before the first full hour.
pub fn milk_yield(cow: &Cow, economy: &EconomyConfig, now: DateTime<Utc>) -> Option<i64> {
    let hours = now.signed_duration_since(cow.harvest_anchor()).num_hours();
    if hours < 1 {
        return None;
    }
    let mut milk = hours.checked_mul(i64::from(cow.level))?;
    if cow.happiness < economy.low_happiness_threshold {
        milk /= 2;
    }
    (milk > 0).then_some(milk)
}
