//! Admin Service
//!
//! Administrators mint balances and items into a target account. Nothing is
//! debited from the admin; every grant is recorded as
//! `ADMIN_TRANSFER_<ITEM>` on the target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::time::timeout_at;
use tracing::{info, warn};

use super::EngineContext;
use crate::balance::BalanceMutator;
use crate::domain::money::{BALANCE_DP, require_positive};
use crate::domain::{
    Actor, ActorId, Currency, GrantItem, LedgerCategory, LedgerEntry, LedgerUnit, Resource,
    normalize_wallet,
};
use crate::error::EconomyError;
use crate::lock::OpClass;
use crate::store::{StoreTx, lock_or_create_inventory, save_inventory};

pub struct AdminService {
    ctx: Arc<EngineContext>,
}

impl AdminService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Mint `amount` of `item` into the account owning `target_wallet`.
    /// Items counted in units (grass, milk, land) must be whole numbers.
    pub async fn grant(
        &self,
        admin: ActorId,
        target_wallet: &str,
        item: GrantItem,
        amount: Decimal,
    ) -> Result<Actor, EconomyError> {
        let max_dp = match item {
            GrantItem::Gold | GrantItem::Usdt | GrantItem::Token => BALANCE_DP,
            GrantItem::Grass | GrantItem::Milk | GrantItem::Land => 0,
        };
        let amount = require_positive(amount, max_dp)?;

        let caller = self
            .ctx
            .store
            .actor(admin)
            .await?
            .ok_or_else(|| EconomyError::not_found(format!("actor {admin}")))?;
        if !caller.is_admin() {
            warn!(actor = %admin, "Grant attempted without admin role");
            return Err(EconomyError::invalid_state("admin role required"));
        }

        let wallet = normalize_wallet(target_wallet);
        let ctx = &self.ctx;
        ctx.guarded(OpClass::AdminGrant, &wallet, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::grant_in_tx(tx.store(), admin, &wallet, item, amount, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn grant_in_tx(
        tx: &mut dyn StoreTx,
        admin: ActorId,
        wallet: &str,
        item: GrantItem,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Actor, EconomyError> {
        let mut target = tx
            .lock_actor_by_wallet(wallet)
            .await?
            .filter(|a| !a.is_deleted())
            .ok_or_else(|| EconomyError::not_found(format!("target user {wallet}")))?;

        let unit: LedgerUnit = match item {
            GrantItem::Gold | GrantItem::Usdt | GrantItem::Token => {
                let currency = match item {
                    GrantItem::Gold => Currency::Gold,
                    GrantItem::Usdt => Currency::Usdt,
                    _ => Currency::Token,
                };
                BalanceMutator::credit(&mut target, currency, amount)?;
                target.updated_at = now;
                tx.update_actor(&target).await?;
                currency.into()
            }
            GrantItem::Grass | GrantItem::Milk | GrantItem::Land => {
                let units = amount
                    .to_i64()
                    .ok_or_else(|| EconomyError::validation("amount out of range"))?;
                let mut inventory = lock_or_create_inventory(tx, target.id).await?;
                let unit = match item {
                    GrantItem::Grass => {
                        BalanceMutator::adjust_resource(&mut inventory, Resource::Grass, units)?;
                        Resource::Grass.into()
                    }
                    GrantItem::Milk => {
                        BalanceMutator::adjust_resource(&mut inventory, Resource::Milk, units)?;
                        Resource::Milk.into()
                    }
                    _ => {
                        BalanceMutator::add_land_slots(&mut inventory, units)?;
                        LedgerUnit::LandSlot
                    }
                };
                save_inventory(tx, &inventory).await?;
                unit
            }
        };

        tx.insert_ledger(&LedgerEntry::new(
            target.id,
            LedgerCategory::AdminTransfer(item),
            amount,
            unit,
            now,
        ))
        .await?;

        info!(
            actor = %target.id,
            admin = %admin,
            item = item.as_str(),
            amount = %amount,
            "Admin grant applied"
        );
        Ok(target)
    }
}
