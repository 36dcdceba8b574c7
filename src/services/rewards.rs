//! Reward Service
//!
//! Server-side verification callbacks from the ad network. The request is
//! authenticated over its raw bytes, then `ad:<event id>` is recorded as the
//! first write so replays and concurrent duplicates are rejected by the
//! ledger's unique reference.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::timeout_at;
use tracing::{info, warn};
use uuid::Uuid;

use super::EngineContext;
use crate::auth::CallbackValidator;
use crate::balance::BalanceMutator;
use crate::config::EconomyConfig;
use crate::domain::{ActorId, Currency, LedgerCategory, LedgerEntry, LedgerUnit, Resource};
use crate::error::EconomyError;
use crate::idempotency::{IdempotencyLedger, ReferenceScope};
use crate::store::{StoreTx, lock_actor, lock_or_create_inventory, save_inventory};

/// One signed callback as received
#[derive(Debug, Clone)]
pub struct AdCallback {
    /// Exact request body the signature covers
    pub raw: Vec<u8>,
    pub signature: String,
    pub user_id: String,
    pub event_id: String,
}

#[derive(Deserialize)]
struct CallbackBody {
    user_id: String,
    #[serde(default)]
    event_id: String,
}

impl AdCallback {
    /// Extract the user and event ids from a JSON body, keeping the raw
    /// bytes for signature verification
    pub fn from_body(raw: Vec<u8>, signature: impl Into<String>) -> Result<Self, EconomyError> {
        let body: CallbackBody = serde_json::from_slice(&raw)
            .map_err(|e| EconomyError::validation(format!("malformed callback body: {e}")))?;
        Ok(Self {
            raw,
            signature: signature.into(),
            user_id: body.user_id,
            event_id: body.event_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardOutcome {
    /// Happiness went to this cow
    CowBoosted { cow: Uuid, happiness: i32 },
    /// No standard cow needed it; grass was granted instead
    GrassGranted { grass: i64 },
}

pub struct RewardService {
    ctx: Arc<EngineContext>,
    validator: Option<CallbackValidator>,
}

impl RewardService {
    pub fn new(ctx: Arc<EngineContext>, validator: Option<CallbackValidator>) -> Self {
        Self { ctx, validator }
    }

    /// Authenticate and apply one callback.
    ///
    /// Callers answering the ad network should surface
    /// [`EconomyError::public_message`], never the detailed error.
    pub async fn process_ad_callback(
        &self,
        callback: &AdCallback,
    ) -> Result<RewardOutcome, EconomyError> {
        let Some(validator) = &self.validator else {
            warn!("Reward callback received without a configured secret");
            return Err(EconomyError::Internal("ad network secret not configured".to_string()));
        };
        if !validator.verify(&callback.raw, &callback.signature) {
            warn!(event = %callback.event_id, "Reward callback signature mismatch");
            return Err(EconomyError::validation("invalid callback signature"));
        }
        let reference = ReferenceScope::AdEvent.reference(&callback.event_id)?;
        let actor = Uuid::from_str(callback.user_id.trim())
            .map(ActorId)
            .map_err(|_| EconomyError::validation("invalid user id"))?;

        // no advisory lock: copies of one event fail on the ledger reference,
        // distinct events for one viewer queue on the actor row
        let ctx = &self.ctx;
        let reference = reference.as_str();
        ctx.contained(reference, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::reward_in_tx(tx.store(), &ctx.economy, actor, reference, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn reward_in_tx(
        tx: &mut dyn StoreTx,
        economy: &EconomyConfig,
        actor_id: ActorId,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<RewardOutcome, EconomyError> {
        // first write: a replayed event stops here
        IdempotencyLedger::record(
            tx,
            reference,
            actor_id,
            LedgerCategory::AdReward,
            Decimal::from(economy.ad_happiness_boost),
            LedgerUnit::Happiness,
            now,
        )
        .await?;

        let mut actor = lock_actor(tx, actor_id).await?;
        let watched = BalanceMutator::take_daily_slot(&mut actor, now.date_naive(), economy.daily_ad_limit)?;
        actor.last_ad_watched_at = Some(now);
        let gold = BalanceMutator::credit(&mut actor, Currency::Gold, economy.ad_gold_reward)?;
        actor.updated_at = now;
        tx.update_actor(&actor).await?;
        tx.insert_ledger(&LedgerEntry::new(actor_id, LedgerCategory::AdReward, gold, Currency::Gold, now))
            .await?;

        let cows = tx.lock_cows(actor_id).await?;
        let target = cows
            .into_iter()
            .find(|cow| cow.kind.needs_daily_care() && !cow.is_fully_happy());

        let outcome = match target {
            Some(mut cow) => {
                cow.add_happiness(economy.ad_happiness_boost);
                tx.update_cow(&cow).await?;
                RewardOutcome::CowBoosted {
                    cow: cow.id,
                    happiness: cow.happiness,
                }
            }
            None => {
                let mut inventory = lock_or_create_inventory(tx, actor_id).await?;
                BalanceMutator::adjust_resource(&mut inventory, Resource::Grass, economy.ad_grass_fallback)?;
                save_inventory(tx, &inventory).await?;
                tx.insert_ledger(&LedgerEntry::new(
                    actor_id,
                    LedgerCategory::AdRewardGrass,
                    Decimal::from(economy.ad_grass_fallback),
                    Resource::Grass,
                    now,
                ))
                .await?;
                RewardOutcome::GrassGranted {
                    grass: economy.ad_grass_fallback,
                }
            }
        };

        info!(
            actor = %actor_id,
            reference,
            daily_count = watched,
            outcome = ?outcome,
            "Ad reward granted"
        );
        Ok(outcome)
    }
}
