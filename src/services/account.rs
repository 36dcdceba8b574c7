//! Account Service
//!
//! Wallet-signature login with first-login registration, one-time referrer
//! binding, and seeding of the root admin that anchors the referral tree.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::timeout_at;
use tracing::{info, warn};
use uuid::Uuid;

use super::EngineContext;
use crate::auth::SignatureVerifier;
use crate::domain::{Actor, ActorId, Inventory, Role, normalize_wallet};
use crate::error::EconomyError;
use crate::lock::OpClass;
use crate::referral::RollUpResolver;
use crate::store::{StoreTx, lock_actor};

#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub actor: Actor,
    pub is_new: bool,
}

pub struct AccountService {
    ctx: Arc<EngineContext>,
    verifier: Arc<dyn SignatureVerifier>,
    root_wallet: Option<String>,
}

impl AccountService {
    pub fn new(
        ctx: Arc<EngineContext>,
        verifier: Arc<dyn SignatureVerifier>,
        root_wallet: Option<String>,
    ) -> Self {
        Self {
            ctx,
            verifier,
            root_wallet: root_wallet
                .map(|w| normalize_wallet(&w))
                .filter(|w| !w.is_empty()),
        }
    }

    pub fn root_wallet(&self) -> Option<&str> {
        self.root_wallet.as_deref()
    }

    /// Verify wallet ownership, then register on first login or rotate the
    /// nonce of an existing account.
    ///
    /// New accounts are attached to `referrer_wallet` when it names another
    /// registered account, otherwise to the root wallet.
    pub async fn login(
        &self,
        wallet: &str,
        message: &str,
        signature: &str,
        referrer_wallet: Option<&str>,
    ) -> Result<LoginOutcome, EconomyError> {
        let wallet = normalize_wallet(wallet);
        if wallet.is_empty() {
            return Err(EconomyError::validation("wallet address required"));
        }
        if !self.verifier.verify(message, signature, &wallet) {
            warn!(wallet = %wallet, "Login signature rejected");
            return Err(EconomyError::validation("signature verification failed"));
        }

        // weak reference: read outside the transaction, never locked
        let referrer = self.pick_referrer(&wallet, referrer_wallet).await?;

        let ctx = &self.ctx;
        ctx.guarded(OpClass::Account, &wallet, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(tx.deadline(), Self::login_in_tx(tx.store(), &wallet, referrer, now)).await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn pick_referrer(
        &self,
        wallet: &str,
        referrer_wallet: Option<&str>,
    ) -> Result<Option<ActorId>, EconomyError> {
        let given = referrer_wallet
            .map(normalize_wallet)
            .filter(|w| !w.is_empty() && w != wallet);
        let candidates = given.iter().map(String::as_str).chain(self.root_wallet());
        for candidate in candidates {
            if candidate == wallet {
                continue;
            }
            if let Some(actor) = self.ctx.store.actor_by_wallet(candidate).await?
                && !actor.is_deleted()
            {
                return Ok(Some(actor.id));
            }
        }
        Ok(None)
    }

    async fn login_in_tx(
        tx: &mut dyn StoreTx,
        wallet: &str,
        referrer: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, EconomyError> {
        if let Some(mut actor) = tx.lock_actor_by_wallet(wallet).await? {
            if actor.is_deleted() {
                return Err(EconomyError::not_found(format!("wallet {wallet}")));
            }
            actor.nonce = Uuid::new_v4().to_string();
            actor.updated_at = now;
            tx.update_actor(&actor).await?;
            info!(actor = %actor.id, "Login");
            return Ok(LoginOutcome { actor, is_new: false });
        }

        let actor = Actor::new(wallet, referrer, now);
        tx.insert_actor(&actor).await?;
        tx.insert_inventory(&Inventory::starter(actor.id)).await?;
        info!(actor = %actor.id, referrer = ?referrer, "Account registered");
        Ok(LoginOutcome { actor, is_new: true })
    }

    /// Attach a referrer to an account that has none. Self-referral and
    /// referral cycles are rejected.
    pub async fn bind_referrer(
        &self,
        actor: ActorId,
        referrer_wallet: &str,
    ) -> Result<Actor, EconomyError> {
        let referrer_wallet = normalize_wallet(referrer_wallet);
        let referrer = self
            .ctx
            .store
            .actor_by_wallet(&referrer_wallet)
            .await?
            .filter(|a| !a.is_deleted())
            .ok_or_else(|| EconomyError::not_found(format!("referrer {referrer_wallet}")))?;

        let ctx = &self.ctx;
        let max_depth = ctx.economy.referral_max_depth;
        ctx.guarded(OpClass::Referral, actor, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(
                tx.deadline(),
                Self::bind_in_tx(tx.store(), actor, &referrer, max_depth, now),
            )
            .await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn bind_in_tx(
        tx: &mut dyn StoreTx,
        actor_id: ActorId,
        referrer: &Actor,
        max_depth: usize,
        now: DateTime<Utc>,
    ) -> Result<Actor, EconomyError> {
        let mut actor = lock_actor(tx, actor_id).await?;
        RollUpResolver::validate_bind(tx, &actor, referrer, max_depth).await?;
        actor.referrer_id = Some(referrer.id);
        actor.updated_at = now;
        tx.update_actor(&actor).await?;
        info!(actor = %actor_id, referrer = %referrer.id, "Referrer bound");
        Ok(actor)
    }

    /// Create the root admin, or upgrade an existing account to admin
    pub async fn seed_root_admin(&self, wallet: &str) -> Result<Actor, EconomyError> {
        let wallet = normalize_wallet(wallet);
        if wallet.is_empty() {
            return Err(EconomyError::validation("root wallet is empty"));
        }
        let ctx = &self.ctx;
        ctx.guarded(OpClass::Account, &wallet, async {
            let now = ctx.clock.now();
            let mut tx = ctx.coordinator.begin().await?;
            let outcome = timeout_at(tx.deadline(), Self::seed_in_tx(tx.store(), &wallet, now)).await;
            ctx.coordinator.finish(tx, outcome).await
        })
        .await
    }

    async fn seed_in_tx(
        tx: &mut dyn StoreTx,
        wallet: &str,
        now: DateTime<Utc>,
    ) -> Result<Actor, EconomyError> {
        match tx.lock_actor_by_wallet(wallet).await? {
            Some(mut actor) => {
                if actor.role != Role::Admin {
                    actor.role = Role::Admin;
                    actor.updated_at = now;
                    tx.update_actor(&actor).await?;
                    info!(actor = %actor.id, "Root wallet upgraded to admin");
                } else {
                    info!(actor = %actor.id, "Root admin already registered");
                }
                Ok(actor)
            }
            None => {
                let mut actor = Actor::new(wallet, None, now);
                actor.role = Role::Admin;
                tx.insert_actor(&actor).await?;
                tx.insert_inventory(&Inventory::starter(actor.id)).await?;
                info!(actor = %actor.id, "Root admin created");
                Ok(actor)
            }
        }
    }
}
