//! Transaction Coordinator
//!
//! Opens a store transaction with a deadline strictly shorter than the
//! advisory lock TTL, so the lock can never expire while the transaction it
//! protects is still running.
//!
//! ```text
//! let mut tx = coordinator.begin().await?;
//! let outcome = timeout_at(tx.deadline(), body(tx.store())).await;
//! coordinator.finish(tx, outcome).await   // commit | rollback | Timeout
//! ```
//!
//! The commit shares the body's deadline. A rollback may run until the lock
//! TTL; past that the transaction is dropped, which discards it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::error::Elapsed;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::EconomyError;
use crate::store::{Store, StoreTx};

pub struct TxCoordinator {
    store: Arc<dyn Store>,
    budget: Duration,
    margin: Duration,
}

impl TxCoordinator {
    /// Rejects any configuration whose deadline would reach the lock TTL
    pub fn new(
        store: Arc<dyn Store>,
        lock_ttl: Duration,
        margin: Duration,
    ) -> Result<Self, EconomyError> {
        if margin.is_zero() || margin >= lock_ttl {
            return Err(EconomyError::validation(format!(
                "transaction deadline must be shorter than lock TTL (ttl={lock_ttl:?}, margin={margin:?})"
            )));
        }
        Ok(Self {
            store,
            budget: lock_ttl - margin,
            margin,
        })
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn begin(&self) -> Result<Transaction, EconomyError> {
        let deadline = Instant::now() + self.budget;
        let inner = timeout_at(deadline, self.store.begin(self.budget))
            .await
            .map_err(|_| EconomyError::Timeout)??;
        Ok(Transaction { inner, deadline })
    }

    /// Commit on success; roll back on error or deadline
    pub async fn finish<T>(
        &self,
        tx: Transaction,
        outcome: Result<Result<T, EconomyError>, Elapsed>,
    ) -> Result<T, EconomyError> {
        let Transaction { inner, deadline } = tx;
        match outcome {
            Ok(Ok(value)) => match timeout_at(deadline, inner.commit()).await {
                Ok(committed) => {
                    committed?;
                    Ok(value)
                }
                Err(_) => {
                    warn!(budget_ms = self.budget.as_millis() as u64, "Commit exceeded transaction deadline");
                    Err(EconomyError::Timeout)
                }
            },
            Ok(Err(e)) => {
                debug!(error = %e, "Rolling back");
                self.rollback(inner, deadline).await;
                Err(e)
            }
            Err(_) => {
                warn!(budget_ms = self.budget.as_millis() as u64, "Transaction deadline exceeded");
                self.rollback(inner, deadline).await;
                Err(EconomyError::Timeout)
            }
        }
    }

    async fn rollback(&self, inner: Box<dyn StoreTx>, deadline: Instant) {
        match timeout_at(deadline + self.margin, inner.rollback()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Rollback failed, connection will be discarded"),
            Err(_) => warn!("Rollback outlived the lock TTL, transaction dropped"),
        }
    }
}

/// Open transaction plus its absolute deadline
pub struct Transaction {
    inner: Box<dyn StoreTx>,
    deadline: Instant,
}

impl Transaction {
    pub fn store(&mut self) -> &mut dyn StoreTx {
        self.inner.as_mut()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::domain::{Actor, ActorId};
    use crate::store::{Latency, MemoryStore};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn coordinator(store: &MemoryStore, ttl_ms: u64, margin_ms: u64) -> TxCoordinator {
        TxCoordinator::new(
            Arc::new(store.clone()),
            Duration::from_millis(ttl_ms),
            Duration::from_millis(margin_ms),
        )
        .unwrap()
    }

    async fn credit(tx: &mut dyn StoreTx, id: ActorId) -> Result<(), EconomyError> {
        let mut actor = tx
            .lock_actor(id)
            .await?
            .ok_or_else(|| EconomyError::not_found("actor"))?;
        actor.gold_balance += Decimal::ONE;
        tx.update_actor(&actor).await
    }

    #[test]
    fn test_rejects_deadline_not_below_ttl() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(5);
        assert!(TxCoordinator::new(store.clone(), ttl, ttl).is_err());
        assert!(TxCoordinator::new(store.clone(), ttl, Duration::ZERO).is_err());
        let ok = TxCoordinator::new(store, ttl, Duration::from_secs(1)).unwrap();
        assert_eq!(ok.budget(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_success_commits() {
        let store = MemoryStore::new();
        let actor = Actor::new("0xc0ffee", None, Utc::now());
        store.put_actor(actor.clone());
        let coord = coordinator(&store, 5000, 1000);

        let mut tx = coord.begin().await.unwrap();
        let outcome = tokio::time::timeout_at(tx.deadline(), credit(tx.store(), actor.id)).await;
        coord.finish(tx, outcome).await.unwrap();

        let after = store.actor(actor.id).await.unwrap().unwrap();
        assert_eq!(after.gold_balance, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_error_rolls_back() {
        let store = MemoryStore::new();
        let actor = Actor::new("0xbeef", None, Utc::now());
        store.put_actor(actor.clone());
        let coord = coordinator(&store, 5000, 1000);

        let mut tx = coord.begin().await.unwrap();
        let outcome = tokio::time::timeout_at(tx.deadline(), async {
            credit(tx.store(), actor.id).await?;
            Err::<(), _>(EconomyError::InsufficientBalance)
        })
        .await;
        let err = coord.finish(tx, outcome).await.unwrap_err();

        assert_eq!(err, EconomyError::InsufficientBalance);
        let after = store.actor(actor.id).await.unwrap().unwrap();
        assert_eq!(after.gold_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_blocked_row_lock_times_out_and_rolls_back() {
        let store = MemoryStore::new();
        let actor = Actor::new("0xdead", None, Utc::now());
        store.put_actor(actor.clone());
        let coord = coordinator(&store, 200, 100);

        // a foreign transaction holds the row past our deadline
        let mut blocker = store.begin(Duration::from_secs(5)).await.unwrap();
        blocker.lock_actor(actor.id).await.unwrap();

        let mut tx = coord.begin().await.unwrap();
        let outcome = tokio::time::timeout_at(tx.deadline(), credit(tx.store(), actor.id)).await;
        let err = coord.finish(tx, outcome).await.unwrap_err();
        assert_eq!(err, EconomyError::Timeout);

        blocker.rollback().await.unwrap();
        let after = store.actor(actor.id).await.unwrap().unwrap();
        assert_eq!(after.gold_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_slow_commit_times_out_and_publishes_nothing() {
        let store = MemoryStore::new();
        let actor = Actor::new("0xfade", None, Utc::now());
        store.put_actor(actor.clone());
        let slow = store.with_latency(Latency {
            commit: Duration::from_millis(300),
            ..Latency::default()
        });
        let coord = coordinator(&slow, 200, 100);

        let started = Instant::now();
        let mut tx = coord.begin().await.unwrap();
        let outcome = tokio::time::timeout_at(tx.deadline(), credit(tx.store(), actor.id)).await;
        assert!(matches!(outcome, Ok(Ok(()))));
        let err = coord.finish(tx, outcome).await.unwrap_err();
        assert_eq!(err, EconomyError::Timeout);
        assert!(started.elapsed() < Duration::from_millis(300));

        let after = store.actor(actor.id).await.unwrap().unwrap();
        assert_eq!(after.gold_balance, Decimal::ZERO);

        // the abandoned commit released its row lock
        let mut tx = store.begin(Duration::from_secs(1)).await.unwrap();
        let relock = tokio::time::timeout(Duration::from_millis(50), tx.lock_actor(actor.id)).await;
        assert!(matches!(relock, Ok(Ok(Some(_)))));
    }
}
