//! Referral Roll-Up Resolver
//!
//! The referral graph is a set of weak `referrer_id` back-references. Payouts
//! go to the nearest ancestor that owns at least one cow:
//!
//! ```text
//! buyer ─▶ r1 (0 cows) ─▶ r2 (0 cows) ─▶ r3 (2 cows)   => r3
//! buyer ─▶ r1 ─▶ ... ─▶ r10 (no cows in range)         => None (treasury)
//! ```
//!
//! Every walk is bounded by `max_depth`, so a corrupted graph containing a
//! cycle still terminates.

use tracing::{debug, warn};

use crate::domain::{Actor, ActorId};
use crate::error::EconomyError;
use crate::store::StoreTx;

pub struct RollUpResolver;

impl RollUpResolver {
    /// Nearest eligible ancestor of `start`, checking at most `max_depth`
    /// referrers. Reads are non-locking; the caller locks the winner.
    pub async fn resolve(
        tx: &mut dyn StoreTx,
        start: ActorId,
        max_depth: usize,
    ) -> Result<Option<ActorId>, EconomyError> {
        let mut current = start;
        for depth in 1..=max_depth {
            let Some(referrer) = tx.referrer_of(current).await? else {
                debug!(actor = %start, depth, "Referral chain ended");
                return Ok(None);
            };
            if tx.count_cows(referrer).await? >= 1 {
                debug!(actor = %start, upline = %referrer, depth, "Roll-up resolved");
                return Ok(Some(referrer));
            }
            current = referrer;
        }
        debug!(actor = %start, max_depth, "Roll-up reached max depth");
        Ok(None)
    }

    /// Check that `actor` may adopt `referrer`: set-once, not self, and
    /// `actor` must not already be an ancestor of `referrer` within
    /// `max_depth` hops.
    pub async fn validate_bind(
        tx: &mut dyn StoreTx,
        actor: &Actor,
        referrer: &Actor,
        max_depth: usize,
    ) -> Result<(), EconomyError> {
        if actor.referrer_id.is_some() {
            return Err(EconomyError::invalid_state("referrer already set"));
        }
        if actor.id == referrer.id {
            return Err(EconomyError::invalid_state("cannot refer yourself"));
        }

        let mut current = referrer.id;
        for _ in 0..max_depth {
            match tx.referrer_of(current).await? {
                None => return Ok(()),
                Some(ancestor) if ancestor == actor.id => {
                    warn!(actor = %actor.id, referrer = %referrer.id, "Referral cycle rejected");
                    return Err(EconomyError::invalid_state("referral cycle"));
                }
                Some(ancestor) => current = ancestor,
            }
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::domain::{Cow, CowKind};
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use std::time::Duration;

    /// `chain[0]` is the buyer, `chain[i]`'s referrer is `chain[i + 1]`
    fn chain(store: &MemoryStore, len: usize) -> Vec<Actor> {
        let now = Utc::now();
        let mut actors: Vec<Actor> = Vec::with_capacity(len);
        let mut parent = None;
        for i in 0..len {
            let actor = Actor::new(&format!("0xchain{i:02}"), parent, now);
            parent = Some(actor.id);
            actors.push(actor);
        }
        actors.reverse();
        for actor in &actors {
            store.put_actor(actor.clone());
        }
        actors
    }

    fn give_cow(store: &MemoryStore, owner: ActorId) {
        store.put_cow(Cow::new(owner, CowKind::Standard, 3, Utc::now()));
    }

    async fn resolve(store: &MemoryStore, start: ActorId, depth: usize) -> Option<ActorId> {
        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();
        RollUpResolver::resolve(tx.as_mut(), start, depth).await.unwrap()
    }

    #[tokio::test]
    async fn test_third_ancestor_wins() {
        let store = MemoryStore::new();
        let c = chain(&store, 5);
        give_cow(&store, c[3].id);
        give_cow(&store, c[4].id);

        assert_eq!(resolve(&store, c[0].id, 10).await, Some(c[3].id));
    }

    #[tokio::test]
    async fn test_direct_referrer_wins_when_eligible() {
        let store = MemoryStore::new();
        let c = chain(&store, 3);
        give_cow(&store, c[1].id);
        give_cow(&store, c[2].id);

        assert_eq!(resolve(&store, c[0].id, 10).await, Some(c[1].id));
    }

    #[tokio::test]
    async fn test_no_eligible_ancestor() {
        let store = MemoryStore::new();
        let c = chain(&store, 4);
        assert_eq!(resolve(&store, c[0].id, 10).await, None);

        // no referrer at all
        assert_eq!(resolve(&store, c[3].id, 10).await, None);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let store = MemoryStore::new();
        let c = chain(&store, 13);
        // 11th ancestor is out of reach at depth 10
        give_cow(&store, c[11].id);
        assert_eq!(resolve(&store, c[0].id, 10).await, None);

        // 10th ancestor is the last one checked
        give_cow(&store, c[10].id);
        assert_eq!(resolve(&store, c[0].id, 10).await, Some(c[10].id));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut a = Actor::new("0xcyc-a", None, now);
        let b = Actor::new("0xcyc-b", Some(a.id), now);
        a.referrer_id = Some(b.id);
        store.put_actor(a.clone());
        store.put_actor(b);

        let found = tokio::time::timeout(Duration::from_secs(1), resolve(&store, a.id, 10))
            .await
            .expect("bounded walk");
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_validate_bind_rules() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let c = chain(&store, 3);
        let loner = Actor::new("0xloner", None, now);
        store.put_actor(loner.clone());
        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();

        // already set
        let err = RollUpResolver::validate_bind(tx.as_mut(), &c[0], &loner, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidState(_)));

        // self
        let err = RollUpResolver::validate_bind(tx.as_mut(), &loner, &loner, 10)
            .await
            .unwrap_err();
        assert_eq!(err, EconomyError::invalid_state("cannot refer yourself"));

        // root of the chain adopting its own descendant closes a cycle
        let err = RollUpResolver::validate_bind(tx.as_mut(), &c[2], &c[0], 10)
            .await
            .unwrap_err();
        assert_eq!(err, EconomyError::invalid_state("referral cycle"));

        // unrelated actor is fine
        RollUpResolver::validate_bind(tx.as_mut(), &loner, &c[0], 10)
            .await
            .unwrap();
    }
}
