//! Per-actor resource inventory

use uuid::Uuid;

use super::actor::ActorId;
use super::money::Resource;

/// One-to-one with an actor. Counters are never negative and
/// `land_slots` is at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub id: Uuid,
    pub owner: ActorId,
    pub grass: i64,
    pub milk: i64,
    pub land_slots: i64,
    pub has_barn: bool,
}

impl Inventory {
    /// Empty inventory created on first use (e.g. a buyer's first purchase)
    pub fn empty(owner: ActorId) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            grass: 0,
            milk: 0,
            land_slots: 1,
            has_barn: false,
        }
    }

    /// Starter pack granted at registration
    pub fn starter(owner: ActorId) -> Self {
        Self {
            has_barn: true,
            ..Self::empty(owner)
        }
    }

    pub fn count(&self, resource: Resource) -> i64 {
        match resource {
            Resource::Grass => self.grass,
            Resource::Milk => self.milk,
        }
    }

    pub(crate) fn count_mut(&mut self, resource: Resource) -> &mut i64 {
        match resource {
            Resource::Grass => &mut self.grass,
            Resource::Milk => &mut self.milk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_pack() {
        let owner = ActorId::new();
        let inv = Inventory::starter(owner);
        assert_eq!(inv.owner, owner);
        assert_eq!(inv.land_slots, 1);
        assert!(inv.has_barn);
        assert_eq!(inv.count(Resource::Grass), 0);
        assert_eq!(inv.count(Resource::Milk), 0);
    }

    #[test]
    fn test_empty_has_no_barn() {
        assert!(!Inventory::empty(ActorId::new()).has_barn);
    }
}
