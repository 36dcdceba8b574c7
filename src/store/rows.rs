//! Row helpers shared by every transaction body

use crate::domain::{Actor, ActorId, Inventory};
use crate::error::EconomyError;

use super::StoreTx;

/// Lock a live actor; soft-deleted rows read as missing
pub(crate) async fn lock_actor(
    tx: &mut dyn StoreTx,
    id: ActorId,
) -> Result<Actor, EconomyError> {
    let actor = tx
        .lock_actor(id)
        .await?
        .ok_or_else(|| EconomyError::not_found(format!("actor {id}")))?;
    if actor.is_deleted() {
        return Err(EconomyError::not_found(format!("actor {id}")));
    }
    Ok(actor)
}

/// Lock the owner's inventory, or stage an empty one for first use.
/// Pair with [`save_inventory`].
pub(crate) async fn lock_or_create_inventory(
    tx: &mut dyn StoreTx,
    owner: ActorId,
) -> Result<StagedInventory, EconomyError> {
    Ok(match tx.lock_inventory(owner).await? {
        Some(inventory) => StagedInventory {
            inventory,
            is_new: false,
        },
        None => StagedInventory {
            inventory: Inventory::empty(owner),
            is_new: true,
        },
    })
}

pub(crate) async fn save_inventory(
    tx: &mut dyn StoreTx,
    staged: &StagedInventory,
) -> Result<(), EconomyError> {
    if staged.is_new {
        tx.insert_inventory(&staged.inventory).await
    } else {
        tx.update_inventory(&staged.inventory).await
    }
}

/// Inventory row plus whether it still needs inserting
pub(crate) struct StagedInventory {
    pub inventory: Inventory,
    pub is_new: bool,
}

impl std::ops::Deref for StagedInventory {
    type Target = Inventory;

    fn deref(&self) -> &Inventory {
        &self.inventory
    }
}

impl std::ops::DerefMut for StagedInventory {
    fn deref_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::domain::Resource;
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_staged_inventory_inserts_then_updates() {
        let store = MemoryStore::new();
        let owner = ActorId::new();

        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();
        let mut staged = lock_or_create_inventory(tx.as_mut(), owner).await.unwrap();
        assert!(staged.is_new);
        staged.grass += 3;
        save_inventory(tx.as_mut(), &staged).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();
        let mut staged = lock_or_create_inventory(tx.as_mut(), owner).await.unwrap();
        assert!(!staged.is_new);
        crate::balance::BalanceMutator::adjust_resource(&mut staged, Resource::Grass, 2).unwrap();
        save_inventory(tx.as_mut(), &staged).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.inventory(owner).await.unwrap().unwrap().grass, 5);
    }

    #[tokio::test]
    async fn test_deleted_actor_is_not_found() {
        let store = MemoryStore::new();
        let mut actor = Actor::new("0xdead", None, Utc::now());
        actor.deleted_at = Some(Utc::now());
        store.put_actor(actor.clone());

        let mut tx = store.begin(Duration::from_secs(4)).await.unwrap();
        let err = lock_actor(tx.as_mut(), actor.id).await.unwrap_err();
        assert!(matches!(err, EconomyError::ResourceNotFound(_)));
    }
}
