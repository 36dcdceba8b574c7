//! Economy data model
//!
//! Plain row types shared by the store backends and the services. None of
//! them perform I/O; mutation rules that need a locked row live in
//! [`crate::balance`] and the services.

pub mod actor;
pub mod cow;
pub mod inventory;
pub mod ledger;
pub mod listing;
pub mod money;
pub mod stake;

pub use actor::{Actor, ActorId, Role, canonical_pair, normalize_wallet};
pub use cow::{Cow, CowKind};
pub use inventory::Inventory;
pub use ledger::{GrantItem, LedgerCategory, LedgerEntry, TxStatus};
pub use listing::{Listing, ListingStatus};
pub use money::{Currency, LedgerUnit, Resource};
pub use stake::{Stake, StakeKind};
