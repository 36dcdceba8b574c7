//! PostgreSQL store
//!
//! Row locks are `SELECT … FOR UPDATE`. Each transaction pushes the caller's
//! remaining budget into `statement_timeout` and `lock_timeout` so a blocked
//! row lock is cancelled server-side before the advisory lock TTL runs out.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{Store, StoreResult, StoreTx};
use crate::domain::{
    Actor, ActorId, Cow, CowKind, Inventory, LedgerCategory, LedgerEntry, LedgerUnit, Listing,
    ListingStatus, Resource, Role, Stake, StakeKind, TxStatus, normalize_wallet,
};
use crate::error::EconomyError;

const ACTOR_COLUMNS: &str = "id, wallet_address, role, points, gold_balance, usdt_balance, \
     daily_ad_count, last_ad_date, last_ad_watched_at, nonce, referrer_id, \
     created_at, updated_at, deleted_at";

const INVENTORY_COLUMNS: &str = "id, user_id, grass, milk, land_slots, has_barn";

const COW_COLUMNS: &str = "id, owner_id, kind, level, happiness, expected_lifespan, \
     last_fed_at, last_harvested_at, created_at";

const LISTING_COLUMNS: &str = "id, seller_id, item_type, quantity, price_usdt, status, created_at";

const STAKE_COLUMNS: &str = "id, user_id, asset_type, amount, staked_at, last_claimed_at";

const LEDGER_COLUMNS: &str = "id, user_id, type, amount, currency, status, reference_id, created_at";

fn corrupt(column: &str, value: &str) -> EconomyError {
    EconomyError::Storage(format!("unexpected {column} value '{value}'"))
}

fn row_to_actor(row: &PgRow) -> StoreResult<Actor> {
    let role: String = row.try_get("role")?;
    Ok(Actor {
        id: ActorId(row.try_get("id")?),
        wallet_address: row.try_get("wallet_address")?,
        role: Role::from_tag(&role).ok_or_else(|| corrupt("role", &role))?,
        token_balance: row.try_get("points")?,
        gold_balance: row.try_get("gold_balance")?,
        usdt_balance: row.try_get("usdt_balance")?,
        daily_ad_count: row.try_get("daily_ad_count")?,
        last_ad_date: row.try_get("last_ad_date")?,
        last_ad_watched_at: row.try_get("last_ad_watched_at")?,
        nonce: row.try_get("nonce")?,
        referrer_id: row.try_get::<Option<Uuid>, _>("referrer_id")?.map(ActorId),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_inventory(row: &PgRow) -> StoreResult<Inventory> {
    Ok(Inventory {
        id: row.try_get("id")?,
        owner: ActorId(row.try_get("user_id")?),
        grass: row.try_get("grass")?,
        milk: row.try_get("milk")?,
        land_slots: row.try_get("land_slots")?,
        has_barn: row.try_get("has_barn")?,
    })
}

fn row_to_cow(row: &PgRow) -> StoreResult<Cow> {
    let kind: String = row.try_get("kind")?;
    Ok(Cow {
        id: row.try_get("id")?,
        owner: ActorId(row.try_get("owner_id")?),
        kind: CowKind::from_tag(&kind).ok_or_else(|| corrupt("kind", &kind))?,
        level: row.try_get("level")?,
        happiness: row.try_get("happiness")?,
        expires_at: row.try_get("expected_lifespan")?,
        last_fed_at: row.try_get("last_fed_at")?,
        last_harvested_at: row.try_get("last_harvested_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_listing(row: &PgRow) -> StoreResult<Listing> {
    let item: String = row.try_get("item_type")?;
    let status: String = row.try_get("status")?;
    Ok(Listing {
        id: row.try_get("id")?,
        seller: ActorId(row.try_get("seller_id")?),
        item: Resource::from_str(&item).map_err(|_| corrupt("item_type", &item))?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price_usdt")?,
        status: ListingStatus::from_tag(&status).ok_or_else(|| corrupt("status", &status))?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_stake(row: &PgRow) -> StoreResult<Stake> {
    let kind: String = row.try_get("asset_type")?;
    Ok(Stake {
        id: row.try_get("id")?,
        owner: ActorId(row.try_get("user_id")?),
        kind: StakeKind::from_tag(&kind).ok_or_else(|| corrupt("asset_type", &kind))?,
        amount: row.try_get("amount")?,
        staked_at: row.try_get("staked_at")?,
        last_claimed_at: row.try_get("last_claimed_at")?,
    })
}

fn row_to_ledger(row: &PgRow) -> StoreResult<LedgerEntry> {
    let category: String = row.try_get("type")?;
    let unit: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        actor: ActorId(row.try_get("user_id")?),
        category: LedgerCategory::from_tag(&category)
            .ok_or_else(|| corrupt("type", &category))?,
        amount: row.try_get("amount")?,
        unit: LedgerUnit::parse(&unit).ok_or_else(|| corrupt("currency", &unit))?,
        status: TxStatus::from_tag(&status).ok_or_else(|| corrupt("status", &status))?,
        reference: row.try_get("reference_id")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self, budget: Duration) -> StoreResult<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;
        let ms = budget.as_millis().max(1).to_string();
        sqlx::query(
            "SELECT set_config('statement_timeout', $1, true), set_config('lock_timeout', $1, true)",
        )
        .bind(&ms)
        .execute(&mut *tx)
        .await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn actor(&self, id: ActorId) -> StoreResult<Option<Actor>> {
        let sql = format!("SELECT {ACTOR_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_actor).transpose()
    }

    async fn actor_by_wallet(&self, wallet: &str) -> StoreResult<Option<Actor>> {
        let sql = format!("SELECT {ACTOR_COLUMNS} FROM users WHERE wallet_address = $1");
        let row = sqlx::query(&sql)
            .bind(normalize_wallet(wallet))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_actor).transpose()
    }

    async fn inventory(&self, owner: ActorId) -> StoreResult<Option<Inventory>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventories WHERE user_id = $1");
        let row = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_inventory).transpose()
    }

    async fn cows(&self, owner: ActorId) -> StoreResult<Vec<Cow>> {
        let sql = format!("SELECT {COW_COLUMNS} FROM cows WHERE owner_id = $1 ORDER BY created_at, id");
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_cow).collect()
    }

    async fn listing(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_listing).transpose()
    }

    async fn open_listings(&self) -> StoreResult<Vec<Listing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM market_listings WHERE status = 'OPEN' ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn stakes(&self, owner: ActorId) -> StoreResult<Vec<Stake>> {
        let sql = format!("SELECT {STAKE_COLUMNS} FROM stakes WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_stake).collect()
    }

    async fn ledger(&self, actor: ActorId) -> StoreResult<Vec<LedgerEntry>> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM tx_logs WHERE user_id = $1 ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .bind(actor.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_ledger).collect()
    }

    async fn ledger_by_reference(&self, reference: &str) -> StoreResult<Option<LedgerEntry>> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM tx_logs WHERE reference_id = $1");
        let row = sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_ledger).transpose()
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_actor(&mut self, id: ActorId) -> StoreResult<Option<Actor>> {
        let sql = format!("SELECT {ACTOR_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_actor).transpose()
    }

    async fn lock_actor_by_wallet(&mut self, wallet: &str) -> StoreResult<Option<Actor>> {
        let sql = format!("SELECT {ACTOR_COLUMNS} FROM users WHERE wallet_address = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(normalize_wallet(wallet))
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_actor).transpose()
    }

    async fn insert_actor(&mut self, actor: &Actor) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO users ({ACTOR_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(actor.id.as_uuid())
            .bind(&actor.wallet_address)
            .bind(actor.role.as_str())
            .bind(actor.token_balance)
            .bind(actor.gold_balance)
            .bind(actor.usdt_balance)
            .bind(actor.daily_ad_count)
            .bind(actor.last_ad_date)
            .bind(actor.last_ad_watched_at)
            .bind(&actor.nonce)
            .bind(actor.referrer_id.map(|r| r.as_uuid()))
            .bind(actor.created_at)
            .bind(actor.updated_at)
            .bind(actor.deleted_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_actor(&mut self, actor: &Actor) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET role = $2, points = $3, gold_balance = $4, usdt_balance = $5,
                daily_ad_count = $6, last_ad_date = $7, last_ad_watched_at = $8, nonce = $9,
                referrer_id = $10, updated_at = $11, deleted_at = $12
             WHERE id = $1",
        )
        .bind(actor.id.as_uuid())
        .bind(actor.role.as_str())
        .bind(actor.token_balance)
        .bind(actor.gold_balance)
        .bind(actor.usdt_balance)
        .bind(actor.daily_ad_count)
        .bind(actor.last_ad_date)
        .bind(actor.last_ad_watched_at)
        .bind(&actor.nonce)
        .bind(actor.referrer_id.map(|r| r.as_uuid()))
        .bind(actor.updated_at)
        .bind(actor.deleted_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn referrer_of(&mut self, id: ActorId) -> StoreResult<Option<ActorId>> {
        let referrer: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT referrer_id FROM users WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(referrer.flatten().map(ActorId))
    }

    async fn lock_inventory(&mut self, owner: ActorId) -> StoreResult<Option<Inventory>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventories WHERE user_id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_inventory).transpose()
    }

    async fn insert_inventory(&mut self, inventory: &Inventory) -> StoreResult<()> {
        let sql = format!("INSERT INTO inventories ({INVENTORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)");
        sqlx::query(&sql)
            .bind(inventory.id)
            .bind(inventory.owner.as_uuid())
            .bind(inventory.grass)
            .bind(inventory.milk)
            .bind(inventory.land_slots)
            .bind(inventory.has_barn)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_inventory(&mut self, inventory: &Inventory) -> StoreResult<()> {
        sqlx::query(
            "UPDATE inventories SET grass = $2, milk = $3, land_slots = $4, has_barn = $5
             WHERE user_id = $1",
        )
        .bind(inventory.owner.as_uuid())
        .bind(inventory.grass)
        .bind(inventory.milk)
        .bind(inventory.land_slots)
        .bind(inventory.has_barn)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_cow(&mut self, owner: ActorId, id: Uuid) -> StoreResult<Option<Cow>> {
        let sql = format!("SELECT {COW_COLUMNS} FROM cows WHERE id = $1 AND owner_id = $2 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_cow).transpose()
    }

    async fn lock_cows(&mut self, owner: ActorId) -> StoreResult<Vec<Cow>> {
        let sql = format!("SELECT {COW_COLUMNS} FROM cows WHERE owner_id = $1 ORDER BY id FOR UPDATE");
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        let mut cows = rows.iter().map(row_to_cow).collect::<StoreResult<Vec<_>>>()?;
        cows.sort_by_key(|c| (c.created_at, c.id));
        Ok(cows)
    }

    async fn count_cows(&mut self, owner: ActorId) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cows WHERE owner_id = $1")
            .bind(owner.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn insert_cow(&mut self, cow: &Cow) -> StoreResult<()> {
        let sql = format!("INSERT INTO cows ({COW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)");
        sqlx::query(&sql)
            .bind(cow.id)
            .bind(cow.owner.as_uuid())
            .bind(cow.kind.as_str())
            .bind(cow.level)
            .bind(cow.happiness)
            .bind(cow.expires_at)
            .bind(cow.last_fed_at)
            .bind(cow.last_harvested_at)
            .bind(cow.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_cow(&mut self, cow: &Cow) -> StoreResult<()> {
        sqlx::query(
            "UPDATE cows SET level = $2, happiness = $3, last_fed_at = $4, last_harvested_at = $5
             WHERE id = $1",
        )
        .bind(cow.id)
        .bind(cow.level)
        .bind(cow.happiness)
        .bind(cow.last_fed_at)
        .bind(cow.last_harvested_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_listing(&mut self, id: Uuid) -> StoreResult<Option<Listing>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_listing).transpose()
    }

    async fn insert_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        let sql = format!("INSERT INTO market_listings ({LISTING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)");
        sqlx::query(&sql)
            .bind(listing.id)
            .bind(listing.seller.as_uuid())
            .bind(listing.item.as_str())
            .bind(listing.quantity)
            .bind(listing.price)
            .bind(listing.status.as_str())
            .bind(listing.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_listing(&mut self, listing: &Listing) -> StoreResult<()> {
        sqlx::query("UPDATE market_listings SET status = $2 WHERE id = $1")
            .bind(listing.id)
            .bind(listing.status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_stakes(&mut self, owner: ActorId) -> StoreResult<Vec<Stake>> {
        let sql = format!("SELECT {STAKE_COLUMNS} FROM stakes WHERE user_id = $1 ORDER BY id FOR UPDATE");
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_stake).collect()
    }

    async fn insert_stake(&mut self, stake: &Stake) -> StoreResult<()> {
        let sql = format!("INSERT INTO stakes ({STAKE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)");
        sqlx::query(&sql)
            .bind(stake.id)
            .bind(stake.owner.as_uuid())
            .bind(stake.kind.as_str())
            .bind(stake.amount)
            .bind(stake.staked_at)
            .bind(stake.last_claimed_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_stake(&mut self, stake: &Stake) -> StoreResult<()> {
        sqlx::query("UPDATE stakes SET amount = $2, last_claimed_at = $3 WHERE id = $1")
            .bind(stake.id)
            .bind(stake.amount)
            .bind(stake.last_claimed_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_ledger(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        let sql = format!("INSERT INTO tx_logs ({LEDGER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)");
        sqlx::query(&sql)
            .bind(entry.id)
            .bind(entry.actor.as_uuid())
            .bind(entry.category.as_str())
            .bind(entry.amount)
            .bind(entry.unit.as_str())
            .bind(entry.status.as_str())
            .bind(entry.reference.as_deref())
            .bind(entry.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
