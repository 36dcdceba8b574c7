use anyhow::Result;
use sqlx::PgPool;

/// Create the economy tables if missing. Safe to run at every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Ensuring PostgreSQL schema...");

    for (name, ddl) in STATEMENTS {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    tracing::info!("Schema ready ({} statements)", STATEMENTS.len());
    Ok(())
}

const STATEMENTS: [(&str, &str); 10] = [
    ("users", CREATE_USERS_TABLE),
    ("inventories", CREATE_INVENTORIES_TABLE),
    ("cows", CREATE_COWS_TABLE),
    ("cows owner index", CREATE_COWS_OWNER_INDEX),
    ("market_listings", CREATE_LISTINGS_TABLE),
    ("tx_logs", CREATE_TX_LOGS_TABLE),
    ("tx_logs reference index", CREATE_TX_LOGS_REFERENCE_INDEX),
    ("tx_logs actor index", CREATE_TX_LOGS_ACTOR_INDEX),
    ("stakes", CREATE_STAKES_TABLE),
    ("locks_tb", CREATE_LOCKS_TABLE),
];

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                  UUID PRIMARY KEY,
    wallet_address      VARCHAR(64) NOT NULL UNIQUE,
    role                VARCHAR(16) NOT NULL DEFAULT 'F2P',
    points              NUMERIC(18,2) NOT NULL DEFAULT 0 CHECK (points >= 0),
    gold_balance        NUMERIC(18,2) NOT NULL DEFAULT 0 CHECK (gold_balance >= 0),
    usdt_balance        NUMERIC(18,2) NOT NULL DEFAULT 0 CHECK (usdt_balance >= 0),
    daily_ad_count      INT NOT NULL DEFAULT 0,
    last_ad_date        DATE,
    last_ad_watched_at  TIMESTAMPTZ,
    nonce               VARCHAR(64) NOT NULL,
    referrer_id         UUID REFERENCES users(id),
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at          TIMESTAMPTZ,
    CHECK (referrer_id IS NULL OR referrer_id <> id)
)
"#;

const CREATE_INVENTORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inventories (
    id          UUID PRIMARY KEY,
    user_id     UUID NOT NULL UNIQUE REFERENCES users(id),
    grass       BIGINT NOT NULL DEFAULT 0 CHECK (grass >= 0),
    milk        BIGINT NOT NULL DEFAULT 0 CHECK (milk >= 0),
    land_slots  BIGINT NOT NULL DEFAULT 1 CHECK (land_slots >= 1),
    has_barn    BOOLEAN NOT NULL DEFAULT FALSE
)
"#;

const CREATE_COWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cows (
    id                  UUID PRIMARY KEY,
    owner_id            UUID NOT NULL REFERENCES users(id),
    kind                VARCHAR(20) NOT NULL DEFAULT 'STANDARD',
    level               INT NOT NULL DEFAULT 1 CHECK (level >= 1),
    happiness           INT NOT NULL DEFAULT 100 CHECK (happiness BETWEEN 0 AND 100),
    expected_lifespan   TIMESTAMPTZ NOT NULL,
    last_fed_at         TIMESTAMPTZ,
    last_harvested_at   TIMESTAMPTZ,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_COWS_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_cows_owner ON cows (owner_id)";

const CREATE_LISTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS market_listings (
    id          UUID PRIMARY KEY,
    seller_id   UUID NOT NULL REFERENCES users(id),
    item_type   VARCHAR(16) NOT NULL,
    quantity    BIGINT NOT NULL CHECK (quantity > 0),
    price_usdt  NUMERIC(18,4) NOT NULL,
    status      VARCHAR(16) NOT NULL DEFAULT 'OPEN',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Ledger. The partial unique index on reference_id is the idempotency boundary.
const CREATE_TX_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tx_logs (
    id            UUID PRIMARY KEY,
    user_id       UUID NOT NULL,
    type          VARCHAR(32) NOT NULL,
    amount        NUMERIC(18,4) NOT NULL,
    currency      VARCHAR(16) NOT NULL,
    status        VARCHAR(16) NOT NULL DEFAULT 'SUCCESS',
    reference_id  VARCHAR(128),
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Unique index that makes ledger references at-most-once
pub const REFERENCE_INDEX: &str = "uq_tx_logs_reference";

const CREATE_TX_LOGS_REFERENCE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS uq_tx_logs_reference \
     ON tx_logs (reference_id) WHERE reference_id IS NOT NULL";

const CREATE_TX_LOGS_ACTOR_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_tx_logs_user ON tx_logs (user_id, created_at)";

const CREATE_STAKES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stakes (
    id               UUID PRIMARY KEY,
    user_id          UUID NOT NULL REFERENCES users(id),
    asset_type       VARCHAR(16) NOT NULL,
    amount           NUMERIC(18,2) NOT NULL CHECK (amount >= 0),
    staked_at        TIMESTAMPTZ NOT NULL,
    last_claimed_at  TIMESTAMPTZ NOT NULL,
    UNIQUE (user_id, asset_type)
)
"#;

/// Advisory lock table used by `PgLockService`
const CREATE_LOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS locks_tb (
    lock_key    VARCHAR(128) PRIMARY KEY,
    token       VARCHAR(32) NOT NULL,
    expires_at  TIMESTAMPTZ NOT NULL
)
"#;
