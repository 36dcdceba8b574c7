use anyhow::{Context, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Emit per-operation advisory lock events (`economy::lock` target)
    #[serde(default)]
    pub trace_locks: bool,
    /// PostgreSQL connection URL (overridden by `DATABASE_URL`)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub postgres_max_connections: u32,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    /// Shared secret for reward-network callbacks (overridden by `AD_NETWORK_SECRET`)
    #[serde(default)]
    pub ad_network_secret: String,
    /// Root of the referral tree; seeded as admin at startup
    #[serde(default)]
    pub root_wallet: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "economy.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            trace_locks: false,
            postgres_url: None,
            postgres_max_connections: default_max_connections(),
            storage: StorageBackend::default(),
            lock: LockConfig::default(),
            economy: EconomyConfig::default(),
            ad_network_secret: String::new(),
            root_wallet: None,
        }
    }
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    Postgres,
    Memory,
    /// Every acquire succeeds. Development only.
    None,
}

/// Advisory lock and transaction deadline settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LockConfig {
    pub backend: LockBackend,
    pub ttl_ms: u64,
    /// Transaction deadline = ttl - margin
    pub deadline_margin_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Postgres,
            ttl_ms: 5000,
            deadline_margin_ms: 1000,
        }
    }
}

/// Gold prices of farm essentials
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GoldCatalog {
    pub grass: Decimal,
    pub baby_cow: Decimal,
    pub cow: Decimal,
    pub land: Decimal,
    pub vitamin: Decimal,
}

impl Default for GoldCatalog {
    fn default() -> Self {
        Self {
            grass: Decimal::from(10),
            baby_cow: Decimal::from(500),
            cow: Decimal::from(2000),
            land: Decimal::from(1000),
            vitamin: Decimal::from(50),
        }
    }
}

/// Unit prices of platform items, in the paying currency (USDT or COW)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlatformCatalog {
    pub cow: Decimal,
    pub grass: Decimal,
}

impl Default for PlatformCatalog {
    fn default() -> Self {
        Self {
            cow: Decimal::from(10),
            grass: Decimal::new(10, 2),
        }
    }
}

/// Game-balance parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EconomyConfig {
    pub min_listing_price: Decimal,
    pub max_listing_price: Decimal,
    pub daily_ad_limit: i32,
    pub ad_gold_reward: Decimal,
    pub ad_happiness_boost: i32,
    pub ad_grass_fallback: i64,
    pub feed_happiness_boost: i32,
    pub harvest_happiness_cost: i32,
    /// Below this, harvest yield is halved
    pub low_happiness_threshold: i32,
    pub care_window_hours: i64,
    pub cow_lifespan_months: u32,
    pub referral_max_depth: usize,
    pub lp_share: Decimal,
    pub referral_share: Decimal,
    pub dev_share: Decimal,
    pub milk_gold_price: Decimal,
    pub gold_per_token: Decimal,
    pub gold_per_usdt: Decimal,
    /// GOLD stake yields `amount / divisor` milk per hour
    pub stake_gold_divisor: Decimal,
    /// MILK stake yields `amount / divisor` gold per hour
    pub stake_milk_divisor: Decimal,
    pub gold_catalog: GoldCatalog,
    pub platform_catalog: PlatformCatalog,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            min_listing_price: Decimal::new(1, 2),
            max_listing_price: Decimal::from(10_000),
            daily_ad_limit: 50,
            ad_gold_reward: Decimal::from(10),
            ad_happiness_boost: 50,
            ad_grass_fallback: 5,
            feed_happiness_boost: 20,
            harvest_happiness_cost: 2,
            low_happiness_threshold: 50,
            care_window_hours: 24,
            cow_lifespan_months: 3,
            referral_max_depth: 10,
            lp_share: Decimal::new(70, 2),
            referral_share: Decimal::new(20, 2),
            dev_share: Decimal::new(10, 2),
            milk_gold_price: Decimal::from(5),
            gold_per_token: Decimal::from(100),
            gold_per_usdt: Decimal::from(10_000),
            stake_gold_divisor: Decimal::from(10_000),
            stake_milk_divisor: Decimal::from(10),
            gold_catalog: GoldCatalog::default(),
            platform_catalog: PlatformCatalog::default(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config: AppConfig =
            serde_yaml::from_str(&content).context("Failed to parse config yaml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.is_empty()
        {
            self.postgres_url = Some(url);
        }
        if let Ok(secret) = std::env::var("AD_NETWORK_SECRET")
            && !secret.is_empty()
        {
            self.ad_network_secret = secret;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock.deadline_margin_ms == 0 || self.lock.deadline_margin_ms >= self.lock.ttl_ms {
            bail!(
                "lock.deadline_margin_ms ({}) must be in 1..ttl_ms ({})",
                self.lock.deadline_margin_ms,
                self.lock.ttl_ms
            );
        }
        let eco = &self.economy;
        if eco.min_listing_price <= Decimal::ZERO || eco.min_listing_price > eco.max_listing_price {
            bail!("economy listing price bounds are inconsistent");
        }
        if eco.lp_share + eco.referral_share + eco.dev_share != Decimal::ONE {
            bail!("economy revenue split must sum to 1");
        }
        if self.storage == StorageBackend::Postgres && self.postgres_url.is_none() {
            bail!("storage: postgres requires postgres_url or DATABASE_URL");
        }
        if self.postgres_max_connections == 0 {
            bail!("postgres_max_connections must be at least 1");
        }
        Ok(())
    }
}
