//! Productive asset (cow) model

use std::fmt;

use chrono::{DateTime, Months, Utc};
use uuid::Uuid;

use super::actor::ActorId;

pub const MAX_HAPPINESS: i32 = 100;
pub const MIN_HAPPINESS: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CowKind {
    Standard,
    BabyGolden,
    Golden,
}

impl CowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CowKind::Standard => "STANDARD",
            CowKind::BabyGolden => "BABY_GOLDEN",
            CowKind::Golden => "GOLDEN",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "STANDARD" => Some(CowKind::Standard),
            "BABY_GOLDEN" => Some(CowKind::BabyGolden),
            "GOLDEN" => Some(CowKind::Golden),
            _ => None,
        }
    }

    /// Standard (free-to-play) cows only produce while their owner keeps up daily care
    pub fn needs_daily_care(&self) -> bool {
        matches!(self, CowKind::Standard)
    }
}

impl fmt::Display for CowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cow {
    pub id: Uuid,
    pub owner: ActorId,
    pub kind: CowKind,
    pub level: i32,
    pub happiness: i32,
    /// Advisory only; expired cows are never removed by the engine
    pub expires_at: DateTime<Utc>,
    pub last_fed_at: Option<DateTime<Utc>>,
    pub last_harvested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Cow {
    pub fn new(owner: ActorId, kind: CowKind, lifespan_months: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            kind,
            level: 1,
            happiness: MAX_HAPPINESS,
            expires_at: now
                .checked_add_months(Months::new(lifespan_months))
                .unwrap_or(now),
            last_fed_at: None,
            last_harvested_at: None,
            created_at: now,
        }
    }

    /// Adjust happiness, clamped to `[0, 100]`
    pub fn add_happiness(&mut self, delta: i32) {
        self.happiness = self
            .happiness
            .saturating_add(delta)
            .clamp(MIN_HAPPINESS, MAX_HAPPINESS);
    }

    pub fn is_fully_happy(&self) -> bool {
        self.happiness >= MAX_HAPPINESS
    }

    /// Reference point for the next harvest
    pub fn harvest_anchor(&self) -> DateTime<Utc> {
        self.last_harvested_at.unwrap_or(self.created_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
