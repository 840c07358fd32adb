#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::MonotonicTimeMs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MealIntentType {
    Small,
    Normal,
    Large,
    Snack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealIntent {
    pub kind: MealIntentType,
    pub set_at: MonotonicTimeMs,
    pub valid_until: MonotonicTimeMs,
}

impl MealIntent {
    pub fn with_ttl(kind: MealIntentType, set_at: MonotonicTimeMs, ttl_minutes: u64) -> Self {
        Self {
            kind,
            set_at,
            valid_until: set_at.plus_minutes(ttl_minutes),
        }
    }

    pub fn is_active_at(&self, now: MonotonicTimeMs) -> bool {
        now >= self.set_at && now < self.valid_until
    }
}
