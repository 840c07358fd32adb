#![forbid(unsafe_code)]

use glyco_kernel_contracts::meal::{MealIntent, MealIntentType};
use glyco_kernel_contracts::MonotonicTimeMs;
use tracing::debug;

pub trait MealIntentSource {
    fn active_at(&self, now: MonotonicTimeMs) -> Option<MealIntent>;
}

/// In-memory holder for the most recent announced meal.
#[derive(Debug, Clone, Default)]
pub struct MealIntentHolder {
    current: Option<MealIntent>,
}

impl MealIntentHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: MealIntentType, ttl_minutes: u64, now: MonotonicTimeMs) {
        let intent = MealIntent::with_ttl(kind, now, ttl_minutes);
        debug!(?kind, ttl_minutes, "meal intent set");
        self.current = Some(intent);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

impl MealIntentSource for MealIntentHolder {
    fn active_at(&self, now: MonotonicTimeMs) -> Option<MealIntent> {
        self.current.filter(|intent| intent.is_active_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_meal_holder_01_intent_expires_and_clears() {
        let mut holder = MealIntentHolder::new();
        let t0 = MonotonicTimeMs::from_minutes(10);
        assert!(holder.active_at(t0).is_none());
        holder.set(MealIntentType::Snack, 30, t0);
        assert_eq!(
            holder.active_at(t0.plus_minutes(10)).map(|i| i.kind),
            Some(MealIntentType::Snack)
        );
        assert!(holder.active_at(t0.plus_minutes(30)).is_none());
        holder.set(MealIntentType::Large, 30, t0);
        holder.clear();
        assert!(holder.active_at(t0).is_none());
    }
}
