#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::validate_unit_interval;
use crate::{ContractViolation, MonotonicTimeMs, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub u64);

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartTrigger {
    Insulin,
    Rise,
    MealIntent,
}

impl StartTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            StartTrigger::Insulin => "INSULIN",
            StartTrigger::Rise => "RISE",
            StartTrigger::MealIntent => "MEAL_INTENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    RescueConfirmed,
    DowntrendLocked,
    ManualBolus,
    DataInsufficient,
}

impl ExclusionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionReason::RescueConfirmed => "RESCUE_CONFIRMED",
            ExclusionReason::DowntrendLocked => "DOWNTREND_LOCKED",
            ExclusionReason::ManualBolus => "MANUAL_BOLUS",
            ExclusionReason::DataInsufficient => "DATA_INSUFFICIENT",
        }
    }
}

/// One detected meal/correction episode.
///
/// Values are never edited in place: every transition returns a new copy, so a
/// finished episode handed out by the tracker stays exactly as it was emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub start_time: MonotonicTimeMs,
    pub end_time: Option<MonotonicTimeMs>,
    pub is_night: bool,
    pub excluded: bool,
    pub exclusion_reason: Option<ExclusionReason>,
    pub quality_score: f64,
    pub meal_intent_active_at_start: bool,
    pub start_trigger: StartTrigger,
    pub first_insulin_at: Option<MonotonicTimeMs>,
    pub delay_to_first_insulin_min: Option<u32>,
    pub missed_intervention: bool,
}

impl Episode {
    pub fn open(
        id: EpisodeId,
        start_time: MonotonicTimeMs,
        is_night: bool,
        quality_score: f64,
        meal_intent_active_at_start: bool,
        start_trigger: StartTrigger,
    ) -> Result<Self, ContractViolation> {
        let episode = Self {
            id,
            start_time,
            end_time: None,
            is_night,
            excluded: false,
            exclusion_reason: None,
            quality_score,
            meal_intent_active_at_start,
            start_trigger,
            first_insulin_at: None,
            delay_to_first_insulin_min: None,
            missed_intervention: false,
        };
        episode.validate()?;
        Ok(episode)
    }

    /// Marks the episode excluded. The first recorded reason is kept.
    pub fn with_exclusion(self, reason: ExclusionReason) -> Self {
        if self.excluded {
            return self;
        }
        Self {
            excluded: true,
            exclusion_reason: Some(reason),
            ..self
        }
    }

    pub fn with_first_insulin(self, at: MonotonicTimeMs) -> Self {
        if self.first_insulin_at.is_some() {
            return self;
        }
        let delay = at.minutes_since(self.start_time).max(0) as u32;
        Self {
            first_insulin_at: Some(at),
            delay_to_first_insulin_min: Some(delay),
            ..self
        }
    }

    pub fn as_missed_intervention(self) -> Self {
        Self {
            missed_intervention: true,
            first_insulin_at: None,
            delay_to_first_insulin_min: None,
            ..self
        }
    }

    /// Closes the episode. An end before the start is pinned to the start.
    pub fn finished_at(self, end: MonotonicTimeMs) -> Self {
        let end = end.max(self.start_time);
        Self {
            end_time: Some(end),
            ..self
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn duration_min(&self) -> Option<u32> {
        self.end_time
            .map(|end| end.minutes_since(self.start_time).max(0) as u32)
    }
}

impl Validate for Episode {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_unit_interval("episode.quality_score", self.quality_score)?;
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(ContractViolation::InvalidValue {
                    field: "episode.end_time",
                    reason: "must not precede start_time",
                });
            }
        }
        if self.excluded != self.exclusion_reason.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "episode.exclusion_reason",
                reason: "must be present exactly when excluded=true",
            });
        }
        if self.first_insulin_at.is_some() != self.delay_to_first_insulin_min.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "episode.delay_to_first_insulin_min",
                reason: "must be present exactly when first_insulin_at is present",
            });
        }
        if self.missed_intervention && self.first_insulin_at.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "episode.missed_intervention",
                reason: "missed intervention cannot carry a first-insulin timestamp",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EpisodeEvent {
    Started(Episode),
    Finished(Episode),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Episode {
        Episode::open(
            EpisodeId(3),
            MonotonicTimeMs::from_minutes(600),
            false,
            0.8,
            false,
            StartTrigger::Rise,
        )
        .unwrap()
    }

    #[test]
    fn at_episode_01_transitions_copy_and_keep_first_exclusion() {
        let ep = open()
            .with_exclusion(ExclusionReason::RescueConfirmed)
            .with_exclusion(ExclusionReason::ManualBolus);
        assert_eq!(ep.exclusion_reason, Some(ExclusionReason::RescueConfirmed));
        assert!(ep.validate().is_ok());
    }

    #[test]
    fn at_episode_02_first_insulin_records_delay_once() {
        let ep = open()
            .with_first_insulin(MonotonicTimeMs::from_minutes(615))
            .with_first_insulin(MonotonicTimeMs::from_minutes(640));
        assert_eq!(ep.delay_to_first_insulin_min, Some(15));
        assert_eq!(ep.first_insulin_at, Some(MonotonicTimeMs::from_minutes(615)));
    }

    #[test]
    fn at_episode_03_finish_never_precedes_start() {
        let ep = open().finished_at(MonotonicTimeMs::from_minutes(590));
        assert_eq!(ep.end_time, Some(ep.start_time));
        assert_eq!(ep.duration_min(), Some(0));
        assert!(ep.validate().is_ok());
    }

    #[test]
    fn at_episode_04_quality_out_of_range_is_rejected() {
        let err = Episode::open(
            EpisodeId(1),
            MonotonicTimeMs(0),
            false,
            1.2,
            false,
            StartTrigger::Insulin,
        )
        .unwrap_err();
        assert!(matches!(err, ContractViolation::InvalidRange { .. }));
    }

    #[test]
    fn at_episode_05_missed_intervention_drops_first_insulin() {
        let ep = open()
            .with_first_insulin(MonotonicTimeMs::from_minutes(610))
            .as_missed_intervention();
        assert!(ep.missed_intervention);
        assert!(ep.first_insulin_at.is_none());
        assert!(ep.validate().is_ok());
    }
}
