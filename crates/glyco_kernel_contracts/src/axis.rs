#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{clamp_unit, validate_text, validate_unit_interval};
use crate::episode::EpisodeId;
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Axis {
    Timing,
    Height,
    Persistence,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Timing, Axis::Height, Axis::Persistence];

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Timing => "TIMING",
            Axis::Height => "HEIGHT",
            Axis::Persistence => "PERSISTENCE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimingOutcome {
    Ok,
    Early,
    Late,
    LatePeakIntervention,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeightOutcome {
    Ok,
    TooHigh,
    TooStrong,
    TooWeak,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceOutcome {
    Ok,
    TooShort,
    TooLong,
    Unknown,
}

/// Outcome tag, scoped to the axis that owns its vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AxisOutcome {
    Timing(TimingOutcome),
    Height(HeightOutcome),
    Persistence(PersistenceOutcome),
}

impl AxisOutcome {
    pub fn axis(self) -> Axis {
        match self {
            AxisOutcome::Timing(_) => Axis::Timing,
            AxisOutcome::Height(_) => Axis::Height,
            AxisOutcome::Persistence(_) => Axis::Persistence,
        }
    }

    pub fn ok(axis: Axis) -> Self {
        match axis {
            Axis::Timing => AxisOutcome::Timing(TimingOutcome::Ok),
            Axis::Height => AxisOutcome::Height(HeightOutcome::Ok),
            Axis::Persistence => AxisOutcome::Persistence(PersistenceOutcome::Ok),
        }
    }

    pub fn unknown(axis: Axis) -> Self {
        match axis {
            Axis::Timing => AxisOutcome::Timing(TimingOutcome::Unknown),
            Axis::Height => AxisOutcome::Height(HeightOutcome::Unknown),
            Axis::Persistence => AxisOutcome::Persistence(PersistenceOutcome::Unknown),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(
            self,
            AxisOutcome::Timing(TimingOutcome::Ok)
                | AxisOutcome::Height(HeightOutcome::Ok)
                | AxisOutcome::Persistence(PersistenceOutcome::Ok)
        )
    }

    pub fn is_unknown(self) -> bool {
        matches!(
            self,
            AxisOutcome::Timing(TimingOutcome::Unknown)
                | AxisOutcome::Height(HeightOutcome::Unknown)
                | AxisOutcome::Persistence(PersistenceOutcome::Unknown)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AxisOutcome::Timing(t) => match t {
                TimingOutcome::Ok => "OK",
                TimingOutcome::Early => "EARLY",
                TimingOutcome::Late => "LATE",
                TimingOutcome::LatePeakIntervention => "LATE_PEAK_INTERVENTION",
                TimingOutcome::Unknown => "UNKNOWN",
            },
            AxisOutcome::Height(h) => match h {
                HeightOutcome::Ok => "OK",
                HeightOutcome::TooHigh => "TOO_HIGH",
                HeightOutcome::TooStrong => "TOO_STRONG",
                HeightOutcome::TooWeak => "TOO_WEAK",
                HeightOutcome::Unknown => "UNKNOWN",
            },
            AxisOutcome::Persistence(p) => match p {
                PersistenceOutcome::Ok => "OK",
                PersistenceOutcome::TooShort => "TOO_SHORT",
                PersistenceOutcome::TooLong => "TOO_LONG",
                PersistenceOutcome::Unknown => "UNKNOWN",
            },
        }
    }

    pub fn vocabulary(axis: Axis) -> &'static [AxisOutcome] {
        const TIMING: [AxisOutcome; 5] = [
            AxisOutcome::Timing(TimingOutcome::Ok),
            AxisOutcome::Timing(TimingOutcome::Early),
            AxisOutcome::Timing(TimingOutcome::Late),
            AxisOutcome::Timing(TimingOutcome::LatePeakIntervention),
            AxisOutcome::Timing(TimingOutcome::Unknown),
        ];
        const HEIGHT: [AxisOutcome; 5] = [
            AxisOutcome::Height(HeightOutcome::Ok),
            AxisOutcome::Height(HeightOutcome::TooHigh),
            AxisOutcome::Height(HeightOutcome::TooStrong),
            AxisOutcome::Height(HeightOutcome::TooWeak),
            AxisOutcome::Height(HeightOutcome::Unknown),
        ];
        const PERSISTENCE: [AxisOutcome; 4] = [
            AxisOutcome::Persistence(PersistenceOutcome::Ok),
            AxisOutcome::Persistence(PersistenceOutcome::TooShort),
            AxisOutcome::Persistence(PersistenceOutcome::TooLong),
            AxisOutcome::Persistence(PersistenceOutcome::Unknown),
        ];
        match axis {
            Axis::Timing => &TIMING,
            Axis::Height => &HEIGHT,
            Axis::Persistence => &PERSISTENCE,
        }
    }

    /// Resolves an outcome name within one axis's vocabulary.
    pub fn parse(axis: Axis, name: &str) -> Option<Self> {
        Self::vocabulary(axis)
            .iter()
            .copied()
            .find(|outcome| outcome.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisObservation {
    pub episode_id: EpisodeId,
    pub outcome: AxisOutcome,
    pub signal_strength: f64,
    pub reason: String,
    pub tags: BTreeMap<String, String>,
}

impl AxisObservation {
    /// Builds an observation; strength is clamped into `[0, 1]`.
    pub fn new(
        episode_id: EpisodeId,
        outcome: AxisOutcome,
        signal_strength: f64,
        reason: String,
        tags: BTreeMap<String, String>,
    ) -> Self {
        let signal_strength = if outcome.is_unknown() {
            0.0
        } else {
            clamp_unit(signal_strength)
        };
        Self {
            episode_id,
            outcome,
            signal_strength,
            reason,
            tags,
        }
    }

    pub fn axis(&self) -> Axis {
        self.outcome.axis()
    }
}

impl Validate for AxisObservation {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_unit_interval("axis_observation.signal_strength", self.signal_strength)?;
        validate_text("axis_observation.reason", &self.reason, 256)?;
        if self.outcome.is_unknown() && self.signal_strength > 0.0 {
            return Err(ContractViolation::InvalidValue {
                field: "axis_observation.signal_strength",
                reason: "UNKNOWN outcomes carry no signal",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AxisStatus {
    NoDirection,
    WeakSignal,
    StructuralSignal,
}

impl AxisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AxisStatus::NoDirection => "NO_DIRECTION",
            AxisStatus::WeakSignal => "WEAK_SIGNAL",
            AxisStatus::StructuralSignal => "STRUCTURAL_SIGNAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeShare {
    pub outcome: AxisOutcome,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSnapshot {
    pub axis: Axis,
    pub status: AxisStatus,
    pub episodes_seen: u32,
    pub dominant_outcome: Option<AxisOutcome>,
    pub dominant_confidence: f64,
    /// Share of live non-OK evidence per outcome, largest first.
    pub percentages: Vec<OutcomeShare>,
}

impl AxisSnapshot {
    pub fn empty(axis: Axis) -> Self {
        Self {
            axis,
            status: AxisStatus::NoDirection,
            episodes_seen: 0,
            dominant_outcome: None,
            dominant_confidence: 0.0,
            percentages: Vec::new(),
        }
    }
}
