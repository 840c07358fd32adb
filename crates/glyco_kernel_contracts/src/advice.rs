#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisOutcome};
use crate::common::{validate_text, validate_unit_interval};
use crate::{ContractViolation, MonotonicTimeMs, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningParameter {
    KDelta,
    KSlope,
    KAccel,
    CommitIobPower,
    MinCommitDose,
    UncertainMinFraction,
    UncertainMaxFraction,
    ConfirmMinFraction,
    ConfirmMaxFraction,
    AbsorptionDoseFactor,
    PrePeakBundleFactor,
    PeakMomentumGain,
    PeakRiseGain,
}

impl LearningParameter {
    pub const ALL: [LearningParameter; 13] = [
        LearningParameter::KDelta,
        LearningParameter::KSlope,
        LearningParameter::KAccel,
        LearningParameter::CommitIobPower,
        LearningParameter::MinCommitDose,
        LearningParameter::UncertainMinFraction,
        LearningParameter::UncertainMaxFraction,
        LearningParameter::ConfirmMinFraction,
        LearningParameter::ConfirmMaxFraction,
        LearningParameter::AbsorptionDoseFactor,
        LearningParameter::PrePeakBundleFactor,
        LearningParameter::PeakMomentumGain,
        LearningParameter::PeakRiseGain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LearningParameter::KDelta => "K_DELTA",
            LearningParameter::KSlope => "K_SLOPE",
            LearningParameter::KAccel => "K_ACCEL",
            LearningParameter::CommitIobPower => "COMMIT_IOB_POWER",
            LearningParameter::MinCommitDose => "MIN_COMMIT_DOSE",
            LearningParameter::UncertainMinFraction => "UNCERTAIN_MIN_FRACTION",
            LearningParameter::UncertainMaxFraction => "UNCERTAIN_MAX_FRACTION",
            LearningParameter::ConfirmMinFraction => "CONFIRM_MIN_FRACTION",
            LearningParameter::ConfirmMaxFraction => "CONFIRM_MAX_FRACTION",
            LearningParameter::AbsorptionDoseFactor => "ABSORPTION_DOSE_FACTOR",
            LearningParameter::PrePeakBundleFactor => "PRE_PEAK_BUNDLE_FACTOR",
            LearningParameter::PeakMomentumGain => "PEAK_MOMENTUM_GAIN",
            LearningParameter::PeakRiseGain => "PEAK_RISE_GAIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningDomain {
    Timing,
    Height,
}

/// Staged rollout of learning. `TimingOnly` parks every HEIGHT-domain parameter at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningPhase {
    #[default]
    TimingOnly,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Decrease,
    Hold,
    Increase,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Decrease => -1.0,
            Direction::Hold => 0.0,
            Direction::Increase => 1.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Direction::Decrease => "-1",
            Direction::Hold => "0",
            Direction::Increase => "+1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterHint {
    pub parameter: LearningParameter,
    pub direction: Direction,
    pub confidence: f64,
    pub axis: Axis,
    pub outcome: AxisOutcome,
    pub reason: String,
}

impl ParameterHint {
    pub fn v1(
        parameter: LearningParameter,
        direction: Direction,
        confidence: f64,
        outcome: AxisOutcome,
        reason: String,
    ) -> Result<Self, ContractViolation> {
        let hint = Self {
            parameter,
            direction,
            confidence,
            axis: outcome.axis(),
            outcome,
            reason,
        };
        hint.validate()?;
        Ok(hint)
    }
}

impl Validate for ParameterHint {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_unit_interval("parameter_hint.confidence", self.confidence)?;
        validate_text("parameter_hint.reason", &self.reason, 256)?;
        if self.outcome.axis() != self.axis {
            return Err(ContractViolation::InvalidValue {
                field: "parameter_hint.outcome",
                reason: "must belong to parameter_hint.axis",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceBundle {
    pub created_at: MonotonicTimeMs,
    pub advices: Vec<ParameterHint>,
    pub debug_summary: String,
}

impl AdviceBundle {
    pub fn debug_only(created_at: MonotonicTimeMs, debug_summary: String) -> Self {
        Self {
            created_at,
            advices: Vec::new(),
            debug_summary,
        }
    }

    pub fn has_advice(&self) -> bool {
        !self.advices.is_empty()
    }
}
