#![forbid(unsafe_code)]

use glyco_kernel_contracts::advice::{LearningDomain, LearningParameter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningParameterSpec {
    pub parameter: LearningParameter,
    pub label: &'static str,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub night_allowed: bool,
    pub domain: LearningDomain,
}

const fn spec(
    parameter: LearningParameter,
    label: &'static str,
    min_multiplier: f64,
    max_multiplier: f64,
    domain: LearningDomain,
) -> LearningParameterSpec {
    LearningParameterSpec {
        parameter,
        label,
        min_multiplier,
        max_multiplier,
        night_allowed: true,
        domain,
    }
}

pub const fn spec_for(parameter: LearningParameter) -> LearningParameterSpec {
    use LearningDomain::{Height, Timing};
    use LearningParameter as P;
    match parameter {
        P::KDelta => spec(parameter, "Glucose deviation", 0.85, 1.15, Height),
        P::KSlope => spec(parameter, "Glucose rise rate", 0.80, 1.20, Height),
        P::KAccel => spec(parameter, "Glucose acceleration", 0.80, 1.20, Height),
        P::CommitIobPower => spec(parameter, "IOB braking", 0.70, 1.40, Timing),
        P::MinCommitDose => spec(parameter, "Minimum correction", 0.70, 1.30, Timing),
        P::UncertainMinFraction => spec(parameter, "Uncertain min %", 0.85, 1.15, Timing),
        P::UncertainMaxFraction => spec(parameter, "Uncertain max %", 0.85, 1.15, Timing),
        P::ConfirmMinFraction => spec(parameter, "Confirm min %", 0.85, 1.15, Timing),
        P::ConfirmMaxFraction => spec(parameter, "Confirm max %", 0.85, 1.15, Timing),
        P::AbsorptionDoseFactor => spec(parameter, "Absorption reduction", 0.50, 1.30, Height),
        P::PrePeakBundleFactor => spec(parameter, "Pre-peak bundle", 0.70, 1.20, Timing),
        P::PeakMomentumGain => spec(parameter, "Peak momentum", 0.70, 1.40, Height),
        P::PeakRiseGain => spec(parameter, "Peak rise", 0.70, 1.30, Height),
    }
}
