#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use glyco_kernel_contracts::advice::{AdviceBundle, Direction, LearningParameter, ParameterHint};
use glyco_kernel_contracts::axis::{
    AxisOutcome, HeightOutcome, PersistenceOutcome, TimingOutcome,
};
use glyco_kernel_contracts::{clamp_unit, MonotonicTimeMs};
use tracing::warn;

use crate::confidence::TopSignal;

use Direction::{Decrease, Increase};
use LearningParameter as P;

/// Parameter nudges implied by a structural outcome.
pub fn hints_for(outcome: AxisOutcome) -> &'static [(LearningParameter, Direction)] {
    match outcome {
        AxisOutcome::Timing(TimingOutcome::Late) => &[
            (P::UncertainMinFraction, Increase),
            (P::ConfirmMinFraction, Increase),
            (P::CommitIobPower, Decrease),
        ],
        AxisOutcome::Timing(TimingOutcome::LatePeakIntervention) => &[
            (P::UncertainMinFraction, Increase),
            (P::ConfirmMinFraction, Increase),
            (P::CommitIobPower, Decrease),
            (P::PrePeakBundleFactor, Increase),
            (P::UncertainMaxFraction, Increase),
        ],
        AxisOutcome::Timing(TimingOutcome::Early) => &[
            (P::UncertainMaxFraction, Decrease),
            (P::ConfirmMaxFraction, Decrease),
            (P::MinCommitDose, Decrease),
        ],
        AxisOutcome::Height(HeightOutcome::TooHigh) => {
            &[(P::KDelta, Increase), (P::KSlope, Increase)]
        }
        AxisOutcome::Height(HeightOutcome::TooStrong) => &[
            (P::KDelta, Decrease),
            (P::KSlope, Decrease),
            (P::KAccel, Decrease),
        ],
        AxisOutcome::Height(HeightOutcome::TooWeak) => &[(P::KDelta, Increase)],
        AxisOutcome::Persistence(PersistenceOutcome::TooShort) => {
            &[(P::PeakMomentumGain, Increase)]
        }
        AxisOutcome::Persistence(PersistenceOutcome::TooLong) => &[
            (P::AbsorptionDoseFactor, Decrease),
            (P::PeakMomentumGain, Decrease),
        ],
        AxisOutcome::Timing(TimingOutcome::Ok | TimingOutcome::Unknown)
        | AxisOutcome::Height(HeightOutcome::Ok | HeightOutcome::Unknown)
        | AxisOutcome::Persistence(PersistenceOutcome::Ok | PersistenceOutcome::Unknown) => &[],
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdviceEmitter;

impl AdviceEmitter {
    pub fn new() -> Self {
        Self
    }

    /// One hint per parameter; when two signals touch the same parameter the
    /// more confident one wins.
    pub fn emit(&self, now: MonotonicTimeMs, top_signals: &[TopSignal]) -> AdviceBundle {
        let mut chosen: BTreeMap<LearningParameter, ParameterHint> = BTreeMap::new();
        for signal in top_signals {
            let confidence = clamp_unit(signal.confidence);
            for (parameter, direction) in hints_for(signal.outcome) {
                if chosen
                    .get(parameter)
                    .map_or(false, |existing| existing.confidence >= confidence)
                {
                    continue;
                }
                let reason = format!(
                    "{} {} conf={:.2} n={}",
                    signal.axis.as_str(),
                    signal.outcome.as_str(),
                    confidence,
                    signal.support_count
                );
                match ParameterHint::v1(*parameter, *direction, confidence, signal.outcome, reason) {
                    Ok(hint) => {
                        chosen.insert(*parameter, hint);
                    }
                    Err(err) => warn!(parameter = parameter.as_str(), error = %err, "hint dropped"),
                }
            }
        }

        let advices: Vec<ParameterHint> = chosen.into_values().collect();
        let debug_summary = advices
            .iter()
            .map(|h| {
                format!(
                    "{} {} ({} {:.2})",
                    h.parameter.as_str(),
                    h.direction.symbol(),
                    h.outcome.as_str(),
                    h.confidence
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        AdviceBundle {
            created_at: now,
            advices,
            debug_summary: format!("[OBS] advice: {debug_summary}"),
        }
    }
}
