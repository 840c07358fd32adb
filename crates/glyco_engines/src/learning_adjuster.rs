#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use glyco_kernel_contracts::advice::{
    AdviceBundle, Direction, LearningDomain, LearningParameter, LearningPhase, ParameterHint,
};
use glyco_kernel_contracts::axis::Axis;
use glyco_kernel_contracts::clamp_unit;

use crate::learning_params::{spec_for, LearningParameterSpec};

pub const TIMING_STEP: f64 = 0.15;
pub const HEIGHT_STEP: f64 = 0.07;

/// Source of the latest per-parameter advice.
pub trait LearningAdvisor {
    fn advice_for(&self, parameter: LearningParameter, is_night: bool) -> Option<&ParameterHint>;
}

impl<T: LearningAdvisor + ?Sized> LearningAdvisor for &T {
    fn advice_for(&self, parameter: LearningParameter, is_night: bool) -> Option<&ParameterHint> {
        (**self).advice_for(parameter, is_night)
    }
}

/// Latest advice per parameter. Each non-empty bundle replaces the whole book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdviceBook {
    latest: BTreeMap<LearningParameter, ParameterHint>,
}

impl AdviceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, bundle: &AdviceBundle) -> bool {
        if !bundle.has_advice() {
            return false;
        }
        self.latest = bundle
            .advices
            .iter()
            .map(|h| (h.parameter, h.clone()))
            .collect();
        true
    }

    /// Drops every hint derived from `axis`. Returns how many were dropped.
    pub fn forget_axis(&mut self, axis: Axis) -> usize {
        let before = self.latest.len();
        self.latest.retain(|_, hint| hint.axis != axis);
        before - self.latest.len()
    }

    pub fn hints(&self) -> impl Iterator<Item = &ParameterHint> {
        self.latest.values()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

impl LearningAdvisor for AdviceBook {
    fn advice_for(&self, parameter: LearningParameter, _is_night: bool) -> Option<&ParameterHint> {
        self.latest.get(&parameter)
    }
}

pub fn step_for(domain: LearningDomain) -> f64 {
    match domain {
        LearningDomain::Timing => TIMING_STEP,
        LearningDomain::Height => HEIGHT_STEP,
    }
}

/// `1 + direction * confidence * step`, clamped to the parameter bounds.
pub fn bounded_multiplier(
    spec: &LearningParameterSpec,
    direction: Direction,
    confidence: f64,
) -> f64 {
    let raw = 1.0 + direction.sign() * clamp_unit(confidence) * step_for(spec.domain);
    raw.clamp(spec.min_multiplier, spec.max_multiplier)
}

/// Read-only view that turns advice into multipliers. Never touches the
/// baseline configuration.
#[derive(Debug, Clone)]
pub struct LearningAdjuster<A: LearningAdvisor> {
    advisor: A,
    phase: LearningPhase,
}

impl<A: LearningAdvisor> LearningAdjuster<A> {
    pub fn new(advisor: A, phase: LearningPhase) -> Self {
        Self { advisor, phase }
    }

    pub fn phase(&self) -> LearningPhase {
        self.phase
    }

    pub fn multiplier(&self, parameter: LearningParameter, is_night: bool) -> f64 {
        let spec = spec_for(parameter);
        if spec.domain == LearningDomain::Height && self.phase == LearningPhase::TimingOnly {
            return 1.0;
        }
        if is_night && !spec.night_allowed {
            return 1.0;
        }
        match self.advisor.advice_for(parameter, is_night) {
            Some(hint) => bounded_multiplier(&spec, hint.direction, hint.confidence),
            None => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyco_kernel_contracts::axis::{AxisOutcome, HeightOutcome, TimingOutcome};
    use glyco_kernel_contracts::MonotonicTimeMs;

    fn hint(parameter: LearningParameter, direction: Direction, confidence: f64) -> ParameterHint {
        let outcome = match spec_for(parameter).domain {
            LearningDomain::Timing => AxisOutcome::Timing(TimingOutcome::Late),
            LearningDomain::Height => AxisOutcome::Height(HeightOutcome::TooHigh),
        };
        ParameterHint::v1(parameter, direction, confidence, outcome, "t".to_string()).unwrap()
    }

    fn book(hints: Vec<ParameterHint>) -> AdviceBook {
        let mut book = AdviceBook::new();
        book.absorb(&AdviceBundle {
            created_at: MonotonicTimeMs(0),
            advices: hints,
            debug_summary: String::new(),
        });
        book
    }

    #[test]
    fn at_adjuster_01_no_advice_is_neutral() {
        let adj = LearningAdjuster::new(AdviceBook::new(), LearningPhase::Full);
        for p in LearningParameter::ALL {
            assert_eq!(adj.multiplier(p, false), 1.0);
        }
    }

    #[test]
    fn at_adjuster_02_timing_step_applies() {
        let b = book(vec![hint(LearningParameter::ConfirmMinFraction, Direction::Increase, 0.6)]);
        let adj = LearningAdjuster::new(&b, LearningPhase::TimingOnly);
        let m = adj.multiplier(LearningParameter::ConfirmMinFraction, false);
        assert!((m - 1.09).abs() < 1e-12);
    }

    #[test]
    fn at_adjuster_03_height_parked_while_timing_only() {
        let b = book(vec![hint(LearningParameter::KDelta, Direction::Decrease, 1.0)]);
        assert_eq!(
            LearningAdjuster::new(&b, LearningPhase::TimingOnly)
                .multiplier(LearningParameter::KDelta, false),
            1.0
        );
        let m = LearningAdjuster::new(&b, LearningPhase::Full)
            .multiplier(LearningParameter::KDelta, true);
        assert!((m - 0.93).abs() < 1e-12);
    }

    #[test]
    fn at_adjuster_04_multiplier_always_within_bounds() {
        for p in LearningParameter::ALL {
            let spec = spec_for(p);
            for direction in [Direction::Decrease, Direction::Hold, Direction::Increase] {
                for step in 0..=20 {
                    let confidence = f64::from(step) / 20.0;
                    let m = bounded_multiplier(&spec, direction, confidence);
                    assert!(m >= spec.min_multiplier && m <= spec.max_multiplier);
                }
            }
            assert_eq!(bounded_multiplier(&spec, Direction::Hold, 1.0), 1.0);
        }
    }

    #[test]
    fn at_adjuster_05_empty_bundle_keeps_previous_book() {
        let mut b = book(vec![hint(LearningParameter::MinCommitDose, Direction::Decrease, 0.5)]);
        assert!(!b.absorb(&AdviceBundle::debug_only(MonotonicTimeMs(1), "x".to_string())));
        assert!(b.advice_for(LearningParameter::MinCommitDose, false).is_some());
        b.absorb(&AdviceBundle {
            created_at: MonotonicTimeMs(2),
            advices: vec![hint(LearningParameter::KSlope, Direction::Increase, 0.5)],
            debug_summary: String::new(),
        });
        assert!(b.advice_for(LearningParameter::MinCommitDose, false).is_none());
        assert_eq!(b.hints().count(), 1);
    }

    #[test]
    fn at_adjuster_06_forget_axis_drops_only_that_axis() {
        let mut b = book(vec![
            hint(LearningParameter::ConfirmMinFraction, Direction::Increase, 0.6),
            hint(LearningParameter::CommitIobPower, Direction::Decrease, 0.6),
            hint(LearningParameter::KDelta, Direction::Increase, 0.6),
        ]);
        assert_eq!(b.forget_axis(Axis::Timing), 2);
        assert!(b.advice_for(LearningParameter::ConfirmMinFraction, false).is_none());
        assert!(b.advice_for(LearningParameter::KDelta, false).is_some());
        assert_eq!(b.forget_axis(Axis::Persistence), 0);
        let adj = LearningAdjuster::new(&b, LearningPhase::Full);
        assert_eq!(adj.multiplier(LearningParameter::ConfirmMinFraction, false), 1.0);
    }
}
