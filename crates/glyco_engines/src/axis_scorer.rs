#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use glyco_kernel_contracts::axis::{
    Axis, AxisObservation, AxisOutcome, HeightOutcome, PersistenceOutcome, TimingOutcome,
};
use glyco_kernel_contracts::clamp_unit;
use glyco_kernel_contracts::episode::Episode;
use glyco_kernel_contracts::summary::EpisodeSummary;
use serde::{Deserialize, Serialize};

pub mod tags {
    pub const PRED_MISMATCH: &str = "PRED_MISMATCH";
    pub const PRED_ERR: &str = "PRED_ERR";
    pub const SEVERITY: &str = "severity";
}

// Blend weights: quality share first, then the outcome-specific signals.
const MISSED_QUALITY_W: f64 = 0.60;
const MISSED_PEAK_W: f64 = 0.40;
const OK_QUALITY_W: f64 = 0.65;
const NO_INSULIN_QUALITY_W: f64 = 0.70;
const NO_INSULIN_PEAK_W: f64 = 0.30;
const EARLY_QUALITY_W: f64 = 0.55;
const EARLY_DEPTH_W: f64 = 0.45;
const LATE_PEAK_QUALITY_W: f64 = 0.50;
const LATE_PEAK_PEAK_W: f64 = 0.30;
const LATE_PEAK_PHASE_W: f64 = 0.20;
const LATE_PEAK_PHASE_SPAN: f64 = 0.6;
const LATE_QUALITY_W: f64 = 0.55;
const LATE_PEAK_SIGNAL_W: f64 = 0.25;
const LATE_LATENESS_W: f64 = 0.20;
const LATENESS_FLOOR: f64 = 0.30;
const LATENESS_SPAN_MIN: f64 = 30.0;
const HYPO_QUALITY_W: f64 = 0.45;
const HYPO_SEVERITY_W: f64 = 0.25;
const HYPO_TIME_W: f64 = 0.20;
const HYPO_TARGET_TIME_W: f64 = 0.10;
const HYPO_TIME_SPAN_MIN: f64 = 20.0;
const HYPO_TARGET_SPAN_MIN: f64 = 40.0;
const UNDERSHOOT_QUALITY_W: f64 = 0.50;
const UNDERSHOOT_RATIO_W: f64 = 0.50;
const TOO_HIGH_QUALITY_W: f64 = 0.60;
const TOO_HIGH_OVERSHOOT_W: f64 = 0.40;
const TOO_LONG_QUALITY_W: f64 = 0.55;
const TOO_LONG_DEPTH_W: f64 = 0.45;
const TOO_LONG_UNKNOWN_DEPTH: f64 = 0.5;
const TOO_SHORT_QUALITY_W: f64 = 0.55;
const TOO_SHORT_PEAK_W: f64 = 0.25;
const TOO_SHORT_ABOVE_W: f64 = 0.20;
const TOO_SHORT_SPAN_MIN: f64 = 60.0;
const OVERSHOOT_SPAN_MMOL: f64 = 4.0;
const NADIR_DEPTH_SPAN_MMOL: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisScorerConfig {
    pub high_mmol: f64,
    pub hypo_mmol: f64,
    pub late_base_min: u32,
    pub meal_intent_tightening_min: u32,
    pub early_max_min: u32,
    pub early_nadir_safety_mmol: f64,
    pub too_short_above_min: u32,
    pub late_peak_phase: f64,
    pub prolonged_below_target_min: u32,
    pub prolonged_below_target_fraction: f64,
    pub too_long_requires_low_nadir: bool,
    pub predicted_peak_mismatch_mmol: f64,
    pub late_timing_damping: f64,
    pub late_peak_extra_damping: f64,
    pub missed_intervention_amplification: f64,
}

impl AxisScorerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            high_mmol: 10.0,
            hypo_mmol: 3.9,
            late_base_min: 20,
            meal_intent_tightening_min: 5,
            early_max_min: 8,
            early_nadir_safety_mmol: 4.2,
            too_short_above_min: 45,
            late_peak_phase: 0.8,
            prolonged_below_target_min: 30,
            prolonged_below_target_fraction: 0.5,
            too_long_requires_low_nadir: true,
            predicted_peak_mismatch_mmol: 2.0,
            late_timing_damping: 0.72,
            late_peak_extra_damping: 0.85,
            missed_intervention_amplification: 1.15,
        }
    }
}

impl Default for AxisScorerConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

/// Turns one finished episode plus its fact sheet into per-axis observations.
/// Pure: the same inputs always produce the same observations.
#[derive(Debug, Clone)]
pub struct AxisScorer {
    config: AxisScorerConfig,
}

impl AxisScorer {
    pub fn new(config: AxisScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AxisScorerConfig {
        &self.config
    }

    pub fn score(&self, episode: &Episode, summary: &EpisodeSummary) -> Vec<AxisObservation> {
        if episode.excluded {
            let reason = episode
                .exclusion_reason
                .map_or("UNSPECIFIED", |r| r.as_str());
            return vec![AxisObservation::new(
                episode.id,
                AxisOutcome::unknown(Axis::Height),
                0.0,
                format!("EXCLUDED: {reason}"),
                BTreeMap::new(),
            )];
        }

        let tags = self.prediction_tags(summary);
        let Some(peak) = summary.peak_glucose_mmol.filter(|p| p.is_finite()) else {
            return Axis::ALL
                .iter()
                .map(|axis| {
                    AxisObservation::new(
                        episode.id,
                        AxisOutcome::unknown(*axis),
                        0.0,
                        format!("{} unknown: peak missing", axis.as_str()),
                        tags.clone(),
                    )
                })
                .collect();
        };

        let quality = clamp_unit(episode.quality_score);
        let facts = Facts {
            episode,
            summary,
            quality,
            peak,
            nadir: summary.nadir_glucose_mmol.filter(|n| n.is_finite()),
        };

        let timing = self.score_timing(&facts, &tags);
        let timing_outcome = match timing.outcome {
            AxisOutcome::Timing(t) => t,
            _ => TimingOutcome::Unknown,
        };
        let height = self.score_height(&facts, timing_outcome, &tags);
        let persistence = self.score_persistence(&facts, &tags);
        vec![timing, height, persistence]
    }

    fn prediction_tags(&self, summary: &EpisodeSummary) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if let (Some(pred), Some(peak)) = (summary.predicted_peak_at_start, summary.peak_glucose_mmol)
        {
            let err = (pred - peak).abs();
            if err >= self.config.predicted_peak_mismatch_mmol {
                tags.insert(
                    tags::PRED_MISMATCH.to_string(),
                    format!("absErr={err:.2} pred={pred:.2} act={peak:.2}"),
                );
            }
        }
        if let Some(err) = summary.peak_prediction_error {
            tags.insert(tags::PRED_ERR.to_string(), format!("act-pred={err:.2}"));
        }
        tags
    }

    fn score_timing(&self, f: &Facts<'_>, tags: &BTreeMap<String, String>) -> AxisObservation {
        let cfg = &self.config;
        let obs = |outcome: TimingOutcome, strength: f64, reason: String| {
            AxisObservation::new(
                f.episode.id,
                AxisOutcome::Timing(outcome),
                strength,
                reason,
                tags.clone(),
            )
        };
        let peak_signal = self.peak_signal(f.peak);

        if f.episode.missed_intervention {
            return obs(
                TimingOutcome::Late,
                MISSED_QUALITY_W * f.quality + MISSED_PEAK_W * peak_signal,
                format!("TIMING LATE: missed intervention peak={:.2}", f.peak),
            );
        }
        if f.peak <= cfg.high_mmol {
            return obs(
                TimingOutcome::Ok,
                OK_QUALITY_W * f.quality,
                format!("TIMING OK: peak<={:.2}", cfg.high_mmol),
            );
        }
        let Some(minutes_to_first) = f.summary.minutes_to_first_insulin else {
            return obs(
                TimingOutcome::Late,
                NO_INSULIN_QUALITY_W * f.quality + NO_INSULIN_PEAK_W * peak_signal,
                "TIMING LATE: no meaningful insulin".to_string(),
            );
        };

        if let Some(nadir) = f.nadir {
            if minutes_to_first <= cfg.early_max_min && nadir <= cfg.early_nadir_safety_mmol {
                let depth = clamp_unit((cfg.early_nadir_safety_mmol - nadir) / NADIR_DEPTH_SPAN_MMOL);
                return obs(
                    TimingOutcome::Early,
                    EARLY_QUALITY_W * f.quality + EARLY_DEPTH_W * depth,
                    format!("TIMING EARLY: minToFirst={minutes_to_first} nadir={nadir:.2}"),
                );
            }
        }

        if let Some(phase) = f.summary.phase_of_first_insulin {
            if phase >= cfg.late_peak_phase {
                let excess = clamp_unit((phase - cfg.late_peak_phase) / LATE_PEAK_PHASE_SPAN);
                return obs(
                    TimingOutcome::LatePeakIntervention,
                    LATE_PEAK_QUALITY_W * f.quality
                        + LATE_PEAK_PEAK_W * peak_signal
                        + LATE_PEAK_PHASE_W * excess,
                    format!("TIMING LATE_PEAK: phase={phase:.2} peak={:.2}", f.peak),
                );
            }
        }

        let threshold = if f.episode.meal_intent_active_at_start {
            cfg.late_base_min
                .saturating_sub(cfg.meal_intent_tightening_min)
        } else {
            cfg.late_base_min
        };
        let late = minutes_to_first >= threshold;
        let lateness = if late {
            clamp_unit(f64::from(minutes_to_first - threshold) / LATENESS_SPAN_MIN)
        } else {
            LATENESS_FLOOR
        };
        let outcome = if late {
            TimingOutcome::Late
        } else {
            TimingOutcome::Ok
        };
        obs(
            outcome,
            LATE_QUALITY_W * f.quality + LATE_PEAK_SIGNAL_W * peak_signal + LATE_LATENESS_W * lateness,
            format!(
                "TIMING {}: minToFirst={minutes_to_first} threshold={threshold}",
                AxisOutcome::Timing(outcome).as_str()
            ),
        )
    }

    fn score_height(
        &self,
        f: &Facts<'_>,
        timing: TimingOutcome,
        tags: &BTreeMap<String, String>,
    ) -> AxisObservation {
        let cfg = &self.config;
        let s = f.summary;
        let obs = |outcome: HeightOutcome, strength: f64, reason: String, tags: BTreeMap<String, String>| {
            AxisObservation::new(f.episode.id, AxisOutcome::Height(outcome), strength, reason, tags)
        };

        if let Some(nadir) = f.nadir.filter(|n| *n < cfg.hypo_mmol) {
            let severity = clamp_unit((cfg.hypo_mmol - nadir) / NADIR_DEPTH_SPAN_MMOL);
            let hypo_time = clamp_unit(f64::from(s.time_below_hypo_min) / HYPO_TIME_SPAN_MIN);
            let target_time = clamp_unit(f64::from(s.time_below_target_min) / HYPO_TARGET_SPAN_MIN);
            let mut tags = tags.clone();
            tags.insert(tags::SEVERITY.to_string(), format!("{severity:.2}"));
            return obs(
                HeightOutcome::TooStrong,
                HYPO_QUALITY_W * f.quality
                    + HYPO_SEVERITY_W * severity
                    + HYPO_TIME_W * hypo_time
                    + HYPO_TARGET_TIME_W * target_time,
                format!("HEIGHT TOO_STRONG: nadir={nadir:.2}"),
                tags,
            );
        }

        if s.time_below_target_min >= cfg.prolonged_below_target_min && s.duration_min > 0 {
            let ratio = clamp_unit(f64::from(s.time_below_target_min) / f64::from(s.duration_min));
            if ratio > cfg.prolonged_below_target_fraction {
                return obs(
                    HeightOutcome::TooStrong,
                    UNDERSHOOT_QUALITY_W * f.quality + UNDERSHOOT_RATIO_W * ratio,
                    format!("HEIGHT TOO_STRONG: prolonged below target {}m", s.time_below_target_min),
                    tags.clone(),
                );
            }
        }

        if f.peak > cfg.high_mmol {
            let overshoot = clamp_unit((f.peak - cfg.high_mmol) / OVERSHOOT_SPAN_MMOL);
            let mut base = TOO_HIGH_QUALITY_W * f.quality + TOO_HIGH_OVERSHOOT_W * overshoot;
            let late_peak = timing == TimingOutcome::LatePeakIntervention;
            let late = late_peak || timing == TimingOutcome::Late;
            if late {
                base *= cfg.late_timing_damping;
            }
            if late_peak {
                base *= cfg.late_peak_extra_damping;
            }
            if f.episode.missed_intervention {
                base *= cfg.missed_intervention_amplification;
            }
            let note = if late_peak {
                " (timing late-peak)"
            } else if late {
                " (timing late)"
            } else {
                ""
            };
            return obs(
                HeightOutcome::TooHigh,
                base,
                format!("HEIGHT TOO_HIGH{note}: peak={:.2}", f.peak),
                tags.clone(),
            );
        }

        obs(
            HeightOutcome::Ok,
            OK_QUALITY_W * f.quality,
            "HEIGHT OK".to_string(),
            tags.clone(),
        )
    }

    fn score_persistence(&self, f: &Facts<'_>, tags: &BTreeMap<String, String>) -> AxisObservation {
        let cfg = &self.config;
        let s = f.summary;
        let obs = |outcome: PersistenceOutcome, strength: f64, reason: String| {
            AxisObservation::new(
                f.episode.id,
                AxisOutcome::Persistence(outcome),
                strength,
                reason,
                tags.clone(),
            )
        };

        if f.peak <= cfg.high_mmol {
            return obs(
                PersistenceOutcome::Ok,
                OK_QUALITY_W * f.quality,
                format!("PERSISTENCE OK: peak<={:.2}", cfg.high_mmol),
            );
        }

        let low_enough = !cfg.too_long_requires_low_nadir
            || f.nadir.map_or(false, |n| n <= cfg.early_nadir_safety_mmol);
        if s.rebound_detected && low_enough {
            let depth = f.nadir.map_or(TOO_LONG_UNKNOWN_DEPTH, |n| {
                clamp_unit((cfg.early_nadir_safety_mmol - n) / NADIR_DEPTH_SPAN_MMOL)
            });
            return obs(
                PersistenceOutcome::TooLong,
                TOO_LONG_QUALITY_W * f.quality + TOO_LONG_DEPTH_W * depth,
                format!(
                    "PERSISTENCE TOO_LONG: rebound nadir={}",
                    f.nadir.map_or("?".to_string(), |n| format!("{n:.2}"))
                ),
            );
        }

        let too_short = s.time_above_high_min >= cfg.too_short_above_min;
        let above = if too_short {
            clamp_unit(f64::from(s.time_above_high_min - cfg.too_short_above_min) / TOO_SHORT_SPAN_MIN)
        } else {
            LATENESS_FLOOR
        };
        let outcome = if too_short {
            PersistenceOutcome::TooShort
        } else {
            PersistenceOutcome::Ok
        };
        obs(
            outcome,
            TOO_SHORT_QUALITY_W * f.quality
                + TOO_SHORT_PEAK_W * self.peak_signal(f.peak)
                + TOO_SHORT_ABOVE_W * above,
            format!(
                "PERSISTENCE {}: timeAbove={}m (tooShort>={}m) rebound={}",
                AxisOutcome::Persistence(outcome).as_str(),
                s.time_above_high_min,
                cfg.too_short_above_min,
                s.rebound_detected
            ),
        )
    }

    fn peak_signal(&self, peak: f64) -> f64 {
        clamp_unit((peak - self.config.high_mmol).max(0.0) / OVERSHOOT_SPAN_MMOL)
    }
}

struct Facts<'a> {
    episode: &'a Episode,
    summary: &'a EpisodeSummary,
    quality: f64,
    peak: f64,
    nadir: Option<f64>,
}
