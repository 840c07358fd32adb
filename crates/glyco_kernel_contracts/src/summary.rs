#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_finite;
use crate::{ContractViolation, Validate};

/// Fact sheet reduced from a finished episode's glucose/insulin series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub peak_glucose_mmol: Option<f64>,
    pub nadir_glucose_mmol: Option<f64>,
    pub minutes_to_first_insulin: Option<u32>,
    pub time_above_high_min: u32,
    pub time_below_target_min: u32,
    pub time_below_hypo_min: u32,
    pub duration_min: u32,
    pub rebound_detected: bool,
    pub predicted_peak_at_start: Option<f64>,
    pub peak_prediction_error: Option<f64>,
    /// Minutes from start to first insulin divided by minutes from start to peak.
    /// Values at or above 1.0 mean insulin arrived at or after the peak.
    pub phase_of_first_insulin: Option<f64>,
}

impl Validate for EpisodeSummary {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (field, value) in [
            ("episode_summary.peak_glucose_mmol", self.peak_glucose_mmol),
            ("episode_summary.nadir_glucose_mmol", self.nadir_glucose_mmol),
            (
                "episode_summary.predicted_peak_at_start",
                self.predicted_peak_at_start,
            ),
            (
                "episode_summary.peak_prediction_error",
                self.peak_prediction_error,
            ),
            (
                "episode_summary.phase_of_first_insulin",
                self.phase_of_first_insulin,
            ),
        ] {
            if let Some(v) = value {
                validate_finite(field, v)?;
            }
        }
        if let (Some(peak), Some(nadir)) = (self.peak_glucose_mmol, self.nadir_glucose_mmol) {
            if peak < nadir {
                return Err(ContractViolation::InvalidValue {
                    field: "episode_summary.peak_glucose_mmol",
                    reason: "must be >= nadir_glucose_mmol",
                });
            }
        }
        if let Some(phase) = self.phase_of_first_insulin {
            if phase < 0.0 {
                return Err(ContractViolation::InvalidValue {
                    field: "episode_summary.phase_of_first_insulin",
                    reason: "must be >= 0",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_summary_01_peak_below_nadir_is_rejected() {
        let summary = EpisodeSummary {
            peak_glucose_mmol: Some(5.0),
            nadir_glucose_mmol: Some(6.0),
            ..EpisodeSummary::default()
        };
        assert!(summary.validate().is_err());
    }

    #[test]
    fn at_summary_02_non_finite_fact_is_rejected() {
        let summary = EpisodeSummary {
            peak_glucose_mmol: Some(f64::NAN),
            ..EpisodeSummary::default()
        };
        assert_eq!(
            summary.validate(),
            Err(ContractViolation::NotFinite {
                field: "episode_summary.peak_glucose_mmol"
            })
        );
    }
}
