#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, MonotonicTimeMs, Validate};

/// Configuration keys whose change invalidates the evidence of one axis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFingerprint {
    pub profile: Option<String>,
    pub meal_detect_speed: Option<String>,
    pub correction_style: Option<String>,
}

impl Validate for SettingsFingerprint {
    fn validate(&self) -> Result<(), ContractViolation> {
        for (field, value) in [
            ("settings_fingerprint.profile", &self.profile),
            (
                "settings_fingerprint.meal_detect_speed",
                &self.meal_detect_speed,
            ),
            (
                "settings_fingerprint.correction_style",
                &self.correction_style,
            ),
        ] {
            if let Some(v) = value {
                validate_text(field, v, 64)?;
            }
        }
        Ok(())
    }
}

/// Facts supplied by the host for one 5-minute control cycle.
///
/// Readings are kept as raw `f64`: non-finite values are legal here and are
/// dropped by the consumers for that tick only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickInput {
    pub now: MonotonicTimeMs,
    pub is_night: bool,
    pub meal_intent_active: bool,
    pub rescue_confirmed: bool,
    pub downtrend_locked: bool,
    pub manual_bolus: bool,
    pub glucose_mmol: f64,
    pub target_mmol: f64,
    pub iob_u: f64,
    pub slope_mmol_per_h: f64,
    pub accel_mmol_per_h2: f64,
    pub trend_consistency: f64,
    pub commanded_dose_u: f64,
    pub max_bolus_u: f64,
    pub predicted_peak_mmol: Option<f64>,
    pub delivery_confidence: f64,
    pub settings: SettingsFingerprint,
}

impl Default for TickInput {
    fn default() -> Self {
        Self {
            now: MonotonicTimeMs(0),
            is_night: false,
            meal_intent_active: false,
            rescue_confirmed: false,
            downtrend_locked: false,
            manual_bolus: false,
            glucose_mmol: f64::NAN,
            target_mmol: 5.5,
            iob_u: 0.0,
            slope_mmol_per_h: 0.0,
            accel_mmol_per_h2: 0.0,
            trend_consistency: 0.0,
            commanded_dose_u: 0.0,
            max_bolus_u: 0.0,
            predicted_peak_mmol: None,
            delivery_confidence: 1.0,
            settings: SettingsFingerprint::default(),
        }
    }
}

impl TickInput {
    pub fn glucose(&self) -> Option<f64> {
        finite_positive(self.glucose_mmol)
    }

    pub fn dose(&self) -> Option<f64> {
        if self.commanded_dose_u.is_finite() && self.commanded_dose_u >= 0.0 {
            Some(self.commanded_dose_u)
        } else {
            None
        }
    }

    pub fn iob(&self) -> Option<f64> {
        if self.iob_u.is_finite() {
            Some(self.iob_u.max(0.0))
        } else {
            None
        }
    }
}

fn finite_positive(value: f64) -> Option<f64> {
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_tick_01_non_finite_readings_are_absent() {
        let tick = TickInput {
            glucose_mmol: f64::NAN,
            commanded_dose_u: f64::INFINITY,
            iob_u: -0.3,
            ..TickInput::default()
        };
        assert_eq!(tick.glucose(), None);
        assert_eq!(tick.dose(), None);
        assert_eq!(tick.iob(), Some(0.0));
    }

    #[test]
    fn at_tick_02_partial_json_uses_defaults() {
        let tick: TickInput =
            serde_json::from_str(r#"{"now":600000,"glucose_mmol":7.2,"settings":{"profile":"A"}}"#)
                .unwrap();
        assert_eq!(tick.glucose(), Some(7.2));
        assert_eq!(tick.delivery_confidence, 1.0);
        assert_eq!(tick.settings.profile.as_deref(), Some("A"));
        assert!(tick.settings.validate().is_ok());
    }
}
