#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wall-clock instant in milliseconds, as supplied by the host control loop.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MonotonicTimeMs(pub u64);

impl MonotonicTimeMs {
    pub const MS_PER_MINUTE: u64 = 60_000;

    pub fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(Self::MS_PER_MINUTE))
    }

    pub fn plus_minutes(self, minutes: u64) -> Self {
        Self(
            self.0
                .saturating_add(minutes.saturating_mul(Self::MS_PER_MINUTE)),
        )
    }

    /// Whole minutes elapsed from `earlier` to `self`. Negative when `earlier` is in the future.
    pub fn minutes_since(self, earlier: MonotonicTimeMs) -> i64 {
        if self.0 >= earlier.0 {
            ((self.0 - earlier.0) / Self::MS_PER_MINUTE) as i64
        } else {
            -(((earlier.0 - self.0) / Self::MS_PER_MINUTE) as i64)
        }
    }

    /// Fractional hours elapsed since `earlier`, clamped at zero.
    pub fn hours_since(self, earlier: MonotonicTimeMs) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / 3_600_000.0
    }
}

impl fmt::Display for MonotonicTimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("{field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("{field}: {got} outside {min}..={max}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    #[error("{field}: must be finite")]
    NotFinite { field: &'static str },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

/// Clamps into `[0, 1]`; non-finite input collapses to zero.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub(crate) fn validate_finite(field: &'static str, value: f64) -> Result<(), ContractViolation> {
    if !value.is_finite() {
        return Err(ContractViolation::NotFinite { field });
    }
    Ok(())
}

pub(crate) fn validate_unit_interval(
    field: &'static str,
    value: f64,
) -> Result<(), ContractViolation> {
    validate_finite(field, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ContractViolation::InvalidRange {
            field,
            min: 0.0,
            max: 1.0,
            got: value,
        });
    }
    Ok(())
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if value.chars().any(|c| c.is_control() && c != '\n') {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain control chars",
        });
    }
    Ok(())
}
