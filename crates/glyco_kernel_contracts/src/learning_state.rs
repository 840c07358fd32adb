#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisOutcome};
use crate::common::validate_finite;
use crate::episode::EpisodeId;
use crate::tick::SettingsFingerprint;
use crate::{ContractViolation, MonotonicTimeMs, Validate};

pub const LEARNING_STATE_VERSION: &str = "v1";

/// One persisted evidence contribution. `outcome` is stored by name and
/// resolved against the vocabulary of `axis` on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvidence {
    pub at_millis: MonotonicTimeMs,
    pub episode_id: EpisodeId,
    pub axis: Axis,
    pub outcome: String,
    pub strength: f64,
    pub weight: f64,
    #[serde(default)]
    pub is_night: bool,
}

impl StoredEvidence {
    pub fn resolved_outcome(&self) -> Option<AxisOutcome> {
        AxisOutcome::parse(self.axis, &self.outcome)
    }
}

impl Validate for StoredEvidence {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_finite("stored_evidence.strength", self.strength)?;
        validate_finite("stored_evidence.weight", self.weight)?;
        if self.weight < 0.0 {
            return Err(ContractViolation::InvalidValue {
                field: "stored_evidence.weight",
                reason: "must be >= 0",
            });
        }
        match self.resolved_outcome() {
            None => Err(ContractViolation::InvalidValue {
                field: "stored_evidence.outcome",
                reason: "not in the vocabulary of stored_evidence.axis",
            }),
            Some(outcome) if outcome.is_unknown() => Err(ContractViolation::InvalidValue {
                field: "stored_evidence.outcome",
                reason: "UNKNOWN outcomes are never stored",
            }),
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLearningState {
    pub version: String,
    pub saved_at_millis: MonotonicTimeMs,
    pub evidence: Vec<StoredEvidence>,
    /// Settings the evidence was gathered under. Blobs written before this
    /// field existed read back with every key unknown.
    #[serde(default)]
    pub settings: SettingsFingerprint,
}

impl StoredLearningState {
    pub fn is_current_version(&self) -> bool {
        self.version == LEARNING_STATE_VERSION
    }
}

impl Validate for StoredLearningState {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.version.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "stored_learning_state.version",
                reason: "must not be empty",
            });
        }
        for record in &self.evidence {
            record.validate()?;
        }
        self.settings.validate()
    }
}
