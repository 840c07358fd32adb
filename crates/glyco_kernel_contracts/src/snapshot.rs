#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::axis::AxisSnapshot;
use crate::episode::{Episode, EpisodeId, StartTrigger};
use crate::MonotonicTimeMs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    Observing,
    SignalPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryGateStatus {
    Trusted,
    Degraded,
    Untrusted,
}

impl DeliveryGateStatus {
    pub const TRUSTED_MIN: f64 = 0.8;
    pub const DEGRADED_MIN: f64 = 0.5;

    pub fn from_confidence(confidence: f64) -> Self {
        if !confidence.is_finite() {
            return DeliveryGateStatus::Untrusted;
        }
        if confidence >= Self::TRUSTED_MIN {
            DeliveryGateStatus::Trusted
        } else if confidence >= Self::DEGRADED_MIN {
            DeliveryGateStatus::Degraded
        } else {
            DeliveryGateStatus::Untrusted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistStatus {
    NotAttached,
    Saved,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerPhase {
    Idle,
    PendingRise,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEpisodeView {
    pub id: EpisodeId,
    pub phase: TrackerPhase,
    pub start_time: MonotonicTimeMs,
    pub start_trigger: StartTrigger,
    pub excluded: bool,
}

/// Read-only view of the learning core, rebuilt after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: MonotonicTimeMs,
    pub status: SnapshotStatus,
    pub total_episodes: u64,
    pub active_episode: Option<ActiveEpisodeView>,
    pub axes: Vec<AxisSnapshot>,
    pub recent_episodes: Vec<Episode>,
    pub last_delivery_confidence: f64,
    pub delivery_gate_status: DeliveryGateStatus,
    pub persist_status: PersistStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_snapshot_01_delivery_gate_bands() {
        assert_eq!(
            DeliveryGateStatus::from_confidence(0.8),
            DeliveryGateStatus::Trusted
        );
        assert_eq!(
            DeliveryGateStatus::from_confidence(0.79),
            DeliveryGateStatus::Degraded
        );
        assert_eq!(
            DeliveryGateStatus::from_confidence(0.5),
            DeliveryGateStatus::Degraded
        );
        assert_eq!(
            DeliveryGateStatus::from_confidence(0.1),
            DeliveryGateStatus::Untrusted
        );
        assert_eq!(
            DeliveryGateStatus::from_confidence(f64::NAN),
            DeliveryGateStatus::Untrusted
        );
    }
}
