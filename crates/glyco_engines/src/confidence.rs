#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use glyco_kernel_contracts::axis::{
    Axis, AxisObservation, AxisOutcome, AxisSnapshot, AxisStatus, OutcomeShare,
};
use glyco_kernel_contracts::episode::EpisodeId;
use glyco_kernel_contracts::learning_state::{
    StoredEvidence, StoredLearningState, LEARNING_STATE_VERSION,
};
use glyco_kernel_contracts::tick::SettingsFingerprint;
use glyco_kernel_contracts::{clamp_unit, MonotonicTimeMs, Validate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    pub half_life_hours: f64,
    pub emit_threshold: f64,
    pub min_structural_episodes: u32,
    pub negligible_weight: f64,
    pub max_records: usize,
}

impl AccumulatorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            half_life_hours: 14.0 * 24.0,
            emit_threshold: 0.55,
            min_structural_episodes: 5,
            negligible_weight: 0.05,
            max_records: 2000,
        }
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Contribution {
    at: MonotonicTimeMs,
    episode_id: EpisodeId,
    strength: f64,
    weight: f64,
    is_night: bool,
}

/// Evidence for one (axis, outcome) pair. Contributions keep their raw weight
/// and are decayed on read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceBucket {
    contributions: VecDeque<Contribution>,
}

impl EvidenceBucket {
    pub fn weight_at(&self, now: MonotonicTimeMs, half_life_hours: f64) -> f64 {
        self.contributions
            .iter()
            .map(|c| c.weight * decay_factor(now, c.at, half_life_hours))
            .sum()
    }

    pub fn supporting_episodes(&self) -> usize {
        self.contributions
            .iter()
            .map(|c| c.episode_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn last_updated(&self) -> Option<MonotonicTimeMs> {
        self.contributions.iter().map(|c| c.at).max()
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }
}

fn decay_factor(now: MonotonicTimeMs, at: MonotonicTimeMs, half_life_hours: f64) -> f64 {
    if half_life_hours <= 0.0 || !half_life_hours.is_finite() {
        return 1.0;
    }
    0.5f64.powf(now.hours_since(at) / half_life_hours)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSignal {
    pub axis: Axis,
    pub outcome: AxisOutcome,
    pub confidence: f64,
    pub support_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { records: usize, skipped: usize },
    VersionMismatch { found: String },
}

#[derive(Debug, Clone)]
pub struct ConfidenceAccumulator {
    config: AccumulatorConfig,
    buckets: BTreeMap<AxisOutcome, EvidenceBucket>,
}

impl ConfidenceAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            buckets: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    pub fn emit_threshold(&self) -> f64 {
        self.config.emit_threshold
    }

    pub fn record_count(&self) -> usize {
        self.buckets.values().map(EvidenceBucket::len).sum()
    }

    pub fn bucket(&self, outcome: AxisOutcome) -> Option<&EvidenceBucket> {
        self.buckets.get(&outcome)
    }

    /// Adds one scored episode. Returns how many observations became evidence.
    pub fn ingest_episode(
        &mut self,
        now: MonotonicTimeMs,
        is_night: bool,
        episode_quality: f64,
        observations: &[AxisObservation],
        delivery_confidence: f64,
    ) -> usize {
        let delivery = clamp_unit(delivery_confidence);
        let quality = clamp_unit(episode_quality);
        let mut ingested = 0;
        for obs in observations {
            if obs.outcome.is_unknown() {
                continue;
            }
            let strength = clamp_unit(obs.signal_strength);
            let weight = strength * delivery * quality;
            if weight <= 0.0 {
                continue;
            }
            self.buckets
                .entry(obs.outcome)
                .or_default()
                .contributions
                .push_back(Contribution {
                    at: now,
                    episode_id: obs.episode_id,
                    strength,
                    weight,
                    is_night,
                });
            ingested += 1;
            debug!(
                episode_id = obs.episode_id.0,
                axis = obs.axis().as_str(),
                outcome = obs.outcome.as_str(),
                weight,
                "evidence ingested"
            );
        }
        self.enforce_record_cap();
        ingested
    }

    pub fn build_axis_snapshot(
        &self,
        now: MonotonicTimeMs,
        axis: Axis,
        emit_threshold: f64,
    ) -> AxisSnapshot {
        let half_life = self.config.half_life_hours;
        let mut total = 0.0;
        let mut non_ok: Vec<(AxisOutcome, f64, &EvidenceBucket)> = Vec::new();
        let mut seen: BTreeSet<EpisodeId> = BTreeSet::new();
        for (outcome, bucket) in self.buckets.iter().filter(|(o, _)| o.axis() == axis) {
            let w = bucket.weight_at(now, half_life);
            total += w;
            if !outcome.is_ok() {
                seen.extend(bucket.contributions.iter().map(|c| c.episode_id));
                non_ok.push((*outcome, w, bucket));
            }
        }

        let non_ok_total: f64 = non_ok.iter().map(|(_, w, _)| w).sum();
        let mut percentages: Vec<OutcomeShare> = if non_ok_total > 0.0 {
            non_ok
                .iter()
                .map(|(outcome, w, _)| OutcomeShare {
                    outcome: *outcome,
                    percent: 100.0 * w / non_ok_total,
                })
                .collect()
        } else {
            Vec::new()
        };
        percentages.sort_by(|a, b| b.percent.total_cmp(&a.percent));

        let mut snapshot = AxisSnapshot {
            axis,
            status: AxisStatus::NoDirection,
            episodes_seen: seen.len() as u32,
            dominant_outcome: None,
            dominant_confidence: 0.0,
            percentages,
        };

        // first maximum in outcome order wins ties
        let dominant = non_ok
            .iter()
            .fold(None::<&(AxisOutcome, f64, &EvidenceBucket)>, |best, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        let Some((outcome, weight, bucket)) = dominant else {
            return snapshot;
        };
        if total < self.config.negligible_weight || *weight < self.config.negligible_weight {
            return snapshot;
        }

        let confidence = clamp_unit(weight / total);
        snapshot.dominant_outcome = Some(*outcome);
        snapshot.dominant_confidence = confidence;
        let enough_episodes =
            bucket.supporting_episodes() as u32 >= self.config.min_structural_episodes;
        snapshot.status = if confidence >= emit_threshold && enough_episodes {
            AxisStatus::StructuralSignal
        } else {
            AxisStatus::WeakSignal
        };
        snapshot
    }

    pub fn build_snapshots(&self, now: MonotonicTimeMs) -> Vec<AxisSnapshot> {
        Axis::ALL
            .iter()
            .map(|axis| self.build_axis_snapshot(now, *axis, self.config.emit_threshold))
            .collect()
    }

    /// Structural axes only, strongest first.
    pub fn top_signals(&self, now: MonotonicTimeMs) -> Vec<TopSignal> {
        let mut out: Vec<TopSignal> = self
            .build_snapshots(now)
            .into_iter()
            .filter(|s| s.status == AxisStatus::StructuralSignal)
            .filter_map(|s| {
                let outcome = s.dominant_outcome?;
                let support_count = self
                    .buckets
                    .get(&outcome)
                    .map_or(0, EvidenceBucket::supporting_episodes)
                    as u32;
                Some(TopSignal {
                    axis: s.axis,
                    outcome,
                    confidence: s.dominant_confidence,
                    support_count,
                })
            })
            .collect();
        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        out
    }

    /// Clears one axis; the other axes keep their evidence.
    pub fn reset_axis(&mut self, axis: Axis) -> usize {
        let before = self.record_count();
        self.buckets.retain(|outcome, _| outcome.axis() != axis);
        let removed = before - self.record_count();
        info!(axis = axis.as_str(), removed, "axis evidence reset");
        removed
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn export_state(&self, now: MonotonicTimeMs) -> StoredLearningState {
        let mut evidence: Vec<StoredEvidence> = self
            .buckets
            .iter()
            .flat_map(|(outcome, bucket)| {
                bucket.contributions.iter().map(move |c| StoredEvidence {
                    at_millis: c.at,
                    episode_id: c.episode_id,
                    axis: outcome.axis(),
                    outcome: outcome.as_str().to_string(),
                    strength: c.strength,
                    weight: c.weight,
                    is_night: c.is_night,
                })
            })
            .collect();
        evidence.sort_by_key(|e| (e.at_millis, e.episode_id, e.axis));
        StoredLearningState {
            version: LEARNING_STATE_VERSION.to_string(),
            saved_at_millis: now,
            evidence,
            settings: SettingsFingerprint::default(),
        }
    }

    /// Replaces the ledger with `state`. A foreign version leaves the ledger empty.
    pub fn import_state(&mut self, state: &StoredLearningState) -> ImportOutcome {
        self.buckets.clear();
        if !state.is_current_version() {
            warn!(
                found = state.version.as_str(),
                expected = LEARNING_STATE_VERSION,
                "learning state version mismatch; starting empty"
            );
            return ImportOutcome::VersionMismatch {
                found: state.version.clone(),
            };
        }

        let mut records: Vec<(AxisOutcome, Contribution)> = Vec::with_capacity(state.evidence.len());
        let mut skipped = 0;
        for record in &state.evidence {
            let outcome = match (record.validate(), record.resolved_outcome()) {
                (Ok(()), Some(outcome)) => outcome,
                (result, _) => {
                    debug!(episode_id = record.episode_id.0, error = ?result.err(), "stored evidence skipped");
                    skipped += 1;
                    continue;
                }
            };
            records.push((
                outcome,
                Contribution {
                    at: record.at_millis,
                    episode_id: record.episode_id,
                    strength: clamp_unit(record.strength),
                    weight: record.weight,
                    is_night: record.is_night,
                },
            ));
        }
        records.sort_by_key(|(_, c)| (c.at, c.episode_id));
        for (outcome, contribution) in records {
            self.buckets
                .entry(outcome)
                .or_default()
                .contributions
                .push_back(contribution);
        }
        self.enforce_record_cap();
        let imported = self.record_count();
        info!(records = imported, skipped, "learning state imported");
        ImportOutcome::Imported {
            records: imported,
            skipped,
        }
    }

    fn enforce_record_cap(&mut self) {
        let mut count = self.record_count();
        while count > self.config.max_records {
            let oldest = self
                .buckets
                .iter()
                .filter_map(|(outcome, b)| b.contributions.front().map(|c| (c.at, *outcome)))
                .min();
            let Some((_, outcome)) = oldest else {
                break;
            };
            if let Some(bucket) = self.buckets.get_mut(&outcome) {
                bucket.contributions.pop_front();
                count -= 1;
                if bucket.is_empty() {
                    self.buckets.remove(&outcome);
                }
            }
        }
    }
}
