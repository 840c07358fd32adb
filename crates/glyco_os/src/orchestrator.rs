#![forbid(unsafe_code)]

use std::collections::VecDeque;

use glyco_engines::advice_emitter::AdviceEmitter;
use glyco_engines::axis_scorer::{AxisScorer, AxisScorerConfig};
use glyco_engines::confidence::{AccumulatorConfig, ConfidenceAccumulator, ImportOutcome};
use glyco_engines::episode_summary::{
    EpisodeSummarizer, SeriesSample, TickSeriesSummarizer, TickSeriesSummarizerConfig,
};
use glyco_engines::episode_tracker::{EpisodeTracker, EpisodeTrackerConfig, TrackerTick};
use glyco_engines::learning_adjuster::{AdviceBook, LearningAdjuster};
use glyco_engines::meal_intent::{MealIntentHolder, MealIntentSource};
use glyco_kernel_contracts::advice::{AdviceBundle, LearningPhase};
use glyco_kernel_contracts::axis::{AxisObservation, AxisStatus};
use glyco_kernel_contracts::episode::{Episode, EpisodeEvent, EpisodeId};
use glyco_kernel_contracts::snapshot::{
    DeliveryGateStatus, PersistStatus, Snapshot, SnapshotStatus,
};
use glyco_kernel_contracts::summary::EpisodeSummary;
use glyco_kernel_contracts::tick::TickInput;
use glyco_kernel_contracts::{clamp_unit, MonotonicTimeMs};
use glyco_storage::{LearningStore, RestoreOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::settings_watch::SettingsWatch;

const SERIES_MAX_AGE_MIN: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsOrchestratorConfig {
    pub recent_episodes: usize,
    pub debug_trail: usize,
    pub series_capacity: usize,
    pub learning_phase: LearningPhase,
    pub tracker: EpisodeTrackerConfig,
    pub scorer: AxisScorerConfig,
    pub accumulator: AccumulatorConfig,
    pub summarizer: TickSeriesSummarizerConfig,
}

impl ObsOrchestratorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            recent_episodes: 7,
            debug_trail: 7,
            series_capacity: 288,
            learning_phase: LearningPhase::TimingOnly,
            tracker: EpisodeTrackerConfig::mvp_v1(),
            scorer: AxisScorerConfig::mvp_v1(),
            accumulator: AccumulatorConfig::mvp_v1(),
            summarizer: TickSeriesSummarizerConfig::mvp_v1(),
        }
    }
}

impl Default for ObsOrchestratorConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

/// Observations produced for one finished episode, kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEpisode {
    pub episode_id: EpisodeId,
    pub finished_at: MonotonicTimeMs,
    pub excluded: bool,
    pub ingested: usize,
    pub observations: Vec<AxisObservation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColdStartReason {
    Absent,
    VersionMismatch { found: String },
    Corrupt { reason: String },
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearningRestore {
    Restored { records: usize, skipped: usize },
    ColdStart(ColdStartReason),
}

/// Per-tick wiring of tracker, summarizer, scorer, accumulator and emitter.
///
/// Owns all learning state. Nothing in here can fail the caller's control
/// cycle: every error ends as a log line and "no advice this cycle".
#[derive(Debug)]
pub struct ObsOrchestrator<M = MealIntentHolder, S = TickSeriesSummarizer>
where
    M: MealIntentSource,
    S: EpisodeSummarizer,
{
    config: ObsOrchestratorConfig,
    tracker: EpisodeTracker,
    summarizer: S,
    scorer: AxisScorer,
    accumulator: ConfidenceAccumulator,
    emitter: AdviceEmitter,
    meal_intent: M,
    settings: SettingsWatch,
    advice_book: AdviceBook,
    store: Option<LearningStore>,
    persist_status: PersistStatus,
    series: VecDeque<SeriesSample>,
    recent: VecDeque<Episode>,
    trail: VecDeque<ScoredEpisode>,
    predicted_peak_at_start: Option<f64>,
    last_tick_at: MonotonicTimeMs,
    last_delivery_confidence: f64,
}

impl ObsOrchestrator {
    pub fn new(config: ObsOrchestratorConfig) -> Self {
        let summarizer = TickSeriesSummarizer::new(config.summarizer.clone());
        Self::with_parts(config, MealIntentHolder::new(), summarizer)
    }
}

impl<M, S> ObsOrchestrator<M, S>
where
    M: MealIntentSource,
    S: EpisodeSummarizer,
{
    pub fn with_parts(config: ObsOrchestratorConfig, meal_intent: M, summarizer: S) -> Self {
        Self {
            tracker: EpisodeTracker::new(config.tracker.clone()),
            scorer: AxisScorer::new(config.scorer.clone()),
            accumulator: ConfidenceAccumulator::new(config.accumulator.clone()),
            emitter: AdviceEmitter::new(),
            summarizer,
            meal_intent,
            settings: SettingsWatch::new(),
            advice_book: AdviceBook::new(),
            store: None,
            persist_status: PersistStatus::NotAttached,
            series: VecDeque::new(),
            recent: VecDeque::new(),
            trail: VecDeque::new(),
            predicted_peak_at_start: None,
            last_tick_at: MonotonicTimeMs(0),
            last_delivery_confidence: 1.0,
            config,
        }
    }

    pub fn config(&self) -> &ObsOrchestratorConfig {
        &self.config
    }

    pub fn meal_intent(&self) -> &M {
        &self.meal_intent
    }

    pub fn meal_intent_mut(&mut self) -> &mut M {
        &mut self.meal_intent
    }

    pub fn accumulator(&self) -> &ConfidenceAccumulator {
        &self.accumulator
    }

    pub fn advice_book(&self) -> &AdviceBook {
        &self.advice_book
    }

    pub fn adjuster(&self) -> LearningAdjuster<&AdviceBook> {
        LearningAdjuster::new(&self.advice_book, self.config.learning_phase)
    }

    pub fn debug_trail(&self) -> impl Iterator<Item = &ScoredEpisode> {
        self.trail.iter()
    }

    pub fn recent_episodes(&self) -> impl Iterator<Item = &Episode> {
        self.recent.iter()
    }

    /// Restores evidence from `store` and keeps it for later saves. Anything
    /// short of a clean restore is a cold start; in-memory evidence is kept.
    pub fn attach_learning_store(&mut self, store: LearningStore) -> LearningRestore {
        let restore = match store.restore() {
            Ok(RestoreOutcome::Restored(state)) => match self.accumulator.import_state(&state) {
                ImportOutcome::Imported { records, skipped } => {
                    self.settings.seed(&state.settings);
                    self.rebuild_advice(state.saved_at_millis);
                    self.persist_status = PersistStatus::Saved;
                    LearningRestore::Restored { records, skipped }
                }
                ImportOutcome::VersionMismatch { found } => {
                    LearningRestore::ColdStart(ColdStartReason::VersionMismatch { found })
                }
            },
            Ok(RestoreOutcome::Absent) => LearningRestore::ColdStart(ColdStartReason::Absent),
            Ok(RestoreOutcome::VersionMismatch { found }) => {
                LearningRestore::ColdStart(ColdStartReason::VersionMismatch { found })
            }
            Ok(RestoreOutcome::Corrupt { reason }) => {
                LearningRestore::ColdStart(ColdStartReason::Corrupt { reason })
            }
            Err(err) => {
                warn!(error = %err, "learning store unreadable");
                LearningRestore::ColdStart(ColdStartReason::Unreadable {
                    reason: err.to_string(),
                })
            }
        };
        info!(?restore, "learning store attached");
        self.store = Some(store);
        restore
    }

    pub fn detach_learning_store(&mut self) -> Option<LearningStore> {
        self.persist_status = PersistStatus::NotAttached;
        self.store.take()
    }

    /// Forgets all evidence and advice, including the persisted blob.
    pub fn reset_learning(&mut self) {
        self.accumulator.clear();
        self.advice_book = AdviceBook::new();
        self.trail.clear();
        if let Some(store) = self.store.as_mut() {
            match store.clear() {
                Ok(()) => self.persist_status = PersistStatus::Saved,
                Err(err) => {
                    warn!(error = %err, "learning store could not be cleared");
                    self.persist_status = PersistStatus::Failed;
                }
            }
        }
        info!("learning reset");
    }

    pub fn on_five_minute_tick(&mut self, tick: &TickInput) -> Option<AdviceBundle> {
        let now = tick.now;
        self.last_tick_at = now;
        self.last_delivery_confidence = if tick.delivery_confidence.is_finite() {
            clamp_unit(tick.delivery_confidence)
        } else {
            0.0
        };

        let changed = self.settings.observe(&tick.settings);
        if !changed.is_empty() {
            for axis in changed {
                self.accumulator.reset_axis(axis);
                let withdrawn = self.advice_book.forget_axis(axis);
                debug!(axis = axis.as_str(), withdrawn, "advice withdrawn");
            }
            self.persist(now);
        }

        self.record_sample(tick);

        let meal_intent_active =
            tick.meal_intent_active || self.meal_intent.active_at(now).is_some();
        let tracker_tick = TrackerTick {
            now,
            is_night: tick.is_night,
            meal_intent_active,
            rescue_confirmed: tick.rescue_confirmed,
            downtrend_locked: tick.downtrend_locked,
            manual_bolus: tick.manual_bolus,
            glucose_mmol: tick.glucose(),
            iob_u: tick.iob(),
            dose_u: tick.dose(),
            max_bolus_u: tick.max_bolus_u,
            trend_consistency: tick.trend_consistency,
        };

        match self.tracker.on_tick(&tracker_tick)? {
            EpisodeEvent::Started(episode) => {
                self.predicted_peak_at_start = tick.predicted_peak_mmol.filter(|p| p.is_finite());
                debug!(episode_id = episode.id.0, "episode open");
                None
            }
            EpisodeEvent::Finished(episode) => self.on_episode_finished(episode, now),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let now = self.last_tick_at;
        let axes = self.accumulator.build_snapshots(now);
        let status = if axes
            .iter()
            .any(|a| a.status == AxisStatus::StructuralSignal)
        {
            SnapshotStatus::SignalPresent
        } else {
            SnapshotStatus::Observing
        };
        Snapshot {
            created_at: now,
            status,
            total_episodes: self.tracker.total_episodes(),
            active_episode: self.tracker.active_view(),
            axes,
            recent_episodes: self.recent.iter().cloned().collect(),
            last_delivery_confidence: self.last_delivery_confidence,
            delivery_gate_status: DeliveryGateStatus::from_confidence(
                self.last_delivery_confidence,
            ),
            persist_status: self.persist_status,
        }
    }

    fn record_sample(&mut self, tick: &TickInput) {
        let glucose = tick.glucose();
        let dose = tick.dose().unwrap_or(0.0);
        if glucose.is_some() || dose > 0.0 {
            self.series.push_back(SeriesSample {
                at: tick.now,
                glucose_mmol: glucose.unwrap_or(f64::NAN),
                target_mmol: tick.target_mmol,
                dose_u: dose,
            });
        }
        while self.series.len() > self.config.series_capacity {
            self.series.pop_front();
        }
        while self
            .series
            .front()
            .map_or(false, |s| tick.now.minutes_since(s.at) > SERIES_MAX_AGE_MIN)
        {
            self.series.pop_front();
        }
    }

    fn on_episode_finished(
        &mut self,
        episode: Episode,
        now: MonotonicTimeMs,
    ) -> Option<AdviceBundle> {
        self.recent.push_back(episode.clone());
        while self.recent.len() > self.config.recent_episodes {
            self.recent.pop_front();
        }

        let predicted_peak = self.predicted_peak_at_start.take();
        let series = self.series.make_contiguous();
        let summary = match self.summarizer.summarize(&episode, series, predicted_peak) {
            Ok(summary) => summary,
            Err(err) if episode.excluded => {
                debug!(episode_id = episode.id.0, error = %err, "excluded episode has no summary");
                EpisodeSummary::default()
            }
            Err(err) => {
                warn!(episode_id = episode.id.0, error = %err, "episode summary failed; no advice this cycle");
                return None;
            }
        };

        let observations = self.scorer.score(&episode, &summary);
        let ingested = if episode.excluded {
            0
        } else {
            self.accumulator.ingest_episode(
                now,
                episode.is_night,
                episode.quality_score,
                &observations,
                self.last_delivery_confidence,
            )
        };
        self.remember(ScoredEpisode {
            episode_id: episode.id,
            finished_at: now,
            excluded: episode.excluded,
            ingested,
            observations,
        });

        if episode.excluded {
            info!(
                episode_id = episode.id.0,
                reason = episode.exclusion_reason.map_or("UNSPECIFIED", |r| r.as_str()),
                "excluded episode not learned from"
            );
            return None;
        }
        self.persist(now);

        let top = self.accumulator.top_signals(now);
        if top.is_empty() {
            return Some(AdviceBundle::debug_only(now, self.debug_summary(&episode, now)));
        }
        let bundle = self.emitter.emit(now, &top);
        self.advice_book.absorb(&bundle);
        info!(
            episode_id = episode.id.0,
            advices = bundle.advices.len(),
            "advice emitted"
        );
        Some(bundle)
    }

    fn remember(&mut self, scored: ScoredEpisode) {
        self.trail.push_back(scored);
        while self.trail.len() > self.config.debug_trail {
            self.trail.pop_front();
        }
    }

    fn debug_summary(&self, episode: &Episode, now: MonotonicTimeMs) -> String {
        let mut out = format!("[OBS] Episode {} finished. Buckets:", episode.id);
        for axis in self.accumulator.build_snapshots(now) {
            match axis.dominant_outcome {
                Some(outcome) => out.push_str(&format!(
                    "\n - {}: top={} conf={:.2} n={}",
                    axis.axis.as_str(),
                    outcome.as_str(),
                    axis.dominant_confidence,
                    axis.episodes_seen
                )),
                None => out.push_str(&format!("\n - {}: (no evidence)", axis.axis.as_str())),
            }
        }
        out
    }

    /// Re-derives the standing advice from restored evidence. No bundle is
    /// returned to the caller; the adjuster simply sees the hints again.
    fn rebuild_advice(&mut self, at: MonotonicTimeMs) {
        let top = self.accumulator.top_signals(at);
        if top.is_empty() {
            return;
        }
        let bundle = self.emitter.emit(at, &top);
        if self.advice_book.absorb(&bundle) {
            info!(advices = bundle.advices.len(), "advice rebuilt from saved evidence");
        }
    }

    fn persist(&mut self, now: MonotonicTimeMs) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let mut state = self.accumulator.export_state(now);
        state.settings = self.settings.last_seen().clone();
        match store.save(&state) {
            Ok(()) => self.persist_status = PersistStatus::Saved,
            Err(err) => {
                warn!(error = %err, "learning not saved this cycle");
                self.persist_status = PersistStatus::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyco_engines::learning_adjuster::LearningAdvisor;
    use glyco_kernel_contracts::advice::LearningParameter;
    use glyco_kernel_contracts::axis::{Axis, AxisOutcome, TimingOutcome};
    use glyco_kernel_contracts::episode::{ExclusionReason, StartTrigger};
    use glyco_kernel_contracts::meal::MealIntentType;
    use glyco_kernel_contracts::snapshot::TrackerPhase;
    use glyco_kernel_contracts::tick::SettingsFingerprint;
    use glyco_storage::{InMemoryLearningSlot, LearningSlot, StorageError};

    const LATE: AxisOutcome = AxisOutcome::Timing(TimingOutcome::Late);

    #[derive(Debug)]
    struct FailingSlot;

    impl LearningSlot for FailingSlot {
        fn read(&self) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn write(&mut self, _payload: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        fn clear(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn settings(speed: &str) -> SettingsFingerprint {
        SettingsFingerprint {
            profile: Some("default".to_string()),
            meal_detect_speed: Some(speed.to_string()),
            correction_style: Some("soft".to_string()),
        }
    }

    fn tick(minute: u64, glucose: f64) -> TickInput {
        TickInput {
            now: MonotonicTimeMs::from_minutes(minute),
            glucose_mmol: glucose,
            target_mmol: 5.5,
            trend_consistency: 0.8,
            max_bolus_u: 1.0,
            settings: settings("normal"),
            ..TickInput::default()
        }
    }

    /// Flat glucose, a rise at +30 and no insulin: the episode times out at
    /// +70 as a missed intervention. Returns the result of the finishing tick.
    fn run_missed_rise(
        orch: &mut ObsOrchestrator,
        base: u64,
        edit: impl Fn(&mut TickInput),
    ) -> Option<AdviceBundle> {
        for m in (0..30).step_by(5) {
            let mut t = tick(base + m, 6.0);
            edit(&mut t);
            assert!(orch.on_five_minute_tick(&t).is_none());
        }
        let rising = [7.2, 7.8, 8.6, 9.4, 10.2, 11.0, 11.6, 12.0];
        for (i, g) in rising.iter().enumerate() {
            let mut t = tick(base + 30 + 5 * i as u64, *g);
            edit(&mut t);
            assert!(orch.on_five_minute_tick(&t).is_none());
        }
        let mut t = tick(base + 70, 12.2);
        edit(&mut t);
        orch.on_five_minute_tick(&t)
    }

    #[test]
    fn at_orch_01_missed_intervention_scores_late_timing() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let bundle = run_missed_rise(&mut orch, 0, |_| {}).unwrap();

        assert!(!bundle.has_advice());
        assert!(bundle.debug_summary.starts_with("[OBS] Episode #1 finished."));
        assert!(bundle.debug_summary.contains("TIMING: top=LATE"));

        let snap = orch.snapshot();
        assert_eq!(snap.total_episodes, 1);
        assert_eq!(snap.recent_episodes.len(), 1);
        assert!(snap.recent_episodes[0].missed_intervention);
        assert_eq!(snap.recent_episodes[0].start_trigger, StartTrigger::Rise);
        assert_eq!(snap.status, SnapshotStatus::Observing);
        assert_eq!(snap.persist_status, PersistStatus::NotAttached);
        let timing = &snap.axes[0];
        assert_eq!(timing.axis, Axis::Timing);
        assert_eq!(timing.dominant_outcome, Some(LATE));
        assert_eq!(timing.status, AxisStatus::WeakSignal);
        assert_eq!(orch.accumulator().bucket(LATE).map(|b| b.len()), Some(1));
    }

    #[test]
    fn at_orch_02_excluded_episode_is_scored_but_not_learned() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let out = run_missed_rise(&mut orch, 0, |t| {
            if t.now == MonotonicTimeMs::from_minutes(40) {
                t.rescue_confirmed = true;
            }
        });

        assert!(out.is_none());
        assert_eq!(orch.accumulator().record_count(), 0);
        let trail: Vec<&ScoredEpisode> = orch.debug_trail().collect();
        assert_eq!(trail.len(), 1);
        assert!(trail[0].excluded);
        assert_eq!(trail[0].ingested, 0);
        assert_eq!(trail[0].observations.len(), 1);
        assert!(trail[0].observations[0].outcome.is_unknown());
        let recent: Vec<&Episode> = orch.recent_episodes().collect();
        assert_eq!(
            recent[0].exclusion_reason,
            Some(ExclusionReason::RescueConfirmed)
        );
    }

    #[test]
    fn at_orch_03_setting_change_resets_only_its_axis() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        run_missed_rise(&mut orch, 0, |_| {}).unwrap();
        let before = orch.accumulator().record_count();
        let late = orch.accumulator().bucket(LATE).map_or(0, |b| b.len());
        assert!(late > 0);

        let mut t = tick(80, 9.0);
        t.settings = settings("fast");
        assert!(orch.on_five_minute_tick(&t).is_none());

        assert!(orch.accumulator().bucket(LATE).is_none());
        assert_eq!(orch.accumulator().record_count(), before - late);
        assert_eq!(orch.snapshot().axes[0].status, AxisStatus::NoDirection);
    }

    #[test]
    fn at_orch_04_failing_store_degrades_to_unsaved() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let restore = orch.attach_learning_store(LearningStore::new(Box::new(FailingSlot)));
        assert_eq!(restore, LearningRestore::ColdStart(ColdStartReason::Absent));

        let bundle = run_missed_rise(&mut orch, 0, |_| {});
        assert!(bundle.is_some());
        assert_eq!(orch.snapshot().persist_status, PersistStatus::Failed);
        assert!(orch.accumulator().record_count() > 0);
    }

    #[test]
    fn at_orch_05_evidence_survives_restart() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        orch.attach_learning_store(LearningStore::in_memory());
        run_missed_rise(&mut orch, 0, |_| {}).unwrap();
        assert_eq!(orch.snapshot().persist_status, PersistStatus::Saved);
        let records = orch.accumulator().record_count();
        let store = orch.detach_learning_store().unwrap();

        let mut restarted = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        assert_eq!(
            restarted.attach_learning_store(store),
            LearningRestore::Restored {
                records,
                skipped: 0
            }
        );
        let before = orch.accumulator().build_snapshots(MonotonicTimeMs::from_minutes(70));
        let after = restarted
            .accumulator()
            .build_snapshots(MonotonicTimeMs::from_minutes(70));
        assert_eq!(before, after);
    }

    #[test]
    fn at_orch_06_corrupt_blob_is_cold_start() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let store = LearningStore::new(Box::new(InMemoryLearningSlot::with_payload("{torn")));
        assert!(matches!(
            orch.attach_learning_store(store),
            LearningRestore::ColdStart(ColdStartReason::Corrupt { .. })
        ));
        assert_eq!(orch.accumulator().record_count(), 0);
    }

    #[test]
    fn at_orch_07_structural_timing_drives_adjuster() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let mut last = None;
        for k in 0..5 {
            last = run_missed_rise(&mut orch, k * 200, |_| {});
        }
        let bundle = last.unwrap();
        assert!(bundle.has_advice());
        assert!(bundle.debug_summary.starts_with("[OBS] advice:"));
        assert_eq!(orch.snapshot().status, SnapshotStatus::SignalPresent);

        let hint = orch
            .advice_book()
            .advice_for(LearningParameter::UncertainMinFraction, false)
            .unwrap();
        assert_eq!(hint.outcome, LATE);

        let adjuster = orch.adjuster();
        let m = adjuster.multiplier(LearningParameter::UncertainMinFraction, false);
        assert!((m - 1.15).abs() < 1e-9);
        let c = adjuster.multiplier(LearningParameter::CommitIobPower, false);
        assert!((c - 0.85).abs() < 1e-9);
        assert_eq!(adjuster.multiplier(LearningParameter::KDelta, false), 1.0);
    }

    #[test]
    fn at_orch_08_meal_intent_holder_opens_episode() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        orch.on_five_minute_tick(&tick(0, 6.0));
        orch.meal_intent_mut()
            .set(MealIntentType::Normal, 60, MonotonicTimeMs::from_minutes(3));
        orch.on_five_minute_tick(&tick(5, 6.1));

        let active = orch.snapshot().active_episode.unwrap();
        assert_eq!(active.phase, TrackerPhase::PendingRise);
        assert_eq!(active.start_trigger, StartTrigger::MealIntent);
    }

    #[test]
    fn at_orch_09_delivery_confidence_gates_snapshot() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let mut t = tick(0, 6.0);
        t.delivery_confidence = 0.6;
        orch.on_five_minute_tick(&t);
        assert_eq!(
            orch.snapshot().delivery_gate_status,
            DeliveryGateStatus::Degraded
        );
        t.now = MonotonicTimeMs::from_minutes(5);
        t.delivery_confidence = f64::NAN;
        orch.on_five_minute_tick(&t);
        let snap = orch.snapshot();
        assert_eq!(snap.last_delivery_confidence, 0.0);
        assert_eq!(snap.delivery_gate_status, DeliveryGateStatus::Untrusted);
    }

    #[test]
    fn at_orch_10_partial_config_json_uses_defaults() {
        let config: ObsOrchestratorConfig =
            serde_json::from_str(r#"{"recent_episodes":3,"accumulator":{"emit_threshold":0.7}}"#)
                .unwrap();
        assert_eq!(config.recent_episodes, 3);
        assert_eq!(config.series_capacity, 288);
        assert_eq!(config.accumulator.emit_threshold, 0.7);
        assert_eq!(config.accumulator.min_structural_episodes, 5);
    }

    #[test]
    fn at_orch_11_reset_learning_clears_store() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        orch.attach_learning_store(LearningStore::in_memory());
        run_missed_rise(&mut orch, 0, |_| {}).unwrap();
        orch.reset_learning();
        assert_eq!(orch.accumulator().record_count(), 0);
        let store = orch.detach_learning_store().unwrap();
        assert_eq!(store.restore().unwrap(), RestoreOutcome::Absent);
    }

    #[test]
    fn at_orch_12_setting_change_withdraws_advice() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        for k in 0..5 {
            run_missed_rise(&mut orch, k * 200, |_| {});
        }
        let m = orch
            .adjuster()
            .multiplier(LearningParameter::UncertainMinFraction, false);
        assert!((m - 1.15).abs() < 1e-9);

        let mut t = tick(4 * 200 + 80, 9.0);
        t.settings = settings("fast");
        assert!(orch.on_five_minute_tick(&t).is_none());

        assert!(orch
            .advice_book()
            .advice_for(LearningParameter::UncertainMinFraction, false)
            .is_none());
        let adjuster = orch.adjuster();
        assert_eq!(
            adjuster.multiplier(LearningParameter::UncertainMinFraction, false),
            1.0
        );
        assert_eq!(adjuster.multiplier(LearningParameter::CommitIobPower, false), 1.0);
        assert_eq!(orch.snapshot().axes[0].status, AxisStatus::NoDirection);
    }

    #[test]
    fn at_orch_13_restart_restores_standing_advice() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        orch.attach_learning_store(LearningStore::in_memory());
        for k in 0..5 {
            run_missed_rise(&mut orch, k * 200, |_| {});
        }
        let store = orch.detach_learning_store().unwrap();

        let mut restarted = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        assert!(matches!(
            restarted.attach_learning_store(store),
            LearningRestore::Restored { .. }
        ));
        for param in [
            LearningParameter::UncertainMinFraction,
            LearningParameter::CommitIobPower,
        ] {
            let before = orch.adjuster().multiplier(param, false);
            let after = restarted.adjuster().multiplier(param, false);
            assert_ne!(before, 1.0);
            assert!((before - after).abs() < 1e-9);
        }
    }

    #[test]
    fn at_orch_14_setting_changed_while_down_resets_axis() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        orch.attach_learning_store(LearningStore::in_memory());
        run_missed_rise(&mut orch, 0, |_| {}).unwrap();
        let store = orch.detach_learning_store().unwrap();
        match store.restore().unwrap() {
            RestoreOutcome::Restored(state) => {
                assert_eq!(state.settings, settings("normal"));
            }
            other => panic!("unexpected restore outcome: {other:?}"),
        }

        let mut restarted = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        restarted.attach_learning_store(store);
        assert!(restarted.accumulator().bucket(LATE).is_some());

        let mut t = tick(80, 9.0);
        t.settings = settings("fast");
        assert!(restarted.on_five_minute_tick(&t).is_none());
        assert!(restarted.accumulator().bucket(LATE).is_none());
    }
}
