#![forbid(unsafe_code)]

use std::collections::VecDeque;

use glyco_kernel_contracts::episode::{
    Episode, EpisodeEvent, EpisodeId, ExclusionReason, StartTrigger,
};
use glyco_kernel_contracts::snapshot::{ActiveEpisodeView, TrackerPhase};
use glyco_kernel_contracts::{clamp_unit, MonotonicTimeMs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeTrackerConfig {
    pub insulin_window_min: i64,
    pub glucose_ring_ticks: usize,
    pub glucose_ring_max_age_min: i64,
    pub absolute_min_dose_u: f64,
    pub start_boost_fraction: f64,
    pub start_iob_ceiling_u: f64,
    pub end_iob_threshold_u: f64,
    pub end_stable_min: i64,
    pub rise_delta_mmol: f64,
    pub rise_lookback_min: i64,
    pub rise_lookback_max: i64,
    pub pending_timeout_min: i64,
    pub retro_min_age_min: i64,
    pub retro_max_age_min: i64,
    pub retro_min_readings: usize,
    pub rearm_after_end_min: i64,
    pub min_valid_glucose_readings: u32,
}

impl EpisodeTrackerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            insulin_window_min: 30,
            glucose_ring_ticks: 40,
            glucose_ring_max_age_min: 120,
            absolute_min_dose_u: 0.20,
            start_boost_fraction: 0.20,
            start_iob_ceiling_u: 0.30,
            end_iob_threshold_u: 0.25,
            end_stable_min: 20,
            rise_delta_mmol: 1.0,
            rise_lookback_min: 15,
            rise_lookback_max: 30,
            pending_timeout_min: 40,
            retro_min_age_min: 10,
            retro_max_age_min: 90,
            retro_min_readings: 4,
            rearm_after_end_min: 30,
            min_valid_glucose_readings: 3,
        }
    }
}

impl Default for EpisodeTrackerConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

/// Per-tick facts the tracker needs. Readings that were non-finite upstream
/// arrive as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerTick {
    pub now: MonotonicTimeMs,
    pub is_night: bool,
    pub meal_intent_active: bool,
    pub rescue_confirmed: bool,
    pub downtrend_locked: bool,
    pub manual_bolus: bool,
    pub glucose_mmol: Option<f64>,
    pub iob_u: Option<f64>,
    pub dose_u: Option<f64>,
    pub max_bolus_u: f64,
    pub trend_consistency: f64,
}

impl TrackerTick {
    fn exclusion(&self) -> Option<ExclusionReason> {
        if self.rescue_confirmed {
            Some(ExclusionReason::RescueConfirmed)
        } else if self.downtrend_locked {
            Some(ExclusionReason::DowntrendLocked)
        } else if self.manual_bolus {
            Some(ExclusionReason::ManualBolus)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GlucoseReading {
    at: MonotonicTimeMs,
    mmol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InsulinDose {
    at: MonotonicTimeMs,
}

#[derive(Debug, Clone, PartialEq)]
enum TrackerState {
    Idle,
    PendingRise {
        episode: Episode,
    },
    Active {
        episode: Episode,
        iob_below_end_since: Option<MonotonicTimeMs>,
    },
}

#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    config: EpisodeTrackerConfig,
    state: TrackerState,
    next_id: u64,
    last_episode_end: Option<MonotonicTimeMs>,
    glucose_ring: VecDeque<GlucoseReading>,
    insulin_ring: VecDeque<InsulinDose>,
    valid_glucose_in_episode: u32,
}

impl EpisodeTracker {
    pub fn new(config: EpisodeTrackerConfig) -> Self {
        Self {
            config,
            state: TrackerState::Idle,
            next_id: 1,
            last_episode_end: None,
            glucose_ring: VecDeque::new(),
            insulin_ring: VecDeque::new(),
            valid_glucose_in_episode: 0,
        }
    }

    pub fn config(&self) -> &EpisodeTrackerConfig {
        &self.config
    }

    pub fn total_episodes(&self) -> u64 {
        self.next_id - 1
    }

    pub fn phase(&self) -> TrackerPhase {
        match self.state {
            TrackerState::Idle => TrackerPhase::Idle,
            TrackerState::PendingRise { .. } => TrackerPhase::PendingRise,
            TrackerState::Active { .. } => TrackerPhase::Active,
        }
    }

    pub fn active_view(&self) -> Option<ActiveEpisodeView> {
        let episode = match &self.state {
            TrackerState::Idle => return None,
            TrackerState::PendingRise { episode } | TrackerState::Active { episode, .. } => {
                episode
            }
        };
        Some(ActiveEpisodeView {
            id: episode.id,
            phase: self.phase(),
            start_time: episode.start_time,
            start_trigger: episode.start_trigger,
            excluded: episode.excluded,
        })
    }

    pub fn last_episode_end(&self) -> Option<MonotonicTimeMs> {
        self.last_episode_end
    }

    /// Advances the state machine by one control cycle. Never fails: unusable
    /// readings are skipped for this tick only.
    pub fn on_tick(&mut self, tick: &TrackerTick) -> Option<EpisodeEvent> {
        let now = tick.now;
        let glucose = tick.glucose_mmol.filter(|g| g.is_finite() && *g > 0.0);
        let dose = tick.dose_u.filter(|d| d.is_finite() && *d >= 0.0);
        let iob = tick.iob_u.filter(|i| i.is_finite());

        let rising = glucose.map_or(false, |g| self.rise_detected(now, g));
        self.record_glucose(now, glucose);
        self.record_insulin(now, dose);

        let start_threshold = self.start_threshold(tick.max_bolus_u);
        let is_start_dose = dose.map_or(false, |d| d > 0.0 && d >= start_threshold);

        let state = std::mem::replace(&mut self.state, TrackerState::Idle);
        let (next, event) = match state {
            TrackerState::Idle => self.step_idle(tick, glucose, iob, is_start_dose, rising),
            TrackerState::PendingRise { episode } => {
                self.step_pending(tick, episode, glucose, is_start_dose)
            }
            TrackerState::Active {
                episode,
                iob_below_end_since,
            } => self.step_active(tick, episode, iob_below_end_since, glucose, iob),
        };
        self.state = next;
        event
    }

    fn step_idle(
        &mut self,
        tick: &TrackerTick,
        glucose: Option<f64>,
        iob: Option<f64>,
        is_start_dose: bool,
        rising: bool,
    ) -> (TrackerState, Option<EpisodeEvent>) {
        let now = tick.now;
        let iob_allows_start = iob.map_or(false, |i| i <= self.config.start_iob_ceiling_u);

        if is_start_dose && iob_allows_start {
            let retro = self.find_retro_start(now).unwrap_or(now);
            let start = self.not_before_last_end(retro);
            let Some(episode) = self.open_episode(tick, start, StartTrigger::Insulin) else {
                return (TrackerState::Idle, None);
            };
            let episode = episode.with_first_insulin(now);
            self.valid_glucose_in_episode = self
                .glucose_ring
                .iter()
                .filter(|r| r.at >= start)
                .count() as u32;
            info!(
                episode_id = episode.id.0,
                start_ms = start.0,
                retro = retro != now,
                "episode started by insulin"
            );
            return (
                TrackerState::Active {
                    episode: episode.clone(),
                    iob_below_end_since: None,
                },
                Some(EpisodeEvent::Started(episode)),
            );
        }

        let rearmed = self
            .last_episode_end
            .map_or(true, |end| now.minutes_since(end) >= self.config.rearm_after_end_min);
        if rearmed && (tick.meal_intent_active || rising) {
            let trigger = if tick.meal_intent_active {
                StartTrigger::MealIntent
            } else {
                StartTrigger::Rise
            };
            let start = self.not_before_last_end(now);
            let Some(episode) = self.open_episode(tick, start, trigger) else {
                return (TrackerState::Idle, None);
            };
            self.valid_glucose_in_episode = u32::from(glucose.is_some());
            info!(
                episode_id = episode.id.0,
                trigger = trigger.as_str(),
                "episode pending first insulin"
            );
            return (
                TrackerState::PendingRise {
                    episode: episode.clone(),
                },
                Some(EpisodeEvent::Started(episode)),
            );
        }

        (TrackerState::Idle, None)
    }

    fn step_pending(
        &mut self,
        tick: &TrackerTick,
        episode: Episode,
        glucose: Option<f64>,
        is_start_dose: bool,
    ) -> (TrackerState, Option<EpisodeEvent>) {
        let now = tick.now;
        let episode = self.apply_tick_exclusion(tick, episode, glucose);

        if is_start_dose {
            let episode = episode.with_first_insulin(now);
            debug!(
                episode_id = episode.id.0,
                delay_min = episode.delay_to_first_insulin_min,
                "pending episode committed by insulin"
            );
            return (
                TrackerState::Active {
                    episode,
                    iob_below_end_since: None,
                },
                None,
            );
        }

        if now.minutes_since(episode.start_time) >= self.config.pending_timeout_min {
            let finished = self.finish(episode.as_missed_intervention(), now);
            info!(
                episode_id = finished.id.0,
                "episode finished without intervention"
            );
            return (TrackerState::Idle, Some(EpisodeEvent::Finished(finished)));
        }

        (TrackerState::PendingRise { episode }, None)
    }

    fn step_active(
        &mut self,
        tick: &TrackerTick,
        episode: Episode,
        iob_below_end_since: Option<MonotonicTimeMs>,
        glucose: Option<f64>,
        iob: Option<f64>,
    ) -> (TrackerState, Option<EpisodeEvent>) {
        let now = tick.now;
        let episode = self.apply_tick_exclusion(tick, episode, glucose);
        let quiet = self.insulin_ring.is_empty();

        let below_since = match iob {
            Some(i) if i < self.config.end_iob_threshold_u && quiet => {
                Some(iob_below_end_since.unwrap_or(now))
            }
            // unreadable IOB leaves the countdown where it was
            None if quiet => iob_below_end_since,
            _ => None,
        };

        if let Some(since) = below_since {
            if now.minutes_since(since) >= self.config.end_stable_min {
                let finished = self.finish(episode, now);
                info!(
                    episode_id = finished.id.0,
                    duration_min = finished.duration_min(),
                    excluded = finished.excluded,
                    "episode finished"
                );
                return (TrackerState::Idle, Some(EpisodeEvent::Finished(finished)));
            }
        }

        (
            TrackerState::Active {
                episode,
                iob_below_end_since: below_since,
            },
            None,
        )
    }

    fn open_episode(
        &mut self,
        tick: &TrackerTick,
        start: MonotonicTimeMs,
        trigger: StartTrigger,
    ) -> Option<Episode> {
        let id = EpisodeId(self.next_id);
        match Episode::open(
            id,
            start,
            tick.is_night,
            clamp_unit(tick.trend_consistency),
            tick.meal_intent_active,
            trigger,
        ) {
            Ok(episode) => {
                self.next_id += 1;
                Some(match tick.exclusion() {
                    Some(reason) => episode.with_exclusion(reason),
                    None => episode,
                })
            }
            Err(err) => {
                warn!(error = %err, "episode could not be opened");
                None
            }
        }
    }

    fn apply_tick_exclusion(
        &mut self,
        tick: &TrackerTick,
        episode: Episode,
        glucose: Option<f64>,
    ) -> Episode {
        if glucose.is_some() {
            self.valid_glucose_in_episode += 1;
        }
        match tick.exclusion() {
            Some(reason) if !episode.excluded => {
                debug!(
                    episode_id = episode.id.0,
                    reason = reason.as_str(),
                    "episode excluded"
                );
                episode.with_exclusion(reason)
            }
            _ => episode,
        }
    }

    fn finish(&mut self, episode: Episode, now: MonotonicTimeMs) -> Episode {
        let mut finished = episode.finished_at(now);
        if self.valid_glucose_in_episode < self.config.min_valid_glucose_readings {
            finished = finished.with_exclusion(ExclusionReason::DataInsufficient);
        }
        self.last_episode_end = finished.end_time;
        self.insulin_ring.clear();
        self.valid_glucose_in_episode = 0;
        finished
    }

    fn start_threshold(&self, max_bolus_u: f64) -> f64 {
        let boosted = if max_bolus_u.is_finite() {
            max_bolus_u * self.config.start_boost_fraction
        } else {
            0.0
        };
        self.config.absolute_min_dose_u.max(boosted)
    }

    fn not_before_last_end(&self, at: MonotonicTimeMs) -> MonotonicTimeMs {
        match self.last_episode_end {
            Some(end) if at < end => end,
            _ => at,
        }
    }

    fn rise_detected(&self, now: MonotonicTimeMs, glucose: f64) -> bool {
        let lowest = self
            .glucose_ring
            .iter()
            .filter(|r| {
                let age = now.minutes_since(r.at);
                age >= self.config.rise_lookback_min && age <= self.config.rise_lookback_max
            })
            .map(|r| r.mmol)
            .min_by(f64::total_cmp);
        lowest.map_or(false, |low| glucose - low >= self.config.rise_delta_mmol)
    }

    fn find_retro_start(&self, now: MonotonicTimeMs) -> Option<MonotonicTimeMs> {
        if self.glucose_ring.len() < self.config.retro_min_readings {
            return None;
        }
        self.glucose_ring
            .iter()
            .filter(|r| {
                let age = now.minutes_since(r.at);
                age >= self.config.retro_min_age_min && age <= self.config.retro_max_age_min
            })
            .min_by(|a, b| a.mmol.total_cmp(&b.mmol))
            .map(|r| r.at)
    }

    fn record_glucose(&mut self, now: MonotonicTimeMs, glucose: Option<f64>) {
        if let Some(mmol) = glucose {
            self.glucose_ring.push_back(GlucoseReading { at: now, mmol });
        }
        while self.glucose_ring.len() > self.config.glucose_ring_ticks {
            self.glucose_ring.pop_front();
        }
        while self.glucose_ring.front().map_or(false, |r| {
            now.minutes_since(r.at) > self.config.glucose_ring_max_age_min
        }) {
            self.glucose_ring.pop_front();
        }
    }

    fn record_insulin(&mut self, now: MonotonicTimeMs, dose: Option<f64>) {
        if let Some(u) = dose {
            if u > 0.0 {
                self.insulin_ring.push_back(InsulinDose { at: now });
            }
        }
        while self.insulin_ring.front().map_or(false, |d| {
            now.minutes_since(d.at) >= self.config.insulin_window_min
        }) {
            self.insulin_ring.pop_front();
        }
    }
}
