#![forbid(unsafe_code)]

use glyco_kernel_contracts::episode::{Episode, EpisodeId};
use glyco_kernel_contracts::summary::EpisodeSummary;
use glyco_kernel_contracts::{ContractViolation, MonotonicTimeMs, Validate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recorded control-cycle sample, as kept by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSample {
    pub at: MonotonicTimeMs,
    pub glucose_mmol: f64,
    pub target_mmol: f64,
    pub dose_u: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SummaryError {
    #[error("episode {0} has no end time")]
    EpisodeOpen(EpisodeId),
    #[error("no usable glucose samples inside episode {0}")]
    NoSamples(EpisodeId),
    #[error("summary failed validation: {0}")]
    Contract(#[from] ContractViolation),
}

/// Reduces a finished episode and the recorded series into a fact sheet.
pub trait EpisodeSummarizer {
    fn summarize(
        &self,
        episode: &Episode,
        series: &[SeriesSample],
        predicted_peak_at_start: Option<f64>,
    ) -> Result<EpisodeSummary, SummaryError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickSeriesSummarizerConfig {
    pub high_mmol: f64,
    pub hypo_mmol: f64,
    pub max_interval_min: i64,
    pub rebound_rise_mmol: f64,
    pub min_minutes_to_peak: i64,
}

impl TickSeriesSummarizerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            high_mmol: 10.0,
            hypo_mmol: 3.9,
            max_interval_min: 10,
            rebound_rise_mmol: 1.5,
            min_minutes_to_peak: 5,
        }
    }
}

impl Default for TickSeriesSummarizerConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

#[derive(Debug, Clone)]
pub struct TickSeriesSummarizer {
    config: TickSeriesSummarizerConfig,
}

impl TickSeriesSummarizer {
    pub fn new(config: TickSeriesSummarizerConfig) -> Self {
        Self { config }
    }
}

impl Default for TickSeriesSummarizer {
    fn default() -> Self {
        Self::new(TickSeriesSummarizerConfig::mvp_v1())
    }
}

impl EpisodeSummarizer for TickSeriesSummarizer {
    fn summarize(
        &self,
        episode: &Episode,
        series: &[SeriesSample],
        predicted_peak_at_start: Option<f64>,
    ) -> Result<EpisodeSummary, SummaryError> {
        let end = episode.end_time.ok_or(SummaryError::EpisodeOpen(episode.id))?;
        let window: Vec<SeriesSample> = series
            .iter()
            .filter(|s| s.at >= episode.start_time && s.at <= end)
            .filter(|s| s.glucose_mmol.is_finite() && s.glucose_mmol > 0.0)
            .copied()
            .collect();
        if window.is_empty() {
            return Err(SummaryError::NoSamples(episode.id));
        }

        let mut peak = window[0];
        let mut nadir = window[0];
        for s in &window[1..] {
            if s.glucose_mmol > peak.glucose_mmol {
                peak = *s;
            }
            if s.glucose_mmol < nadir.glucose_mmol {
                nadir = *s;
            }
        }

        let mut time_above_high_min = 0u32;
        let mut time_below_target_min = 0u32;
        let mut time_below_hypo_min = 0u32;
        for pair in window.windows(2) {
            let (lead, next) = (pair[0], pair[1]);
            let interval = next
                .at
                .minutes_since(lead.at)
                .clamp(0, self.config.max_interval_min) as u32;
            let g = lead.glucose_mmol;
            if g > self.config.high_mmol {
                time_above_high_min += interval;
            }
            if lead.target_mmol.is_finite() && g < lead.target_mmol {
                time_below_target_min += interval;
            }
            if g < self.config.hypo_mmol {
                time_below_hypo_min += interval;
            }
        }

        let phase_of_first_insulin = episode.first_insulin_at.map(|first| {
            let to_first = first.minutes_since(episode.start_time).max(0) as f64;
            let to_peak = peak
                .at
                .minutes_since(episode.start_time)
                .max(self.config.min_minutes_to_peak) as f64;
            to_first / to_peak
        });

        let predicted = predicted_peak_at_start.filter(|p| p.is_finite());
        let summary = EpisodeSummary {
            peak_glucose_mmol: Some(peak.glucose_mmol),
            nadir_glucose_mmol: Some(nadir.glucose_mmol),
            minutes_to_first_insulin: episode.delay_to_first_insulin_min,
            time_above_high_min,
            time_below_target_min,
            time_below_hypo_min,
            duration_min: episode.duration_min().unwrap_or(0),
            rebound_detected: self.rebound_after_peak(&window, peak.at),
            predicted_peak_at_start: predicted,
            peak_prediction_error: predicted.map(|p| peak.glucose_mmol - p),
            phase_of_first_insulin,
        };
        summary.validate()?;
        Ok(summary)
    }
}

impl TickSeriesSummarizer {
    fn rebound_after_peak(&self, window: &[SeriesSample], peak_at: MonotonicTimeMs) -> bool {
        let mut low: Option<f64> = None;
        for s in window.iter().filter(|s| s.at > peak_at) {
            match low {
                Some(l) if s.glucose_mmol >= l + self.config.rebound_rise_mmol => return true,
                Some(l) if s.glucose_mmol < l => low = Some(s.glucose_mmol),
                None => low = Some(s.glucose_mmol),
                _ => {}
            }
        }
        false
    }
}
