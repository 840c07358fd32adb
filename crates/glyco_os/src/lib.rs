#![forbid(unsafe_code)]

pub mod orchestrator;
pub mod settings_watch;

pub use orchestrator::{
    ColdStartReason, LearningRestore, ObsOrchestrator, ObsOrchestratorConfig, ScoredEpisode,
};
pub use settings_watch::SettingsWatch;
