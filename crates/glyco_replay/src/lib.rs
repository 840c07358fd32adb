#![forbid(unsafe_code)]

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use glyco_kernel_contracts::advice::AdviceBundle;
use glyco_kernel_contracts::snapshot::Snapshot;
use glyco_kernel_contracts::tick::TickInput;
use glyco_os::{LearningRestore, ObsOrchestrator, ObsOrchestratorConfig};
use glyco_storage::LearningStore;
use serde::Serialize;
use tracing::{info, warn};

pub const USAGE: &str = "usage: glyco_replay <ticks.jsonl> [--config <path>] [--state <path>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayArgs {
    pub ticks: PathBuf,
    pub config: Option<PathBuf>,
    pub state: Option<PathBuf>,
}

pub fn parse_args(args: &[String]) -> Result<ReplayArgs, String> {
    let mut ticks = None;
    let mut config = None;
    let mut state = None;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let path = it.next().ok_or_else(|| format!("--config needs a path\n{USAGE}"))?;
                config = Some(PathBuf::from(path));
            }
            "--state" => {
                let path = it.next().ok_or_else(|| format!("--state needs a path\n{USAGE}"))?;
                state = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag: {flag}\n{USAGE}"));
            }
            path if ticks.is_none() => ticks = Some(PathBuf::from(path)),
            extra => return Err(format!("unexpected argument: {extra}\n{USAGE}")),
        }
    }
    Ok(ReplayArgs {
        ticks: ticks.ok_or_else(|| USAGE.to_string())?,
        config,
        state,
    })
}

pub fn load_config(path: Option<&PathBuf>) -> Result<ObsOrchestratorConfig, String> {
    let Some(path) = path else {
        return Ok(ObsOrchestratorConfig::mvp_v1());
    };
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid config {}: {e}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub ticks: usize,
    pub skipped_lines: usize,
    pub bundles: Vec<AdviceBundle>,
    pub snapshot: Snapshot,
}

/// Feeds one JSON tick per line. Blank lines and `#` comments are ignored;
/// lines that do not parse are logged and skipped.
pub fn replay<R: BufRead>(orch: &mut ObsOrchestrator, reader: R) -> Result<ReplayReport, String> {
    let mut ticks = 0;
    let mut skipped_lines = 0;
    let mut bundles = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read tick line {}: {e}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tick: TickInput = match serde_json::from_str(trimmed) {
            Ok(tick) => tick,
            Err(err) => {
                warn!(line = idx + 1, error = %err, "tick line skipped");
                skipped_lines += 1;
                continue;
            }
        };
        ticks += 1;
        if let Some(bundle) = orch.on_five_minute_tick(&tick) {
            bundles.push(bundle);
        }
    }
    Ok(ReplayReport {
        ticks,
        skipped_lines,
        bundles,
        snapshot: orch.snapshot(),
    })
}

pub fn run_replay(args: &ReplayArgs) -> Result<ReplayReport, String> {
    let config = load_config(args.config.as_ref())?;
    let mut orch = ObsOrchestrator::new(config);
    if let Some(state) = &args.state {
        match orch.attach_learning_store(LearningStore::file(state)) {
            LearningRestore::Restored { records, skipped } => {
                info!(records, skipped, "learning state restored")
            }
            LearningRestore::ColdStart(reason) => info!(?reason, "learning cold start"),
        }
    }
    let file = fs::File::open(&args.ticks)
        .map_err(|e| format!("failed to open {}: {e}", args.ticks.display()))?;
    replay(&mut orch, BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyco_kernel_contracts::MonotonicTimeMs;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    fn missed_rise_jsonl() -> String {
        let mut glucose = vec![6.0; 6];
        glucose.extend([7.2, 7.8, 8.6, 9.4, 10.2, 11.0, 11.6, 12.0, 12.2]);
        glucose
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let tick = TickInput {
                    now: MonotonicTimeMs::from_minutes(5 * i as u64),
                    glucose_mmol: *g,
                    trend_consistency: 0.8,
                    max_bolus_u: 1.0,
                    ..TickInput::default()
                };
                serde_json::to_string(&tick).unwrap()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn at_replay_01_args_parse_in_any_order() {
        let parsed = parse_args(&args(&["--state", "s.json", "ticks.jsonl", "--config", "c.json"]))
            .unwrap();
        assert_eq!(parsed.ticks, PathBuf::from("ticks.jsonl"));
        assert_eq!(parsed.config, Some(PathBuf::from("c.json")));
        assert_eq!(parsed.state, Some(PathBuf::from("s.json")));

        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["a", "b"])).is_err());
        assert!(parse_args(&args(&["a", "--config"])).is_err());
        assert!(parse_args(&args(&["a", "--verbose"])).is_err());
    }

    #[test]
    fn at_replay_02_missed_rise_yields_debug_bundle() {
        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let input = format!("# header\n\nnot json\n{}\n", missed_rise_jsonl());
        let report = replay(&mut orch, input.as_bytes()).unwrap();

        assert_eq!(report.ticks, 15);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.bundles.len(), 1);
        assert!(report.bundles[0].debug_summary.contains("TIMING: top=LATE"));
        assert_eq!(report.snapshot.total_episodes, 1);
    }

    #[test]
    fn at_replay_03_state_file_carries_evidence_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let ticks = dir.path().join("ticks.jsonl");
        fs::write(&ticks, missed_rise_jsonl()).unwrap();
        let replay_args = ReplayArgs {
            ticks,
            config: None,
            state: Some(dir.path().join("state").join("learning.json")),
        };

        let first = run_replay(&replay_args).unwrap();
        let seen = first.snapshot.axes[0].episodes_seen;
        assert_eq!(seen, 1);

        let mut orch = ObsOrchestrator::new(ObsOrchestratorConfig::mvp_v1());
        let restore = orch.attach_learning_store(LearningStore::file(
            replay_args.state.clone().unwrap(),
        ));
        assert!(matches!(restore, LearningRestore::Restored { .. }));
    }

    #[test]
    fn at_replay_04_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"tracker":{"pending_timeout_min":60}}"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.tracker.pending_timeout_min, 60);
        assert_eq!(config.tracker.end_stable_min, 20);
        assert!(load_config(Some(&dir.path().join("missing.json"))).is_err());
    }
}
