#![forbid(unsafe_code)]

use std::env;

use glyco_replay::{parse_args, run_replay};
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;
    let report = run_replay(&args)?;

    for bundle in &report.bundles {
        let line = serde_json::to_string(bundle).map_err(|e| e.to_string())?;
        println!("{line}");
    }
    let snapshot = serde_json::to_string_pretty(&report.snapshot).map_err(|e| e.to_string())?;
    println!("{snapshot}");
    eprintln!(
        "replayed {} ticks ({} skipped), {} bundles",
        report.ticks,
        report.skipped_lines,
        report.bundles.len()
    );
    Ok(())
}
