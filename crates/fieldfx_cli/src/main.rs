use std::fs;
use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;

use fieldfx_cli::{parse_scenario, run_scenario};

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut scenario_path: Option<String> = None;
    let mut pretty = false;
    let mut summary_only = false;
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--pretty" => {
                pretty = true;
                index += 1;
            }
            "--summary-only" => {
                summary_only = true;
                index += 1;
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown flag '{other}'\n\n{}", usage_text()));
            }
            other => {
                if scenario_path.is_some() {
                    return Err(format!("unexpected extra argument '{other}'"));
                }
                scenario_path = Some(other.to_string());
                index += 1;
            }
        }
    }

    let scenario_path = scenario_path.ok_or_else(usage_text)?;
    let raw = fs::read_to_string(&scenario_path)
        .map_err(|error| format!("read scenario '{scenario_path}': {error}"))?;
    let scenario = parse_scenario(&raw)?;

    info!(path = %scenario_path, ticks = scenario.ticks, "scenario_loaded");
    let run = run_scenario(&scenario);

    if !summary_only {
        for sample in &run.samples {
            let line = if pretty {
                serde_json::to_string_pretty(sample)
            } else {
                serde_json::to_string(sample)
            }
            .map_err(|error| format!("encode sample json: {error}"))?;
            println!("{line}");
        }
    }

    println!(
        "ran {} ticks, peak {} live effects, {} warp execution(s)",
        run.summary.ticks_run, run.summary.effects_spawned_peak, run.summary.warp_executions
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn usage_text() -> String {
    [
        "usage: fieldfx_cli [--pretty] [--summary-only] <scenario.json>",
        "",
        "Runs a field-effect scenario headless at the fixed 60 Hz tick and",
        "prints one json draw-list sample per line.",
        "",
        "flags:",
        "  --pretty        pretty-print each sample",
        "  --summary-only  suppress per-tick samples, print totals only",
    ]
    .join("\n")
}

fn print_usage() {
    println!("{}", usage_text());
}
