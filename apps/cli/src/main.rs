#![deny(warnings)]

//! Headless driver for the token-economy simulation.
//!
//! Streams one JSON payload per tick to stdout. Control messages can be fed
//! as JSON lines on stdin with `--stdin-controls`.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use sim_core::{EngineConfig, RuntimeConfig};
use sim_runtime::{evaluate, Session, SessionStats, TickPayload};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    policy: Option<PathBuf>,
    seed: Option<u64>,
    ticks: Option<u64>,
    cadence_ms: Option<u64>,
    override_price: Option<f64>,
    shock_at: Vec<u64>,
    stdin_controls: bool,
    no_auto_reset: bool,
    evaluate: Option<u32>,
    version: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--policy" => args.policy = it.next().map(PathBuf::from),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--ticks" => args.ticks = it.next().and_then(|s| s.parse().ok()),
            "--cadence-ms" => args.cadence_ms = it.next().and_then(|s| s.parse().ok()),
            "--override" => args.override_price = it.next().and_then(|s| s.parse().ok()),
            "--shock-at" => {
                if let Some(t) = it.next().and_then(|s| s.parse().ok()) {
                    args.shock_at.push(t);
                }
            }
            "--stdin-controls" => args.stdin_controls = true,
            "--no-auto-reset" => args.no_auto_reset = true,
            "--evaluate" => args.evaluate = it.next().and_then(|s| s.parse().ok()),
            "--version" => args.version = true,
            _ => {}
        }
    }
    args
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_yaml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    Ok(cfg)
}

/// "HH:MM" label for a simulated hour.
fn clock_label(hours: f64) -> String {
    let secs = (hours.rem_euclid(24.0) * 3600.0).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs % 86_400, 0)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

fn print_kpi(last: &TickPayload, stats: &SessionStats) {
    eprintln!(
        "KPI | ticks: {} | episodes: {} | truncated: {} | clock: {} | server: {:.2} | vram: {:.2} | quality: {:.3} | contributors: {:.0} | consumers: {:.0} | fiat: {:.2} | reward: {:.2}",
        stats.ticks,
        stats.episodes_completed,
        stats.truncations,
        clock_label(last.info.time_of_day),
        last.info.server_load,
        last.info.vram_load,
        last.info.data_quality,
        last.info.net_contributor_tokens,
        last.info.net_consumer_tokens,
        last.info.fiat_rate,
        last.reward_health,
    );
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries payloads only.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    if args.version {
        println!(
            "econ-cli {} ({} built {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    info!(?args, "starting CLI");

    let config = load_config(&args)?;
    let policy_seed = config.seed.wrapping_add(1);
    let mut policy = sim_ai::load_policy_or_fallback(args.policy.as_deref(), policy_seed);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Some(episodes) = args.evaluate {
        let summary = evaluate(&config, policy.as_mut(), episodes, config.seed);
        writeln!(out, "{}", serde_json::to_string(&summary)?)?;
        return Ok(());
    }

    let runtime = RuntimeConfig {
        tick_interval_ms: args
            .cadence_ms
            .unwrap_or(RuntimeConfig::default().tick_interval_ms),
        auto_reset: !args.no_auto_reset,
    };
    let ticks = args.ticks.unwrap_or(config.max_steps);
    let cadence = Duration::from_millis(runtime.tick_interval_ms);
    let mut session = Session::new(config, runtime, policy);
    let handle = session.control_handle();

    if let Some(price) = args.override_price {
        handle.engage_override(price);
    }
    if args.stdin_controls {
        let stdin_handle = handle.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if !stdin_handle.send_raw(&line) {
                    warn!("control message ignored");
                }
            }
        });
    }

    let mut last = TickPayload::default();
    for t in 0..ticks {
        if args.shock_at.contains(&t) {
            handle.trigger_shock();
        }
        last = session.tick();
        writeln!(out, "{}", serde_json::to_string(&last)?)?;
        out.flush()?;
        if !cadence.is_zero() {
            std::thread::sleep(cadence);
        }
    }

    print_kpi(&last, &session.stats());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_labels() {
        assert_eq!(clock_label(0.0), "00:00");
        assert_eq!(clock_label(13.75), "13:45");
        assert_eq!(clock_label(23.999_999), "00:00");
    }
}
