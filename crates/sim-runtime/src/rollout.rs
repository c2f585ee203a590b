//! Offline evaluation of a policy over whole episodes.

use serde::{Deserialize, Serialize};
use sim_ai::Policy;
use sim_core::EngineConfig;
use sim_econ::EconomyEngine;
use tracing::{debug, info};

/// Result of a single episode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub seed: u64,
    pub steps: u64,
    pub total_reward: f64,
    pub truncated: bool,
    pub final_contributor_tokens: f64,
    pub final_quality: f64,
}

/// Aggregate KPIs across evaluated episodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub episodes: u32,
    pub mean_reward: f64,
    pub mean_length: f64,
    pub truncated_episodes: u32,
    pub mean_final_contributor_tokens: f64,
    pub mean_final_quality: f64,
}

/// Play one episode from a fresh reset with `seed`.
pub fn run_episode(
    engine: &mut EconomyEngine,
    policy: &mut dyn Policy,
    seed: u64,
) -> EpisodeReport {
    let (mut obs, _) = engine.reset(Some(seed));
    let mut report = EpisodeReport {
        seed,
        ..EpisodeReport::default()
    };
    loop {
        let action = policy.decide(&obs);
        let out = engine.step(&action);
        report.steps += 1;
        report.total_reward += out.reward;
        obs = out.observation;
        if out.episode_over() {
            report.truncated = out.truncated;
            report.final_contributor_tokens = out.info.net_contributor_tokens;
            report.final_quality = out.info.data_quality;
            break;
        }
    }
    debug!(
        seed,
        steps = report.steps,
        reward = report.total_reward,
        truncated = report.truncated,
        "episode evaluated"
    );
    report
}

/// Evaluate `policy` over `episodes` episodes seeded `seed, seed + 1, ...`.
pub fn evaluate(
    config: &EngineConfig,
    policy: &mut dyn Policy,
    episodes: u32,
    seed: u64,
) -> EvaluationSummary {
    let mut engine = EconomyEngine::new(config.clone());
    let mut summary = EvaluationSummary {
        episodes,
        ..EvaluationSummary::default()
    };
    if episodes == 0 {
        return summary;
    }
    for i in 0..episodes {
        let r = run_episode(&mut engine, policy, seed.wrapping_add(u64::from(i)));
        summary.mean_reward += r.total_reward;
        summary.mean_length += r.steps as f64;
        summary.mean_final_contributor_tokens += r.final_contributor_tokens;
        summary.mean_final_quality += r.final_quality;
        if r.truncated {
            summary.truncated_episodes += 1;
        }
    }
    let n = f64::from(episodes);
    summary.mean_reward /= n;
    summary.mean_length /= n;
    summary.mean_final_contributor_tokens /= n;
    summary.mean_final_quality /= n;
    info!(
        policy = policy.name(),
        episodes,
        mean_reward = summary.mean_reward,
        mean_length = summary.mean_length,
        truncated = summary.truncated_episodes,
        "evaluation complete"
    );
    summary
}
