//! System-health reward and episode termination.

use serde::{Deserialize, Serialize};
use sim_core::{EngineConfig, RewardConfig};

/// Post-transition quantities the reward depends on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardInputs {
    pub contributor_tokens: f64,
    pub data_quality: f64,
    pub server_load: f64,
    pub vram_load: f64,
}

/// The six additive reward terms. Penalties are stored as non-positive values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub wealth: f64,
    pub quality: f64,
    pub server_overload: f64,
    pub vram_overload: f64,
    pub cascade: f64,
    pub bankruptcy: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.wealth
            + self.quality
            + self.server_overload
            + self.vram_overload
            + self.cascade
            + self.bankruptcy
    }
}

/// Evaluate every reward term.
pub fn compute_reward(inputs: &RewardInputs, cfg: &RewardConfig) -> RewardBreakdown {
    let mut r = RewardBreakdown {
        wealth: inputs.contributor_tokens * cfg.wealth_weight,
        quality: (inputs.data_quality - cfg.quality_pivot) * cfg.quality_weight,
        ..RewardBreakdown::default()
    };
    if inputs.server_load > cfg.overload_threshold {
        r.server_overload =
            -(inputs.server_load - cfg.overload_threshold) * cfg.server_overload_weight;
    }
    // VRAM exhaustion is weighted harsher than compute saturation.
    if inputs.vram_load > cfg.overload_threshold {
        r.vram_overload = -(inputs.vram_load - cfg.overload_threshold) * cfg.vram_overload_weight;
    }
    if inputs.server_load > cfg.cascade_threshold || inputs.vram_load > cfg.cascade_threshold {
        r.cascade = -cfg.cascade_penalty;
    }
    if inputs.contributor_tokens <= 0.0 {
        r.bankruptcy = -cfg.bankruptcy_penalty;
    }
    r
}

/// Episode end flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    /// Horizon reached.
    pub terminated: bool,
    /// Divergent or insolvent state.
    pub truncated: bool,
}

/// Decide episode end from the post-increment step counter.
pub fn termination(steps_taken: u64, inputs: &RewardInputs, cfg: &EngineConfig) -> Termination {
    let limit = cfg.reward.divergence_threshold;
    Termination {
        terminated: steps_taken >= cfg.max_steps,
        truncated: inputs.server_load > limit
            || inputs.vram_load > limit
            || inputs.contributor_tokens <= 0.0,
    }
}
