#![deny(warnings)]

//! Core contracts for the token-economy simulation.
//!
//! This crate defines the action and observation vectors exchanged with
//! control policies, the mutable economy state owned by the engine, the
//! per-tick info record and the engine configuration.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

mod config;

pub use config::{
    CohortConfig, CohortProfile, EngineConfig, InitialConditions, LiquidityConfig, NormalParams,
    QualityConfig, RewardConfig, RuntimeConfig,
};

/// Number of action components.
pub const ACTION_DIM: usize = 3;
/// Number of observation components.
pub const OBS_DIM: usize = 8;
/// Lower bound of every action component.
pub const ACTION_LOW: f64 = 0.1;
/// Upper bound of every action component.
pub const ACTION_HIGH: f64 = 5.0;
/// Nominal upper bounds of the observation components (lower bounds are 0).
pub const OBS_HIGH: [f32; OBS_DIM] = [2.0, 2.0, 24.0, 1.0, 5.0, 1000.0, 100.0, 100.0];
/// Upper clip of the global contributor/consumer ratio.
pub const MAX_GLOBAL_CCR: f64 = 5.0;

/// The three market-control multipliers chosen each tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionVector {
    /// Multiplier on the token price of API consumption.
    pub price_multiplier: f64,
    /// Multiplier on the token reward paid for contributed data.
    pub reward_multiplier: f64,
    /// Multiplier on the fiat price of tokens.
    pub fiat_tax_multiplier: f64,
}

impl ActionVector {
    /// Build an action with every component clipped to the action space.
    pub fn clamped(price: f64, reward: f64, fiat_tax: f64) -> Self {
        ActionSpace.clip([price, reward, fiat_tax])
    }

    /// The neutral action (all multipliers 1.0).
    pub fn neutral() -> Self {
        Self::clamped(1.0, 1.0, 1.0)
    }

    pub fn to_array(self) -> [f64; ACTION_DIM] {
        [
            self.price_multiplier,
            self.reward_multiplier,
            self.fiat_tax_multiplier,
        ]
    }
}

/// Box action space `[0.1, 5.0]^3`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionSpace;

impl ActionSpace {
    /// Clip a raw vector into the space. NaN components map to the lower bound.
    pub fn clip(&self, raw: [f64; ACTION_DIM]) -> ActionVector {
        let c = |v: f64| {
            if v.is_nan() {
                ACTION_LOW
            } else {
                v.clamp(ACTION_LOW, ACTION_HIGH)
            }
        };
        ActionVector {
            price_multiplier: c(raw[0]),
            reward_multiplier: c(raw[1]),
            fiat_tax_multiplier: c(raw[2]),
        }
    }

    /// Draw an action uniformly from the space.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ActionVector {
        ActionVector {
            price_multiplier: rng.gen_range(ACTION_LOW..=ACTION_HIGH),
            reward_multiplier: rng.gen_range(ACTION_LOW..=ACTION_HIGH),
            fiat_tax_multiplier: rng.gen_range(ACTION_LOW..=ACTION_HIGH),
        }
    }

    /// Whether every component lies inside the bounds.
    pub fn contains(&self, a: &ActionVector) -> bool {
        a.to_array()
            .iter()
            .all(|v| (ACTION_LOW..=ACTION_HIGH).contains(v))
    }
}

/// Observation handed to policies, in the fixed component order:
/// server load, VRAM load, time of day, data quality, global CCR,
/// fiat rate, total tokens / 1e5, contributor tokens / 1e4.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationVector(pub [f32; OBS_DIM]);

impl ObservationVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
    pub fn server_load(&self) -> f32 {
        self.0[0]
    }
    pub fn vram_load(&self) -> f32 {
        self.0[1]
    }
    pub fn time_of_day(&self) -> f32 {
        self.0[2]
    }
    pub fn data_quality(&self) -> f32 {
        self.0[3]
    }
    pub fn global_ccr(&self) -> f32 {
        self.0[4]
    }
    pub fn fiat_rate(&self) -> f32 {
        self.0[5]
    }
    pub fn total_tokens_scaled(&self) -> f32 {
        self.0[6]
    }
    pub fn contributor_tokens_scaled(&self) -> f32 {
        self.0[7]
    }

    /// Whether every component is inside its nominal range. Out-of-range
    /// observations are legal; this is informational only.
    pub fn within_nominal_bounds(&self) -> bool {
        self.0
            .iter()
            .zip(OBS_HIGH.iter())
            .all(|(v, hi)| *v >= 0.0 && v <= hi)
    }
}

/// One-shot exogenous events queued for the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Large enterprise consumption spike on the consumer cohort.
    EnterpriseShock,
}

/// Queue of events consumed by the next `step`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingEvents {
    queue: VecDeque<MarketEvent>,
}

impl PendingEvents {
    /// Enqueue an event unless an identical one is already pending.
    /// Returns whether the event was newly queued.
    pub fn push_unique(&mut self, event: MarketEvent) -> bool {
        if self.queue.contains(&event) {
            return false;
        }
        self.queue.push_back(event);
        true
    }

    pub fn contains(&self, event: MarketEvent) -> bool {
        self.queue.contains(&event)
    }

    /// Remove and return all pending events in arrival order.
    pub fn drain(&mut self) -> Vec<MarketEvent> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Mutable state of the economy, owned by a single engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomyState {
    /// Token wealth of the net-contributor cohort (>= 0).
    pub net_contributor_tokens: f64,
    /// Token wealth of the balanced cohort (>= 0).
    pub balanced_tokens: f64,
    /// Token wealth of the net-consumer cohort (rescued by the liquidity rule).
    pub net_consumer_tokens: f64,
    /// Fraction of compute capacity in use; may exceed 1.0.
    pub server_load: f64,
    /// Fraction of VRAM capacity in use; may exceed 1.0.
    pub vram_load: f64,
    /// Simulated hour in [0, 24).
    pub time_of_day: f64,
    /// Cleanliness of contributed data in [floor, ceiling].
    pub data_quality: f64,
    /// Fiat price of tokens.
    pub fiat_exchange_rate: f64,
    /// Ticks taken in the current episode.
    pub current_step: u64,
    /// Events to apply on the next tick.
    pub pending: PendingEvents,
}

impl EconomyState {
    /// Fresh state at midnight with the configured wealth pools.
    pub fn initial(cfg: &EngineConfig) -> Self {
        Self {
            net_contributor_tokens: cfg.initial.contributor_tokens,
            balanced_tokens: cfg.initial.balanced_tokens,
            net_consumer_tokens: cfg.initial.consumer_tokens,
            server_load: cfg.initial.server_load,
            vram_load: cfg.initial.vram_load,
            time_of_day: 0.0,
            data_quality: cfg.quality.initial,
            fiat_exchange_rate: cfg.base_fiat_rate,
            current_step: 0,
            pending: PendingEvents::default(),
        }
    }

    pub fn total_tokens(&self) -> f64 {
        self.net_contributor_tokens + self.balanced_tokens + self.net_consumer_tokens
    }

    /// Contributor wealth relative to consumer wealth, clipped to [0, 5].
    pub fn global_ccr(&self) -> f64 {
        let ratio = (self.net_contributor_tokens * 2.0) / (self.net_consumer_tokens + 1.0);
        if ratio.is_nan() {
            return 0.0;
        }
        ratio.clamp(0.0, MAX_GLOBAL_CCR)
    }

    pub fn enterprise_shock_pending(&self) -> bool {
        self.pending.contains(MarketEvent::EnterpriseShock)
    }

    /// Derive the policy observation.
    pub fn observation(&self) -> ObservationVector {
        ObservationVector([
            self.server_load as f32,
            self.vram_load as f32,
            self.time_of_day as f32,
            self.data_quality as f32,
            self.global_ccr() as f32,
            self.fiat_exchange_rate as f32,
            (self.total_tokens() / 100_000.0) as f32,
            (self.net_contributor_tokens / 10_000.0) as f32,
        ])
    }
}

/// Per-tick auxiliary record returned by `step`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub server_load: f64,
    pub vram_load: f64,
    pub time_of_day: f64,
    pub data_quality: f64,
    pub fiat_rate: f64,
    pub net_contributor_tokens: f64,
    pub balanced_tokens: f64,
    pub net_consumer_tokens: f64,
    /// Total uploads over total demand for this tick.
    pub system_ccr: f64,
    pub price_multiplier: f64,
    pub reward_multiplier: f64,
    pub fiat_tax_multiplier: f64,
}

/// Auxiliary record returned by `reset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Seed of the random stream used for the new episode.
    pub seed: u64,
}

/// Validation errors for configuration invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("{0} must be finite")]
    NonFinite(&'static str),
    /// Field must be strictly positive.
    #[error("{0} must be > 0")]
    NonPositive(&'static str),
    /// Field must be non-negative.
    #[error("{0} must be >= 0")]
    Negative(&'static str),
    /// Quality bounds or thresholds out of order.
    #[error("quality settings must satisfy 0 <= floor <= initial <= ceiling <= 1 and restore_below <= degrade_above")]
    QualityBounds,
    /// Load thresholds out of order.
    #[error("load thresholds must satisfy overload <= cascade <= divergence")]
    LoadThresholds,
    /// Tick length outside a single day.
    #[error("tick_hours must be within (0, 24)")]
    TickHours,
    /// YAML could not be parsed.
    #[error("invalid yaml config: {0}")]
    Yaml(String),
}
