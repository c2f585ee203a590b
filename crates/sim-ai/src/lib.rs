#![deny(warnings)]

//! Control policies for the token economy.
//!
//! A [`Policy`] maps an observation to the three market multipliers. Three
//! sources exist: a trained MLP artifact, a uniform-random fallback, and a
//! manual price override layered on top by [`PolicySelector`]. The engine
//! never needs to know which one produced an action.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sim_core::{ActionSpace, ActionVector, ObservationVector, ACTION_HIGH, ACTION_LOW};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

mod mlp;

pub use mlp::{DenseLayer, MlpPolicy, PolicyArtifact};

/// Which capability produced an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Trained,
    UniformRandom,
    ManualOverride,
}

/// Errors raised while loading a trained policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid policy json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("policy has no layers")]
    Empty,
    #[error("layer {layer}: expected {expected} units, found {found}")]
    Shape {
        layer: usize,
        expected: usize,
        found: usize,
    },
    #[error("layer {0}: bias length does not match weight rows")]
    Bias(usize),
    #[error("layer {0}: non-finite parameter")]
    NonFinite(usize),
}

/// Decision function from observations to actions.
pub trait Policy: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;
    /// Kind of capability this policy represents.
    fn source(&self) -> ActionSource;
    /// Choose the action for the next tick.
    fn decide(&mut self, obs: &ObservationVector) -> ActionVector;
}

/// Fallback used when no trained artifact is available.
#[derive(Clone, Debug)]
pub struct UniformRandomPolicy {
    rng: ChaCha8Rng,
}

impl UniformRandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Policy for UniformRandomPolicy {
    fn name(&self) -> &str {
        "uniform-random"
    }

    fn source(&self) -> ActionSource {
        ActionSource::UniformRandom
    }

    fn decide(&mut self, _obs: &ObservationVector) -> ActionVector {
        ActionSpace.sample(&mut self.rng)
    }
}

/// Load the trained artifact at `path`, falling back to the uniform policy
/// when there is no path or it cannot be loaded.
pub fn load_policy_or_fallback(path: Option<&Path>, seed: u64) -> Box<dyn Policy> {
    let Some(path) = path else {
        info!("no policy artifact given; using uniform-random actions");
        return Box::new(UniformRandomPolicy::new(seed));
    };
    match MlpPolicy::load(path) {
        Ok(p) => {
            info!(path = %path.display(), name = p.name(), "loaded trained policy");
            Box::new(p)
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "could not load policy; using uniform-random actions"
            );
            Box::new(UniformRandomPolicy::new(seed))
        }
    }
}

/// Action chosen for a tick together with its origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionVector,
    pub source: ActionSource,
}

impl Decision {
    pub fn is_manual(&self) -> bool {
        self.source == ActionSource::ManualOverride
    }
}

/// Picks the action source each tick: the base policy, with the price
/// component replaced while a manual override is engaged.
pub struct PolicySelector {
    base: Box<dyn Policy>,
    manual_price: Option<f64>,
}

impl PolicySelector {
    pub fn new(base: Box<dyn Policy>) -> Self {
        Self {
            base,
            manual_price: None,
        }
    }

    pub fn base_name(&self) -> &str {
        self.base.name()
    }

    pub fn override_price(&self) -> Option<f64> {
        self.manual_price
    }

    /// Pin the price multiplier. Non-finite values are ignored; others are
    /// clipped to the action bounds. Returns the price now in force.
    pub fn engage_override(&mut self, price: f64) -> Option<f64> {
        if !price.is_finite() {
            return self.manual_price;
        }
        let price = price.clamp(ACTION_LOW, ACTION_HIGH);
        self.manual_price = Some(price);
        self.manual_price
    }

    pub fn disengage_override(&mut self) {
        self.manual_price = None;
    }

    pub fn decide(&mut self, obs: &ObservationVector) -> Decision {
        let mut action = self.base.decide(obs);
        match self.manual_price {
            Some(price) => {
                action.price_multiplier = price;
                Decision {
                    action,
                    source: ActionSource::ManualOverride,
                }
            }
            None => Decision {
                action,
                source: self.base.source(),
            },
        }
    }
}
