//! Trained-policy artifact: a small tanh MLP serialised as JSON.

use serde::{Deserialize, Serialize};
use sim_core::{
    ActionSpace, ActionVector, ObservationVector, ACTION_DIM, ACTION_HIGH, ACTION_LOW, OBS_DIM,
};
use std::fs;
use std::path::Path;

use crate::{ActionSource, Policy, PolicyError};

/// Fully connected layer; `weights[out][in]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b;
                z.tanh()
            })
            .collect()
    }
}

/// Serialised form of a trained policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyArtifact {
    #[serde(default = "default_name")]
    pub name: String,
    pub layers: Vec<DenseLayer>,
}

fn default_name() -> String {
    "mlp".to_string()
}

impl PolicyArtifact {
    /// Check layer shapes chain from the observation to the action size.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.layers.is_empty() {
            return Err(PolicyError::Empty);
        }
        let mut inputs = OBS_DIM;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.bias.len() != layer.weights.len() {
                return Err(PolicyError::Bias(i));
            }
            for row in &layer.weights {
                if row.len() != inputs {
                    return Err(PolicyError::Shape {
                        layer: i,
                        expected: inputs,
                        found: row.len(),
                    });
                }
                if row.iter().any(|w| !w.is_finite()) {
                    return Err(PolicyError::NonFinite(i));
                }
            }
            if layer.bias.iter().any(|b| !b.is_finite()) {
                return Err(PolicyError::NonFinite(i));
            }
            inputs = layer.weights.len();
        }
        if inputs != ACTION_DIM {
            return Err(PolicyError::Shape {
                layer: self.layers.len() - 1,
                expected: ACTION_DIM,
                found: inputs,
            });
        }
        Ok(())
    }
}

/// Deterministic policy backed by a [`PolicyArtifact`].
#[derive(Clone, Debug)]
pub struct MlpPolicy {
    artifact: PolicyArtifact,
}

impl MlpPolicy {
    pub fn from_artifact(artifact: PolicyArtifact) -> Result<Self, PolicyError> {
        artifact.validate()?;
        Ok(Self { artifact })
    }

    pub fn from_json_str(text: &str) -> Result<Self, PolicyError> {
        let artifact: PolicyArtifact = serde_json::from_str(text)?;
        Self::from_artifact(artifact)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn artifact(&self) -> &PolicyArtifact {
        &self.artifact
    }

    /// Map an observation to an action. The final tanh is stretched onto the
    /// action bounds.
    pub fn predict(&self, obs: &ObservationVector) -> ActionVector {
        let mut x: Vec<f32> = obs.as_slice().to_vec();
        for layer in &self.artifact.layers {
            x = layer.forward(&x);
        }
        let span = ACTION_HIGH - ACTION_LOW;
        let mut raw = [ACTION_LOW; ACTION_DIM];
        for (slot, y) in raw.iter_mut().zip(&x) {
            *slot = ACTION_LOW + (f64::from(*y) + 1.0) * 0.5 * span;
        }
        ActionSpace.clip(raw)
    }
}

impl Policy for MlpPolicy {
    fn name(&self) -> &str {
        &self.artifact.name
    }

    fn source(&self) -> ActionSource {
        ActionSource::Trained
    }

    fn decide(&mut self, obs: &ObservationVector) -> ActionVector {
        self.predict(obs)
    }
}
