//! Engine configuration with defaults matching the reference economy.
//!
//! Every struct is `#[serde(default)]` so a YAML file only needs the fields it
//! wants to change. Cohorts differ in their defaults, so a cohort section is
//! merged field by field over that cohort's own profile.

use serde::{Deserialize, Deserializer, Serialize};

use crate::ValidationError;

/// Parameters of a normal draw.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalParams {
    /// Mean of the draw.
    pub mean: f64,
    /// Standard deviation (>= 0).
    pub std_dev: f64,
}

impl NormalParams {
    pub const fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }
}

/// Behavioural profile of one user cohort.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CohortProfile {
    /// API consumption per tick before traffic scaling.
    pub demand: NormalParams,
    /// Data contribution per tick before traffic scaling.
    pub upload: NormalParams,
    /// Whether demand follows the business-hour cycle.
    pub demand_business_scaled: bool,
    /// Whether uploads follow the business-hour cycle.
    pub upload_business_scaled: bool,
    /// Price elasticity exponent; 0 means inelastic.
    pub elasticity: f64,
    /// VRAM units consumed per unit of demand.
    pub vram_weight: f64,
}

/// The three cohorts of the economy.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CohortConfig {
    pub contributor: CohortProfile,
    pub balanced: CohortProfile,
    pub consumer: CohortProfile,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            // Uploads happen mostly off-hours.
            contributor: CohortProfile {
                demand: NormalParams::new(200.0, 50.0),
                upload: NormalParams::new(500.0, 100.0),
                demand_business_scaled: true,
                upload_business_scaled: false,
                elasticity: 1.1,
                vram_weight: 0.5,
            },
            balanced: CohortProfile {
                demand: NormalParams::new(800.0, 150.0),
                upload: NormalParams::new(800.0, 150.0),
                demand_business_scaled: true,
                upload_business_scaled: true,
                elasticity: 1.5,
                vram_weight: 0.8,
            },
            // Speech workloads: heavy on VRAM, indifferent to price.
            consumer: CohortProfile {
                demand: NormalParams::new(3000.0, 500.0),
                upload: NormalParams::new(50.0, 10.0),
                demand_business_scaled: true,
                upload_business_scaled: false,
                elasticity: 0.0,
                vram_weight: 1.5,
            },
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct NormalPatch {
    mean: Option<f64>,
    std_dev: Option<f64>,
}

impl NormalPatch {
    fn apply(self, base: &mut NormalParams) {
        if let Some(v) = self.mean {
            base.mean = v;
        }
        if let Some(v) = self.std_dev {
            base.std_dev = v;
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct CohortPatch {
    demand: NormalPatch,
    upload: NormalPatch,
    demand_business_scaled: Option<bool>,
    upload_business_scaled: Option<bool>,
    elasticity: Option<f64>,
    vram_weight: Option<f64>,
}

impl CohortPatch {
    fn apply(self, base: &mut CohortProfile) {
        self.demand.apply(&mut base.demand);
        self.upload.apply(&mut base.upload);
        if let Some(v) = self.demand_business_scaled {
            base.demand_business_scaled = v;
        }
        if let Some(v) = self.upload_business_scaled {
            base.upload_business_scaled = v;
        }
        if let Some(v) = self.elasticity {
            base.elasticity = v;
        }
        if let Some(v) = self.vram_weight {
            base.vram_weight = v;
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct CohortConfigPatch {
    contributor: CohortPatch,
    balanced: CohortPatch,
    consumer: CohortPatch,
}

impl<'de> Deserialize<'de> for CohortConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let patch = CohortConfigPatch::deserialize(deserializer)?;
        let mut cohorts = CohortConfig::default();
        patch.contributor.apply(&mut cohorts.contributor);
        patch.balanced.apply(&mut cohorts.balanced);
        patch.consumer.apply(&mut cohorts.consumer);
        Ok(cohorts)
    }
}

/// Data-quality dynamics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub initial: f64,
    pub floor: f64,
    pub ceiling: f64,
    /// Reward multipliers strictly above this degrade quality.
    pub degrade_above: f64,
    /// Reward multipliers strictly below this restore quality.
    pub restore_below: f64,
    pub degrade_step: f64,
    pub restore_step: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            initial: 0.8,
            floor: 0.1,
            ceiling: 1.0,
            degrade_above: 3.0,
            restore_below: 2.0,
            degrade_step: 0.01,
            restore_step: 0.005,
        }
    }
}

/// Emergency fiat purchase rule for the consumer cohort.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    pub threshold: f64,
    pub injection: f64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            threshold: 5000.0,
            injection: 10_000.0,
        }
    }
}

/// Reward weights and load thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub wealth_weight: f64,
    pub quality_pivot: f64,
    pub quality_weight: f64,
    pub overload_threshold: f64,
    pub server_overload_weight: f64,
    pub vram_overload_weight: f64,
    pub cascade_threshold: f64,
    pub cascade_penalty: f64,
    /// Loads above this abort the episode.
    pub divergence_threshold: f64,
    pub bankruptcy_penalty: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            wealth_weight: 0.0005,
            quality_pivot: 0.5,
            quality_weight: 10.0,
            overload_threshold: 0.9,
            server_overload_weight: 500.0,
            vram_overload_weight: 2000.0,
            cascade_threshold: 1.2,
            cascade_penalty: 5000.0,
            divergence_threshold: 1.5,
            bankruptcy_penalty: 1000.0,
        }
    }
}

/// Initial wealth pools and loads applied on reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConditions {
    pub contributor_tokens: f64,
    pub balanced_tokens: f64,
    pub consumer_tokens: f64,
    pub server_load: f64,
    pub vram_load: f64,
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self {
            contributor_tokens: 20_000.0,
            balanced_tokens: 10_000.0,
            consumer_tokens: 90_000.0,
            server_load: 0.1,
            vram_load: 0.1,
        }
    }
}

/// Full parameter set of the economy engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requests per tick the compute tier can serve.
    pub server_capacity: f64,
    /// VRAM units per tick the GPU tier can serve.
    pub vram_capacity: f64,
    /// Token cost of 1k API calls at multiplier 1.0.
    pub base_unit_cost: f64,
    /// Fiat price of tokens at tax multiplier 1.0.
    pub base_fiat_rate: f64,
    /// Simulated hours per tick.
    pub tick_hours: f64,
    /// Episode horizon in ticks.
    pub max_steps: u64,
    /// Extra consumer demand added by an enterprise shock.
    pub shock_spike: f64,
    /// Default RNG seed.
    pub seed: u64,
    pub initial: InitialConditions,
    pub cohorts: CohortConfig,
    pub quality: QualityConfig,
    pub liquidity: LiquidityConfig,
    pub reward: RewardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_capacity: 15_000.0,
            vram_capacity: 10_000.0,
            base_unit_cost: 10.0,
            base_fiat_rate: 5.0,
            tick_hours: 0.25,
            max_steps: 1000,
            shock_spike: 8000.0,
            seed: 42,
            initial: InitialConditions::default(),
            cohorts: CohortConfig::default(),
            quality: QualityConfig::default(),
            liquidity: LiquidityConfig::default(),
            reward: RewardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) YAML document and validate it.
    pub fn from_yaml_str(text: &str) -> Result<Self, ValidationError> {
        let cfg: EngineConfig =
            serde_yaml::from_str(text).map_err(|e| ValidationError::Yaml(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        positive("server_capacity", self.server_capacity)?;
        positive("vram_capacity", self.vram_capacity)?;
        non_negative("base_unit_cost", self.base_unit_cost)?;
        non_negative("base_fiat_rate", self.base_fiat_rate)?;
        non_negative("shock_spike", self.shock_spike)?;
        if !(self.tick_hours.is_finite() && self.tick_hours > 0.0 && self.tick_hours < 24.0) {
            return Err(ValidationError::TickHours);
        }
        if self.max_steps == 0 {
            return Err(ValidationError::NonPositive("max_steps"));
        }

        let init = &self.initial;
        non_negative("initial.contributor_tokens", init.contributor_tokens)?;
        non_negative("initial.balanced_tokens", init.balanced_tokens)?;
        finite("initial.consumer_tokens", init.consumer_tokens)?;
        non_negative("initial.server_load", init.server_load)?;
        non_negative("initial.vram_load", init.vram_load)?;

        for (name, c) in [
            ("cohorts.contributor", &self.cohorts.contributor),
            ("cohorts.balanced", &self.cohorts.balanced),
            ("cohorts.consumer", &self.cohorts.consumer),
        ] {
            finite(name, c.demand.mean)?;
            finite(name, c.upload.mean)?;
            non_negative(name, c.demand.std_dev)?;
            non_negative(name, c.upload.std_dev)?;
            non_negative(name, c.elasticity)?;
            non_negative(name, c.vram_weight)?;
        }

        let q = &self.quality;
        for v in [q.floor, q.initial, q.ceiling] {
            finite("quality", v)?;
        }
        finite("quality.degrade_above", q.degrade_above)?;
        finite("quality.restore_below", q.restore_below)?;
        if !(0.0 <= q.floor
            && q.floor <= q.initial
            && q.initial <= q.ceiling
            && q.ceiling <= 1.0)
        {
            return Err(ValidationError::QualityBounds);
        }
        non_negative("quality.degrade_step", q.degrade_step)?;
        non_negative("quality.restore_step", q.restore_step)?;
        if q.restore_below > q.degrade_above {
            return Err(ValidationError::QualityBounds);
        }

        non_negative("liquidity.injection", self.liquidity.injection)?;
        finite("liquidity.threshold", self.liquidity.threshold)?;

        let r = &self.reward;
        for (name, v) in [
            ("reward.wealth_weight", r.wealth_weight),
            ("reward.quality_weight", r.quality_weight),
            ("reward.server_overload_weight", r.server_overload_weight),
            ("reward.vram_overload_weight", r.vram_overload_weight),
            ("reward.cascade_penalty", r.cascade_penalty),
            ("reward.bankruptcy_penalty", r.bankruptcy_penalty),
        ] {
            non_negative(name, v)?;
        }
        if !(r.overload_threshold <= r.cascade_threshold
            && r.cascade_threshold <= r.divergence_threshold)
        {
            return Err(ValidationError::LoadThresholds);
        }
        Ok(())
    }
}

/// Settings of the tick loop that drives the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Wall-clock pause between ticks (4 Hz by default).
    pub tick_interval_ms: u64,
    /// Reset the economy when an episode ends.
    pub auto_reset: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 250,
            auto_reset: true,
        }
    }
}

fn finite(name: &'static str, v: f64) -> Result<(), ValidationError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite(name))
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<(), ValidationError> {
    finite(name, v)?;
    if v < 0.0 {
        return Err(ValidationError::Negative(name));
    }
    Ok(())
}

fn positive(name: &'static str, v: f64) -> Result<(), ValidationError> {
    finite(name, v)?;
    if v <= 0.0 {
        return Err(ValidationError::NonPositive(name));
    }
    Ok(())
}
