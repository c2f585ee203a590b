#![deny(warnings)]

//! Economy simulation engine.
//!
//! Advances a three-cohort token economy one tick (15 simulated minutes) at a
//! time under the control multipliers chosen by a policy:
//! - cyclic business-hour traffic and stochastic cohort draws
//! - price elasticity and coupled compute/VRAM saturation
//! - data-quality decay and restoration driven by the reward multiplier
//! - token settlement with an emergency fiat liquidity backstop
//! - a system-health reward with overload and catastrophic-failure terms
//!
//! Randomness comes from a seeded ChaCha8 stream owned by the engine;
//! [`EconomyEngine::step_with_draws`] is the pure transition used to replay
//! exact draws.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sim_core::{
    ActionVector, EconomyState, EngineConfig, MarketEvent, ObservationVector, ResetInfo, StepInfo,
};
use tracing::debug;

pub mod draws;
pub mod dynamics;
pub mod reward;

pub use draws::{sample_flows, CohortFlows, Flow};
pub use reward::{compute_reward, termination, RewardBreakdown, RewardInputs, Termination};

/// Everything produced by one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: ObservationVector,
    pub reward: f64,
    /// Episode horizon reached.
    pub terminated: bool,
    /// Load or solvency blew past safety thresholds.
    pub truncated: bool,
    pub info: StepInfo,
    /// Individual reward terms.
    pub breakdown: RewardBreakdown,
    /// Post-shock, post-elasticity demand and uploads.
    pub flows: CohortFlows,
    pub shock_applied: bool,
    pub liquidity_injected: bool,
}

impl StepOutcome {
    /// Whether the caller should reset before the next tick.
    pub fn episode_over(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Owner of a single economy. Not shared; each simulated economy needs its
/// own engine.
#[derive(Clone, Debug)]
pub struct EconomyEngine {
    config: EngineConfig,
    state: EconomyState,
    rng: ChaCha8Rng,
    seed: u64,
}

impl EconomyEngine {
    /// Fresh economy seeded from `config.seed`.
    pub fn new(config: EngineConfig) -> Self {
        let seed = config.seed;
        let state = EconomyState::initial(&config);
        Self {
            config,
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Start from an explicit state, e.g. to stage a scenario.
    pub fn from_state(config: EngineConfig, state: EconomyState, seed: u64) -> Self {
        Self {
            config,
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    /// Immutable copy for readers that must not observe live state.
    pub fn snapshot(&self) -> EconomyState {
        self.state.clone()
    }

    /// Seed of the current episode's random stream.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn observation(&self) -> ObservationVector {
        self.state.observation()
    }

    /// Reinitialise the economy. `Some(seed)` reseeds the draw stream;
    /// `None` derives the next episode seed from the current stream.
    pub fn reset(&mut self, seed: Option<u64>) -> (ObservationVector, ResetInfo) {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.state = EconomyState::initial(&self.config);
        debug!(seed, "economy reset");
        (self.state.observation(), ResetInfo { seed })
    }

    /// Queue an enterprise demand shock for the next tick. Repeated calls
    /// before that tick have no further effect.
    pub fn trigger_shock(&mut self) {
        if self.state.pending.push_unique(MarketEvent::EnterpriseShock) {
            debug!(step = self.state.current_step, "enterprise shock queued");
        }
    }

    /// Advance one tick, drawing cohort flows from the engine's stream.
    pub fn step(&mut self, action: &ActionVector) -> StepOutcome {
        let next_time = dynamics::advance_clock(self.state.time_of_day, self.config.tick_hours);
        let business = dynamics::business_hour_multiplier(next_time);
        let draws = sample_flows(&mut self.rng, &self.config.cohorts, business);
        self.step_with_draws(action, &draws)
    }

    /// Advance one tick with externally supplied draws (already scaled by
    /// the business-hour factor and floored at zero).
    pub fn step_with_draws(&mut self, action: &ActionVector, draws: &CohortFlows) -> StepOutcome {
        let cfg = &self.config;
        let st = &mut self.state;
        let price = action.price_multiplier;

        st.time_of_day = dynamics::advance_clock(st.time_of_day, cfg.tick_hours);

        let mut flows = *draws;
        let mut shock_applied = false;
        for event in st.pending.drain() {
            match event {
                MarketEvent::EnterpriseShock => {
                    flows.consumer.demand += cfg.shock_spike;
                    shock_applied = true;
                    debug!(
                        step = st.current_step,
                        spike = cfg.shock_spike,
                        "enterprise shock applied"
                    );
                }
            }
        }

        st.data_quality =
            dynamics::update_quality(st.data_quality, action.reward_multiplier, &cfg.quality);
        let reward_rate =
            dynamics::effective_reward_rate(action.reward_multiplier, st.data_quality);

        let cohorts = &cfg.cohorts;
        flows.contributor.demand =
            dynamics::elastic_demand(flows.contributor.demand, price, &cohorts.contributor);
        flows.balanced.demand =
            dynamics::elastic_demand(flows.balanced.demand, price, &cohorts.balanced);
        flows.consumer.demand =
            dynamics::elastic_demand(flows.consumer.demand, price, &cohorts.consumer);

        let total_demand = flows.total_demand();
        let vram_demand = flows.contributor.demand * cohorts.contributor.vram_weight
            + flows.balanced.demand * cohorts.balanced.vram_weight
            + flows.consumer.demand * cohorts.consumer.vram_weight;
        st.server_load = total_demand / cfg.server_capacity;
        st.vram_load = vram_demand / cfg.vram_capacity;

        let settle = |f: &Flow| {
            let cost = dynamics::consumption_cost(f.demand, price, cfg);
            let earnings = f.upload * reward_rate;
            earnings - cost
        };
        st.net_contributor_tokens =
            (st.net_contributor_tokens + settle(&flows.contributor)).max(0.0);
        st.balanced_tokens = (st.balanced_tokens + settle(&flows.balanced)).max(0.0);
        st.net_consumer_tokens += settle(&flows.consumer);

        st.fiat_exchange_rate = dynamics::fiat_rate(action.fiat_tax_multiplier, cfg);

        let (consumer_tokens, liquidity_injected) =
            dynamics::apply_liquidity_backstop(st.net_consumer_tokens, cfg);
        if liquidity_injected {
            debug!(
                step = st.current_step,
                before = st.net_consumer_tokens,
                after = consumer_tokens,
                "emergency fiat purchase"
            );
        }
        st.net_consumer_tokens = consumer_tokens;

        let inputs = RewardInputs {
            contributor_tokens: st.net_contributor_tokens,
            data_quality: st.data_quality,
            server_load: st.server_load,
            vram_load: st.vram_load,
        };
        let breakdown = compute_reward(&inputs, &cfg.reward);

        st.current_step += 1;
        let ends = termination(st.current_step, &inputs, cfg);

        let info = StepInfo {
            server_load: st.server_load,
            vram_load: st.vram_load,
            time_of_day: st.time_of_day,
            data_quality: st.data_quality,
            fiat_rate: st.fiat_exchange_rate,
            net_contributor_tokens: st.net_contributor_tokens,
            balanced_tokens: st.balanced_tokens,
            net_consumer_tokens: st.net_consumer_tokens,
            system_ccr: flows.total_upload() / (total_demand + 1.0),
            price_multiplier: action.price_multiplier,
            reward_multiplier: action.reward_multiplier,
            fiat_tax_multiplier: action.fiat_tax_multiplier,
        };

        StepOutcome {
            observation: st.observation(),
            reward: breakdown.total(),
            terminated: ends.terminated,
            truncated: ends.truncated,
            info,
            breakdown,
            flows,
            shock_applied,
            liquidity_injected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn draws(contributor: f64, balanced: f64, consumer: f64) -> CohortFlows {
        CohortFlows {
            contributor: Flow {
                demand: contributor,
                upload: 500.0,
            },
            balanced: Flow {
                demand: balanced,
                upload: 800.0,
            },
            consumer: Flow {
                demand: consumer,
                upload: 50.0,
            },
        }
    }

    #[test]
    fn reset_restores_initial_state_mid_episode() {
        let mut eng = EconomyEngine::new(EngineConfig::default());
        for _ in 0..10 {
            eng.step(&ActionVector::clamped(4.0, 4.5, 2.0));
        }
        eng.trigger_shock();
        let (obs, info) = eng.reset(Some(9));
        assert_eq!(info.seed, 9);
        assert_eq!(eng.state(), &EconomyState::initial(eng.config()));
        assert_eq!(obs, eng.observation());
    }

    #[test]
    fn fixed_draws_make_step_pure() {
        let cfg = EngineConfig::default();
        let start = EconomyState::initial(&cfg);
        let action = ActionVector::clamped(1.7, 2.4, 0.6);
        let d = draws(180.0, 900.0, 3100.0);
        let mut a = EconomyEngine::from_state(cfg.clone(), start.clone(), 1);
        let mut b = EconomyEngine::from_state(cfg, start, 2);
        for _ in 0..5 {
            assert_eq!(
                a.step_with_draws(&action, &d),
                b.step_with_draws(&action, &d)
            );
        }
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn same_seed_same_trajectory() {
        let mut a = EconomyEngine::new(EngineConfig::default());
        let mut b = EconomyEngine::new(EngineConfig::default());
        a.reset(Some(1234));
        b.reset(Some(1234));
        let action = ActionVector::clamped(1.2, 1.5, 1.0);
        for _ in 0..200 {
            assert_eq!(a.step(&action), b.step(&action));
        }
    }

    #[test]
    fn step_follows_transition_order() {
        let cfg = EngineConfig::default();
        let mut eng = EconomyEngine::new(cfg.clone());
        let action = ActionVector::clamped(2.0, 1.0, 3.0);
        let out = eng.step_with_draws(&action, &draws(200.0, 800.0, 3000.0));

        assert_eq!(out.info.time_of_day, 0.25);
        assert!((out.info.data_quality - 0.805).abs() < 1e-12);
        let c_demand = 200.0 / 2f64.powf(1.1);
        let b_demand = 800.0 / 2f64.powf(1.5);
        assert!((out.flows.contributor.demand - c_demand).abs() < 1e-9);
        assert!((out.flows.balanced.demand - b_demand).abs() < 1e-9);
        assert_eq!(out.flows.consumer.demand, 3000.0);

        let total = c_demand + b_demand + 3000.0;
        let vram = c_demand * 0.5 + b_demand * 0.8 + 3000.0 * 1.5;
        assert!((out.info.server_load - total / 15_000.0).abs() < 1e-12);
        assert!((out.info.vram_load - vram / 10_000.0).abs() < 1e-12);

        let rate = 1.0 * 0.805;
        let contributor = 20_000.0 - c_demand / 1000.0 * 10.0 * 2.0 + 500.0 * rate;
        let consumer = 90_000.0 - (3000.0 / 1000.0 * 10.0 * 2.0 - 50.0 * rate);
        assert!((out.info.net_contributor_tokens - contributor).abs() < 1e-9);
        assert!((out.info.net_consumer_tokens - consumer).abs() < 1e-9);
        assert_eq!(out.info.fiat_rate, 15.0);
        assert!((out.info.system_ccr - 1350.0 / (total + 1.0)).abs() < 1e-12);
        assert_eq!(out.info.price_multiplier, 2.0);
        assert_eq!(eng.state().current_step, 1);
        assert!(!out.terminated && !out.truncated);
        assert!((out.reward - out.breakdown.total()).abs() < 1e-12);
    }

    #[test]
    fn liquidity_backstop_injects_after_settlement() {
        let cfg = EngineConfig::default();
        let mut state = EconomyState::initial(&cfg);
        state.net_consumer_tokens = 5000.0;
        let mut eng = EconomyEngine::from_state(cfg, state, 0);
        let mut d = draws(0.0, 0.0, 1000.0);
        d.consumer.upload = 0.0;
        // cost = 1000 / 1000 * 10 * 1.0 = 10, leaving 4990 before injection
        let out = eng.step_with_draws(&ActionVector::neutral(), &d);
        assert!(out.liquidity_injected);
        assert!((out.info.net_consumer_tokens - 14_990.0).abs() < 1e-9);
    }

    #[test]
    fn shock_applies_once() {
        let mut eng = EconomyEngine::new(EngineConfig::default());
        let d = draws(200.0, 800.0, 3000.0);
        eng.trigger_shock();
        eng.trigger_shock();
        assert!(eng.state().enterprise_shock_pending());

        let first = eng.step_with_draws(&ActionVector::neutral(), &d);
        assert!(first.shock_applied);
        assert_eq!(first.flows.consumer.demand, 11_000.0);
        assert!(!eng.state().enterprise_shock_pending());

        let second = eng.step_with_draws(&ActionVector::neutral(), &d);
        assert!(!second.shock_applied);
        assert_eq!(second.flows.consumer.demand, 3000.0);
    }

    #[test]
    fn shock_only_changes_consumer_demand_under_same_seed() {
        let mut shocked = EconomyEngine::new(EngineConfig::default());
        let mut calm = EconomyEngine::new(EngineConfig::default());
        shocked.trigger_shock();
        let a = shocked.step(&ActionVector::neutral());
        let b = calm.step(&ActionVector::neutral());
        let spike = a.flows.consumer.demand - b.flows.consumer.demand;
        assert!((spike - 8000.0).abs() < 1e-9);
        assert_eq!(a.flows.contributor, b.flows.contributor);
        assert!(a.info.vram_load > b.info.vram_load);
    }

    #[test]
    fn overload_triggers_cascade_and_truncation() {
        let mut eng = EconomyEngine::new(EngineConfig::default());
        // vram = 12000 * 1.5 / 10000 = 1.8
        let out = eng.step_with_draws(&ActionVector::neutral(), &draws(0.0, 0.0, 12_000.0));
        assert!(out.info.vram_load > 1.5);
        assert_eq!(out.breakdown.cascade, -5000.0);
        assert!(out.truncated);
        assert!(!out.terminated);
        assert!(out.episode_over());
    }

    #[test]
    fn insolvent_contributors_truncate() {
        let cfg = EngineConfig::default();
        let mut state = EconomyState::initial(&cfg);
        state.net_contributor_tokens = 1.0;
        let mut eng = EconomyEngine::from_state(cfg, state, 0);
        let mut d = draws(5000.0, 0.0, 0.0);
        d.contributor.upload = 0.0;
        let out = eng.step_with_draws(&ActionVector::neutral(), &d);
        assert_eq!(out.info.net_contributor_tokens, 0.0);
        assert_eq!(out.breakdown.bankruptcy, -1000.0);
        assert!(out.truncated);
    }

    #[test]
    fn episode_horizon() {
        let mut eng = EconomyEngine::new(EngineConfig::default());
        eng.reset(Some(2024));
        let action = ActionVector::neutral();
        for i in 1..=1000u64 {
            let out = eng.step(&action);
            assert!(!out.truncated, "diverged at tick {i}");
            assert_eq!(out.terminated, i == 1000);
        }
        assert_eq!(eng.state().current_step, 1000);
    }

    #[test]
    fn clock_returns_to_midnight_after_a_day() {
        let mut eng = EconomyEngine::new(EngineConfig::default());
        for _ in 0..96 {
            eng.step(&ActionVector::neutral());
        }
        assert_eq!(eng.state().time_of_day, 0.0);
    }

    #[test]
    fn low_quality_suppresses_payouts() {
        let cfg = EngineConfig::default();
        let mut clean = EconomyState::initial(&cfg);
        clean.data_quality = 1.0;
        let mut dirty = clean.clone();
        dirty.data_quality = 0.1;
        let action = ActionVector::clamped(1.0, 2.5, 1.0);
        let d = draws(0.0, 0.0, 0.0);
        let a = EconomyEngine::from_state(cfg.clone(), clean, 0)
            .step_with_draws(&action, &d)
            .info;
        let b = EconomyEngine::from_state(cfg, dirty, 0)
            .step_with_draws(&action, &d)
            .info;
        assert!(a.net_contributor_tokens > b.net_contributor_tokens);
    }

    fn action_strategy() -> impl Strategy<Value = ActionVector> {
        (0.1f64..=5.0, 0.1f64..=5.0, 0.1f64..=5.0)
            .prop_map(|(p, r, f)| ActionVector::clamped(p, r, f))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn invariants_hold_on_random_trajectories(
            seed in any::<u64>(),
            actions in prop::collection::vec(action_strategy(), 1..200),
        ) {
            let mut eng = EconomyEngine::new(EngineConfig::default());
            eng.reset(Some(seed));
            for a in &actions {
                if seed % 7 == 0 {
                    eng.trigger_shock();
                }
                let out = eng.step(a);
                let s = eng.state();
                prop_assert!((0.1..=1.0).contains(&s.data_quality));
                prop_assert!(s.net_contributor_tokens >= 0.0);
                prop_assert!(s.balanced_tokens >= 0.0);
                prop_assert!((0.0..24.0).contains(&s.time_of_day));
                prop_assert!(s.server_load >= 0.0 && s.vram_load >= 0.0);
                if out.episode_over() {
                    eng.reset(None);
                }
            }
        }

        #[test]
        fn high_reward_multiplier_never_raises_quality(
            seed in any::<u64>(),
            rewards in prop::collection::vec(3.0001f64..=5.0, 1..100),
        ) {
            let mut eng = EconomyEngine::new(EngineConfig::default());
            eng.reset(Some(seed));
            let d = draws(200.0, 800.0, 3000.0);
            let mut last = eng.state().data_quality;
            for r in rewards {
                eng.step_with_draws(&ActionVector::clamped(1.0, r, 1.0), &d);
                let q = eng.state().data_quality;
                prop_assert!(q <= last);
                last = q;
            }
        }

        #[test]
        fn moderate_reward_multiplier_never_lowers_quality(
            seed in any::<u64>(),
            rewards in prop::collection::vec(0.1f64..1.9999, 1..100),
        ) {
            let mut eng = EconomyEngine::new(EngineConfig::default());
            eng.reset(Some(seed));
            let d = draws(200.0, 800.0, 3000.0);
            let mut last = eng.state().data_quality;
            for r in rewards {
                eng.step_with_draws(&ActionVector::clamped(1.0, r, 1.0), &d);
                let q = eng.state().data_quality;
                prop_assert!(q >= last);
                last = q;
            }
        }
    }
}
