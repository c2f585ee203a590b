//! Tick session: one economy, one policy, one control inbox.
//!
//! State lives in a `bevy_ecs` world and is advanced by a chained schedule:
//! apply controls, decide the action, step the engine, publish a payload.
//! Readers only ever see the published [`TickPayload`] or a state snapshot.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use serde::{Deserialize, Serialize};
use sim_ai::{Decision, Policy, PolicySelector};
use sim_core::{EconomyState, EngineConfig, RuntimeConfig, StepInfo};
use sim_econ::{EconomyEngine, StepOutcome};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::control::{control_channel, ControlHandle, ControlMessage};

/// Broadcast record produced after every tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickPayload {
    #[serde(flatten)]
    pub info: StepInfo,
    /// Whether the price multiplier was pinned by a manual override.
    pub is_manual: bool,
    /// Scalar reward of the tick.
    pub reward_health: f64,
}

impl TickPayload {
    pub fn from_outcome(outcome: &StepOutcome, is_manual: bool) -> Self {
        Self {
            info: outcome.info.clone(),
            is_manual,
            reward_health: outcome.reward,
        }
    }
}

/// Running counters of a session.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ticks: u64,
    pub episodes_completed: u64,
    pub truncations: u64,
    pub liquidity_injections: u64,
    pub shocks_applied: u64,
}

#[derive(Resource)]
struct Economy(EconomyEngine);

#[derive(Resource)]
struct ActivePolicy(PolicySelector);

#[derive(Resource)]
struct ControlInbox(Mutex<Receiver<ControlMessage>>);

#[derive(Resource, Default)]
struct PendingDecision(Option<Decision>);

#[derive(Resource, Default)]
struct LatestTick(Option<TickPayload>);

#[derive(Resource)]
struct Settings(RuntimeConfig);

fn apply_controls(
    mut inbox: ResMut<ControlInbox>,
    mut economy: ResMut<Economy>,
    mut policy: ResMut<ActivePolicy>,
) {
    let rx = inbox.0.get_mut().unwrap_or_else(PoisonError::into_inner);
    while let Ok(msg) = rx.try_recv() {
        match msg {
            ControlMessage::Override { value } => {
                if let Some(price) = policy.0.engage_override(value) {
                    info!(price, "manual override engaged");
                }
            }
            ControlMessage::Auto => {
                if policy.0.override_price().is_some() {
                    info!(policy = policy.0.base_name(), "manual override released");
                }
                policy.0.disengage_override();
            }
            ControlMessage::Shock => {
                info!("enterprise shock requested");
                economy.0.trigger_shock();
            }
        }
    }
}

fn decide_action(
    economy: Res<Economy>,
    mut policy: ResMut<ActivePolicy>,
    mut pending: ResMut<PendingDecision>,
) {
    let obs = economy.0.observation();
    pending.0 = Some(policy.0.decide(&obs));
}

fn step_economy(
    mut economy: ResMut<Economy>,
    mut pending: ResMut<PendingDecision>,
    settings: Res<Settings>,
    mut latest: ResMut<LatestTick>,
    mut stats: ResMut<SessionStats>,
) {
    let Some(decision) = pending.0.take() else {
        return;
    };
    let outcome = economy.0.step(&decision.action);
    stats.ticks += 1;
    if outcome.liquidity_injected {
        stats.liquidity_injections += 1;
    }
    if outcome.shock_applied {
        stats.shocks_applied += 1;
    }
    if outcome.episode_over() {
        stats.episodes_completed += 1;
        if outcome.truncated {
            stats.truncations += 1;
        }
        info!(
            step = economy.0.state().current_step,
            terminated = outcome.terminated,
            truncated = outcome.truncated,
            server_load = outcome.info.server_load,
            vram_load = outcome.info.vram_load,
            contributor_tokens = outcome.info.net_contributor_tokens,
            "episode finished"
        );
        if settings.0.auto_reset {
            let (_, reset) = economy.0.reset(None);
            debug!(seed = reset.seed, "economy restarted");
        }
    }
    latest.0 = Some(TickPayload::from_outcome(&outcome, decision.is_manual()));
}

/// Drives one economy under a policy and a control inbox.
pub struct Session {
    world: World,
    schedule: Schedule,
    handle: ControlHandle,
}

impl Session {
    pub fn new(config: EngineConfig, runtime: RuntimeConfig, policy: Box<dyn Policy>) -> Self {
        let (handle, inbox) = control_channel();
        let mut world = World::new();
        info!(
            policy = policy.name(),
            seed = config.seed,
            max_steps = config.max_steps,
            "session starting"
        );
        world.insert_resource(Economy(EconomyEngine::new(config)));
        world.insert_resource(ActivePolicy(PolicySelector::new(policy)));
        world.insert_resource(ControlInbox(Mutex::new(inbox)));
        world.insert_resource(PendingDecision::default());
        world.insert_resource(LatestTick::default());
        world.insert_resource(SessionStats::default());
        world.insert_resource(Settings(runtime));

        let mut schedule = Schedule::default();
        // One economy, one thread of control.
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);
        schedule.add_systems((apply_controls, decide_action, step_economy).chain());
        Self {
            world,
            schedule,
            handle,
        }
    }

    /// Handle for feeding control messages into this session.
    pub fn control_handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Run one tick and return its broadcast payload.
    pub fn tick(&mut self) -> TickPayload {
        self.schedule.run(&mut self.world);
        self.world
            .resource::<LatestTick>()
            .0
            .clone()
            .unwrap_or_default()
    }

    /// Payload of the most recent tick, if any.
    pub fn latest(&self) -> Option<&TickPayload> {
        self.world.resource::<LatestTick>().0.as_ref()
    }

    /// Copy of the economy state after the last tick.
    pub fn snapshot(&self) -> EconomyState {
        self.world.resource::<Economy>().0.snapshot()
    }

    pub fn stats(&self) -> SessionStats {
        *self.world.resource::<SessionStats>()
    }

    /// Price currently pinned by a manual override.
    pub fn override_price(&self) -> Option<f64> {
        self.world.resource::<ActivePolicy>().0.override_price()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_ai::UniformRandomPolicy;

    fn session(max_steps: u64, auto_reset: bool) -> Session {
        let config = EngineConfig {
            max_steps,
            ..EngineConfig::default()
        };
        let runtime = RuntimeConfig {
            tick_interval_ms: 0,
            auto_reset,
        };
        Session::new(config, runtime, Box::new(UniformRandomPolicy::new(3)))
    }

    #[test]
    fn tick_publishes_payload() {
        let mut s = session(1000, true);
        assert!(s.latest().is_none());
        let p = s.tick();
        assert_eq!(p.info.time_of_day, 0.25);
        assert!(!p.is_manual);
        assert_eq!(s.latest(), Some(&p));
        assert_eq!(s.snapshot().current_step, 1);
        assert_eq!(s.stats().ticks, 1);
    }

    #[test]
    fn override_pins_price_until_auto() {
        let mut s = session(1000, true);
        let h = s.control_handle();
        h.engage_override(4.2);
        let p = s.tick();
        assert!(p.is_manual);
        assert_eq!(p.info.price_multiplier, 4.2);
        assert_eq!(s.override_price(), Some(4.2));

        let p = s.tick();
        assert!(p.is_manual);

        h.release_override();
        let p = s.tick();
        assert!(!p.is_manual);
        assert_eq!(s.override_price(), None);
    }

    #[test]
    fn malformed_controls_do_not_reach_the_engine() {
        let mut s = session(1000, true);
        let h = s.control_handle();
        assert!(!h.send_raw(r#"{"type":"override","value":"abc"}"#));
        let p = s.tick();
        assert!(!p.is_manual);
    }

    #[test]
    fn admin_shock_raises_vram_load_for_one_tick() {
        let mut calm = session(1000, true);
        let mut shocked = session(1000, true);
        shocked.control_handle().trigger_shock();
        shocked.control_handle().trigger_shock();

        let a = calm.tick();
        let b = shocked.tick();
        assert!(b.info.vram_load > a.info.vram_load);
        assert_eq!(shocked.stats().shocks_applied, 1);

        let a = calm.tick();
        let b = shocked.tick();
        assert_eq!(shocked.stats().shocks_applied, 1);
        assert_eq!(a.info.price_multiplier, b.info.price_multiplier);
    }

    #[test]
    fn auto_reset_after_horizon() {
        let mut s = session(3, true);
        for _ in 0..3 {
            s.tick();
        }
        assert_eq!(s.stats().episodes_completed, 1);
        assert_eq!(s.snapshot().current_step, 0);
        s.tick();
        assert_eq!(s.snapshot().current_step, 1);
    }

    #[test]
    fn without_auto_reset_the_counter_keeps_going() {
        let mut s = session(3, false);
        for _ in 0..5 {
            s.tick();
        }
        assert_eq!(s.snapshot().current_step, 5);
        assert!(s.stats().episodes_completed >= 3);
    }

    #[test]
    fn payload_serialises_flat() {
        let mut s = session(1000, true);
        let p = s.tick();
        let v: serde_json::Value = serde_json::to_value(&p).unwrap();
        for key in [
            "server_load",
            "vram_load",
            "time_of_day",
            "data_quality",
            "fiat_rate",
            "net_contributor_tokens",
            "balanced_tokens",
            "net_consumer_tokens",
            "system_ccr",
            "price_multiplier",
            "reward_multiplier",
            "fiat_tax_multiplier",
            "is_manual",
            "reward_health",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        let back: TickPayload = serde_json::from_value(v).unwrap();
        assert_eq!(back.is_manual, p.is_manual);
        assert!((back.info.server_load - p.info.server_load).abs() < 1e-12);
    }
}
