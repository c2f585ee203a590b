//! Deterministic pieces of the per-tick transition.
//!
//! Every helper here is pure and saturating: out-of-range inputs are clamped
//! rather than reported.

use sim_core::{CohortProfile, EngineConfig, QualityConfig};
use std::f64::consts::PI;

/// Lowest traffic multiplier reached in the dead of night.
pub const MIN_BUSINESS_MULTIPLIER: f64 = 0.2;

/// Advance the simulated clock, wrapping into [0, 24).
pub fn advance_clock(time_of_day: f64, tick_hours: f64) -> f64 {
    let t = (time_of_day + tick_hours).rem_euclid(24.0);
    // rem_euclid can round up to exactly 24.0 for tiny negative inputs.
    if t >= 24.0 {
        0.0
    } else {
        t
    }
}

/// Business-hour traffic factor: peaks at 1.5 around noon, floored at 0.2.
///
/// Example:
/// assert!((business_hour_multiplier(12.0) - 1.5).abs() < 1e-12);
/// assert_eq!(business_hour_multiplier(0.0), 0.2);
pub fn business_hour_multiplier(time_of_day: f64) -> f64 {
    let m = 0.8 + 0.7 * ((time_of_day - 6.0) * PI / 12.0).sin();
    m.max(MIN_BUSINESS_MULTIPLIER)
}

/// Apply the spam/moderation rule to data quality.
pub fn update_quality(quality: f64, reward_multiplier: f64, cfg: &QualityConfig) -> f64 {
    if reward_multiplier > cfg.degrade_above {
        (quality - cfg.degrade_step).max(cfg.floor)
    } else if reward_multiplier < cfg.restore_below {
        (quality + cfg.restore_step).min(cfg.ceiling)
    } else {
        quality
    }
}

/// Tokens actually paid per uploaded unit. Garbage data pays less.
pub fn effective_reward_rate(reward_multiplier: f64, quality: f64) -> f64 {
    reward_multiplier * quality
}

/// Demand after the price response of a cohort. Exponent 0 is inelastic.
pub fn elastic_demand(raw_demand: f64, price_multiplier: f64, profile: &CohortProfile) -> f64 {
    if profile.elasticity == 0.0 {
        return raw_demand.max(0.0);
    }
    (raw_demand / price_multiplier.powf(profile.elasticity)).max(0.0)
}

/// Token cost of a tick's demand for one cohort.
pub fn consumption_cost(demand: f64, price_multiplier: f64, cfg: &EngineConfig) -> f64 {
    (demand / 1000.0) * cfg.base_unit_cost * price_multiplier
}

/// Fiat price of tokens; recomputed from scratch each tick.
pub fn fiat_rate(fiat_tax_multiplier: f64, cfg: &EngineConfig) -> f64 {
    cfg.base_fiat_rate * fiat_tax_multiplier
}

/// Emergency fiat purchase: returns the new consumer balance and whether
/// tokens were injected.
pub fn apply_liquidity_backstop(consumer_tokens: f64, cfg: &EngineConfig) -> (f64, bool) {
    if consumer_tokens < cfg.liquidity.threshold {
        (consumer_tokens + cfg.liquidity.injection, true)
    } else {
        (consumer_tokens, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(advance_clock(23.75, 0.25), 0.0);
        assert_eq!(advance_clock(10.0, 0.25), 10.25);
        assert!((0.0..24.0).contains(&advance_clock(-1e-18, 0.0)));
    }

    #[test]
    fn traffic_cycle_shape() {
        assert!((business_hour_multiplier(12.0) - 1.5).abs() < 1e-12);
        assert!((business_hour_multiplier(6.0) - 0.8).abs() < 1e-12);
        // 0.8 - 0.7 at midnight is below the floor.
        assert_eq!(business_hour_multiplier(0.0), MIN_BUSINESS_MULTIPLIER);
        let noon = business_hour_multiplier(12.0);
        assert!(noon > business_hour_multiplier(18.0));
    }

    #[test]
    fn quality_bands() {
        let q = QualityConfig::default();
        assert!((update_quality(0.8, 3.5, &q) - 0.79).abs() < 1e-12);
        assert!((update_quality(0.8, 1.0, &q) - 0.805).abs() < 1e-12);
        assert_eq!(update_quality(0.8, 2.0, &q), 0.8);
        assert_eq!(update_quality(0.8, 3.0, &q), 0.8);
        assert_eq!(update_quality(0.1, 5.0, &q), 0.1);
        assert_eq!(update_quality(1.0, 0.1, &q), 1.0);
    }

    #[test]
    fn balanced_cohort_is_more_price_sensitive() {
        let cfg = EngineConfig::default();
        let c = elastic_demand(1000.0, 2.0, &cfg.cohorts.contributor);
        let b = elastic_demand(1000.0, 2.0, &cfg.cohorts.balanced);
        let k = elastic_demand(1000.0, 2.0, &cfg.cohorts.consumer);
        assert!(b < c);
        assert_eq!(k, 1000.0);
        assert!((c - 1000.0 / 2f64.powf(1.1)).abs() < 1e-9);
    }

    #[test]
    fn liquidity_rule() {
        let cfg = EngineConfig::default();
        assert_eq!(apply_liquidity_backstop(4999.0, &cfg), (14_999.0, true));
        assert_eq!(apply_liquidity_backstop(5000.0, &cfg), (5000.0, false));
        assert_eq!(apply_liquidity_backstop(-200.0, &cfg), (9800.0, true));
    }

    #[test]
    fn cost_and_fiat() {
        let cfg = EngineConfig::default();
        assert!((consumption_cost(3000.0, 2.0, &cfg) - 60.0).abs() < 1e-12);
        assert_eq!(fiat_rate(0.5, &cfg), 2.5);
    }
}
