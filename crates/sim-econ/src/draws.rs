//! Stochastic cohort demand and upload draws.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use sim_core::{CohortConfig, CohortProfile, NormalParams};

/// Demand and upload of one cohort for a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// API consumption (requests).
    pub demand: f64,
    /// Contributed data units.
    pub upload: f64,
}

/// Flows of all three cohorts.
///
/// Used both for raw draws (business-hour scaled, floored at zero) fed into
/// the transition and for the realised flows it reports back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortFlows {
    pub contributor: Flow,
    pub balanced: Flow,
    pub consumer: Flow,
}

impl CohortFlows {
    pub fn total_demand(&self) -> f64 {
        self.contributor.demand + self.balanced.demand + self.consumer.demand
    }

    pub fn total_upload(&self) -> f64 {
        self.contributor.upload + self.balanced.upload + self.consumer.upload
    }
}

fn normal<R: Rng>(rng: &mut R, p: NormalParams) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    p.mean + p.std_dev * z
}

fn draw_flow<R: Rng>(rng: &mut R, profile: &CohortProfile, business: f64) -> Flow {
    let demand_scale = if profile.demand_business_scaled {
        business
    } else {
        1.0
    };
    let upload_scale = if profile.upload_business_scaled {
        business
    } else {
        1.0
    };
    // Draw order is part of the replay contract: demand first, then upload.
    let demand = (normal(rng, profile.demand) * demand_scale).max(0.0);
    let upload = (normal(rng, profile.upload) * upload_scale).max(0.0);
    Flow { demand, upload }
}

/// Draw this tick's flows in cohort order contributor, balanced, consumer.
pub fn sample_flows<R: Rng>(rng: &mut R, cohorts: &CohortConfig, business: f64) -> CohortFlows {
    let contributor = draw_flow(rng, &cohorts.contributor, business);
    let balanced = draw_flow(rng, &cohorts.balanced, business);
    let consumer = draw_flow(rng, &cohorts.consumer, business);
    CohortFlows {
        contributor,
        balanced,
        consumer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn seeded_draws_replay() {
        let cohorts = CohortConfig::default();
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..32 {
            assert_eq!(
                sample_flows(&mut a, &cohorts, 1.2),
                sample_flows(&mut b, &cohorts, 1.2)
            );
        }
    }

    #[test]
    fn zero_variance_draws_are_the_means() {
        let mut cohorts = CohortConfig::default();
        for c in [
            &mut cohorts.contributor,
            &mut cohorts.balanced,
            &mut cohorts.consumer,
        ] {
            c.demand.std_dev = 0.0;
            c.upload.std_dev = 0.0;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let f = sample_flows(&mut rng, &cohorts, 0.5);
        let flow = |demand, upload| Flow { demand, upload };
        assert_eq!(f.contributor, flow(100.0, 500.0));
        assert_eq!(f.balanced, flow(400.0, 400.0));
        assert_eq!(f.consumer, flow(1500.0, 50.0));
    }

    proptest! {
        #[test]
        fn draws_are_floored_at_zero(seed in any::<u64>(), business in 0.2f64..1.5) {
            let mut cohorts = CohortConfig::default();
            // Wide enough that negative raw samples are common.
            cohorts.contributor.demand = NormalParams::new(0.0, 1000.0);
            cohorts.consumer.upload = NormalParams::new(-10.0, 5.0);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let f = sample_flows(&mut rng, &cohorts, business);
            for flow in [f.contributor, f.balanced, f.consumer] {
                prop_assert!(flow.demand >= 0.0);
                prop_assert!(flow.upload >= 0.0);
            }
        }
    }
}
