use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::simulation::environment::Observation;
use crate::types::WeightVector;

/// Maps an observation to a per-asset weight adjustment.
pub trait Policy {
    fn act(&mut self, observation: &Observation) -> Vec<Decimal>;

    fn name(&self) -> &'static str;
}

/// Never trades.
#[derive(Debug, Clone, Default)]
pub struct HoldPolicy;

impl Policy for HoldPolicy {
    fn act(&mut self, observation: &Observation) -> Vec<Decimal> {
        vec![Decimal::ZERO; observation.weights.len()]
    }

    fn name(&self) -> &'static str {
        "hold"
    }
}

/// Moves toward fixed target weights every step. Large gaps are closed over
/// several steps because the environment clips each action component.
#[derive(Debug, Clone)]
pub struct TargetWeightPolicy {
    pub target: WeightVector,
}

impl TargetWeightPolicy {
    pub fn new(target: WeightVector) -> Self {
        TargetWeightPolicy { target }
    }
}

impl Policy for TargetWeightPolicy {
    fn act(&mut self, observation: &Observation) -> Vec<Decimal> {
        self.target
            .iter()
            .zip(observation.weights.iter())
            .map(|(t, w)| t - w)
            .collect()
    }

    fn name(&self) -> &'static str {
        "target_weights"
    }
}

/// Uniform random adjustments in `[-scale, scale]`, seeded for replay.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
    scale: f64,
}

impl RandomPolicy {
    pub fn new(scale: Decimal, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        RandomPolicy {
            rng,
            scale: scale.abs().to_f64().unwrap_or(0.0),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, observation: &Observation) -> Vec<Decimal> {
        let scale = self.scale;
        (0..observation.weights.len())
            .map(|_| {
                if scale == 0.0 {
                    return Decimal::ZERO;
                }
                let draw: f64 = self.rng.gen_range(-scale..=scale);
                Decimal::from_f64(draw).unwrap_or(Decimal::ZERO).round_dp(10)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn observation() -> Observation {
        Observation {
            step: 0,
            weights: vec![dec!(0.6), dec!(0.4)],
            value: dec!(100),
            prediction: vec![],
        }
    }

    #[test]
    fn test_hold_is_zero() {
        assert_eq!(HoldPolicy.act(&observation()), vec![Decimal::ZERO; 2]);
    }

    #[test]
    fn test_target_weight_gap() {
        let mut policy = TargetWeightPolicy::new(vec![dec!(0.5), dec!(0.5)]);
        assert_eq!(policy.act(&observation()), vec![dec!(-0.1), dec!(0.1)]);
    }

    #[test]
    fn test_random_policy_seeded_and_bounded() {
        let mut a = RandomPolicy::new(dec!(0.05), Some(7));
        let mut b = RandomPolicy::new(dec!(0.05), Some(7));
        for _ in 0..20 {
            let x = a.act(&observation());
            assert_eq!(x, b.act(&observation()));
            assert!(x.iter().all(|v| v.abs() <= dec!(0.05)));
        }
    }
}
