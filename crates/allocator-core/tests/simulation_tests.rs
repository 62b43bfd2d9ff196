#![cfg(feature = "simulation")]

use allocator_core::config::{RuinPolicy, SimulatorConfig};
use allocator_core::simulation::{
    generate_returns, run_episode, HoldPolicy, Observation, Policy, PredictionProvider,
    PortfolioState, RandomPolicy, RebalanceEnv, SimStatus, StaticPrediction, SyntheticReturns,
    TargetWeightPolicy,
};
use allocator_core::AllocatorError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn synthetic(periods: usize, seed: u64) -> Vec<Vec<Decimal>> {
    generate_returns(&SyntheticReturns {
        mu: vec![dec!(0.0004), dec!(0.0002), dec!(0.0001)],
        sigma: vec![
            vec![dec!(0.0001), dec!(0.00002), dec!(0.0)],
            vec![dec!(0.00002), dec!(0.00004), dec!(0.0)],
            vec![dec!(0.0), dec!(0.0), dec!(0.00001)],
        ],
        periods,
        seed: Some(seed),
    })
    .unwrap()
}

/// Prediction that tracks the step index, to check the provider is consulted.
struct StepEcho;

impl PredictionProvider for StepEcho {
    fn predict(&self, step: usize, state: &PortfolioState) -> Vec<Decimal> {
        vec![Decimal::from(step as i64); state.n_assets()]
    }
}

/// Overweights whichever asset the prediction ranks highest.
struct FollowPrediction;

impl Policy for FollowPrediction {
    fn act(&mut self, observation: &Observation) -> Vec<Decimal> {
        let best = observation
            .prediction
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| **p)
            .map(|(i, _)| i)
            .unwrap_or(0);
        (0..observation.weights.len())
            .map(|i| if i == best { dec!(0.05) } else { dec!(-0.025) })
            .collect()
    }

    fn name(&self) -> &'static str {
        "follow_prediction"
    }
}

#[test]
fn test_custom_prediction_provider_reaches_observations() {
    let mut env = RebalanceEnv::new(synthetic(5, 1), StepEcho, SimulatorConfig::default()).unwrap();
    let first = env.reset();
    assert_eq!(first.prediction, vec![Decimal::ZERO; 3]);
    let next = env.step(&[Decimal::ZERO; 3]).unwrap();
    assert_eq!(next.observation.prediction, vec![Decimal::ONE; 3]);
}

#[test]
fn test_custom_policy_tilts_toward_prediction() {
    let mut env = RebalanceEnv::new(
        synthetic(20, 2),
        StaticPrediction::new(vec![dec!(0.01), dec!(0.08), dec!(0.03)]),
        SimulatorConfig::default(),
    )
    .unwrap();
    let summary = run_episode(&mut env, &mut FollowPrediction).unwrap();
    assert_eq!(summary.policy, "follow_prediction");
    assert!(summary.final_weights[1] > dec!(0.9));
    assert!(summary.total_transaction_cost > Decimal::ZERO);
}

#[test]
fn test_hold_beats_churn_on_flat_returns() {
    let flat = vec![vec![Decimal::ZERO; 3]; 30];
    let config = SimulatorConfig::default();

    let mut env = RebalanceEnv::new(flat.clone(), StaticPrediction::new(vec![]), config.clone())
        .unwrap();
    let hold = run_episode(&mut env, &mut HoldPolicy).unwrap();

    let mut env = RebalanceEnv::new(flat, StaticPrediction::new(vec![]), config).unwrap();
    let churn = run_episode(&mut env, &mut RandomPolicy::new(dec!(0.05), Some(5))).unwrap();

    assert_eq!(hold.final_value, dec!(10000));
    assert!(churn.final_value < hold.final_value);
    assert!(churn.total_reward < Decimal::ZERO);
}

#[test]
fn test_target_policy_on_synthetic_path() {
    let mut env = RebalanceEnv::new(
        synthetic(40, 3),
        StaticPrediction::new(vec![Decimal::ZERO; 3]),
        SimulatorConfig::default(),
    )
    .unwrap();
    let mut policy = TargetWeightPolicy::new(vec![dec!(0.6), dec!(0.3), dec!(0.1)]);
    let summary = run_episode(&mut env, &mut policy).unwrap();
    assert_eq!(summary.steps, 40);
    assert_eq!(env.status(), SimStatus::Terminated);
    for (w, t) in summary.final_weights.iter().zip([dec!(0.6), dec!(0.3), dec!(0.1)]) {
        assert!((w - t).abs() < dec!(0.000001));
    }
}

#[test]
fn test_stepping_after_episode_end_fails() {
    let mut env = RebalanceEnv::new(
        synthetic(2, 4),
        StaticPrediction::new(vec![Decimal::ZERO; 3]),
        SimulatorConfig {
            ruin_policy: RuinPolicy::Clamp,
            ..SimulatorConfig::default()
        },
    )
    .unwrap();
    run_episode(&mut env, &mut HoldPolicy).unwrap();
    assert!(matches!(
        env.step(&[Decimal::ZERO; 3]),
        Err(AllocatorError::EpisodeTerminated)
    ));
}
