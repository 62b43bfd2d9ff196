use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::SimulatorConfig;
use crate::error::AllocatorError;
use crate::simulation::environment::{PredictionProvider, RebalanceEnv, StaticPrediction};
use crate::simulation::policy::{HoldPolicy, Policy, RandomPolicy, TargetWeightPolicy};
use crate::simulation::synthetic::{generate_returns, SyntheticReturns};
use crate::types::{with_metadata, ComputationOutput, Matrix, WeightVector};
use crate::AllocatorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Aggregate statistics of one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub policy: String,
    pub steps: usize,
    pub initial_value: Decimal,
    pub final_value: Decimal,
    /// final_value / initial_value - 1
    pub cumulative_return: Decimal,
    pub total_reward: Decimal,
    pub total_turnover: Decimal,
    pub total_transaction_cost: Decimal,
    /// Largest peak-to-trough decline of portfolio value, as a fraction.
    pub max_drawdown: Decimal,
    pub ruined: bool,
    pub final_weights: WeightVector,
    pub rewards: Vec<Decimal>,
    /// Value after each step, starting with the initial value.
    pub values: Vec<Decimal>,
}

/// Where the episode's realised returns come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ReturnsSource {
    /// T x n realised returns.
    Historical { returns: Matrix },
    Synthetic(SyntheticReturns),
}

/// Scripted policy selection for [`run_simulation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicySpec {
    Hold,
    TargetWeights { weights: WeightVector },
    Random { scale: Decimal, seed: Option<u64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    pub returns: ReturnsSource,
    pub policy: PolicySpec,
    /// Static prediction attached to every observation; zeros when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Vec<Decimal>>,
    #[serde(default)]
    pub config: SimulatorConfig,
}

// ---------------------------------------------------------------------------
// Episode driver
// ---------------------------------------------------------------------------

/// Reset `env` and step it with `policy` until the episode ends.
pub fn run_episode<P, A>(env: &mut RebalanceEnv<P>, policy: &mut A) -> AllocatorResult<EpisodeSummary>
where
    P: PredictionProvider,
    A: Policy + ?Sized,
{
    let mut observation = env.reset();
    let initial_value = observation.value;

    let mut rewards = Vec::with_capacity(env.horizon());
    let mut values = Vec::with_capacity(env.horizon() + 1);
    values.push(initial_value);
    let mut total_turnover = Decimal::ZERO;
    let mut total_transaction_cost = Decimal::ZERO;
    let mut ruined = false;

    loop {
        let action = policy.act(&observation);
        let outcome = env.step(&action)?;
        rewards.push(outcome.reward);
        values.push(outcome.observation.value);
        total_turnover += outcome.turnover;
        total_transaction_cost += outcome.transaction_cost;
        ruined = outcome.ruined;
        observation = outcome.observation;
        if outcome.done {
            break;
        }
    }

    let final_value = observation.value;
    debug!(
        policy = policy.name(),
        steps = rewards.len(),
        final_value = %final_value,
        "episode complete"
    );

    Ok(EpisodeSummary {
        policy: policy.name().to_string(),
        steps: rewards.len(),
        initial_value,
        final_value,
        cumulative_return: final_value / initial_value - Decimal::ONE,
        total_reward: rewards.iter().sum(),
        total_turnover,
        total_transaction_cost,
        max_drawdown: max_drawdown(&values),
        ruined,
        final_weights: observation.weights,
        rewards,
        values,
    })
}

/// Build the environment and policy described by `input` and run one episode.
pub fn run_simulation(
    input: &SimulationInput,
) -> AllocatorResult<ComputationOutput<EpisodeSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let returns = match &input.returns {
        ReturnsSource::Historical { returns } => returns.clone(),
        ReturnsSource::Synthetic(spec) => generate_returns(spec)?,
    };
    let n = returns.first().map(|r| r.len()).unwrap_or(0);
    let prediction = match &input.prediction {
        Some(p) if p.len() != n => {
            return Err(AllocatorError::InvalidInput {
                field: "prediction".into(),
                reason: format!("Expected {} values but got {}", n, p.len()),
            })
        }
        Some(p) => p.clone(),
        None => vec![Decimal::ZERO; n],
    };

    let mut env = RebalanceEnv::new(returns, StaticPrediction::new(prediction), input.config.clone())?;
    let mut policy: Box<dyn Policy> = match &input.policy {
        PolicySpec::Hold => Box::new(HoldPolicy),
        PolicySpec::TargetWeights { weights } => {
            if weights.len() != n {
                return Err(AllocatorError::InvalidInput {
                    field: "policy.weights".into(),
                    reason: format!("Expected {} weights but got {}", n, weights.len()),
                });
            }
            Box::new(TargetWeightPolicy::new(weights.clone()))
        }
        PolicySpec::Random { scale, seed } => Box::new(RandomPolicy::new(*scale, *seed)),
    };

    let summary = run_episode(&mut env, policy.as_mut())?;
    if summary.ruined {
        warnings.push(format!(
            "Portfolio ruined after {} of {} steps",
            summary.steps,
            env.horizon()
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Single-period rebalancing simulation with proportional transaction costs",
        &serde_json::json!({
            "policy": summary.policy,
            "horizon": env.horizon(),
            "transaction_cost_rate": input.config.transaction_cost_rate.to_string(),
            "action_bound": input.config.action_bound.to_string(),
            "ruin_policy": input.config.ruin_policy,
        }),
        warnings,
        elapsed,
        summary,
    ))
}

/// Largest relative decline from a running peak.
fn max_drawdown(values: &[Decimal]) -> Decimal {
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;
    for v in values {
        if *v > peak {
            peak = *v;
        }
        if peak > Decimal::ZERO {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}
