use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SimulatorConfig;
use crate::error::AllocatorError;
use crate::simulation::rebalance::{simulate_step, PortfolioState};
use crate::types::{Matrix, WeightVector};
use crate::AllocatorResult;

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Source of the per-asset prediction vector attached to each observation.
pub trait PredictionProvider {
    fn predict(&self, step: usize, state: &PortfolioState) -> Vec<Decimal>;
}

/// The same expected-return vector at every step (e.g. a posterior mean).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPrediction {
    pub expected_returns: Vec<Decimal>,
}

impl StaticPrediction {
    pub fn new(expected_returns: Vec<Decimal>) -> Self {
        StaticPrediction { expected_returns }
    }
}

impl PredictionProvider for StaticPrediction {
    fn predict(&self, _step: usize, _state: &PortfolioState) -> Vec<Decimal> {
        self.expected_returns.clone()
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimStatus {
    Active,
    Terminated,
}

/// What the agent sees before choosing an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Index of the next return period to be applied.
    pub step: usize,
    pub weights: WeightVector,
    pub value: Decimal,
    pub prediction: Vec<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: Decimal,
    pub done: bool,
    pub portfolio_return: Decimal,
    pub turnover: Decimal,
    pub transaction_cost: Decimal,
    /// True when the episode ended because the portfolio was ruined.
    pub ruined: bool,
}

/// Rebalancing environment over a fixed series of realised returns.
///
/// One `step` consumes one row of `returns`. The episode terminates after
/// the last row or on a clamped ruin; a terminated episode must be `reset`.
pub struct RebalanceEnv<P: PredictionProvider> {
    returns: Matrix,
    config: SimulatorConfig,
    predictor: P,
    state: PortfolioState,
    step: usize,
    status: SimStatus,
}

impl<P: PredictionProvider> RebalanceEnv<P> {
    /// `returns` is T x n, one row per period.
    pub fn new(returns: Matrix, predictor: P, config: SimulatorConfig) -> AllocatorResult<Self> {
        config.validate()?;
        let n = returns.first().map(|r| r.len()).unwrap_or(0);
        if returns.is_empty() || n == 0 {
            return Err(AllocatorError::InsufficientData(
                "At least one return period with one asset required".into(),
            ));
        }
        if let Some((t, row)) = returns.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(AllocatorError::InvalidInput {
                field: format!("returns[{}]", t),
                reason: format!("Expected {} returns but got {}", n, row.len()),
            });
        }
        let state = PortfolioState::initial(n, config.initial_value);
        Ok(RebalanceEnv {
            returns,
            config,
            predictor,
            state,
            step: 0,
            status: SimStatus::Active,
        })
    }

    /// Restore equal weights and the initial capital.
    pub fn reset(&mut self) -> Observation {
        self.state = PortfolioState::initial(self.n_assets(), self.config.initial_value);
        self.step = 0;
        self.status = SimStatus::Active;
        self.observe()
    }

    /// Apply `action` and the next period of returns.
    pub fn step(&mut self, action: &[Decimal]) -> AllocatorResult<StepOutcome> {
        if self.status == SimStatus::Terminated {
            return Err(AllocatorError::EpisodeTerminated);
        }
        let realized = &self.returns[self.step];
        let result = match simulate_step(&self.state, realized, action, &self.config) {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, AllocatorError::PortfolioRuin { .. }) {
                    self.status = SimStatus::Terminated;
                }
                return Err(e);
            }
        };

        self.state = result.state;
        self.step += 1;
        let done = result.done || self.step >= self.returns.len();
        if done {
            self.status = SimStatus::Terminated;
            debug!(step = self.step, value = %self.state.value, "episode finished");
        }

        Ok(StepOutcome {
            observation: self.observe(),
            reward: result.reward,
            done,
            portfolio_return: result.portfolio_return,
            turnover: result.turnover,
            transaction_cost: result.transaction_cost,
            ruined: result.done,
        })
    }

    pub fn observe(&self) -> Observation {
        Observation {
            step: self.step,
            weights: self.state.weights.clone(),
            value: self.state.value,
            prediction: self.predictor.predict(self.step, &self.state),
        }
    }

    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn n_assets(&self) -> usize {
        self.returns.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Number of return periods in one episode.
    pub fn horizon(&self) -> usize {
        self.returns.len()
    }
}
