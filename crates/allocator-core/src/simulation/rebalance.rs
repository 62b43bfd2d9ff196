use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{RuinPolicy, SimulatorConfig};
use crate::error::AllocatorError;
use crate::linalg::{equal_weights, l1_distance, validate_weight_vector, vec_dot};
use crate::types::WeightVector;
use crate::AllocatorResult;

const STATE_WEIGHT_TOLERANCE: Decimal = dec!(0.000001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Holdings carried from one step to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub weights: WeightVector,
    /// Portfolio value in currency units. Zero only after a clamped ruin.
    pub value: Decimal,
}

impl PortfolioState {
    /// Equal weights holding `initial_value`.
    pub fn initial(n_assets: usize, initial_value: Decimal) -> Self {
        PortfolioState {
            weights: equal_weights(n_assets),
            value: initial_value,
        }
    }

    pub fn n_assets(&self) -> usize {
        self.weights.len()
    }
}

/// Outcome of one transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub state: PortfolioState,
    pub reward: Decimal,
    /// Set when the step ruined the portfolio under [`RuinPolicy::Clamp`].
    pub done: bool,
    /// current_weights . realized_returns
    pub portfolio_return: Decimal,
    /// ||new_weights - current_weights||_1
    pub turnover: Decimal,
    /// tc_rate * turnover * value
    pub transaction_cost: Decimal,
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Apply one rebalancing action and one period of realised returns.
///
/// ```text
/// raw_new_w        = max(0, w + clip(action, -bound, bound))
/// new_weights      = raw_new_w / sum(raw_new_w)      (1/n if the sum is 0)
/// turnover_cost    = tc_rate * ||new_weights - w||_1 * value
/// portfolio_return = w . realized_returns
/// new_value        = value * (1 + portfolio_return) - turnover_cost
/// reward           = portfolio_return - turnover_cost / new_value
/// ```
///
/// Returns are earned on the weights held going into the period; the
/// rebalanced weights become the new state. A zero action leaves the
/// weights untouched.
pub fn simulate_step(
    state: &PortfolioState,
    realized_returns: &[Decimal],
    action: &[Decimal],
    config: &SimulatorConfig,
) -> AllocatorResult<StepResult> {
    let n = state.n_assets();
    validate_step(state, realized_returns, action, n)?;

    let bound = config.action_bound;
    let clipped: Vec<Decimal> = action.iter().map(|a| (*a).clamp(-bound, bound)).collect();

    let new_weights = if clipped.iter().all(|a| a.is_zero()) {
        state.weights.clone()
    } else {
        let raw: Vec<Decimal> = state
            .weights
            .iter()
            .zip(clipped.iter())
            .map(|(w, a)| (w + a).max(Decimal::ZERO))
            .collect();
        let total: Decimal = raw.iter().sum();
        if total.is_zero() {
            equal_weights(n)
        } else {
            raw.iter().map(|w| w / total).collect()
        }
    };

    let turnover = l1_distance(&new_weights, &state.weights);
    let transaction_cost = config.transaction_cost_rate * turnover * state.value;
    let portfolio_return = vec_dot(&state.weights, realized_returns);
    let new_value = state.value * (Decimal::ONE + portfolio_return) - transaction_cost;

    if new_value <= Decimal::ZERO {
        return match config.ruin_policy {
            RuinPolicy::Fail => Err(AllocatorError::PortfolioRuin { value: new_value }),
            RuinPolicy::Clamp => {
                warn!(value = %new_value, "portfolio ruined; clamping value to zero");
                Ok(StepResult {
                    state: PortfolioState {
                        weights: new_weights,
                        value: Decimal::ZERO,
                    },
                    reward: -Decimal::ONE,
                    done: true,
                    portfolio_return,
                    turnover,
                    transaction_cost,
                })
            }
        };
    }

    let reward = portfolio_return - transaction_cost / new_value;

    Ok(StepResult {
        state: PortfolioState {
            weights: new_weights,
            value: new_value,
        },
        reward,
        done: false,
        portfolio_return,
        turnover,
        transaction_cost,
    })
}

fn validate_step(
    state: &PortfolioState,
    realized_returns: &[Decimal],
    action: &[Decimal],
    n: usize,
) -> AllocatorResult<()> {
    if n == 0 {
        return Err(AllocatorError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if state.value <= Decimal::ZERO {
        return Err(AllocatorError::InvalidInput {
            field: "state.value".into(),
            reason: format!("Portfolio value must be positive (got {})", state.value),
        });
    }
    validate_weight_vector("state.weights", &state.weights, n, STATE_WEIGHT_TOLERANCE)?;
    if realized_returns.len() != n {
        return Err(AllocatorError::InvalidInput {
            field: "realized_returns".into(),
            reason: format!("Expected {} returns but got {}", n, realized_returns.len()),
        });
    }
    if action.len() != n {
        return Err(AllocatorError::InvalidInput {
            field: "action".into(),
            reason: format!("Expected {} components but got {}", n, action.len()),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
