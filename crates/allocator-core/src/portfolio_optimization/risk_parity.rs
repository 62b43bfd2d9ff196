use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::RiskParityConfig;
use crate::error::AllocatorError;
use crate::linalg::{
    equal_weights, l2_norm, mat_vec_multiply, sqrt_decimal, validate_covariance_matrix, vec_dot,
};
use crate::types::{with_metadata, ComputationOutput, Matrix, WeightVector};
use crate::AllocatorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Terminal status of the fixed-point iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskParityStatus {
    Converged,
    /// Best-effort weights from the last iterate.
    MaxIterationsReached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParityResult {
    pub weights: WeightVector,
    /// Fractional risk contributions, summing to 1.
    pub risk_contributions: Vec<Decimal>,
    pub iterations: u32,
    /// ||rc - 1/n||_2 at the last iterate.
    pub residual: Decimal,
    pub status: RiskParityStatus,
}

impl RiskParityResult {
    pub fn is_converged(&self) -> bool {
        self.status == RiskParityStatus::Converged
    }

    /// Turn a best-effort outcome into an error.
    pub fn require_converged(self) -> AllocatorResult<Self> {
        match self.status {
            RiskParityStatus::Converged => Ok(self),
            RiskParityStatus::MaxIterationsReached => Err(AllocatorError::MaxIterationsReached {
                iterations: self.iterations,
                residual: self.residual,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParityInput {
    /// Asset identifiers; positional labels are used when empty.
    #[serde(default)]
    pub assets: Vec<String>,
    /// N x N covariance matrix.
    pub covariance: Matrix,
    #[serde(default)]
    pub config: RiskParityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAllocation {
    pub name: String,
    pub weight: Decimal,
    pub risk_contribution: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParityOutput {
    pub solution: RiskParityResult,
    pub allocations: Vec<RiskAllocation>,
    pub portfolio_volatility: Decimal,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Equal-risk-contribution weights with the default step size.
pub fn solve_risk_parity(
    sigma: &[Vec<Decimal>],
    tol: Decimal,
    max_iter: u32,
) -> AllocatorResult<RiskParityResult> {
    let config = RiskParityConfig {
        tolerance: tol,
        max_iterations: max_iter,
        ..RiskParityConfig::default()
    };
    solve_risk_parity_with_config(sigma, &config)
}

/// Fixed-point iteration from equal weights:
///
/// ```text
/// rc_i = w_i * (Sigma w)_i / (w' Sigma w)
/// w   <- normalise(max(0, w - step * (rc - 1/n)))
/// ```
///
/// Stops when `||rc - 1/n||_2 < tolerance`. Exhausting the iteration cap is
/// reported through [`RiskParityStatus::MaxIterationsReached`], not an error.
pub fn solve_risk_parity_with_config(
    sigma: &[Vec<Decimal>],
    config: &RiskParityConfig,
) -> AllocatorResult<RiskParityResult> {
    config.validate()?;
    let n = sigma.len();
    if n == 0 {
        return Err(AllocatorError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    validate_covariance_matrix("sigma", sigma, n)?;
    if let Some(i) = (0..n).find(|&i| sigma[i][i].is_zero()) {
        return Err(AllocatorError::InvalidInput {
            field: "sigma".into(),
            reason: format!("Asset {} has zero variance; its risk contribution is undefined", i),
        });
    }

    let target = Decimal::ONE / Decimal::from(n as i64);
    let mut w = equal_weights(n);
    let mut residual = Decimal::ZERO;
    let mut rc = vec![target; n];

    for iteration in 0..config.max_iterations {
        rc = risk_contributions(sigma, &w).ok_or_else(|| AllocatorError::SolverDidNotConverge {
            function: "risk_parity".into(),
            iterations: iteration,
            last_delta: residual,
        })?;

        let gap: Vec<Decimal> = rc.iter().map(|r| r - target).collect();
        residual = l2_norm(&gap);
        if residual < config.tolerance {
            debug!(iteration, residual = %residual, "risk parity converged");
            return Ok(RiskParityResult {
                weights: w,
                risk_contributions: rc,
                iterations: iteration,
                residual,
                status: RiskParityStatus::Converged,
            });
        }

        for (wi, gi) in w.iter_mut().zip(gap.iter()) {
            *wi = (*wi - config.step_size * gi).max(Decimal::ZERO);
        }
        let total: Decimal = w.iter().sum();
        if total <= Decimal::ZERO {
            return Err(AllocatorError::SolverDidNotConverge {
                function: "risk_parity".into(),
                iterations: iteration,
                last_delta: residual,
            });
        }
        for wi in w.iter_mut() {
            *wi /= total;
        }
    }

    // Report the contributions of the weights actually returned.
    if let Some(last) = risk_contributions(sigma, &w) {
        residual = l2_norm(&last.iter().map(|r| r - target).collect::<Vec<_>>());
        rc = last;
    }
    warn!(
        iterations = config.max_iterations,
        residual = %residual,
        "risk parity stopped at the iteration cap"
    );
    Ok(RiskParityResult {
        weights: w,
        risk_contributions: rc,
        iterations: config.max_iterations,
        residual,
        status: RiskParityStatus::MaxIterationsReached,
    })
}

/// Solve and wrap the result in the standard envelope.
pub fn run_risk_parity(
    input: &RiskParityInput,
) -> AllocatorResult<ComputationOutput<RiskParityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let solution = solve_risk_parity_with_config(&input.covariance, &input.config)?;
    if !solution.is_converged() {
        warnings.push(format!(
            "Did not converge within {} iterations (residual {:.8}); weights are best-effort",
            solution.iterations, solution.residual
        ));
    }

    let n = solution.weights.len();
    let names: Vec<String> = if input.assets.len() == n {
        input.assets.clone()
    } else {
        (0..n).map(|i| format!("asset_{}", i)).collect()
    };
    let allocations = names
        .into_iter()
        .zip(solution.weights.iter().zip(solution.risk_contributions.iter()))
        .map(|(name, (w, rc))| RiskAllocation {
            name,
            weight: *w,
            risk_contribution: *rc,
        })
        .collect();

    let sigma_w = mat_vec_multiply(&input.covariance, &solution.weights);
    let portfolio_volatility = sqrt_decimal(vec_dot(&solution.weights, &sigma_w));

    let output = RiskParityOutput {
        solution,
        allocations,
        portfolio_volatility,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Equal risk contribution via damped fixed-point iteration",
        &serde_json::json!({
            "n_assets": n,
            "tolerance": input.config.tolerance.to_string(),
            "max_iterations": input.config.max_iterations,
            "step_size": input.config.step_size.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Fractional risk contributions; `None` when portfolio variance is zero.
pub fn risk_contributions(sigma: &[Vec<Decimal>], w: &[Decimal]) -> Option<Vec<Decimal>> {
    let sigma_w = mat_vec_multiply(sigma, w);
    let variance = vec_dot(w, &sigma_w);
    if variance <= Decimal::ZERO {
        return None;
    }
    Some(
        w.iter()
            .zip(sigma_w.iter())
            .map(|(wi, swi)| wi * swi / variance)
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::diagonal;
    use rust_decimal_macros::dec;

    fn diag_sigma() -> Matrix {
        diagonal(&[dec!(0.04), dec!(0.09), dec!(0.01)])
    }

    fn correlated_sigma() -> Matrix {
        vec![
            vec![dec!(0.0225), dec!(0.003), dec!(0.006)],
            vec![dec!(0.003), dec!(0.0016), dec!(0.001)],
            vec![dec!(0.006), dec!(0.001), dec!(0.0400)],
        ]
    }

    #[test]
    fn test_diagonal_converges_to_inverse_volatility() {
        let result = solve_risk_parity(&diag_sigma(), dec!(0.0001), 1000).unwrap();
        assert_eq!(result.status, RiskParityStatus::Converged);
        assert!(result.iterations < 1000);

        // 1/sigma = [5, 3.33, 10], normalised = [3/11, 2/11, 6/11]
        let expected = [dec!(3) / dec!(11), dec!(2) / dec!(11), dec!(6) / dec!(11)];
        for (w, e) in result.weights.iter().zip(expected.iter()) {
            assert!((w - e).abs() < dec!(0.0001), "{} vs {}", w, e);
        }
    }

    #[test]
    fn test_default_tolerance_converges() {
        let config = RiskParityConfig::default();
        let result = solve_risk_parity_with_config(&diag_sigma(), &config).unwrap();
        assert!(result.is_converged());
        assert!(result.residual < dec!(0.000001));
        assert!((result.weights[2] - dec!(6) / dec!(11)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_weights_on_simplex_and_contributions_equal() {
        let result = solve_risk_parity(&correlated_sigma(), dec!(0.00001), 5000).unwrap();
        assert!(result.is_converged());
        let total: Decimal = result.weights.iter().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000000001));
        assert!(result.weights.iter().all(|w| *w >= Decimal::ZERO));
        for rc in &result.risk_contributions {
            assert!((rc - dec!(1) / dec!(3)).abs() < dec!(0.00001));
        }
        // Low-vol bonds carry the largest weight.
        assert!(result.weights[1] > result.weights[0]);
        assert!(result.weights[1] > result.weights[2]);
    }

    #[test]
    fn test_iteration_cap_flagged_not_hidden() {
        let result = solve_risk_parity(&correlated_sigma(), dec!(0.000001), 5).unwrap();
        assert_eq!(result.status, RiskParityStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 5);
        assert!(result.residual >= dec!(0.000001));
        let total: Decimal = result.weights.iter().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000000001));

        assert!(matches!(
            result.require_converged(),
            Err(AllocatorError::MaxIterationsReached { iterations: 5, .. })
        ));
    }

    #[test]
    fn test_single_asset_trivially_converged() {
        let result = solve_risk_parity(&[vec![dec!(0.04)]], dec!(0.000001), 10).unwrap();
        assert!(result.is_converged());
        assert_eq!(result.weights, vec![Decimal::ONE]);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_zero_variance_asset_rejected() {
        let sigma = diagonal(&[dec!(0.04), Decimal::ZERO]);
        assert!(matches!(
            solve_risk_parity(&sigma, dec!(0.000001), 1000),
            Err(AllocatorError::InvalidInput { .. })
        ));
        let all_zero = vec![vec![Decimal::ZERO; 2]; 2];
        assert!(matches!(
            solve_risk_parity(&all_zero, dec!(0.000001), 10),
            Err(AllocatorError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_collapsed_portfolio_variance_is_solver_failure() {
        // Perfectly offsetting assets: equal weights carry no variance.
        let sigma = vec![
            vec![dec!(0.04), dec!(-0.04)],
            vec![dec!(-0.04), dec!(0.04)],
        ];
        assert!(matches!(
            solve_risk_parity(&sigma, dec!(0.000001), 10),
            Err(AllocatorError::SolverDidNotConverge { iterations: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            solve_risk_parity(&[], dec!(0.000001), 10),
            Err(AllocatorError::InsufficientData(_))
        ));
        let asymmetric = vec![
            vec![dec!(0.04), dec!(0.01)],
            vec![dec!(0.02), dec!(0.09)],
        ];
        assert!(matches!(
            solve_risk_parity(&asymmetric, dec!(0.000001), 10),
            Err(AllocatorError::InvalidInput { .. })
        ));
        let ragged = vec![vec![dec!(0.04), dec!(0.01)], vec![dec!(0.09)]];
        assert!(solve_risk_parity(&ragged, dec!(0.000001), 10).is_err());
    }

    #[test]
    fn test_run_risk_parity_envelope() {
        let input = RiskParityInput {
            assets: vec!["A".into(), "B".into(), "C".into()],
            covariance: correlated_sigma(),
            config: RiskParityConfig {
                max_iterations: 5,
                ..RiskParityConfig::default()
            },
        };
        let out = run_risk_parity(&input).unwrap();
        assert_eq!(out.result.allocations[2].name, "C");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.result.portfolio_volatility > Decimal::ZERO);
    }
}
