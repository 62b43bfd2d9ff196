use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::black_litterman::posterior::{asset_labels, PosteriorEstimate};
use crate::config::OptimizerConfig;
use crate::error::AllocatorError;
use crate::linalg::{
    equal_weights, identity, l1_distance, l2_norm, mat_add, mat_inverse, mat_scale,
    mat_vec_multiply, quadratic_form, sqrt_decimal, validate_covariance_matrix,
    validate_weight_vector, vec_dot,
};
use crate::types::{with_metadata, ComputationOutput, WeightVector};
use crate::AllocatorResult;

/// Accepted drift of the current weights from the simplex.
const CURRENT_WEIGHT_TOLERANCE: Decimal = dec!(0.000001);

/// Bisection on the budget multiplier inside the non-smooth prox.
const BISECTION_STEPS: u32 = 200;
const BISECTION_TOLERANCE: Decimal = dec!(0.00000000000000000001);

const MIN_RHO: Decimal = dec!(0.0001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to the turnover-penalised mean-variance optimiser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceInput {
    /// Posterior mean and covariance.
    pub posterior: PosteriorEstimate,
    /// Weights currently held. Equal weights when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_weights: Option<Vec<Decimal>>,
    #[serde(default)]
    pub config: OptimizerConfig,
}

/// Solver outcome with portfolio statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Long-only, fully invested target weights.
    pub weights: WeightVector,
    pub iterations: u32,
    /// mu'w - lambda * w'Sigma w - c * ||w - w0||_1 at the solution.
    pub objective: Decimal,
    pub expected_return: Decimal,
    pub volatility: Decimal,
    /// ||w - w0||_1.
    pub turnover: Decimal,
    pub primal_residual: Decimal,
    pub dual_residual: Decimal,
}

/// A single asset weight with its trade and risk/return contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetWeight {
    pub name: String,
    pub weight: Decimal,
    pub previous_weight: Decimal,
    /// weight - previous_weight.
    pub trade: Decimal,
    /// Weight times expected return.
    pub contribution_to_return: Decimal,
    /// w_i * (Sigma w)_i / sigma_p.
    pub contribution_to_risk: Decimal,
}

/// Output of [`run_optimize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceOutput {
    pub optimization: OptimizationResult,
    pub allocations: Vec<AssetWeight>,
    /// Herfindahl-Hirschman index of weights.
    pub hhi_concentration: Decimal,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Maximise `mu'w - lambda * w'Sigma w - tc_rate * ||w - current||_1` over the
/// long-only simplex, with default solver settings.
pub fn optimize_weights(
    posterior: &PosteriorEstimate,
    current: &[Decimal],
    risk_aversion: Decimal,
    tc_rate: Decimal,
) -> AllocatorResult<WeightVector> {
    let config = OptimizerConfig {
        risk_aversion,
        transaction_cost_rate: tc_rate,
        ..OptimizerConfig::default()
    };
    optimize_weights_with_config(posterior, current, &config).map(|r| r.weights)
}

/// ADMM solve of the turnover-penalised problem.
///
/// The objective is split as `f(x) + g(z)` subject to `x = z`, where `f` is
/// the smooth quadratic (a linear solve with `2*lambda*Sigma + rho*I`) and `g`
/// is the L1 turnover penalty plus the simplex indicator, whose prox is
/// separable once the budget multiplier is fixed.
pub fn optimize_weights_with_config(
    posterior: &PosteriorEstimate,
    current: &[Decimal],
    config: &OptimizerConfig,
) -> AllocatorResult<OptimizationResult> {
    config.validate()?;
    let n = posterior.n_assets();
    validate_problem(posterior, current, n)?;

    let mu = &posterior.mu_post;
    let sigma = &posterior.sigma_post;
    let lambda = config.risk_aversion;
    let tc = config.transaction_cost_rate;
    let tol = config.tolerance;
    let rho = config.rho.unwrap_or_else(|| default_rho(sigma, lambda));

    let system = mat_add(
        &mat_scale(sigma, dec!(2) * lambda),
        &mat_scale(&identity(n), rho),
    );
    let system_inv = mat_inverse(&system).ok_or_else(|| AllocatorError::InvalidInput {
        field: "posterior.sigma_post".into(),
        reason: "2*lambda*Sigma + rho*I is not invertible; covariance is not PSD".into(),
    })?;

    let mut z: Vec<Decimal> = current.to_vec();
    let mut u: Vec<Decimal> = vec![Decimal::ZERO; n];
    let mut last_delta = Decimal::ZERO;

    for iteration in 1..=config.max_iterations {
        let rhs: Vec<Decimal> = (0..n).map(|i| mu[i] + rho * (z[i] - u[i])).collect();
        let x = mat_vec_multiply(&system_inv, &rhs);

        let v: Vec<Decimal> = x.iter().zip(u.iter()).map(|(xi, ui)| xi + ui).collect();
        let z_next = prox_turnover_simplex(&v, current, tc, rho)?;
        let z_prev = std::mem::replace(&mut z, z_next);

        let gap: Vec<Decimal> = x.iter().zip(z.iter()).map(|(xi, zi)| xi - zi).collect();
        for (ui, gi) in u.iter_mut().zip(gap.iter()) {
            *ui += *gi;
        }

        let primal = l2_norm(&gap);
        let step: Vec<Decimal> = z.iter().zip(z_prev.iter()).map(|(a, b)| a - b).collect();
        let dual = rho * l2_norm(&step);

        if primal < tol && dual < tol {
            debug!(iteration, primal = %primal, dual = %dual, "mean-variance ADMM converged");
            return Ok(summarise(posterior, current, config, z, iteration, primal, dual));
        }
        last_delta = primal.max(dual);
    }

    warn!(
        iterations = config.max_iterations,
        residual = %last_delta,
        "mean-variance ADMM hit the iteration cap"
    );
    Err(AllocatorError::SolverDidNotConverge {
        function: "mean_variance_admm".into(),
        iterations: config.max_iterations,
        last_delta,
    })
}

/// Optimise and wrap the result with per-asset allocations.
pub fn run_optimize(
    input: &MeanVarianceInput,
) -> AllocatorResult<ComputationOutput<MeanVarianceOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.posterior.n_assets();
    let current = input
        .current_weights
        .clone()
        .unwrap_or_else(|| equal_weights(n));
    let optimization = optimize_weights_with_config(&input.posterior, &current, &input.config)?;

    let sigma = &input.posterior.sigma_post;
    let w = &optimization.weights;
    let sigma_w = mat_vec_multiply(sigma, w);
    let names = asset_labels(&input.posterior.assets, n);

    let allocations: Vec<AssetWeight> = (0..n)
        .map(|i| AssetWeight {
            name: names[i].clone(),
            weight: w[i],
            previous_weight: current[i],
            trade: w[i] - current[i],
            contribution_to_return: w[i] * input.posterior.mu_post[i],
            contribution_to_risk: if optimization.volatility.is_zero() {
                Decimal::ZERO
            } else {
                w[i] * sigma_w[i] / optimization.volatility
            },
        })
        .collect();

    let hhi: Decimal = w.iter().map(|wi| wi * wi).sum();
    if hhi > dec!(0.5) {
        warnings.push(format!(
            "Concentrated allocation (HHI {:.4}); consider a higher risk aversion",
            hhi
        ));
    }
    if optimization.turnover > Decimal::ONE {
        warnings.push(format!(
            "Turnover {:.4} exceeds 100% of portfolio value",
            optimization.turnover
        ));
    }

    let output = MeanVarianceOutput {
        optimization,
        allocations,
        hhi_concentration: hhi,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-variance with L1 turnover penalty (ADMM, long-only, fully invested)",
        &serde_json::json!({
            "n_assets": n,
            "risk_aversion": input.config.risk_aversion.to_string(),
            "transaction_cost_rate": input.config.transaction_cost_rate.to_string(),
            "tolerance": input.config.tolerance.to_string(),
            "current_weights": if input.current_weights.is_some() { "supplied" } else { "equal" },
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// `mu'w - lambda * w'Sigma w - tc_rate * ||w - current||_1`.
pub fn objective_value(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    w: &[Decimal],
    current: &[Decimal],
    risk_aversion: Decimal,
    tc_rate: Decimal,
) -> Decimal {
    vec_dot(mu, w) - risk_aversion * quadratic_form(w, sigma) - tc_rate * l1_distance(w, current)
}

// ---------------------------------------------------------------------------
// Solver internals
// ---------------------------------------------------------------------------

/// Penalty scaled to the average asset variance.
fn default_rho(sigma: &[Vec<Decimal>], lambda: Decimal) -> Decimal {
    let n = sigma.len();
    if n == 0 {
        return MIN_RHO;
    }
    let trace: Decimal = (0..n).map(|i| sigma[i][i]).sum();
    (dec!(2) * lambda * trace / Decimal::from(n as i64)).max(MIN_RHO)
}

/// Exact prox of `c*||z - anchor||_1 + indicator(simplex)` at `v`.
///
/// For a fixed budget multiplier theta each coordinate is a soft-threshold
/// of `v_i - theta/rho` around `anchor_i`, clipped at zero. The total is
/// non-increasing in theta, so theta is found by bisection.
fn prox_turnover_simplex(
    v: &[Decimal],
    anchor: &[Decimal],
    c: Decimal,
    rho: Decimal,
) -> AllocatorResult<Vec<Decimal>> {
    let kappa = c / rho;
    let shifted = |theta: Decimal| -> Vec<Decimal> {
        v.iter()
            .zip(anchor.iter())
            .map(|(vi, a)| {
                let s = vi - theta / rho;
                let zi = if s > *a + kappa {
                    s - kappa
                } else if s < *a - kappa {
                    s + kappa
                } else {
                    *a
                };
                zi.max(Decimal::ZERO)
            })
            .collect()
    };

    let v_max = v.iter().copied().max().unwrap_or(Decimal::ZERO);
    // At lo the largest coordinate alone reaches 1; at hi every coordinate is 0.
    let mut lo = rho * (v_max - Decimal::ONE) - c;
    let mut hi = rho * v_max + c;

    for _ in 0..BISECTION_STEPS {
        if hi - lo <= BISECTION_TOLERANCE {
            break;
        }
        let mid = (lo + hi) / dec!(2);
        let total: Decimal = shifted(mid).iter().sum();
        if total >= Decimal::ONE {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let z = shifted(lo);
    let total: Decimal = z.iter().sum();
    if total <= Decimal::ZERO {
        return Err(AllocatorError::Infeasible(
            "No non-negative weights satisfy the budget constraint".into(),
        ));
    }
    Ok(z.into_iter().map(|zi| zi / total).collect())
}

fn summarise(
    posterior: &PosteriorEstimate,
    current: &[Decimal],
    config: &OptimizerConfig,
    weights: Vec<Decimal>,
    iterations: u32,
    primal_residual: Decimal,
    dual_residual: Decimal,
) -> OptimizationResult {
    let mu = &posterior.mu_post;
    let sigma = &posterior.sigma_post;
    OptimizationResult {
        objective: objective_value(
            mu,
            sigma,
            &weights,
            current,
            config.risk_aversion,
            config.transaction_cost_rate,
        ),
        expected_return: vec_dot(mu, &weights),
        volatility: sqrt_decimal(quadratic_form(&weights, sigma)),
        turnover: l1_distance(&weights, current),
        weights,
        iterations,
        primal_residual,
        dual_residual,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_problem(
    posterior: &PosteriorEstimate,
    current: &[Decimal],
    n: usize,
) -> AllocatorResult<()> {
    if n == 0 {
        return Err(AllocatorError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    validate_covariance_matrix("posterior.sigma_post", &posterior.sigma_post, n)?;
    validate_weight_vector("current_weights", current, n, CURRENT_WEIGHT_TOLERANCE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::diagonal;
    use rust_decimal_macros::dec;

    fn posterior(mu: Vec<Decimal>, sigma: Vec<Vec<Decimal>>) -> PosteriorEstimate {
        PosteriorEstimate {
            assets: Vec::new(),
            mu_post: mu,
            sigma_post: sigma,
            condition_number: Decimal::ZERO,
        }
    }

    fn two_asset() -> PosteriorEstimate {
        posterior(
            vec![dec!(0.08), dec!(0.10)],
            diagonal(&[dec!(0.04), dec!(0.09)]),
        )
    }

    fn three_asset() -> PosteriorEstimate {
        let v1 = dec!(0.15);
        let v2 = dec!(0.20);
        let v3 = dec!(0.25);
        let c12 = dec!(0.3) * v1 * v2;
        let c13 = dec!(0.1) * v1 * v3;
        let c23 = dec!(0.5) * v2 * v3;
        PosteriorEstimate {
            assets: vec!["Equity".into(), "Bonds".into(), "Commodities".into()],
            mu_post: vec![dec!(0.10), dec!(0.04), dec!(0.07)],
            sigma_post: vec![
                vec![v1 * v1, c12, c13],
                vec![c12, v2 * v2, c23],
                vec![c13, c23, v3 * v3],
            ],
            condition_number: Decimal::ZERO,
        }
    }

    fn assert_on_simplex(w: &[Decimal]) {
        let total: Decimal = w.iter().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000000001), "sum {}", total);
        assert!(w.iter().all(|x| *x >= Decimal::ZERO), "negative weight in {:?}", w);
    }

    // ------------------------------------------------------------------
    // Closed-form interior optimum without costs
    // ------------------------------------------------------------------
    #[test]
    fn test_zero_cost_matches_closed_form() {
        // mu_i - 2*lambda*sigma_i^2*w_i = gamma  =>  w = [43/65, 22/65]
        let w = optimize_weights(&two_asset(), &equal_weights(2), dec!(2.5), Decimal::ZERO)
            .unwrap();
        assert_on_simplex(&w);
        assert!((w[0] - dec!(43) / dec!(65)).abs() < dec!(0.00001), "{:?}", w);
        assert!((w[1] - dec!(22) / dec!(65)).abs() < dec!(0.00001), "{:?}", w);
    }

    #[test]
    fn test_corner_solution() {
        let post = posterior(
            vec![dec!(0.5), dec!(0.0)],
            diagonal(&[dec!(0.04), dec!(0.09)]),
        );
        let w = optimize_weights(&post, &equal_weights(2), dec!(1), Decimal::ZERO).unwrap();
        assert_on_simplex(&w);
        assert!(w[1] < dec!(0.000001));
    }

    // ------------------------------------------------------------------
    // Objective beats a brute-force grid
    // ------------------------------------------------------------------
    #[test]
    fn test_objective_at_least_grid_optimum() {
        let post = two_asset();
        let current = vec![dec!(0.5), dec!(0.5)];
        let (lambda, tc) = (dec!(2.5), dec!(0.01));
        let config = OptimizerConfig {
            risk_aversion: lambda,
            transaction_cost_rate: tc,
            ..OptimizerConfig::default()
        };
        let result = optimize_weights_with_config(&post, &current, &config).unwrap();
        assert_on_simplex(&result.weights);

        let mut best = Decimal::MIN;
        for step in 0..=2000 {
            let w0 = Decimal::from(step) / dec!(2000);
            let w = vec![w0, Decimal::ONE - w0];
            let f = objective_value(&post.mu_post, &post.sigma_post, &w, &current, lambda, tc);
            best = best.max(f);
        }
        assert!(
            result.objective >= best - dec!(0.000000001),
            "solver {} < grid {}",
            result.objective,
            best
        );
    }

    // ------------------------------------------------------------------
    // Transaction costs
    // ------------------------------------------------------------------
    #[test]
    fn test_high_cost_keeps_current_weights() {
        let current = vec![dec!(0.2), dec!(0.5), dec!(0.3)];
        let w = optimize_weights(&three_asset(), &current, dec!(2.5), dec!(1)).unwrap();
        for (a, b) in w.iter().zip(current.iter()) {
            assert!((a - b).abs() < dec!(0.000001), "{:?} vs {:?}", w, current);
        }
    }

    #[test]
    fn test_costs_reduce_turnover() {
        let post = three_asset();
        let current = vec![dec!(0.2), dec!(0.5), dec!(0.3)];
        let run = |tc: Decimal| {
            let config = OptimizerConfig {
                transaction_cost_rate: tc,
                ..OptimizerConfig::default()
            };
            optimize_weights_with_config(&post, &current, &config).unwrap()
        };
        let free = run(Decimal::ZERO);
        let costly = run(dec!(0.02));
        assert!(costly.turnover <= free.turnover + dec!(0.000001));
        assert!(free.turnover > Decimal::ZERO);
    }

    #[test]
    fn test_weights_on_simplex_across_risk_aversion() {
        let post = three_asset();
        for lambda in [dec!(0.5), dec!(1), dec!(2.5), dec!(10)] {
            let w = optimize_weights(&post, &equal_weights(3), lambda, dec!(0.005)).unwrap();
            assert_on_simplex(&w);
        }
    }

    #[test]
    fn test_higher_risk_aversion_lowers_volatility() {
        let post = three_asset();
        let run = |lambda: Decimal| {
            let config = OptimizerConfig {
                risk_aversion: lambda,
                ..OptimizerConfig::default()
            };
            optimize_weights_with_config(&post, &equal_weights(3), &config).unwrap()
        };
        assert!(run(dec!(10)).volatility < run(dec!(0.5)).volatility);
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------
    #[test]
    fn test_non_positive_risk_aversion_rejected() {
        let result = optimize_weights(&two_asset(), &equal_weights(2), Decimal::ZERO, Decimal::ZERO);
        assert!(matches!(result, Err(AllocatorError::InvalidInput { .. })));
    }

    #[test]
    fn test_negative_cost_rejected() {
        let result = optimize_weights(&two_asset(), &equal_weights(2), dec!(1), dec!(-0.01));
        assert!(matches!(result, Err(AllocatorError::InvalidInput { .. })));
    }

    #[test]
    fn test_current_weights_off_simplex_rejected() {
        let result = optimize_weights(
            &two_asset(),
            &[dec!(0.7), dec!(0.7)],
            dec!(1),
            Decimal::ZERO,
        );
        assert!(matches!(result, Err(AllocatorError::InvalidInput { .. })));
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let config = OptimizerConfig {
            max_iterations: 1,
            ..OptimizerConfig::default()
        };
        let result = optimize_weights_with_config(&three_asset(), &equal_weights(3), &config);
        assert!(matches!(
            result,
            Err(AllocatorError::SolverDidNotConverge { iterations: 1, .. })
        ));
    }

    // ------------------------------------------------------------------
    // Envelope
    // ------------------------------------------------------------------
    #[test]
    fn test_run_optimize_allocations() {
        let input = MeanVarianceInput {
            posterior: three_asset(),
            current_weights: None,
            config: OptimizerConfig::default(),
        };
        let out = run_optimize(&input).unwrap();
        let res = &out.result;
        assert_eq!(res.allocations.len(), 3);
        assert_eq!(res.allocations[0].name, "Equity");
        let risk_sum: Decimal = res.allocations.iter().map(|a| a.contribution_to_risk).sum();
        assert!((risk_sum - res.optimization.volatility).abs() < dec!(0.000001));
        let trades: Decimal = res.allocations.iter().map(|a| a.trade).sum();
        assert!(trades.abs() < dec!(0.000001));
    }
}
