//! End-to-end allocation: returns -> prior moments -> posterior -> target
//! weights, with the risk-parity portfolio alongside as a baseline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::black_litterman::posterior::{
    asset_labels, compute_posterior_with_config, resolve_views, PosteriorEstimate, PosteriorInput,
};
use crate::black_litterman::views::{OmegaMethod, View, ViewSpecification};
use crate::config::AllocatorConfig;
use crate::linalg::equal_weights;
use crate::moments::{estimate_moments, MomentEstimate, ReturnsMatrix};
use crate::portfolio_optimization::mean_variance::{
    optimize_weights_with_config, OptimizationResult,
};
use crate::portfolio_optimization::risk_parity::{solve_risk_parity_with_config, RiskParityResult};
use crate::types::{with_metadata, ComputationOutput};
use crate::AllocatorResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub returns: ReturnsMatrix,
    /// Periods per year applied to the estimated moments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annualization_factor: Option<Decimal>,
    /// Explicit P, Q, Omega. Mutually exclusive with `views`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_specification: Option<ViewSpecification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
    #[serde(default)]
    pub omega_method: OmegaMethod,
    /// Weights currently held. Equal weights when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_weights: Option<Vec<Decimal>>,
    #[serde(default)]
    pub config: AllocatorConfig,
}

/// One row of the side-by-side allocation table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationLine {
    pub name: String,
    pub prior_return: Decimal,
    pub posterior_return: Decimal,
    pub current_weight: Decimal,
    pub mean_variance_weight: Decimal,
    pub risk_parity_weight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub allocations: Vec<AllocationLine>,
    pub prior: MomentEstimate,
    pub posterior: PosteriorEstimate,
    pub mean_variance: OptimizationResult,
    pub risk_parity: RiskParityResult,
}

/// Run every stage on one returns history.
pub fn run_allocation(
    input: &AllocationInput,
) -> AllocatorResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = &input.config;
    config.validate()?;

    let prior = estimate_moments(&input.returns, input.annualization_factor)?;
    let n = prior.n_assets();
    if prior.observations < 3 * n {
        warnings.push(format!(
            "Only {} observations for {} assets; covariance leans on shrinkage (intensity {:.4})",
            prior.observations, n, prior.shrinkage_intensity
        ));
    }

    let posterior_input = PosteriorInput {
        moments: prior.clone(),
        view_specification: input.view_specification.clone(),
        views: input.views.clone(),
        omega_method: input.omega_method,
        config: config.black_litterman.clone(),
    };
    let views = resolve_views(&posterior_input)?;
    if views.k() == 0 {
        warnings.push("No views supplied: posterior mean equals the prior".into());
    }
    let posterior = compute_posterior_with_config(&prior, &views, &config.black_litterman)?;

    let current = input
        .current_weights
        .clone()
        .unwrap_or_else(|| equal_weights(n));
    let mean_variance = optimize_weights_with_config(&posterior, &current, &config.optimizer)?;

    let risk_parity = solve_risk_parity_with_config(&posterior.sigma_post, &config.risk_parity)?;
    if !risk_parity.is_converged() {
        warnings.push(format!(
            "Risk parity stopped after {} iterations (residual {:.8})",
            risk_parity.iterations, risk_parity.residual
        ));
    }

    let names = asset_labels(&prior.assets, n);
    let allocations = (0..n)
        .map(|i| AllocationLine {
            name: names[i].clone(),
            prior_return: prior.mu[i],
            posterior_return: posterior.mu_post[i],
            current_weight: current[i],
            mean_variance_weight: mean_variance.weights[i],
            risk_parity_weight: risk_parity.weights[i],
        })
        .collect();

    info!(
        assets = n,
        views = views.k(),
        turnover = %mean_variance.turnover,
        "allocation complete"
    );

    let output = AllocationOutput {
        allocations,
        prior,
        posterior,
        mean_variance,
        risk_parity,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Ledoit-Wolf moments, Black-Litterman posterior, turnover-penalised mean-variance and risk parity",
        &serde_json::json!({
            "n_assets": n,
            "observations": output.prior.observations,
            "n_views": views.k(),
            "tau": config.black_litterman.tau.to_string(),
            "risk_aversion": config.optimizer.risk_aversion.to_string(),
            "transaction_cost_rate": config.optimizer.transaction_cost_rate.to_string(),
            "annualization_factor": input.annualization_factor.map(|f| f.to_string()),
        }),
        warnings,
        elapsed,
        output,
    ))
}
