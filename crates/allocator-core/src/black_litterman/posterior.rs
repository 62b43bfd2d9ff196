use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::black_litterman::views::{OmegaMethod, View, ViewSpecification};
use crate::config::BlackLittermanConfig;
use crate::error::AllocatorError;
use crate::linalg::{
    condition_number, mat_add, mat_inverse, mat_multiply, mat_scale, mat_sub, mat_transpose,
    mat_vec_multiply, symmetrize, validate_covariance_matrix,
};
use crate::moments::MomentEstimate;
use crate::types::{with_metadata, ComputationOutput, Matrix};
use crate::AllocatorResult;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Posterior moments after combining the prior with views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorEstimate {
    #[serde(default)]
    pub assets: Vec<String>,
    pub mu_post: Vec<Decimal>,
    pub sigma_post: Matrix,
    /// 1-norm condition number of P*tau*Sigma*P' + Omega (zero without views).
    #[serde(default)]
    pub condition_number: Decimal,
}

impl PosteriorEstimate {
    pub fn n_assets(&self) -> usize {
        self.mu_post.len()
    }
}

/// Input for the posterior update. Views are given either as explicit
/// matrices or as named views resolved against `moments.assets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorInput {
    pub moments: MomentEstimate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_specification: Option<ViewSpecification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
    #[serde(default)]
    pub omega_method: OmegaMethod,
    #[serde(default)]
    pub config: BlackLittermanConfig,
}

/// Comparison of prior vs posterior return for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnComparison {
    pub name: String,
    pub prior_return: Decimal,
    pub posterior_return: Decimal,
    pub shift: Decimal,
}

/// Output of [`run_posterior`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorOutput {
    pub posterior: PosteriorEstimate,
    pub prior_vs_posterior: Vec<ReturnComparison>,
    pub views_used: ViewSpecification,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Black-Litterman posterior with the default condition-number limit.
///
/// ```text
/// A          = inverse(P * tau*Sigma * P' + Omega)
/// mu_post    = mu + tau*Sigma * P' * A * (Q - P*mu)
/// Sigma_post = Sigma + tau*Sigma - tau*Sigma * P' * A * P * tau*Sigma
/// ```
pub fn compute_posterior(
    moments: &MomentEstimate,
    views: &ViewSpecification,
    tau: Decimal,
) -> AllocatorResult<PosteriorEstimate> {
    let config = BlackLittermanConfig {
        tau,
        ..BlackLittermanConfig::default()
    };
    compute_posterior_with_config(moments, views, &config)
}

/// Black-Litterman posterior using the tau and condition limit in `config`.
pub fn compute_posterior_with_config(
    moments: &MomentEstimate,
    views: &ViewSpecification,
    config: &BlackLittermanConfig,
) -> AllocatorResult<PosteriorEstimate> {
    config.validate()?;
    let n = moments.n_assets();
    if n == 0 {
        return Err(AllocatorError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    validate_covariance_matrix("moments.sigma", &moments.sigma, n)?;
    views.validate(n)?;

    let tau = config.tau;
    let sigma = &moments.sigma;
    let mu = &moments.mu;
    let tau_sigma = mat_scale(sigma, tau);

    if views.k() == 0 {
        return Ok(PosteriorEstimate {
            assets: moments.assets.clone(),
            mu_post: mu.clone(),
            sigma_post: mat_add(sigma, &tau_sigma),
            condition_number: Decimal::ZERO,
        });
    }

    let p = &views.p;
    let p_t = mat_transpose(p);

    // P * tau*Sigma (K x N) and tau*Sigma * P' (N x K)
    let p_tau_sigma = mat_multiply(p, &tau_sigma);
    let tau_sigma_pt = mat_multiply(&tau_sigma, &p_t);

    let inner = mat_add(&mat_multiply(&p_tau_sigma, &p_t), &views.omega);
    let a = mat_inverse(&inner).ok_or_else(|| {
        AllocatorError::SingularViewSystem(
            "P*tau*Sigma*P' + Omega is not invertible (redundant views with zero uncertainty?)"
                .into(),
        )
    })?;
    let cond = condition_number(&inner, &a);
    if cond > config.max_condition_number {
        return Err(AllocatorError::SingularViewSystem(format!(
            "condition number {} exceeds limit {}",
            cond.round_dp(2),
            config.max_condition_number
        )));
    }

    // Gain: tau*Sigma * P' * A (N x K)
    let gain = mat_multiply(&tau_sigma_pt, &a);

    let p_mu = mat_vec_multiply(p, mu);
    let surprise: Vec<Decimal> = views.q.iter().zip(p_mu.iter()).map(|(q, pm)| q - pm).collect();
    let adjustment = mat_vec_multiply(&gain, &surprise);
    let mu_post: Vec<Decimal> = mu.iter().zip(adjustment.iter()).map(|(m, a)| m + a).collect();

    let reduction = mat_multiply(&gain, &p_tau_sigma);
    let sigma_post = symmetrize(&mat_sub(&mat_add(sigma, &tau_sigma), &reduction));

    debug!(assets = n, views = views.k(), condition = %cond.round_dp(4), "posterior computed");

    Ok(PosteriorEstimate {
        assets: moments.assets.clone(),
        mu_post,
        sigma_post,
        condition_number: cond,
    })
}

/// Resolve the views in `input`, compute the posterior and wrap it in the
/// standard envelope with per-asset prior/posterior comparison.
pub fn run_posterior(input: &PosteriorInput) -> AllocatorResult<ComputationOutput<PosteriorOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let views = resolve_views(input)?;
    let posterior = compute_posterior_with_config(&input.moments, &views, &input.config)?;

    let names = asset_labels(&input.moments.assets, posterior.n_assets());
    let prior_vs_posterior: Vec<ReturnComparison> = names
        .iter()
        .enumerate()
        .map(|(i, name)| ReturnComparison {
            name: name.clone(),
            prior_return: input.moments.mu[i],
            posterior_return: posterior.mu_post[i],
            shift: posterior.mu_post[i] - input.moments.mu[i],
        })
        .collect();

    if views.k() == 0 {
        warnings.push("No views supplied: posterior mean equals the prior".into());
    }
    if posterior.condition_number > dec!(1000000) {
        warnings.push(format!(
            "View system is poorly conditioned (condition number {:.2})",
            posterior.condition_number
        ));
    }

    let output = PosteriorOutput {
        posterior,
        prior_vs_posterior,
        views_used: views,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Litterman posterior (additive Sigma + tau*Sigma form)",
        &serde_json::json!({
            "n_assets": input.moments.n_assets(),
            "n_views": output.views_used.k(),
            "tau": input.config.tau.to_string(),
            "omega_method": format!("{:?}", input.omega_method),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Explicit matrices and named views are mutually exclusive; supplying
/// both is an `InvalidInput` error.
pub fn resolve_views(input: &PosteriorInput) -> AllocatorResult<ViewSpecification> {
    if let Some(spec) = &input.view_specification {
        if !input.views.is_empty() {
            return Err(AllocatorError::InvalidInput {
                field: "views".into(),
                reason: "Supply either view_specification or views, not both".into(),
            });
        }
        return Ok(spec.clone());
    }
    let names = asset_labels(&input.moments.assets, input.moments.n_assets());
    ViewSpecification::from_views(
        &names,
        &input.views,
        &input.moments.sigma,
        input.config.tau,
        input.omega_method,
    )
}

/// Asset names, falling back to positional labels when none were given.
pub(crate) fn asset_labels(assets: &[String], n: usize) -> Vec<String> {
    if assets.len() == n {
        assets.to_vec()
    } else {
        (0..n).map(|i| format!("asset_{}", i)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
