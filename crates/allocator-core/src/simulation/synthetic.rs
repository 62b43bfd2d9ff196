use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::error::AllocatorError;
use crate::linalg::{cholesky, mat_vec_multiply, validate_covariance_matrix};
use crate::types::Matrix;
use crate::AllocatorResult;

/// Multivariate normal return generator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticReturns {
    /// Per-period mean return per asset.
    pub mu: Vec<Decimal>,
    /// Per-period covariance, positive definite.
    pub sigma: Matrix,
    pub periods: usize,
    /// Optional seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Draw `periods` rows of correlated normal returns, `r = mu + L z` with
/// `L` the Cholesky factor of Sigma and `z ~ N(0, I)`.
pub fn generate_returns(spec: &SyntheticReturns) -> AllocatorResult<Matrix> {
    let n = spec.mu.len();
    if n == 0 {
        return Err(AllocatorError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if spec.periods == 0 {
        return Err(AllocatorError::InvalidInput {
            field: "periods".into(),
            reason: "At least one period required".into(),
        });
    }
    validate_covariance_matrix("sigma", &spec.sigma, n)?;
    let l = cholesky(&spec.sigma).ok_or_else(|| AllocatorError::InvalidInput {
        field: "sigma".into(),
        reason: "Covariance must be positive definite for sampling".into(),
    })?;

    let normal = Normal::new(0.0, 1.0).map_err(|e| AllocatorError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;
    let mut rng = match spec.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let mut rows = Vec::with_capacity(spec.periods);
    for _ in 0..spec.periods {
        let z: Vec<Decimal> = (0..n)
            .map(|_| {
                let draw: f64 = rng.sample(normal);
                Decimal::from_f64(draw)
                    .map(|d| d.round_dp(12))
                    .ok_or_else(|| AllocatorError::SerializationError(format!(
                        "Sample {draw} is not representable as a decimal"
                    )))
            })
            .collect::<AllocatorResult<_>>()?;
        let shock = mat_vec_multiply(&l, &z);
        rows.push(
            spec.mu
                .iter()
                .zip(shock.iter())
                .map(|(m, s)| m + s)
                .collect(),
        );
    }
    Ok(rows)
}
