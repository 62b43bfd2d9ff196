use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::AllocatorError;
use crate::moments::returns_matrix::ReturnsMatrix;
use crate::types::{with_metadata, ComputationOutput, Matrix};
use crate::AllocatorResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Prior moments of asset returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentEstimate {
    /// Column order of `mu` and `sigma`. May be empty when moments are
    /// supplied directly rather than estimated.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Expected return per asset.
    pub mu: Vec<Decimal>,
    /// N x N covariance matrix (row-major).
    pub sigma: Matrix,
    /// Ledoit-Wolf intensity applied to the sample covariance, in [0, 1].
    #[serde(default)]
    pub shrinkage_intensity: Decimal,
    /// Number of return observations the estimate was built from.
    #[serde(default)]
    pub observations: usize,
}

impl MomentEstimate {
    pub fn n_assets(&self) -> usize {
        self.mu.len()
    }
}

/// Input for the moment estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentsInput {
    pub returns: ReturnsMatrix,
    /// Periods per year (e.g. 252 for daily data). Defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annualization_factor: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate the prior mean vector and a Ledoit-Wolf shrunk covariance.
///
/// The shrinkage target is the scaled identity `m * I` with `m` the average
/// sample variance; the intensity is the analytic Ledoit-Wolf (2004)
/// estimate computed from the demeaned sample. Both moments are multiplied by
/// `annualization` when given.
pub fn estimate_moments(
    returns: &ReturnsMatrix,
    annualization: Option<Decimal>,
) -> AllocatorResult<MomentEstimate> {
    let data = returns.to_dense()?;
    let n = returns.n_assets();
    let t = data.len();

    if t < n + 1 {
        return Err(AllocatorError::InsufficientData(format!(
            "{} observations for {} assets; at least {} required",
            t,
            n,
            n + 1
        )));
    }

    let factor = annualization.unwrap_or(Decimal::ONE);
    if factor <= Decimal::ZERO {
        return Err(AllocatorError::InvalidInput {
            field: "annualization_factor".into(),
            reason: "Annualization factor must be positive".into(),
        });
    }

    let t_dec = Decimal::from(t as i64);
    let mean: Vec<Decimal> = (0..n)
        .map(|j| data.iter().map(|row| row[j]).sum::<Decimal>() / t_dec)
        .collect();

    let centred: Matrix = data
        .iter()
        .map(|row| row.iter().zip(mean.iter()).map(|(x, m)| x - m).collect())
        .collect();

    let sample = sample_covariance(&centred);

    for (i, asset) in returns.assets.iter().enumerate() {
        if sample[i][i].is_zero() {
            return Err(AllocatorError::InsufficientData(format!(
                "Asset '{}' has zero variance",
                asset
            )));
        }
    }

    let (shrunk, intensity) = ledoit_wolf(&sample, &centred);
    debug!(
        assets = n,
        observations = t,
        shrinkage = %intensity,
        "estimated prior moments"
    );

    Ok(MomentEstimate {
        assets: returns.assets.clone(),
        mu: mean.iter().map(|m| m * factor).collect(),
        sigma: shrunk
            .iter()
            .map(|row| row.iter().map(|v| v * factor).collect())
            .collect(),
        shrinkage_intensity: intensity,
        observations: t,
    })
}

/// Envelope wrapper around [`estimate_moments`].
pub fn run_moments(input: &MomentsInput) -> AllocatorResult<ComputationOutput<MomentEstimate>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let estimate = estimate_moments(&input.returns, input.annualization_factor)?;

    let n = estimate.n_assets();
    if estimate.observations < 3 * n {
        warnings.push(format!(
            "Short sample: {} observations for {} assets; covariance relies heavily on shrinkage",
            estimate.observations, n
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sample mean with Ledoit-Wolf shrinkage covariance (scaled identity target)",
        &serde_json::json!({
            "n_assets": n,
            "observations": estimate.observations,
            "annualization_factor": input.annualization_factor.map(|v| v.to_string()),
        }),
        warnings,
        elapsed,
        estimate,
    ))
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Maximum-likelihood covariance of already-demeaned rows: (1/T) X'X.
#[allow(clippy::needless_range_loop)]
fn sample_covariance(centred: &[Vec<Decimal>]) -> Matrix {
    let t = Decimal::from(centred.len() as i64);
    let n = centred.first().map(|r| r.len()).unwrap_or(0);
    let mut s = vec![vec![Decimal::ZERO; n]; n];
    for row in centred {
        for i in 0..n {
            for j in i..n {
                s[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..n {
        for j in i..n {
            s[i][j] /= t;
            s[j][i] = s[i][j];
        }
    }
    s
}

/// Shrink `sample` toward `m * I`, returning the matrix and the intensity.
#[allow(clippy::needless_range_loop)]
fn ledoit_wolf(sample: &[Vec<Decimal>], centred: &[Vec<Decimal>]) -> (Matrix, Decimal) {
    let n = sample.len();
    let t = Decimal::from(centred.len() as i64);

    let trace: Decimal = (0..n).map(|i| sample[i][i]).sum();
    let m = trace / Decimal::from(n as i64);

    // d^2 = ||S - mI||_F^2
    let mut d2 = Decimal::ZERO;
    for i in 0..n {
        for j in 0..n {
            let target = if i == j { m } else { Decimal::ZERO };
            let diff = sample[i][j] - target;
            d2 += diff * diff;
        }
    }

    // b_bar^2 = (1/T^2) sum_t ||x_t x_t' - S||_F^2
    let mut b_bar2 = Decimal::ZERO;
    for row in centred {
        for i in 0..n {
            for j in 0..n {
                let diff = row[i] * row[j] - sample[i][j];
                b_bar2 += diff * diff;
            }
        }
    }
    b_bar2 /= t * t;

    let intensity = if d2.is_zero() {
        Decimal::ZERO
    } else {
        b_bar2.min(d2) / d2
    };

    let keep = Decimal::ONE - intensity;
    let shrunk: Matrix = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let target = if i == j { intensity * m } else { Decimal::ZERO };
                    target + keep * sample[i][j]
                })
                .collect()
        })
        .collect();

    (shrunk, intensity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
