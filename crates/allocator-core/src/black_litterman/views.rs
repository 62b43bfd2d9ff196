use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AllocatorError;
use crate::linalg::{
    diagonal, mat_multiply, mat_scale, mat_transpose, validate_shape, SYMMETRY_TOLERANCE,
};
use crate::types::Matrix;
use crate::AllocatorResult;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Type of investor view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViewType {
    /// Absolute view on a single asset's return.
    Absolute,
    /// Relative view: one asset outperforms another by a spread.
    Relative,
}

/// A named investor view, resolved against an asset list into one row of P.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    /// Whether the view is absolute or relative.
    pub view_type: ViewType,
    /// Asset names involved in this view.
    pub assets: Vec<String>,
    /// Pick-matrix row: weights for each asset in `assets`.
    /// For an absolute view on one asset: \[1\].
    /// For a relative view "A outperforms B": \[1, -1\].
    pub asset_weights: Vec<Decimal>,
    /// Expected return expressed by this view.
    pub expected_return: Decimal,
    /// Confidence in the view, 0 to 1 (higher = more confident). Only used
    /// by [`OmegaMethod::Confidence`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Decimal>,
}

/// How the view-uncertainty matrix is derived from named views.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OmegaMethod {
    /// Omega = diag(P * tau*Sigma * P').
    #[default]
    Proportional,
    /// Omega_ii = (1/confidence - 1) * (P * tau*Sigma * P')_ii.
    Confidence,
}

/// Views supplied by an external forecaster.
///
/// `p` is K x N (one row per view), `q` holds the K asserted values and
/// `omega` is the K x K view uncertainty. Omega only needs a non-negative
/// diagonal: invertibility is required of `P*tau*Sigma*P' + Omega`, so a zero
/// Omega (views held with certainty) is admissible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSpecification {
    pub p: Matrix,
    pub q: Vec<Decimal>,
    pub omega: Matrix,
}

impl ViewSpecification {
    /// Number of views.
    pub fn k(&self) -> usize {
        self.q.len()
    }

    /// Absolute view on every asset: P = I.
    pub fn identity(q: Vec<Decimal>, omega: Matrix) -> Self {
        let n = q.len();
        ViewSpecification {
            p: crate::linalg::identity(n),
            q,
            omega,
        }
    }

    /// Check dimensions against an N-asset universe.
    #[allow(clippy::needless_range_loop)]
    pub fn validate(&self, n: usize) -> AllocatorResult<()> {
        let k = self.k();
        if k > n {
            tracing::warn!(views = k, assets = n, "more views than assets");
        }
        validate_shape("views.p", &self.p, k, n)?;
        validate_shape("views.omega", &self.omega, k, k)?;
        for i in 0..k {
            if self.omega[i][i] < Decimal::ZERO {
                return Err(AllocatorError::InvalidInput {
                    field: "views.omega".into(),
                    reason: format!("Negative view variance at [{},{}]", i, i),
                });
            }
            for j in (i + 1)..k {
                if (self.omega[i][j] - self.omega[j][i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(AllocatorError::InvalidInput {
                        field: "views.omega".into(),
                        reason: format!("Not symmetric at [{},{}]", i, j),
                    });
                }
            }
        }
        if self.p.iter().any(|row| row.iter().all(|v| v.is_zero())) {
            return Err(AllocatorError::InvalidInput {
                field: "views.p".into(),
                reason: "A view row references no asset".into(),
            });
        }
        Ok(())
    }

    /// Resolve named views against `assets` and build Omega with `method`.
    pub fn from_views(
        assets: &[String],
        views: &[View],
        sigma: &[Vec<Decimal>],
        tau: Decimal,
        method: OmegaMethod,
    ) -> AllocatorResult<Self> {
        let n = assets.len();
        let k = views.len();
        validate_shape("sigma", sigma, n, n)?;

        let mut p: Matrix = vec![vec![Decimal::ZERO; n]; k];
        let mut q: Vec<Decimal> = Vec::with_capacity(k);

        for (vi, view) in views.iter().enumerate() {
            validate_view(vi, view, method)?;
            for (asset_name, weight) in view.assets.iter().zip(view.asset_weights.iter()) {
                let col = assets
                    .iter()
                    .position(|a| a == asset_name)
                    .ok_or_else(|| AllocatorError::InvalidInput {
                        field: format!("views[{}].assets", vi),
                        reason: format!("Unknown asset '{}'", asset_name),
                    })?;
                p[vi][col] += *weight;
            }
            q.push(view.expected_return);
        }

        let base = view_variances(&p, sigma, tau);
        let omega_diag: Vec<Decimal> = match method {
            OmegaMethod::Proportional => base,
            OmegaMethod::Confidence => views
                .iter()
                .zip(base.iter())
                .map(|(view, v)| {
                    let conf = view.confidence.unwrap_or(Decimal::ONE);
                    (Decimal::ONE / conf - Decimal::ONE) * v
                })
                .collect(),
        };

        Ok(ViewSpecification {
            p,
            q,
            omega: diagonal(&omega_diag),
        })
    }
}

/// He-Litterman Omega: diag(P * tau*Sigma * P').
pub fn proportional_omega(p: &[Vec<Decimal>], sigma: &[Vec<Decimal>], tau: Decimal) -> Matrix {
    diagonal(&view_variances(p, sigma, tau))
}

/// Diagonal of P * tau*Sigma * P'.
fn view_variances(p: &[Vec<Decimal>], sigma: &[Vec<Decimal>], tau: Decimal) -> Vec<Decimal> {
    let tau_sigma = mat_scale(sigma, tau);
    let full = mat_multiply(&mat_multiply(p, &tau_sigma), &mat_transpose(p));
    (0..p.len()).map(|i| full[i][i]).collect()
}

fn validate_view(vi: usize, view: &View, method: OmegaMethod) -> AllocatorResult<()> {
    if view.assets.is_empty() {
        return Err(AllocatorError::InvalidInput {
            field: format!("views[{}].assets", vi),
            reason: "A view must reference at least one asset".into(),
        });
    }
    if view.assets.len() != view.asset_weights.len() {
        return Err(AllocatorError::InvalidInput {
            field: format!("views[{}]", vi),
            reason: "assets and asset_weights must have the same length".into(),
        });
    }
    if view.view_type == ViewType::Relative && view.assets.len() < 2 {
        return Err(AllocatorError::InvalidInput {
            field: format!("views[{}]", vi),
            reason: "A relative view needs at least two assets".into(),
        });
    }
    if method == OmegaMethod::Confidence {
        match view.confidence {
            Some(c) if c > Decimal::ZERO && c <= Decimal::ONE => {}
            _ => {
                return Err(AllocatorError::InvalidInput {
                    field: format!("views[{}].confidence", vi),
                    reason: "Confidence must be in (0, 1]".into(),
                })
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
