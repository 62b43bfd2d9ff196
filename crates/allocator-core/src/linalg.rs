//! Dense row-major matrix helpers shared by the estimators and solvers.
//!
//! Matrices are small (one row per asset or per view), so everything is a
//! straightforward `Vec<Vec<Decimal>>` loop. Inversion uses Gauss-Jordan
//! elimination with partial pivoting and reports singularity instead of
//! producing garbage.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::AllocatorError;
use crate::types::Matrix;
use crate::AllocatorResult;

/// Pivots smaller than this fraction of the largest entry are treated as zero.
const RELATIVE_PIVOT_EPSILON: Decimal = dec!(0.000000000000000000001);

/// Multiply two matrices: C = A * B.
/// A is (m x p), B is (p x n_cols), result is (m x n_cols).
#[allow(clippy::needless_range_loop)]
pub fn mat_multiply(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Matrix {
    let m = a.len();
    let p = if m > 0 { a[0].len() } else { 0 };
    let n_cols = if !b.is_empty() { b[0].len() } else { 0 };
    let mut c = vec![vec![Decimal::ZERO; n_cols]; m];
    for i in 0..m {
        for j in 0..n_cols {
            let mut sum = Decimal::ZERO;
            for k in 0..p {
                sum += a[i][k] * b[k][j];
            }
            c[i][j] = sum;
        }
    }
    c
}

/// Transpose a matrix.
pub fn mat_transpose(a: &[Vec<Decimal>]) -> Matrix {
    let m = a.len();
    if m == 0 {
        return Vec::new();
    }
    let n = a[0].len();
    let mut t = vec![vec![Decimal::ZERO; m]; n];
    for (i, row) in a.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            t[j][i] = *v;
        }
    }
    t
}

/// Multiply a matrix (m x n) by a vector (n x 1), returning (m x 1).
pub fn mat_vec_multiply(a: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    a.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product of two vectors.
pub fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Element-wise addition of two matrices.
pub fn mat_add(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Matrix {
    a.iter()
        .zip(b.iter())
        .map(|(row_a, row_b)| row_a.iter().zip(row_b.iter()).map(|(x, y)| x + y).collect())
        .collect()
}

/// Element-wise subtraction of two matrices.
pub fn mat_sub(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Matrix {
    a.iter()
        .zip(b.iter())
        .map(|(row_a, row_b)| row_a.iter().zip(row_b.iter()).map(|(x, y)| x - y).collect())
        .collect()
}

/// Scale every element of a matrix by a scalar.
pub fn mat_scale(a: &[Vec<Decimal>], s: Decimal) -> Matrix {
    a.iter()
        .map(|row| row.iter().map(|v| v * s).collect())
        .collect()
}

/// n x n identity.
pub fn identity(n: usize) -> Matrix {
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| if i == j { Decimal::ONE } else { Decimal::ZERO })
                .collect()
        })
        .collect()
}

/// Diagonal matrix from a vector.
pub fn diagonal(values: &[Decimal]) -> Matrix {
    let n = values.len();
    let mut d = vec![vec![Decimal::ZERO; n]; n];
    for (i, v) in values.iter().enumerate() {
        d[i][i] = *v;
    }
    d
}

/// (A + A') / 2. Removes rounding asymmetry from products like X * S * X'.
pub fn symmetrize(a: &[Vec<Decimal>]) -> Matrix {
    let n = a.len();
    let mut s = a.to_vec();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = (a[i][j] + a[j][i]) / dec!(2);
            s[i][j] = avg;
            s[j][i] = avg;
        }
    }
    s
}

/// Invert a square matrix using Gauss-Jordan elimination with partial
/// pivoting. Returns `None` when a pivot vanishes relative to the largest
/// entry of the input.
#[allow(clippy::needless_range_loop)]
pub fn mat_inverse(a: &[Vec<Decimal>]) -> Option<Matrix> {
    let n = a.len();
    if n == 0 {
        return Some(Vec::new());
    }

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .map(|v| v.abs())
        .max()
        .unwrap_or(Decimal::ZERO);
    if scale.is_zero() {
        return None;
    }
    let pivot_floor = scale * RELATIVE_PIVOT_EPSILON;

    // Augmented matrix [A | I]
    let mut aug: Vec<Vec<Decimal>> = Vec::with_capacity(n);
    for (i, a_row) in a.iter().enumerate() {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(a_row);
        for j in 0..n {
            row.push(if i == j { Decimal::ONE } else { Decimal::ZERO });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_val = aug[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val <= pivot_floor {
            return None;
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        // Clone the pivot row to avoid simultaneous borrow.
        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor.is_zero() {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Some(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Maximum absolute column sum.
pub fn norm_1(a: &[Vec<Decimal>]) -> Decimal {
    let cols = a.first().map(|r| r.len()).unwrap_or(0);
    (0..cols)
        .map(|j| a.iter().map(|row| row[j].abs()).sum::<Decimal>())
        .max()
        .unwrap_or(Decimal::ZERO)
}

/// 1-norm condition number of `a` given its inverse.
pub fn condition_number(a: &[Vec<Decimal>], a_inv: &[Vec<Decimal>]) -> Decimal {
    norm_1(a) * norm_1(a_inv)
}

/// Lower-triangular Cholesky factor L with A = L L'. `None` if A is not
/// positive definite.
#[allow(clippy::needless_range_loop)]
pub fn cholesky(a: &[Vec<Decimal>]) -> Option<Matrix> {
    let n = a.len();
    let mut l = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= Decimal::ZERO {
                    return None;
                }
                l[i][i] = sum.sqrt()?;
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// PSD test: Cholesky of A + tol * I succeeds.
pub fn is_positive_semidefinite(a: &[Vec<Decimal>], tol: Decimal) -> bool {
    let n = a.len();
    let jittered = mat_add(a, &mat_scale(&identity(n), tol));
    cholesky(&jittered).is_some()
}

/// Square root clamped at zero for non-positive input.
pub fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    val.sqrt().unwrap_or(Decimal::ZERO)
}

/// Euclidean norm.
pub fn l2_norm(v: &[Decimal]) -> Decimal {
    sqrt_decimal(v.iter().map(|x| x * x).sum())
}

/// Sum of absolute element-wise differences.
pub fn l1_distance(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Quadratic form w' * Sigma * w.
pub fn quadratic_form(w: &[Decimal], sigma: &[Vec<Decimal>]) -> Decimal {
    vec_dot(w, &mat_vec_multiply(sigma, w))
}

/// Equal weights for n assets.
pub fn equal_weights(n: usize) -> Vec<Decimal> {
    if n == 0 {
        return Vec::new();
    }
    let w = Decimal::ONE / Decimal::from(n as i64);
    vec![w; n]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check that `m` is `rows x cols`.
pub fn validate_shape(
    field: &str,
    m: &[Vec<Decimal>],
    rows: usize,
    cols: usize,
) -> AllocatorResult<()> {
    if m.len() != rows {
        return Err(AllocatorError::InvalidInput {
            field: field.into(),
            reason: format!(
                "Expected {}x{} matrix but got {} rows",
                rows,
                cols,
                m.len()
            ),
        });
    }
    for (i, row) in m.iter().enumerate() {
        if row.len() != cols {
            return Err(AllocatorError::InvalidInput {
                field: field.into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), cols),
            });
        }
    }
    Ok(())
}

/// Square, symmetric, non-negative diagonal.
#[allow(clippy::needless_range_loop)]
/// Largest |a_ij - a_ji| accepted for a symmetric input matrix.
pub const SYMMETRY_TOLERANCE: Decimal = dec!(0.0000001);

pub fn validate_covariance_matrix(
    field: &str,
    cov: &[Vec<Decimal>],
    n: usize,
) -> AllocatorResult<()> {
    validate_shape(field, cov, n, n)?;
    for i in 0..n {
        if cov[i][i] < Decimal::ZERO {
            return Err(AllocatorError::InvalidInput {
                field: field.into(),
                reason: format!("Negative variance on diagonal [{},{}]={}", i, i, cov[i][i]),
            });
        }
        for j in (i + 1)..n {
            if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOLERANCE {
                return Err(AllocatorError::InvalidInput {
                    field: field.into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Entries >= 0 and summing to 1 within `tolerance`.
pub fn validate_weight_vector(
    field: &str,
    w: &[Decimal],
    n: usize,
    tolerance: Decimal,
) -> AllocatorResult<()> {
    if w.len() != n {
        return Err(AllocatorError::InvalidInput {
            field: field.into(),
            reason: format!("Expected {} weights but got {}", n, w.len()),
        });
    }
    if let Some((i, wi)) = w.iter().enumerate().find(|(_, wi)| **wi < Decimal::ZERO) {
        return Err(AllocatorError::InvalidInput {
            field: format!("{}[{}]", field, i),
            reason: format!("Weight must be non-negative (got {})", wi),
        });
    }
    let total: Decimal = w.iter().sum();
    if (total - Decimal::ONE).abs() > tolerance {
        return Err(AllocatorError::InvalidInput {
            field: field.into(),
            reason: format!("Weights must sum to 1.0 (got {})", total),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
