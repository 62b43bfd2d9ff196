use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AllocatorError;
use crate::types::Matrix;
use crate::AllocatorResult;

/// One time-indexed row of per-asset returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnObservation {
    pub date: NaiveDate,
    /// Asset identifier -> periodic return (0.01 = 1%).
    pub returns: BTreeMap<String, Decimal>,
}

/// Cleaned historical returns handed over by the data-preparation layer.
///
/// `assets` fixes the column order used by every downstream vector and
/// matrix. Rows must be in strictly increasing date order and every row must
/// carry a return for every asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsMatrix {
    pub assets: Vec<String>,
    pub observations: Vec<ReturnObservation>,
}

impl ReturnsMatrix {
    /// Build from dense rows (T x n) aligned with `assets` and `dates`.
    pub fn from_rows(
        assets: Vec<String>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<Decimal>>,
    ) -> AllocatorResult<Self> {
        if dates.len() != rows.len() {
            return Err(AllocatorError::InvalidInput {
                field: "dates".into(),
                reason: format!("{} dates for {} rows", dates.len(), rows.len()),
            });
        }
        let mut observations = Vec::with_capacity(rows.len());
        for (t, (date, row)) in dates.into_iter().zip(rows).enumerate() {
            if row.len() != assets.len() {
                return Err(AllocatorError::InvalidInput {
                    field: format!("rows[{}]", t),
                    reason: format!("Expected {} returns but got {}", assets.len(), row.len()),
                });
            }
            let returns = assets.iter().cloned().zip(row).collect();
            observations.push(ReturnObservation { date, returns });
        }
        let matrix = ReturnsMatrix {
            assets,
            observations,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Check the structural invariants: unique assets, ordered dates, complete rows.
    pub fn validate(&self) -> AllocatorResult<()> {
        if self.assets.is_empty() {
            return Err(AllocatorError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        for (i, name) in self.assets.iter().enumerate() {
            if self.assets[..i].contains(name) {
                return Err(AllocatorError::InvalidInput {
                    field: "assets".into(),
                    reason: format!("Duplicate asset '{}'", name),
                });
            }
        }
        if self.observations.len() < 2 {
            return Err(AllocatorError::InsufficientData(
                "At least 2 return observations required".into(),
            ));
        }

        for (t, obs) in self.observations.iter().enumerate() {
            if t > 0 && obs.date <= self.observations[t - 1].date {
                return Err(AllocatorError::InvalidInput {
                    field: format!("observations[{}].date", t),
                    reason: format!(
                        "Dates must be strictly increasing ({} follows {})",
                        obs.date,
                        self.observations[t - 1].date
                    ),
                });
            }
            if let Some(missing) = self.assets.iter().find(|a| !obs.returns.contains_key(*a)) {
                return Err(AllocatorError::InsufficientData(format!(
                    "Observation {} is missing a return for '{}'",
                    obs.date, missing
                )));
            }
            if let Some(extra) = obs.returns.keys().find(|k| !self.assets.contains(k)) {
                return Err(AllocatorError::InvalidInput {
                    field: format!("observations[{}].returns", t),
                    reason: format!("Unknown asset '{}'", extra),
                });
            }
        }
        Ok(())
    }

    /// Dense T x n matrix in `assets` column order.
    pub fn to_dense(&self) -> AllocatorResult<Matrix> {
        self.validate()?;
        Ok(self
            .observations
            .iter()
            .map(|obs| self.assets.iter().map(|a| obs.returns[a]).collect())
            .collect())
    }

    /// Column index of an asset.
    pub fn position(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_from_rows_round_trips_to_dense() {
        let m = ReturnsMatrix::from_rows(
            vec!["SPY".into(), "TLT".into()],
            vec![d(2), d(3), d(4)],
            vec![
                vec![dec!(0.01), dec!(-0.002)],
                vec![dec!(-0.005), dec!(0.003)],
                vec![dec!(0.002), dec!(0.001)],
            ],
        )
        .unwrap();
        assert_eq!(m.n_assets(), 2);
        assert_eq!(m.n_observations(), 3);
        let dense = m.to_dense().unwrap();
        assert_eq!(dense[1], vec![dec!(-0.005), dec!(0.003)]);
        assert_eq!(m.position("TLT"), Some(1));
    }

    #[test]
    fn test_missing_asset_is_insufficient_data() {
        let mut m = ReturnsMatrix::from_rows(
            vec!["A".into(), "B".into()],
            vec![d(2), d(3)],
            vec![vec![dec!(0.01), dec!(0.02)], vec![dec!(0.0), dec!(0.01)]],
        )
        .unwrap();
        m.observations[1].returns.remove("B");
        assert!(matches!(
            m.validate(),
            Err(AllocatorError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_unordered_dates_rejected() {
        let result = ReturnsMatrix::from_rows(
            vec!["A".into()],
            vec![d(3), d(2)],
            vec![vec![dec!(0.01)], vec![dec!(0.02)]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_single_row_rejected() {
        let result = ReturnsMatrix::from_rows(vec!["A".into()], vec![d(2)], vec![vec![dec!(0.01)]]);
        assert!(matches!(result, Err(AllocatorError::InsufficientData(_))));
    }

    #[test]
    fn test_duplicate_assets_rejected() {
        let result = ReturnsMatrix::from_rows(
            vec!["A".into(), "A".into()],
            vec![d(2), d(3)],
            vec![vec![dec!(0.01), dec!(0.01)], vec![dec!(0.02), dec!(0.02)]],
        );
        assert!(result.is_err());
    }
}
