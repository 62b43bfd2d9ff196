//! Solver and simulator settings.
//!
//! Every field carries a serde default so a partial JSON/YAML document (or
//! none at all) yields a usable configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AllocatorError;
use crate::AllocatorResult;

/// What the simulator does when a step drives portfolio value to or below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuinPolicy {
    /// Return `AllocatorError::PortfolioRuin`.
    #[default]
    Fail,
    /// Pin value at zero, emit a reward of -1 and terminate the episode.
    Clamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanConfig {
    /// Prior uncertainty scaling, typically 0.01 - 0.1.
    #[serde(default = "default_tau")]
    pub tau: Decimal,
    /// Inner view system is rejected above this 1-norm condition number.
    #[serde(default = "default_condition_limit")]
    pub max_condition_number: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: Decimal,
    #[serde(default)]
    pub transaction_cost_rate: Decimal,
    /// Primal and dual residual tolerance.
    #[serde(default = "default_optimizer_tolerance")]
    pub tolerance: Decimal,
    #[serde(default = "default_optimizer_max_iterations")]
    pub max_iterations: u32,
    /// ADMM penalty. Derived from the covariance scale when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rho: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParityConfig {
    #[serde(default = "default_rp_tolerance")]
    pub tolerance: Decimal,
    #[serde(default = "default_rp_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_rp_step_size")]
    pub step_size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_sim_tc_rate")]
    pub transaction_cost_rate: Decimal,
    /// Each action component is clipped to [-action_bound, action_bound].
    #[serde(default = "default_action_bound")]
    pub action_bound: Decimal,
    #[serde(default = "default_initial_value")]
    pub initial_value: Decimal,
    #[serde(default)]
    pub ruin_policy: RuinPolicy,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default)]
    pub black_litterman: BlackLittermanConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub risk_parity: RiskParityConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

fn default_tau() -> Decimal {
    dec!(0.05)
}

fn default_condition_limit() -> Decimal {
    dec!(1000000000000)
}

fn default_risk_aversion() -> Decimal {
    dec!(2.5)
}

fn default_optimizer_tolerance() -> Decimal {
    dec!(0.000000001)
}

fn default_optimizer_max_iterations() -> u32 {
    10_000
}

fn default_rp_tolerance() -> Decimal {
    dec!(0.000001)
}

fn default_rp_max_iterations() -> u32 {
    1000
}

fn default_rp_step_size() -> Decimal {
    dec!(0.01)
}

fn default_sim_tc_rate() -> Decimal {
    dec!(0.001)
}

fn default_action_bound() -> Decimal {
    dec!(0.1)
}

fn default_initial_value() -> Decimal {
    dec!(10000)
}

impl Default for BlackLittermanConfig {
    fn default() -> Self {
        Self {
            tau: default_tau(),
            max_condition_number: default_condition_limit(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_aversion: default_risk_aversion(),
            transaction_cost_rate: Decimal::ZERO,
            tolerance: default_optimizer_tolerance(),
            max_iterations: default_optimizer_max_iterations(),
            rho: None,
        }
    }
}

impl Default for RiskParityConfig {
    fn default() -> Self {
        Self {
            tolerance: default_rp_tolerance(),
            max_iterations: default_rp_max_iterations(),
            step_size: default_rp_step_size(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            transaction_cost_rate: default_sim_tc_rate(),
            action_bound: default_action_bound(),
            initial_value: default_initial_value(),
            ruin_policy: RuinPolicy::default(),
        }
    }
}

fn invalid(field: &str, reason: &str) -> AllocatorError {
    AllocatorError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    }
}

impl BlackLittermanConfig {
    pub fn validate(&self) -> AllocatorResult<()> {
        if self.tau <= Decimal::ZERO {
            return Err(invalid("black_litterman.tau", "tau must be positive"));
        }
        if self.max_condition_number < Decimal::ONE {
            return Err(invalid(
                "black_litterman.max_condition_number",
                "condition number limit must be at least 1",
            ));
        }
        Ok(())
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> AllocatorResult<()> {
        if self.risk_aversion <= Decimal::ZERO {
            return Err(invalid("optimizer.risk_aversion", "must be positive"));
        }
        if self.transaction_cost_rate < Decimal::ZERO {
            return Err(invalid(
                "optimizer.transaction_cost_rate",
                "must be non-negative",
            ));
        }
        if self.tolerance <= Decimal::ZERO {
            return Err(invalid("optimizer.tolerance", "must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("optimizer.max_iterations", "must be at least 1"));
        }
        if matches!(self.rho, Some(r) if r <= Decimal::ZERO) {
            return Err(invalid("optimizer.rho", "must be positive"));
        }
        Ok(())
    }
}

impl RiskParityConfig {
    pub fn validate(&self) -> AllocatorResult<()> {
        if self.tolerance <= Decimal::ZERO {
            return Err(invalid("risk_parity.tolerance", "must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("risk_parity.max_iterations", "must be at least 1"));
        }
        if self.step_size <= Decimal::ZERO {
            return Err(invalid("risk_parity.step_size", "must be positive"));
        }
        Ok(())
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> AllocatorResult<()> {
        if self.transaction_cost_rate < Decimal::ZERO {
            return Err(invalid(
                "simulator.transaction_cost_rate",
                "must be non-negative",
            ));
        }
        if self.action_bound <= Decimal::ZERO {
            return Err(invalid("simulator.action_bound", "must be positive"));
        }
        if self.initial_value <= Decimal::ZERO {
            return Err(invalid("simulator.initial_value", "must be positive"));
        }
        Ok(())
    }
}

impl AllocatorConfig {
    /// Validate every section.
    pub fn validate(&self) -> AllocatorResult<()> {
        self.black_litterman.validate()?;
        self.optimizer.validate()?;
        self.risk_parity.validate()?;
        self.simulator.validate()
    }

    /// Parse a JSON document; missing sections fall back to defaults.
    pub fn from_json_str(s: &str) -> AllocatorResult<Self> {
        let cfg: AllocatorConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AllocatorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.risk_parity.max_iterations, 1000);
        assert_eq!(cfg.risk_parity.step_size, dec!(0.01));
        assert_eq!(cfg.simulator.ruin_policy, RuinPolicy::Fail);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg = AllocatorConfig::from_json_str(
            r#"{"black_litterman": {"tau": "0.025"}, "simulator": {"ruin_policy": "clamp"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.black_litterman.tau, dec!(0.025));
        assert_eq!(cfg.optimizer.risk_aversion, dec!(2.5));
        assert_eq!(cfg.simulator.ruin_policy, RuinPolicy::Clamp);
        assert_eq!(cfg.simulator.action_bound, dec!(0.1));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AllocatorConfig::from_json_str(r#"{"black_litterman": {"tau": "0"}}"#).is_err());
        assert!(
            AllocatorConfig::from_json_str(r#"{"optimizer": {"risk_aversion": "-1"}}"#).is_err()
        );
        assert!(AllocatorConfig::from_json_str(r#"{"risk_parity": {"max_iterations": 0}}"#).is_err());
    }
}
