#[cfg(feature = "optimization")]
pub mod mean_variance;
#[cfg(feature = "risk_parity")]
pub mod risk_parity;

#[cfg(feature = "optimization")]
pub use mean_variance::{
    optimize_weights, optimize_weights_with_config, run_optimize, MeanVarianceInput,
    MeanVarianceOutput, OptimizationResult,
};
#[cfg(feature = "risk_parity")]
pub use risk_parity::{
    solve_risk_parity, solve_risk_parity_with_config, run_risk_parity, RiskParityInput,
    RiskParityResult, RiskParityStatus,
};
