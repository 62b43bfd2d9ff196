use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::Deserialize;

use allocator_core::config::{AllocatorConfig, SimulatorConfig};
use allocator_core::simulation::PortfolioState;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[napi]
pub fn estimate_moments(input_json: String) -> NapiResult<String> {
    let input: allocator_core::moments::MomentsInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocator_core::moments::run_moments(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn black_litterman_posterior(input_json: String) -> NapiResult<String> {
    let input: allocator_core::black_litterman::PosteriorInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        allocator_core::black_litterman::run_posterior(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_weights(input_json: String) -> NapiResult<String> {
    let input: allocator_core::portfolio_optimization::MeanVarianceInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        allocator_core::portfolio_optimization::run_optimize(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn solve_risk_parity(input_json: String) -> NapiResult<String> {
    let input: allocator_core::portfolio_optimization::RiskParityInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocator_core::portfolio_optimization::run_risk_parity(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn run_allocation(input_json: String) -> NapiResult<String> {
    let input: allocator_core::pipeline::AllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocator_core::pipeline::run_allocation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StepRequest {
    state: PortfolioState,
    realized_returns: Vec<Decimal>,
    action: Vec<Decimal>,
    #[serde(default)]
    config: SimulatorConfig,
}

/// Single environment transition, for agents that keep state on the JS side.
#[napi]
pub fn simulate_step(input_json: String) -> NapiResult<String> {
    let req: StepRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocator_core::simulation::simulate_step(
        &req.state,
        &req.realized_returns,
        &req.action,
        &req.config,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn run_simulation(input_json: String) -> NapiResult<String> {
    let input: allocator_core::simulation::SimulationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocator_core::simulation::run_simulation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default solver and simulator settings, validated.
#[napi]
pub fn default_config() -> NapiResult<String> {
    let config = AllocatorConfig::default();
    config.validate().map_err(to_napi_error)?;
    serde_json::to_string(&config).map_err(to_napi_error)
}
