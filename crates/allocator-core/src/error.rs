use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Singular view system: {0}")]
    SingularViewSystem(String),

    #[error("Infeasible: {0}")]
    Infeasible(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    SolverDidNotConverge {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Maximum iterations reached: {iterations} iterations, residual {residual}")]
    MaxIterationsReached { iterations: u32, residual: Decimal },

    #[error("Portfolio ruin: value fell to {value}")]
    PortfolioRuin { value: Decimal },

    #[error("Episode terminated: call reset() before stepping again")]
    EpisodeTerminated,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AllocatorError {
    fn from(e: serde_json::Error) -> Self {
        AllocatorError::SerializationError(e.to_string())
    }
}
