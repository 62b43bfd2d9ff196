pub mod config;
pub mod error;
pub mod linalg;
pub mod types;

#[cfg(feature = "moments")]
pub mod moments;

#[cfg(feature = "black_litterman")]
pub mod black_litterman;

#[cfg(any(feature = "optimization", feature = "risk_parity"))]
pub mod portfolio_optimization;

#[cfg(feature = "simulation")]
pub mod simulation;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use error::AllocatorError;
pub use types::*;

/// Standard result type for all allocator operations
pub type AllocatorResult<T> = Result<T, AllocatorError>;
