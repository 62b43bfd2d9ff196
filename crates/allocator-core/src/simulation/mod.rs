pub mod environment;
pub mod episode;
pub mod policy;
pub mod rebalance;
pub mod synthetic;

pub use environment::{
    Observation, PredictionProvider, RebalanceEnv, SimStatus, StaticPrediction, StepOutcome,
};
pub use episode::{run_episode, run_simulation, EpisodeSummary, PolicySpec, ReturnsSource, SimulationInput};
pub use policy::{HoldPolicy, Policy, RandomPolicy, TargetWeightPolicy};
pub use rebalance::{simulate_step, PortfolioState, StepResult};
pub use synthetic::{generate_returns, SyntheticReturns};
