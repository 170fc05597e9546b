//! Scripted scenarios: RON-defined edits, ticks and checks run headlessly

mod definition;
mod executor;
mod results;
mod verification;

pub use definition::{ScenarioAction, ScenarioDefinition, WorldSpec};
pub use executor::{ScenarioExecutor, ScenarioExecutorConfig, build_simulation};
pub use results::{ExecutionReport, PerformanceMetrics};
pub use verification::{Region, VerificationCondition, VerificationResult};
