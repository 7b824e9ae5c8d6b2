// === Public Modules (The Canonical Paths) ===
pub mod engine;
pub mod error;
pub mod executor;
pub mod experiment;
pub mod report;
pub mod rng;
pub mod scenario;

// === Facades (Re-exporting internals) ===
pub use crate::engine::{ReplicaOutput, run_replica};
pub use crate::error::{SimresError, SimresResult};
pub use crate::executor::{
    ExecutorConfig, MonteCarloExecutor, RunStatus, ScenarioResult, run_scenario,
    sink::{JsonlSink, MemorySink, NullSink, ReplicaSink},
};
pub use crate::experiment::FactorialExperiment;
pub use crate::report::{KpiCol, KpiTable, aggregate_bands, aggregate_factorial, summarize};
pub use crate::scenario::{Scenario, ScenarioBuilder};
