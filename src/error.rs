use indicatif::style::TemplateError;
use thiserror::Error;

pub type SimresResult<T> = Result<T, SimresError>;

#[derive(Debug, Error)]
pub enum SimresError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Errors raised while validating a scenario, before any replica starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Field '{field}' must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("Field '{field}' must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("Field '{field}' = {value} exceeds storage capacity {capacity}")]
    ExceedsCapacity {
        field: &'static str,
        value: f64,
        capacity: f64,
    },

    #[error("Field '{field}' = {value} outside valid range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "Disruption duration ordering violated: min {min} <= mode {mode} <= max {max} required"
    )]
    DurationOrdering { min: f64, mode: f64, max: f64 },

    #[error("Field '{field}' must be at least 1, got {value}")]
    ZeroCount { field: &'static str, value: u32 },
}

/// Errors occurring inside the kernel of a single replica.
///
/// These are fatal to the replica that raised them, never to the experiment.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Runtime invariant violated on day {day}: {msg}")]
    InvariantViolation { day: u32, msg: String },

    #[error("Order book overflow: {pending} orders pending, cap is {cap}")]
    OrderBookOverflow { pending: usize, cap: usize },

    #[error("Failed to build '{distribution}' distribution: {msg}")]
    Distribution {
        distribution: &'static str,
        msg: String,
    },
}

/// Errors related to the Monte Carlo executor and its worker pool.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(String),

    #[error("Result channel closed before the experiment finished: {0}")]
    Channel(String),

    #[error("Persisting replica {replica_index} failed after retry: {msg}")]
    Persistence { replica_index: u64, msg: String },

    #[error("Progress bar error")]
    ProgressBar(#[from] TemplateError),
}

/// Errors related to file I/O and serialization of sinks and documents.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Failed to create writer: {0}")]
    WriterCreation(String),

    #[error("Failed to create reader: {0}")]
    ReaderCreation(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),
}

/// Errors related to aggregation and the statistics layer.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("KPI table is empty")]
    EmptyTable,

    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Aggregated series have unequal lengths: {0}")]
    RaggedSeries(String),

    #[error("Factorial design is not balanced: {0}")]
    UnbalancedDesign(String),

    #[error("Factorial design is degenerate: {0}")]
    DegenerateDesign(String),

    #[error("Failed to build distribution: {0}")]
    Distribution(String),
}
