//! Error taxonomy for the energy optimization engine.
use thiserror::Error;

/// Errors raised while validating a device configuration at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum DeviceInvariantError {
    #[error("min_soc_pct ({min}) must be <= max_soc_pct ({max})")]
    SocRangeInverted { min: f64, max: f64 },
    #[error("initial_soc_pct ({initial}) is outside [{min}, {max}]")]
    InitialSocOutOfRange { initial: f64, min: f64, max: f64 },
    #[error("efficiency ({0}) must be in (0.0, 1.0]")]
    InvalidEfficiency(f64),
    #[error("capacity_wh must be positive, got {0}")]
    NonPositiveCapacity(f64),
    #[error("{field} must be positive, got {value}")]
    NonPositivePower { field: &'static str, value: f64 },
    #[error("appliance earliest_start_hour ({earliest}) must be <= latest_start_hour ({latest})")]
    ApplianceWindowInverted { earliest: usize, latest: usize },
    #[error("charge_rates must be non-empty")]
    EmptyChargeRates,
}

/// Errors raised by forecast validation (`ForecastSeries::validate`).
#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("forecast series '{series}' has length {got}, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("forecast series '{series}' is unavailable")]
    Unavailable { series: &'static str },
    #[error("forecast series '{series}' contains a non-finite value at index {index}")]
    NonFinite { series: &'static str, index: usize },
}

/// Errors that can occur while evaluating a single individual's fitness.
///
/// Per design, this error never escapes the fitness evaluator: any `EvaluationError`
/// raised by the simulator is caught and downgraded to a fixed penalty value.
#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("simulation step failed: {0}")]
    SimulationFailed(String),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

/// Errors surfaced by the worker that runs the genetic algorithm off the async executor.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("genetic worker panicked or was cancelled: {0}")]
    JoinFailed(String),
}

/// Errors surfaced by external adapters (prediction/measurement/dispatch ports).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter '{adapter}' failed: {message}")]
    Failed { adapter: String, message: String },
}

/// Errors raised while validating top-level run input before a run is allowed to start.
#[derive(Debug, Error)]
pub enum InputValidationError {
    #[error("horizon_hours must be > 0")]
    ZeroHorizon,
    #[error("optimization.interval must be 3600 seconds, got {got}")]
    InvalidInterval { got: u64 },
    #[error(transparent)]
    Device(#[from] DeviceInvariantError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

/// Top-level error type for the crate. Only [`EosError::InputValidation`] and a terminal
/// [`EosError::ForecastUnavailable`] abort an `EmRunCoordinator::run` in progress; all
/// other variants are logged and cause the run to fall back to `IDLE` without a plan.
#[derive(Debug, Error)]
pub enum EosError {
    #[error(transparent)]
    InputValidation(#[from] InputValidationError),
    #[error("required forecast series unavailable: {0}")]
    ForecastUnavailable(#[from] ForecastError),
    #[error(transparent)]
    DeviceInvariant(#[from] DeviceInvariantError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
