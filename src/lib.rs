//! Energy Optimization System core: genetic-algorithm dispatch planning for PV, battery, EV
//! and appliance fleets.
//!
//! This crate is the C1–C8 core described in `SPEC_FULL.md`: device physics, the hourly
//! simulator, the genome codec, the penalty-augmented fitness evaluator, the µ+λ genetic
//! engine, the parameter assembler, the solution materializer, and the run coordinator that
//! ties them together behind a single-writer, single-run-at-a-time discipline. Prediction
//! providers, config-file loading, on-disk persistence, the HTTP API, and the MILP alternative
//! optimizer are external collaborators this crate only talks to through traits.

pub mod assembler;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod fitness;
pub mod genetic;
pub mod genome;
pub mod materializer;
pub mod simulator;
pub mod telemetry;

pub use assembler::{AdapterPort, DeviceInventory, FillMethod, GeneticParameters, MeasurementProvider, ParameterAssembler, PredictionProvider};
pub use config::EngineConfig;
pub use coordinator::{EmRunCoordinator, EnergyManagementStage};
pub use error::EosError;
pub use genetic::{GeneticEngine, OptimizationResult};
pub use materializer::{OptimizationSolution, SolutionMaterializer};
