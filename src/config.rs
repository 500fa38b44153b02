//! Statically typed engine configuration. Unlike the dynamic, runtime-discovered settings
//! object the reference implementation threads through every module, every option recognized
//! here is an explicit field — unknown keys are rejected at deserialization time via
//! `#[serde(deny_unknown_fields)]`, not silently ignored.
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level configuration for one engine instance.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[validate(nested)]
    #[serde(default)]
    pub prediction: PredictionConfig,

    #[validate(nested)]
    #[serde(default)]
    pub optimization: OptimizationConfig,

    #[validate(nested)]
    #[serde(default)]
    pub ems: EmsConfig,

    #[validate(nested)]
    #[serde(default)]
    pub devices: DeviceCaps,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prediction: PredictionConfig::default(),
            optimization: OptimizationConfig::default(),
            ems: EmsConfig::default(),
            devices: DeviceCaps::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PredictionConfig {
    /// Total horizon `H`, in hours.
    #[serde(default = "default_prediction_hours")]
    #[validate(range(min = 1, max = 168))]
    pub hours: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self { hours: default_prediction_hours() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OptimizationConfig {
    /// Length of the executable (non-locked) window within the horizon.
    #[serde(default = "default_optimization_horizon_hours")]
    #[validate(range(min = 1, max = 168))]
    pub horizon_hours: usize,

    /// Interval in seconds between plan slots; must be exactly one hour.
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,

    #[validate(nested)]
    #[serde(default)]
    pub genetic: GeneticEngineConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            horizon_hours: default_optimization_horizon_hours(),
            interval_s: default_interval_s(),
            genetic: GeneticEngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GeneticEngineConfig {
    #[serde(default = "default_individuals")]
    #[validate(range(min = 10, max = 5000))]
    pub individuals: usize,

    #[serde(default = "default_generations")]
    #[validate(range(min = 1, max = 5000))]
    pub generations: usize,

    /// RNG seed for deterministic runs; `None` means "seed from run start time" (left to the
    /// caller, since this crate never reads the system clock itself).
    #[serde(default)]
    pub seed: Option<u64>,

    /// Widens the per-hour battery state space with two extra DC-charge-gated states.
    /// Off by default, matching the reference implementation's `optimize_dc_charge = False`.
    #[serde(default)]
    pub optimize_dc_charge: bool,

    #[validate(nested)]
    #[serde(default)]
    pub penalties: PenaltyConfig,
}

impl Default for GeneticEngineConfig {
    fn default() -> Self {
        Self {
            individuals: default_individuals(),
            generations: default_generations(),
            seed: None,
            optimize_dc_charge: false,
            penalties: PenaltyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PenaltyConfig {
    /// EUR charged per percentage point the EV ends the horizon below its SoC target.
    #[serde(default = "default_ev_soc_miss_penalty")]
    #[validate(range(min = 0.0))]
    pub ev_soc_miss: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self { ev_soc_miss: default_ev_soc_miss_penalty() }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmsMode {
    Prediction,
    Optimization,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmsConfig {
    #[serde(default = "default_ems_mode")]
    pub mode: EmsMode,

    /// Seconds between successive `manage_energy` polling ticks.
    #[serde(default = "default_ems_interval_s")]
    #[validate(range(min = 1))]
    pub interval_s: u64,
}

impl Default for EmsConfig {
    fn default() -> Self {
        Self {
            mode: default_ems_mode(),
            interval_s: default_ems_interval_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeviceCaps {
    #[serde(default = "default_max_batteries")]
    pub max_batteries: usize,
    #[serde(default)]
    pub max_electric_vehicles: usize,
    #[serde(default = "default_max_inverters")]
    pub max_inverters: usize,
    #[serde(default)]
    pub max_home_appliances: usize,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            max_batteries: default_max_batteries(),
            max_electric_vehicles: 0,
            max_inverters: default_max_inverters(),
            max_home_appliances: 0,
        }
    }
}

fn default_prediction_hours() -> usize { 48 }
fn default_optimization_horizon_hours() -> usize { 24 }
fn default_interval_s() -> u64 { 3600 }
fn default_individuals() -> usize { 300 }
fn default_generations() -> usize { 400 }
fn default_ev_soc_miss_penalty() -> f64 { 10.0 }
fn default_ems_mode() -> EmsMode { EmsMode::Optimization }
fn default_ems_interval_s() -> u64 { 300 }
fn default_max_batteries() -> usize { 1 }
fn default_max_inverters() -> usize { 1 }
