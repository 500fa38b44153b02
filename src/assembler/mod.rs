//! Parameter Assembler (C6): turns config + external prediction/measurement data into the
//! fully-resolved inputs the genetic engine needs for one run, fetching forecast series through
//! a retry-with-defaults loop before giving up and aborting the run.
use crate::config::EngineConfig;
use crate::coordinator::cache::RunCache;
use crate::domain::appliance::HomeApplianceConfig;
use crate::domain::battery::BatteryConfig;
use crate::domain::ev::EvConfig;
use crate::domain::forecast::ForecastSeries;
use crate::domain::inverter::InverterConfig;
use crate::domain::types::Horizon;
use crate::error::{EosError, ForecastError, InputValidationError};
use crate::genome::GenomeLayout;
use crate::simulator::DeviceSet;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

const FORECAST_RETRY_ATTEMPTS: usize = 10;

/// Fixed fallback table of fill configurations installed between retry attempts (`spec.md`
/// §4.6 step 3). The reference implementation swaps in a whole alternate provider on failure;
/// this crate's single injected [`PredictionProvider`] has no such registry to swap, so the
/// fallback table instead cycles the fill strategy requested of that same provider — still a
/// genuinely different request each attempt, not a repeat of the one that just failed.
const FALLBACK_FILL_TABLE: [FillMethod; 4] =
    [FillMethod::Linear, FillMethod::Ffill, FillMethod::Bfill, FillMethod::None];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMethod {
    Linear,
    Ffill,
    Bfill,
    None,
}

/// Source of forecast time series (PV, load, prices, weather). Implemented by a caller-owned
/// adapter; the engine only ever reads through this trait.
pub trait PredictionProvider: Send + Sync {
    fn key_to_array(
        &self,
        key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
        fill: FillMethod,
    ) -> Result<Vec<f64>, ForecastError>;
}

/// Source of point-in-time measurements (e.g. a device's live SoC reading).
pub trait MeasurementProvider: Send + Sync {
    fn key_to_value(&self, key: &str, at: DateTime<Utc>) -> Option<f64>;
}

/// External data-refresh hook the coordinator calls at the start of `DATA_ACQUISITION` and
/// `CONTROL_DISPATCH`. Failures are logged by the caller and never abort a run.
#[async_trait]
pub trait AdapterPort: Send + Sync {
    async fn update_data(&self, force_enable: bool);
}

const PV_KEY: &str = "pvforecast_ac_power";
const PRICE_IMPORT_KEY: &str = "elecprice_marketprice_wh";
const LOAD_KEY: &str = "loadforecast_power_w";
const PRICE_EXPORT_KEY: &str = "feed_in_tariff_wh";
const WEATHER_KEY: &str = "weather_temp_air";

/// Fully-resolved inputs for one genetic-engine run.
pub struct GeneticParameters {
    pub horizon: Horizon,
    pub layout: GenomeLayout,
    pub devices: DeviceSet,
    pub forecast: ForecastSeries,
    pub optimize_dc_charge: bool,
    pub optimize_ev: bool,
    pub seed: u64,
    pub generations: usize,
    pub population_size: usize,
    pub ev_shortfall_penalty_per_pct: f64,
}

/// Per-device configuration the assembler needs from the caller; the engine core has no
/// opinion on where these values come from (file, database, UI) — only on their shape.
#[derive(Debug, Clone, Default)]
pub struct DeviceInventory {
    pub battery: Option<BatteryConfig>,
    pub battery_charge_rates: Vec<f64>,
    pub ev: Option<EvConfig>,
    pub inverter: Option<InverterConfig>,
    pub appliance: Option<HomeApplianceConfig>,
    pub battery_residual_value_eur_per_wh: f64,
}

pub struct ParameterAssembler<'a> {
    pub predictions: &'a dyn PredictionProvider,
    pub measurements: &'a dyn MeasurementProvider,
}

impl<'a> ParameterAssembler<'a> {
    pub fn new(predictions: &'a dyn PredictionProvider, measurements: &'a dyn MeasurementProvider) -> Self {
        Self { predictions, measurements }
    }

    /// Resolve `config.measurement_key_soc_factor` against the measurement interface
    /// (`spec.md` §4.6 step 4): a `[0.0, 1.0]` factor clamped and converted to percent, `0` on
    /// absence. A device with no configured key keeps its static `initial_soc_pct` unchanged.
    fn resolve_initial_soc(&self, measurement_key: Option<&str>, at: DateTime<Utc>) -> Option<f64> {
        let key = measurement_key?;
        let factor = self.measurements.key_to_value(key, at).unwrap_or(0.0);
        Some(factor.clamp(0.0, 1.0) * 100.0)
    }

    /// Assemble one run's parameters. Forecast series are fetched with up to
    /// [`FORECAST_RETRY_ATTEMPTS`] retries each through `cache`; a key still unavailable after
    /// that many attempts aborts the run with [`EosError::ForecastUnavailable`].
    pub fn assemble(
        &self,
        config: &EngineConfig,
        horizon: Horizon,
        inventory: DeviceInventory,
        cache: &mut RunCache,
    ) -> Result<GeneticParameters, EosError> {
        if config.optimization.interval_s != 3600 {
            return Err(InputValidationError::InvalidInterval { got: config.optimization.interval_s }.into());
        }
        if horizon.hours == 0 {
            return Err(InputValidationError::ZeroHorizon.into());
        }

        let start = horizon.start_of_day;
        let end = start + Duration::hours(horizon.hours as i64);
        let interval = Duration::hours(1);

        let forecast = ForecastSeries {
            pv_production_w: self.fetch_with_retry(cache, PV_KEY, start, end, interval)?,
            load_w: self.fetch_with_retry(cache, LOAD_KEY, start, end, interval)?,
            price_import_eur_per_wh: self.fetch_with_retry(cache, PRICE_IMPORT_KEY, start, end, interval)?,
            price_export_eur_per_wh: self.fetch_with_retry(cache, PRICE_EXPORT_KEY, start, end, interval)?,
            temperature_c: Some(self.fetch_with_retry(cache, WEATHER_KEY, start, end, interval)?),
        };
        forecast
            .validate(horizon.hours)
            .map_err(InputValidationError::from)?;

        let mut inventory = inventory;
        if config.devices.max_batteries == 0 {
            inventory.battery = None;
        }
        if config.devices.max_electric_vehicles == 0 {
            inventory.ev = None;
        }
        if config.devices.max_inverters == 0 {
            inventory.inverter = None;
        }
        if config.devices.max_home_appliances == 0 {
            inventory.appliance = None;
        }

        if let Some(battery) = inventory.battery.as_mut() {
            if let Some(soc) = self.resolve_initial_soc(battery.measurement_key_soc_factor.as_deref(), start) {
                battery.initial_soc_pct = soc;
            }
        }
        if let Some(ev) = inventory.ev.as_mut() {
            if let Some(soc) =
                self.resolve_initial_soc(ev.battery.measurement_key_soc_factor.as_deref(), start)
            {
                ev.battery.initial_soc_pct = soc;
            }
        }

        let len_ac = inventory.battery_charge_rates.len().max(1);
        let optimize_ev = inventory
            .ev
            .as_ref()
            .map(|ev| ev.min_soc_target_pct - ev.battery.initial_soc_pct >= 0.0)
            .unwrap_or(false);
        let has_appliance = inventory.appliance.is_some();
        let optimization_hours = config.optimization.horizon_hours.min(horizon.hours);
        let ev_locked_tail = horizon.hours.saturating_sub(optimization_hours);

        let layout = GenomeLayout {
            horizon_hours: horizon.hours,
            len_ac,
            optimize_dc_charge: config.optimization.genetic.optimize_dc_charge,
            optimize_ev,
            has_appliance,
            ev_locked_tail,
        };

        let devices = DeviceSet {
            battery: inventory.battery.unwrap_or_else(default_disabled_battery),
            battery_charge_rates: if inventory.battery_charge_rates.is_empty() {
                vec![0.0]
            } else {
                inventory.battery_charge_rates
            },
            ev: inventory.ev,
            inverter: inventory.inverter.unwrap_or(InverterConfig {
                max_ac_power_w: 1.0,
                efficiency: 1.0,
            }),
            appliance: inventory.appliance,
            battery_residual_value_eur_per_wh: inventory.battery_residual_value_eur_per_wh,
        };

        Ok(GeneticParameters {
            horizon,
            layout,
            devices,
            forecast,
            optimize_dc_charge: config.optimization.genetic.optimize_dc_charge,
            optimize_ev,
            seed: config.optimization.genetic.seed.unwrap_or(0),
            generations: config.optimization.genetic.generations,
            population_size: config.optimization.genetic.individuals,
            ev_shortfall_penalty_per_pct: config.optimization.genetic.penalties.ev_soc_miss,
        })
    }

    /// Fetch one prediction key's array, memoizing the resolved series in `cache` for the
    /// remainder of the run (`spec.md` §4.8) and retrying up to [`FORECAST_RETRY_ATTEMPTS`]
    /// times against [`FALLBACK_FILL_TABLE`] on failure (`spec.md` §4.6 step 3) before aborting.
    fn fetch_with_retry(
        &self,
        cache: &mut RunCache,
        key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Vec<f64>, EosError> {
        let cache_key = format!("{key}:{}:{}", start.timestamp(), end.timestamp());
        if let Some(cached) = cache.get(&cache_key) {
            return Ok(cached);
        }

        let mut last_err = None;
        for attempt in 1..=FORECAST_RETRY_ATTEMPTS {
            let fill = FALLBACK_FILL_TABLE[(attempt - 1) % FALLBACK_FILL_TABLE.len()];
            match self.predictions.key_to_array(key, start, end, interval, fill) {
                Ok(values) => {
                    cache.insert(cache_key, values.clone());
                    return Ok(values);
                }
                Err(err) => {
                    warn!(key, attempt, ?fill, %err, "prediction key unavailable, installing fallback fill configuration and retrying");
                    last_err = Some(err);
                }
            }
        }
        Err(EosError::ForecastUnavailable(
            last_err.unwrap_or(ForecastError::Unavailable { series: "unknown" }),
        ))
    }
}

fn default_disabled_battery() -> BatteryConfig {
    BatteryConfig {
        capacity_wh: 1.0,
        min_soc_pct: 0.0,
        max_soc_pct: 0.0001,
        initial_soc_pct: 0.0,
        charge_efficiency: 1.0,
        discharge_efficiency: 1.0,
        max_charge_power_w: 1.0,
        max_discharge_power_w: 1.0,
        measurement_key_soc_factor: None,
    }
}
