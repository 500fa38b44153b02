//! Simulator (C2): advances one decoded genome across the run horizon against a forecast,
//! producing the per-hour energy balance the fitness evaluator scores.
use crate::domain::appliance::{HomeAppliance, HomeApplianceConfig};
use crate::domain::battery::{Battery, BatteryConfig};
use crate::domain::ev::{Ev, EvConfig};
use crate::domain::forecast::ForecastSeries;
use crate::domain::inverter::{Inverter, InverterConfig};
use crate::domain::plan::OperationMode;
use crate::domain::types::{Energy, Horizon, Power};
use crate::error::{DeviceInvariantError, EvaluationError};
use crate::genome::{BatteryGene, Genome};
use chrono::{DateTime, Utc};

/// Static device configuration for one run; fresh [`Battery`]/[`Ev`] instances are constructed
/// from this every simulation since the genetic engine's inner loop calls `simulate` once per
/// individual per generation and each call must start from the same initial state.
#[derive(Debug, Clone)]
pub struct DeviceSet {
    pub battery: BatteryConfig,
    /// Available home-battery AC charge rates as fractions of `max_charge_power_w`, indexed by
    /// `BatteryGene::AcCharge::rate_idx`.
    pub battery_charge_rates: Vec<f64>,
    pub ev: Option<EvConfig>,
    pub inverter: InverterConfig,
    pub appliance: Option<HomeApplianceConfig>,
    /// Residual value assigned to energy left in the battery at the end of the horizon
    /// (EUR per Wh), subtracted from the total balance as in `preis_euro_pro_wh_akku`.
    pub battery_residual_value_eur_per_wh: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub total_cost_eur: f64,
    pub total_revenue_eur: f64,
    pub total_balance_eur: f64,
    /// Per-hour energy losses (Wh): inverter AC-cap curtailment plus battery/EV charge and
    /// discharge conversion losses for that hour (`spec.md` §3.5, §4.1).
    pub losses_wh: Vec<f64>,
    pub battery_soc_per_hour: Vec<f64>,
    pub ev_soc_per_hour: Vec<f64>,
    /// Per-hour net energy actually stored (post-efficiency) across the home battery's AC and
    /// DC charging and the EV's charging, Wh — the `battery_charge[h]` term of the energy
    /// balance in `spec.md` §8.
    pub battery_charge_wh: Vec<f64>,
    /// Per-hour gross energy drawn out of the home battery's cell by discharge (pre-efficiency,
    /// i.e. `delivered + losses`), Wh — the `battery_discharge[h]` term of that same balance.
    pub battery_discharge_wh: Vec<f64>,
    pub grid_import_wh: Vec<f64>,
    pub grid_export_wh: Vec<f64>,
    pub final_battery_energy_wh: f64,
    pub final_ev_soc_pct: f64,
    pub hourly_modes: Vec<(DateTime<Utc>, OperationMode, f64)>,
}

fn map_device_err(e: DeviceInvariantError) -> EvaluationError {
    EvaluationError::SimulationFailed(e.to_string())
}

/// Run the full horizon for one decoded genome.
pub fn simulate(
    devices: &DeviceSet,
    forecast: &ForecastSeries,
    genome: &Genome,
    horizon: &Horizon,
    optimize_dc_charge: bool,
) -> Result<SimulationOutput, EvaluationError> {
    forecast.validate(horizon.hours)?;

    let mut battery = Battery::new(&devices.battery).map_err(map_device_err)?;
    let mut ev = devices
        .ev
        .as_ref()
        .map(Ev::new)
        .transpose()
        .map_err(map_device_err)?;

    let inverter = Inverter::new(&devices.inverter).map_err(map_device_err)?;
    let ac_capacity_wh = Energy::from_power_one_hour(inverter.max_ac_power_w()).as_watt_hours();

    let appliance_profile = match (&devices.appliance, genome.appliance_start_hour) {
        (Some(cfg), Some(start)) => {
            let appliance = HomeAppliance::new(cfg).map_err(map_device_err)?;
            let clamped_start = appliance.clamp_start_hour(start);
            Some(appliance.energy_profile(clamped_start, horizon.hours))
        }
        _ => None,
    };

    let mut total_cost = 0.0;
    let mut total_revenue = 0.0;
    let mut losses_wh = Vec::with_capacity(horizon.hours);
    let mut battery_soc_per_hour = Vec::with_capacity(horizon.hours);
    let mut ev_soc_per_hour = Vec::with_capacity(horizon.hours);
    let mut battery_charge_wh = Vec::with_capacity(horizon.hours);
    let mut battery_discharge_wh = Vec::with_capacity(horizon.hours);
    let mut grid_import_wh = Vec::with_capacity(horizon.hours);
    let mut grid_export_wh = Vec::with_capacity(horizon.hours);
    let mut hourly_modes = Vec::with_capacity(horizon.hours);

    for h in 0..horizon.hours {
        let pv_energy = Energy::from_power_one_hour(Power::watts(forecast.pv_production_w[h]));
        let load_energy = Energy::from_power_one_hour(Power::watts(forecast.load_w[h]));
        let appliance_energy = appliance_profile
            .as_ref()
            .map(|p| p[h])
            .unwrap_or(Energy::watt_hours(0.0));

        let gene = genome.battery[h];
        let dc_allowed = gene.dc_allowed(optimize_dc_charge);

        // DC-coupled PV: whatever the battery does not store passes through to the inverter.
        let (dc_stored, dc_pass_through, dc_charge_losses) = if dc_allowed {
            battery.apply_dc_charge(pv_energy)
        } else {
            (Energy::watt_hours(0.0), pv_energy, Energy::watt_hours(0.0))
        };

        // PV-to-AC is routed first and already clamps to the inverter's AC cap; discharge and
        // AC-side charging below share what's left of that same cap (`spec.md` §4.1 step 4).
        let flow = inverter.dc_to_ac(dc_pass_through);
        let discharge_headroom_wh = (ac_capacity_wh - flow.ac_output.as_watt_hours()).max(0.0);

        let ac_rate = match gene {
            BatteryGene::AcCharge { rate_idx } => {
                devices.battery_charge_rates.get(rate_idx).copied().unwrap_or(0.0)
            }
            _ => 0.0,
        };
        let (ac_charge_drawn, ac_charge_losses) = if ac_rate > 0.0 {
            battery.apply_ac_charge_capped(ac_rate, ac_capacity_wh)
        } else {
            (Energy::watt_hours(0.0), Energy::watt_hours(0.0))
        };

        let discharge_commanded = matches!(gene, BatteryGene::Discharge);
        let (discharge_delivered, discharge_losses) = if discharge_commanded {
            battery.apply_discharge_capped(true, discharge_headroom_wh)
        } else {
            battery.idle();
            (Energy::watt_hours(0.0), Energy::watt_hours(0.0))
        };

        let charge_headroom_wh = (ac_capacity_wh - ac_charge_drawn.as_watt_hours()).max(0.0);
        let ev_rate_idx = genome.ev_rate_idx.get(h).copied().unwrap_or(0);
        let (ev_drawn, ev_charge_losses) = ev
            .as_mut()
            .map(|ev| ev.apply_charge_rate_index_capped(ev_rate_idx, charge_headroom_wh))
            .unwrap_or((Energy::watt_hours(0.0), Energy::watt_hours(0.0)));

        // `dc_to_ac` applies its own efficiency before clamping to the AC cap; the fraction lost
        // to that conversion (as opposed to curtailed above the cap) never shows up in `flow`.
        let inverter_conversion_loss =
            (dc_pass_through.as_watt_hours() - flow.ac_output.as_watt_hours() - flow.curtailed.as_watt_hours())
                .max(0.0);
        let hour_losses_wh = flow.curtailed.as_watt_hours()
            + inverter_conversion_loss
            + dc_charge_losses.as_watt_hours()
            + ac_charge_losses.as_watt_hours()
            + discharge_losses.as_watt_hours()
            + ev_charge_losses.as_watt_hours();
        losses_wh.push(hour_losses_wh);

        let ac_supply = flow.ac_output + discharge_delivered;
        let ac_demand = load_energy + appliance_energy + ac_charge_drawn + ev_drawn;

        let (import_wh, export_wh) = if ac_supply.as_watt_hours() >= ac_demand.as_watt_hours() {
            (0.0, ac_supply.as_watt_hours() - ac_demand.as_watt_hours())
        } else {
            (ac_demand.as_watt_hours() - ac_supply.as_watt_hours(), 0.0)
        };

        total_cost += import_wh * forecast.price_import_eur_per_wh[h];
        total_revenue += export_wh * forecast.price_export_eur_per_wh[h];

        let rated_charge_wh =
            Energy::from_power_one_hour(Power::watts(devices.battery.max_charge_power_w)).as_watt_hours();
        let effective_ac = ac_charge_drawn.as_watt_hours() / rated_charge_wh.max(1e-9);
        let effective_dc = dc_stored.as_watt_hours() / rated_charge_wh.max(1e-9);
        let effective_discharge = discharge_delivered.as_watt_hours() > 1e-9;

        let (mode, factor) = OperationMode::classify(effective_ac, effective_dc, effective_discharge);

        battery_soc_per_hour.push(battery.soc_pct().as_percent());
        ev_soc_per_hour.push(ev.as_ref().map(|e| e.soc_pct().as_percent()).unwrap_or(0.0));
        // Net energy actually absorbed into a battery cell this hour (post-efficiency, summed
        // across home-battery AC/DC charging and EV charging) and gross energy drawn out of the
        // home battery's cell (pre-efficiency) — these, together with `losses_wh[h]`, are what
        // closes the per-hour energy balance in `spec.md` §8.
        let charge_net_wh = (ac_charge_drawn.as_watt_hours() - ac_charge_losses.as_watt_hours())
            + (dc_stored.as_watt_hours() - dc_charge_losses.as_watt_hours())
            + (ev_drawn.as_watt_hours() - ev_charge_losses.as_watt_hours());
        let discharge_gross_wh = discharge_delivered.as_watt_hours() + discharge_losses.as_watt_hours();
        battery_charge_wh.push(charge_net_wh);
        battery_discharge_wh.push(discharge_gross_wh);
        grid_import_wh.push(import_wh);
        grid_export_wh.push(export_wh);
        hourly_modes.push((horizon.hour_timestamp(h), mode, factor));
    }

    let final_battery_energy_wh = battery.energy_content().as_watt_hours();
    let final_ev_soc_pct = ev.as_ref().map(|e| e.soc_pct().as_percent()).unwrap_or(0.0);
    let total_balance_eur =
        total_cost - total_revenue - final_battery_energy_wh * devices.battery_residual_value_eur_per_wh;

    Ok(SimulationOutput {
        total_cost_eur: total_cost,
        total_revenue_eur: total_revenue,
        total_balance_eur,
        losses_wh,
        battery_soc_per_hour,
        ev_soc_per_hour,
        battery_charge_wh,
        battery_discharge_wh,
        grid_import_wh,
        grid_export_wh,
        final_battery_energy_wh,
        final_ev_soc_pct,
        hourly_modes,
    })
}
