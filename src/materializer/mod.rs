//! Solution Materializer (C7): turns a genome + its simulation output into the per-interval
//! reporting table (`OptimizationSolution`) and the compacted dispatch plan
//! (`EnergyManagementPlan`), per the `(ac, dc, discharge)` -> `(mode, factor)` table in
//! `domain::plan::OperationMode::classify`.
use crate::domain::forecast::ForecastSeries;
use crate::domain::plan::{EnergyManagementPlan, InstructionPayload, OperationMode, PlanResource};
use crate::domain::types::Horizon;
use crate::genome::{BatteryGene, Genome};
use crate::simulator::{DeviceSet, SimulationOutput};
use chrono::{DateTime, Utc};

/// Per-interval reporting table — a struct-of-arrays analogue of the reference
/// implementation's per-interval dataframe. One entry per array per horizon hour.
#[derive(Debug, Clone)]
pub struct OptimizationSolution {
    pub timestamps: Vec<DateTime<Utc>>,
    pub load_energy_wh: Vec<f64>,
    pub grid_feedin_energy_wh: Vec<f64>,
    pub grid_consumption_energy_wh: Vec<f64>,
    pub costs_amt: Vec<f64>,
    pub revenue_amt: Vec<f64>,
    pub losses_energy_wh: Vec<f64>,
    pub battery_soc_factor: Vec<f64>,
    pub ev_soc_factor: Vec<f64>,
    /// Raw (un-clamped) genome intent, before the simulator's SoC clamping.
    pub genetic_ac_charge_factor: Vec<f64>,
    pub genetic_dc_charge_factor: Vec<f64>,
    pub genetic_discharge_allowed_factor: Vec<f64>,
    pub battery_op_mode: Vec<OperationMode>,
    pub battery_op_factor: Vec<f64>,
    pub pv_production_w: Vec<f64>,
    pub price_import_eur_per_wh: Vec<f64>,
    pub price_export_eur_per_wh: Vec<f64>,
}

pub struct SolutionMaterializer;

impl SolutionMaterializer {
    /// Build `(OptimizationSolution, EnergyManagementPlan)` from a decoded genome's simulation
    /// output, for the executable window `[horizon.start_hour, horizon.hours)`.
    pub fn materialize(
        genome: &Genome,
        output: &SimulationOutput,
        forecast: &ForecastSeries,
        horizon: &Horizon,
        devices: &DeviceSet,
    ) -> (OptimizationSolution, EnergyManagementPlan) {
        let range = horizon.executable_hours();
        let len_ac = devices.battery_charge_rates.len().max(1);

        let mut solution = OptimizationSolution {
            timestamps: Vec::new(),
            load_energy_wh: Vec::new(),
            grid_feedin_energy_wh: Vec::new(),
            grid_consumption_energy_wh: Vec::new(),
            costs_amt: Vec::new(),
            revenue_amt: Vec::new(),
            losses_energy_wh: Vec::new(),
            battery_soc_factor: Vec::new(),
            ev_soc_factor: Vec::new(),
            genetic_ac_charge_factor: Vec::new(),
            genetic_dc_charge_factor: Vec::new(),
            genetic_discharge_allowed_factor: Vec::new(),
            battery_op_mode: Vec::new(),
            battery_op_factor: Vec::new(),
            pv_production_w: Vec::new(),
            price_import_eur_per_wh: Vec::new(),
            price_export_eur_per_wh: Vec::new(),
        };

        let mut plan = EnergyManagementPlan::default();

        for h in range.clone() {
            let (ts, mode, factor) = output.hourly_modes[h];
            solution.timestamps.push(ts);
            solution.load_energy_wh.push(forecast.load_w[h]);
            solution.grid_feedin_energy_wh.push(output.grid_export_wh[h]);
            solution.grid_consumption_energy_wh.push(output.grid_import_wh[h]);
            solution.costs_amt.push(output.grid_import_wh[h] * forecast.price_import_eur_per_wh[h]);
            solution.revenue_amt.push(output.grid_export_wh[h] * forecast.price_export_eur_per_wh[h]);
            solution.losses_energy_wh.push(output.losses_wh[h]);
            solution.battery_soc_factor.push(output.battery_soc_per_hour[h] / 100.0);
            solution.ev_soc_factor.push(output.ev_soc_per_hour[h] / 100.0);

            let gene = genome.battery[h];
            let (raw_ac, raw_dc, raw_discharge) = raw_intent(gene, len_ac);
            solution.genetic_ac_charge_factor.push(raw_ac);
            solution.genetic_dc_charge_factor.push(raw_dc);
            solution.genetic_discharge_allowed_factor.push(if raw_discharge { 1.0 } else { 0.0 });

            solution.battery_op_mode.push(mode);
            solution.battery_op_factor.push(factor);
            solution.pv_production_w.push(forecast.pv_production_w[h]);
            solution.price_import_eur_per_wh.push(forecast.price_import_eur_per_wh[h]);
            solution.price_export_eur_per_wh.push(forecast.price_export_eur_per_wh[h]);

            plan.push_compacted(
                PlanResource::Battery,
                ts,
                mode,
                InstructionPayload::Frbc { fill_rate: factor },
            );
        }

        materialize_ev(devices, output, horizon, &mut plan);
        materialize_appliance(genome, devices, horizon, &mut plan);

        (solution, plan)
    }
}

fn raw_intent(gene: BatteryGene, len_ac: usize) -> (f64, f64, bool) {
    match gene {
        BatteryGene::Idle => (0.0, 0.0, false),
        BatteryGene::Discharge => (0.0, 0.0, true),
        BatteryGene::AcCharge { rate_idx } => (
            (rate_idx as f64 + 1.0) / len_ac as f64,
            0.0,
            false,
        ),
        BatteryGene::DcCharge { allowed } => (0.0, if allowed { 1.0 } else { 0.0 }, false),
    }
}

/// Rule 5: if the EV's initial SoC already meets its target, emit a single `IDLE` at
/// `start_datetime` and stop — there is nothing for the EV to do this horizon.
fn materialize_ev(
    devices: &DeviceSet,
    output: &SimulationOutput,
    horizon: &Horizon,
    plan: &mut EnergyManagementPlan,
) {
    let Some(ev) = &devices.ev else { return };
    let start_ts = horizon.hour_timestamp(horizon.start_hour);

    if ev.battery.initial_soc_pct >= ev.min_soc_target_pct {
        plan.push_compacted(PlanResource::Ev, start_ts, OperationMode::Idle, InstructionPayload::Frbc { fill_rate: 1.0 });
        return;
    }

    for h in horizon.executable_hours() {
        let charging = output.ev_soc_per_hour[h.saturating_sub(1).max(horizon.start_hour)]
            < output.ev_soc_per_hour[h]
            || (h == horizon.start_hour && output.ev_soc_per_hour[h] > ev.battery.initial_soc_pct);
        let mode = if charging { OperationMode::GridSupportImport } else { OperationMode::Idle };
        let factor = if charging { 1.0 } else { 0.0 };
        plan.push_compacted(
            PlanResource::Ev,
            horizon.hour_timestamp(h),
            mode,
            InstructionPayload::Frbc { fill_rate: factor },
        );
    }
}

/// Rule 6: emit `RUN` (modeled as `ForcedCharge`/DDBC demand) at the configured start hour and
/// `OFF` (`Idle`) at `start + duration`.
fn materialize_appliance(
    genome: &Genome,
    devices: &DeviceSet,
    horizon: &Horizon,
    plan: &mut EnergyManagementPlan,
) {
    let (Some(appliance), Some(start_hour)) = (&devices.appliance, genome.appliance_start_hour) else {
        return;
    };
    let run_at = horizon.hour_timestamp(start_hour);
    let off_at = horizon.hour_timestamp((start_hour + appliance.duration_hours).min(horizon.hours));

    plan.push_compacted(
        PlanResource::Appliance,
        run_at,
        OperationMode::ForcedCharge,
        InstructionPayload::Ddbc { demand_w: appliance.power_w },
    );
    plan.push_compacted(
        PlanResource::Appliance,
        off_at,
        OperationMode::Idle,
        InstructionPayload::Ddbc { demand_w: 0.0 },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appliance::HomeApplianceConfig;
    use crate::domain::battery::BatteryConfig;
    use crate::domain::ev::EvConfig;
    use crate::domain::inverter::InverterConfig;
    use crate::genome::BatteryGene;
    use chrono::{TimeZone, Utc};

    fn horizon(h: usize) -> Horizon {
        Horizon::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), chrono_tz::Europe::Berlin, h)
    }

    fn devices() -> DeviceSet {
        DeviceSet {
            battery: BatteryConfig {
                capacity_wh: 10_000.0,
                min_soc_pct: 5.0,
                max_soc_pct: 95.0,
                initial_soc_pct: 50.0,
                charge_efficiency: 0.95,
                discharge_efficiency: 0.95,
                max_charge_power_w: 5_000.0,
                max_discharge_power_w: 5_000.0,
                measurement_key_soc_factor: None,
            },
            battery_charge_rates: vec![0.0, 0.5, 1.0],
            ev: None,
            inverter: InverterConfig {
                max_ac_power_w: 8_000.0,
                efficiency: 0.97,
            },
            appliance: None,
            battery_residual_value_eur_per_wh: 0.0002,
        }
    }

    #[test]
    fn appliance_emits_run_then_off() {
        let h = horizon(6);
        let mut devices = devices();
        devices.appliance = Some(HomeApplianceConfig {
            duration_hours: 2,
            power_w: 1_800.0,
            earliest_start_hour: 0,
            latest_start_hour: 5,
        });
        let genome = Genome {
            battery: vec![BatteryGene::Idle; 6],
            ev_rate_idx: vec![0; 6],
            appliance_start_hour: Some(2),
        };
        let mut plan = EnergyManagementPlan::default();
        materialize_appliance(&genome, &devices, &h, &mut plan);
        assert_eq!(plan.instructions.len(), 2);
        assert_eq!(plan.instructions[0].mode, OperationMode::ForcedCharge);
        assert_eq!(plan.instructions[1].mode, OperationMode::Idle);
    }

    #[test]
    fn ev_already_at_target_emits_single_idle() {
        let h = horizon(6);
        let mut devices = devices();
        devices.ev = Some(EvConfig {
            battery: BatteryConfig {
                capacity_wh: 20_000.0,
                min_soc_pct: 0.0,
                max_soc_pct: 100.0,
                initial_soc_pct: 90.0,
                charge_efficiency: 0.9,
                discharge_efficiency: 0.9,
                max_charge_power_w: 11_000.0,
                max_discharge_power_w: 0.0001,
                measurement_key_soc_factor: None,
            },
            charge_rates: vec![0.0, 1.0],
            min_soc_target_pct: 80.0,
        });
        let output = SimulationOutput {
            total_cost_eur: 0.0,
            total_revenue_eur: 0.0,
            total_balance_eur: 0.0,
            losses_wh: vec![0.0; 6],
            battery_soc_per_hour: vec![50.0; 6],
            ev_soc_per_hour: vec![90.0; 6],
            battery_charge_wh: vec![0.0; 6],
            battery_discharge_wh: vec![0.0; 6],
            grid_import_wh: vec![0.0; 6],
            grid_export_wh: vec![0.0; 6],
            final_battery_energy_wh: 5_000.0,
            final_ev_soc_pct: 90.0,
            hourly_modes: (0..6)
                .map(|i| (h.hour_timestamp(i), OperationMode::Idle, 1.0))
                .collect(),
        };
        let mut plan = EnergyManagementPlan::default();
        materialize_ev(&devices, &output, &h, &mut plan);
        assert_eq!(plan.instructions.len(), 1);
        assert_eq!(plan.instructions[0].mode, OperationMode::Idle);
    }
}
