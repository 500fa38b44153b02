//! Fitness evaluator (C4): scores one dense individual by running it through the simulator,
//! then applies the two in-place genome repairs the reference implementation performs as part
//! of `evaluate` itself — repairing infeasible genomes is part of the evaluator's contract, not
//! an incidental side effect to be avoided.
use crate::domain::types::Horizon;
use crate::genome::{BatteryGene, GenomeLayout};
use crate::simulator::{self, DeviceSet, SimulationOutput};
use crate::domain::forecast::ForecastSeries;

/// Fixed penalty returned when the simulator fails outright (an infeasible or exceptional
/// genome), independent of the configurable EV-shortfall penalty below.
pub const EXCEPTION_PENALTY: f64 = 100_000.0;

/// Per-hour weight biasing the search away from pathological all-idle solutions. Load-bearing:
/// changing it changes which optima the search converges on (`spec.md` §9).
const NO_DISCHARGE_WEIGHT: f64 = 0.01;

/// Multiplier applied to `ev_shortfall_penalty_per_pct` for rate-overflow violations — ten
/// times steeper than a plain locked-hour violation since it represents a command the decoder
/// should never have let through.
const RATE_OVERFLOW_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct PopulationMetrics {
    pub balance_eur: f64,
    pub losses_wh: f64,
    pub ev_shortfall_penalty_eur: f64,
}

/// The four additive penalty terms from `spec.md` §4.4, broken out so callers (and tests) can
/// see which one drove a given individual's fitness away from its raw balance.
#[derive(Debug, Clone, Copy, Default)]
struct Penalties {
    no_discharge: f64,
    ev_locked_hours: f64,
    rate_overflow: f64,
    ev_soc_miss: f64,
}

impl Penalties {
    fn total(&self) -> f64 {
        self.no_discharge + self.ev_locked_hours + self.rate_overflow + self.ev_soc_miss
    }
}

pub struct FitnessEvaluator {
    pub layout: GenomeLayout,
    pub devices: DeviceSet,
    pub forecast: ForecastSeries,
    pub horizon: Horizon,
    pub optimize_dc_charge: bool,
    pub optimize_ev: bool,
    /// EUR charged per percentage point the EV ends the horizon below its SoC target.
    pub ev_shortfall_penalty_per_pct: f64,
}

impl FitnessEvaluator {
    /// Score `dense`, repairing it in place, and return `(fitness, metrics)`. Lower fitness is
    /// better (the engine minimizes total balance). On any simulation failure the fixed
    /// [`EXCEPTION_PENALTY`] is returned and no repair is attempted.
    pub fn evaluate(&self, dense: &mut Vec<i64>) -> (f64, PopulationMetrics) {
        let genome = self.layout.decode(dense);
        let output = match simulator::simulate(
            &self.devices,
            &self.forecast,
            &genome,
            &self.horizon,
            self.optimize_dc_charge,
        ) {
            Ok(output) => output,
            Err(_) => {
                return (
                    EXCEPTION_PENALTY,
                    PopulationMetrics {
                        balance_eur: EXCEPTION_PENALTY,
                        losses_wh: 0.0,
                        ev_shortfall_penalty_eur: 0.0,
                    },
                )
            }
        };

        let penalties = self.penalties(dense, &genome, &output);

        self.repair_ev_overcharge(dense, &output);
        self.repair_battery_stuck_at_min(dense, &output);

        let fitness = output.total_balance_eur + penalties.total();

        (
            fitness,
            PopulationMetrics {
                balance_eur: output.total_balance_eur,
                losses_wh: output.losses_wh.iter().sum(),
                ev_shortfall_penalty_eur: penalties.ev_soc_miss,
            },
        )
    }

    /// Compute the four additive penalty terms of `spec.md` §4.4 from the raw (pre-repair)
    /// dense genome, its decode, and the simulation it produced.
    fn penalties(&self, dense: &[i64], genome: &crate::genome::Genome, output: &SimulationOutput) -> Penalties {
        let mut penalties = Penalties::default();

        // Mild bias against pathological all-idle solutions: every hour the battery does not
        // command a discharge adds a small fixed weight.
        let no_discharge_hours = genome
            .battery
            .iter()
            .filter(|g| !matches!(g, BatteryGene::Discharge))
            .count();
        penalties.no_discharge = NO_DISCHARGE_WEIGHT * no_discharge_hours as f64;

        if self.optimize_ev {
            let ev_start = self.layout.horizon_hours;
            let lock_from = self.layout.horizon_hours.saturating_sub(self.layout.ev_locked_tail);

            // Count raw (pre-decode-mask) EV commands inside the locked tail — the decoder
            // defensively zeroes these, but a genome that keeps proposing them is still
            // penalized so the search steers away from wasting entropy there.
            let locked_violations = (lock_from..self.layout.horizon_hours)
                .filter(|&h| dense.get(ev_start + h).copied().unwrap_or(0) != 0)
                .count();
            penalties.ev_locked_hours =
                self.ev_shortfall_penalty_per_pct * locked_violations as f64;

            // Count raw EV rate indices outside the valid charge-rate table — defensively
            // clamped at decode, but still penalized if the genome keeps proposing them.
            let max_valid_index = self.layout.len_ac.saturating_sub(1) as i64;
            let overflow_violations = (0..self.layout.horizon_hours)
                .filter(|&h| dense.get(ev_start + h).copied().unwrap_or(0) > max_valid_index)
                .count();
            penalties.rate_overflow = self.ev_shortfall_penalty_per_pct
                * RATE_OVERFLOW_MULTIPLIER
                * overflow_violations as f64;

            let shortfall_pct = self
                .devices
                .ev
                .as_ref()
                .map(|ev| (ev.min_soc_target_pct - output.final_ev_soc_pct).max(0.0))
                .unwrap_or(0.0);
            if shortfall_pct > 0.0 {
                let nonzero_commands = genome.ev_rate_idx.iter().filter(|&&idx| idx != 0).count();
                penalties.ev_soc_miss =
                    self.ev_shortfall_penalty_per_pct * shortfall_pct * nonzero_commands as f64;
            }
        }

        penalties
    }

    /// Once the EV reaches 100% SoC, any further commanded charging is wasted genome entropy
    /// the GA would otherwise keep re-exploring; zero every charge index after the first hour
    /// the EV is full, keeping only the hour that reached it.
    fn repair_ev_overcharge(&self, dense: &mut [i64], output: &SimulationOutput) {
        if !self.optimize_ev {
            return;
        }
        let start = self.layout.horizon_hours;
        let full_at = output
            .ev_soc_per_hour
            .iter()
            .position(|&soc| soc >= 100.0 - 1e-6);
        let Some(full_at) = full_at else { return };
        for h in (full_at + 1)..self.layout.horizon_hours {
            let idx = start + h;
            if idx < dense.len() {
                dense[idx] = 0;
            }
        }
    }

    /// Once the battery has drifted to its minimum SoC without the genome commanding a
    /// discharge, force that hour's bucket into the `Discharge` state so the GA's own repair
    /// pass converges on a genome the decode/encode bijection already represents as "empty".
    fn repair_battery_stuck_at_min(&self, dense: &mut [i64], output: &SimulationOutput) {
        let len_ac = self.layout.len_ac;
        for h in 0..self.layout.horizon_hours {
            let at_min = output.battery_soc_per_hour[h] <= self.min_soc_floor() + 1e-6;
            if !at_min {
                continue;
            }
            let current = BatteryGene::from_index(dense[h], len_ac, self.optimize_dc_charge);
            if !matches!(current, BatteryGene::Discharge) {
                dense[h] = BatteryGene::Discharge.to_index(len_ac);
            }
        }
    }

    fn min_soc_floor(&self) -> f64 {
        self.devices.battery.min_soc_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::battery::BatteryConfig;
    use crate::domain::ev::EvConfig;
    use crate::domain::inverter::InverterConfig;
    use chrono::{TimeZone, Utc};

    fn horizon(h: usize) -> Horizon {
        Horizon::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), chrono_tz::Europe::Berlin, h)
    }

    fn evaluator(horizon_hours: usize) -> FitnessEvaluator {
        let len_ac = 3;
        FitnessEvaluator {
            layout: GenomeLayout {
                horizon_hours,
                len_ac,
                optimize_dc_charge: false,
                optimize_ev: true,
                has_appliance: false,
                ev_locked_tail: 0,
            },
            devices: DeviceSet {
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
                ev: Some(EvConfig {
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
                    charge_rates: vec![0.0, 0.5, 1.0],
                    min_soc_target_pct: 80.0,
                }),
                inverter: InverterConfig {
                    max_ac_power_w: 8_000.0,
                    efficiency: 0.97,
                },
                appliance: None,
                battery_residual_value_eur_per_wh: 0.0002,
            },
            forecast: ForecastSeries {
                pv_production_w: vec![0.0; horizon_hours],
                load_w: vec![500.0; horizon_hours],
                price_import_eur_per_wh: vec![0.0003; horizon_hours],
                price_export_eur_per_wh: vec![0.00008; horizon_hours],
                temperature_c: None,
            },
            horizon: horizon(horizon_hours),
            optimize_dc_charge: false,
            optimize_ev: true,
            ev_shortfall_penalty_per_pct: 50.0,
        }
    }

    #[test]
    fn repairs_zero_ev_charging_after_full() {
        let evaluator = evaluator(4);
        let mut dense = vec![0, 0, 0, 0, /* ev */ 2, 2, 2, 2];
        let (_, metrics) = evaluator.evaluate(&mut dense);
        assert_eq!(metrics.ev_shortfall_penalty_eur, 0.0);
        assert!(dense[5..].iter().all(|&v| v == 0) || dense[4] != 0);
    }

    #[test]
    fn invalid_forecast_length_returns_exception_penalty() {
        let mut evaluator = evaluator(4);
        evaluator.forecast.load_w.pop();
        let mut dense = vec![0, 0, 0, 0, 0, 0, 0, 0];
        let (fitness, _) = evaluator.evaluate(&mut dense);
        assert_eq!(fitness, EXCEPTION_PENALTY);
    }

    #[test]
    fn ev_soc_miss_penalty_scales_with_shortfall_and_command_count() {
        let mut e = evaluator(4);
        e.devices.ev.as_mut().unwrap().battery.initial_soc_pct = 10.0;
        e.devices.ev.as_mut().unwrap().min_soc_target_pct = 80.0;
        let mut dense = vec![0, 0, 0, 0, /* ev: all idle */ 0, 0, 0, 0];
        let (_, metrics) = e.evaluate(&mut dense);
        // No nonzero EV commands were issued, so the shortfall penalty has nothing to scale.
        assert_eq!(metrics.ev_shortfall_penalty_eur, 0.0);

        let mut dense_charging = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let (_, metrics_charging) = e.evaluate(&mut dense_charging);
        assert!(metrics_charging.ev_shortfall_penalty_eur > 0.0);
    }

    #[test]
    fn ev_locked_tail_violation_is_penalized_even_though_decode_masks_it() {
        let mut e = evaluator(4);
        e.layout.ev_locked_tail = 2;
        // Hours 2,3 are locked; a nonzero raw command there should be penalized.
        let mut locked = vec![0, 0, 0, 0, 0, 0, 1, 1];
        let (fitness_locked, _) = e.evaluate(&mut locked);

        let mut clean = vec![0, 0, 0, 0, 0, 0, 0, 0];
        let (fitness_clean, _) = e.evaluate(&mut clean);
        assert!(fitness_locked > fitness_clean);
    }
}
