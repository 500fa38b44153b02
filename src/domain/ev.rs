//! Electric vehicle model: a battery core plus the charge-rate table and SoC target used by
//! the genetic engine's EV segment (segment B), grounded in `akkudoktoreos`'s use of `PVAkku`
//! for both the home battery and the EV battery.
use crate::domain::battery::{Battery, BatteryConfig};
use crate::domain::types::{Energy, Percentage};
use crate::error::DeviceInvariantError;

#[derive(Debug, Clone)]
pub struct EvConfig {
    pub battery: BatteryConfig,
    /// Available AC charge rates as fractions of `max_charge_power_w`, e.g. `[0.0, 0.25, 0.5, 0.75, 1.0]`.
    /// Index `0` must be `0.0`; this is the "no charge" state the EV segment decodes to when idle.
    pub charge_rates: Vec<f64>,
    pub min_soc_target_pct: f64,
}

#[derive(Debug, Clone)]
pub struct Ev {
    battery: Battery,
    charge_rates: Vec<f64>,
    min_soc_target_pct: Percentage,
}

impl Ev {
    pub fn new(config: &EvConfig) -> Result<Self, DeviceInvariantError> {
        if config.charge_rates.is_empty() {
            return Err(DeviceInvariantError::EmptyChargeRates);
        }
        Ok(Self {
            battery: Battery::new(&config.battery)?,
            charge_rates: config.charge_rates.clone(),
            min_soc_target_pct: Percentage::new(config.min_soc_target_pct),
        })
    }

    pub fn charge_rates(&self) -> &[f64] {
        &self.charge_rates
    }

    pub fn soc_pct(&self) -> Percentage {
        self.battery.soc_pct()
    }

    pub fn min_soc_target_pct(&self) -> Percentage {
        self.min_soc_target_pct
    }

    pub fn soc_target_shortfall_pct(&self) -> f64 {
        (self.min_soc_target_pct.as_percent() - self.battery.soc_pct().as_percent()).max(0.0)
    }

    /// Apply the AC charge rate selected by `rate_idx` (an index into [`Self::charge_rates`]).
    /// Returns `(drawn, losses)`: the AC-side energy drawn this hour and its conversion loss.
    pub fn apply_charge_rate_index(&mut self, rate_idx: usize) -> (Energy, Energy) {
        self.apply_charge_rate_index_capped(rate_idx, f64::INFINITY)
    }

    /// As [`Self::apply_charge_rate_index`], but additionally capped to `max_drawn_wh` — the
    /// inverter AC throughput budget left over after the home battery's own AC charging has
    /// claimed its share (`spec.md` §4.1 step 4).
    pub fn apply_charge_rate_index_capped(&mut self, rate_idx: usize, max_drawn_wh: f64) -> (Energy, Energy) {
        let rate = self.charge_rates.get(rate_idx).copied().unwrap_or(0.0);
        if rate <= 0.0 {
            return (Energy::watt_hours(0.0), Energy::watt_hours(0.0));
        }
        self.battery.apply_ac_charge_capped(rate, max_drawn_wh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::battery::BatteryConfig;

    fn config() -> EvConfig {
        EvConfig {
            battery: BatteryConfig {
                capacity_wh: 60_000.0,
                min_soc_pct: 0.0,
                max_soc_pct: 100.0,
                initial_soc_pct: 20.0,
                charge_efficiency: 0.9,
                discharge_efficiency: 0.9,
                max_charge_power_w: 11_000.0,
                max_discharge_power_w: 0.0001,
                measurement_key_soc_factor: None,
            },
            charge_rates: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            min_soc_target_pct: 80.0,
        }
    }

    #[test]
    fn rate_index_zero_draws_no_energy() {
        let mut ev = Ev::new(&config()).unwrap();
        let (drawn, losses) = ev.apply_charge_rate_index(0);
        assert_eq!(drawn.as_watt_hours(), 0.0);
        assert_eq!(losses.as_watt_hours(), 0.0);
    }

    #[test]
    fn charging_reduces_target_shortfall() {
        let mut ev = Ev::new(&config()).unwrap();
        let before = ev.soc_target_shortfall_pct();
        ev.apply_charge_rate_index(4);
        assert!(ev.soc_target_shortfall_pct() < before);
    }
}
