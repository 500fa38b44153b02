//! Battery physics: a pure, synchronous state struct clamped to its SoC bounds.
//!
//! Unlike the hardware-communication abstractions this crate's structure descends from,
//! battery state here is advanced inline by the simulator on every fitness evaluation, so
//! there is no async trait and no simulated transport latency — see `DeviceInvariantError`
//! for the only failure mode (an impossible configuration at construction time).
use crate::domain::types::{Energy, Percentage, Power};
use crate::error::DeviceInvariantError;
use serde::{Deserialize, Serialize};

/// Static battery capabilities, validated once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryConfig {
    pub capacity_wh: f64,
    pub min_soc_pct: f64,
    pub max_soc_pct: f64,
    pub initial_soc_pct: f64,
    /// Round-trip charge efficiency applied when storing AC/DC energy, in `(0.0, 1.0]`.
    pub charge_efficiency: f64,
    /// Round-trip discharge efficiency applied when delivering stored energy.
    pub discharge_efficiency: f64,
    pub max_charge_power_w: f64,
    pub max_discharge_power_w: f64,
    /// Measurement-interface key the assembler reads this battery's live SoC from at run
    /// start (`spec.md` §4.6 step 4). `None` means `initial_soc_pct` above is used as-is.
    #[serde(default)]
    pub measurement_key_soc_factor: Option<String>,
}

/// A battery's physical state, advanced one hour at a time by the simulator.
#[derive(Debug, Clone)]
pub struct Battery {
    capacity_wh: f64,
    min_soc_pct: Percentage,
    max_soc_pct: Percentage,
    charge_efficiency: f64,
    discharge_efficiency: f64,
    max_charge_power_w: Power,
    max_discharge_power_w: Power,
    soc_pct: Percentage,
}

impl Battery {
    pub fn new(config: &BatteryConfig) -> Result<Self, DeviceInvariantError> {
        if config.capacity_wh <= 0.0 {
            return Err(DeviceInvariantError::NonPositiveCapacity(config.capacity_wh));
        }
        if config.min_soc_pct > config.max_soc_pct {
            return Err(DeviceInvariantError::SocRangeInverted {
                min: config.min_soc_pct,
                max: config.max_soc_pct,
            });
        }
        if config.initial_soc_pct < config.min_soc_pct || config.initial_soc_pct > config.max_soc_pct {
            return Err(DeviceInvariantError::InitialSocOutOfRange {
                initial: config.initial_soc_pct,
                min: config.min_soc_pct,
                max: config.max_soc_pct,
            });
        }
        for (field, eff) in [
            ("charge_efficiency", config.charge_efficiency),
            ("discharge_efficiency", config.discharge_efficiency),
        ] {
            if eff <= 0.0 || eff > 1.0 {
                let _ = field;
                return Err(DeviceInvariantError::InvalidEfficiency(eff));
            }
        }
        if config.max_charge_power_w <= 0.0 {
            return Err(DeviceInvariantError::NonPositivePower {
                field: "max_charge_power_w",
                value: config.max_charge_power_w,
            });
        }
        if config.max_discharge_power_w <= 0.0 {
            return Err(DeviceInvariantError::NonPositivePower {
                field: "max_discharge_power_w",
                value: config.max_discharge_power_w,
            });
        }

        Ok(Self {
            capacity_wh: config.capacity_wh,
            min_soc_pct: Percentage::new(config.min_soc_pct),
            max_soc_pct: Percentage::new(config.max_soc_pct),
            charge_efficiency: config.charge_efficiency,
            discharge_efficiency: config.discharge_efficiency,
            max_charge_power_w: Power::watts(config.max_charge_power_w),
            max_discharge_power_w: Power::watts(config.max_discharge_power_w),
            soc_pct: Percentage::new(config.initial_soc_pct),
        })
    }

    pub fn soc_pct(&self) -> Percentage {
        self.soc_pct
    }

    pub fn energy_content(&self) -> Energy {
        Energy::watt_hours(self.soc_pct.as_ratio() * self.capacity_wh)
    }

    fn headroom_to_max(&self) -> Energy {
        Energy::watt_hours((self.max_soc_pct.as_ratio() - self.soc_pct.as_ratio()) * self.capacity_wh)
    }

    fn headroom_to_min(&self) -> Energy {
        Energy::watt_hours((self.soc_pct.as_ratio() - self.min_soc_pct.as_ratio()) * self.capacity_wh)
    }

    fn apply_delta_wh(&mut self, delta_wh: f64) {
        let new_wh = (self.energy_content().as_watt_hours() + delta_wh)
            .clamp(self.min_soc_pct.as_ratio() * self.capacity_wh, self.max_soc_pct.as_ratio() * self.capacity_wh);
        self.soc_pct = Percentage::new(new_wh / self.capacity_wh * 100.0);
    }

    /// Charge for one hour at `rate` (fraction of `max_charge_power_w`, `[0.0, 1.0]`).
    /// Returns `(drawn, losses)`: the AC-side energy drawn this hour (pre-efficiency) and the
    /// conversion loss `drawn * (1 - charge_efficiency)` the simulator accumulates into
    /// `losses_wh` (`spec.md` §4.1: "losses_wh accumulates battery charge/discharge losses").
    pub fn apply_ac_charge(&mut self, rate: f64) -> (Energy, Energy) {
        self.apply_ac_charge_capped(rate, f64::INFINITY)
    }

    /// As [`Self::apply_ac_charge`], but the AC-side draw is additionally capped to
    /// `max_drawn_wh` — the inverter's remaining AC throughput budget for the hour, shared with
    /// any other device charging through the same AC port (`spec.md` §4.1 step 4).
    pub fn apply_ac_charge_capped(&mut self, rate: f64, max_drawn_wh: f64) -> (Energy, Energy) {
        let rate = rate.clamp(0.0, 1.0);
        let requested =
            (Energy::from_power_one_hour(self.max_charge_power_w).as_watt_hours() * rate).min(max_drawn_wh.max(0.0));
        let headroom = self.headroom_to_max().as_watt_hours() / self.charge_efficiency;
        let drawn = requested.min(headroom).max(0.0);
        self.apply_delta_wh(drawn * self.charge_efficiency);
        (Energy::watt_hours(drawn), Energy::watt_hours(drawn * (1.0 - self.charge_efficiency)))
    }

    /// Charge directly from DC-coupled PV for one hour, limited by `available_dc`.
    /// Returns `(stored_input, pass_through, losses)`: AC-equivalent input absorbed by the
    /// battery, the remainder passed through to the inverter unchanged, and the charge-
    /// efficiency loss on the absorbed portion.
    pub fn apply_dc_charge(&mut self, available_dc: Energy) -> (Energy, Energy, Energy) {
        let requested = available_dc.as_watt_hours().max(0.0);
        let capped_by_power = requested.min(self.max_charge_power_w.as_watts());
        let headroom = self.headroom_to_max().as_watt_hours() / self.charge_efficiency;
        let stored_input = capped_by_power.min(headroom).max(0.0);
        self.apply_delta_wh(stored_input * self.charge_efficiency);
        let pass_through = requested - stored_input;
        (
            Energy::watt_hours(stored_input),
            Energy::watt_hours(pass_through.max(0.0)),
            Energy::watt_hours(stored_input * (1.0 - self.charge_efficiency)),
        )
    }

    /// Discharge for one hour at full rate if `allowed`, else stay idle.
    /// Returns `(delivered, losses)`: the AC-side energy delivered this hour (post-efficiency)
    /// and the conversion loss `drawn_from_cell - delivered`.
    pub fn apply_discharge(&mut self, allowed: bool) -> (Energy, Energy) {
        self.apply_discharge_capped(allowed, f64::INFINITY)
    }

    /// As [`Self::apply_discharge`], but the AC-side delivery is additionally capped to
    /// `max_delivered_wh` — the inverter's remaining AC throughput budget for the hour, after
    /// the PV-to-AC path has already claimed its share (`spec.md` §4.1 step 4).
    pub fn apply_discharge_capped(&mut self, allowed: bool, max_delivered_wh: f64) -> (Energy, Energy) {
        if !allowed {
            return (Energy::watt_hours(0.0), Energy::watt_hours(0.0));
        }
        let requested =
            Energy::from_power_one_hour(self.max_discharge_power_w).as_watt_hours().min(max_delivered_wh.max(0.0));
        let available = self.headroom_to_min().as_watt_hours() * self.discharge_efficiency;
        let delivered = requested.min(available).max(0.0);
        let drawn_from_cell = delivered / self.discharge_efficiency;
        self.apply_delta_wh(-drawn_from_cell);
        (Energy::watt_hours(delivered), Energy::watt_hours(drawn_from_cell - delivered))
    }

    /// No-op state transition — battery neither charges nor discharges this hour.
    pub fn idle(&mut self) {}

    /// Whether the battery currently sits at (or within float tolerance of) `min_soc_pct` — the
    /// boundary condition the fitness evaluator's genome repair checks before forcing a stuck
    /// discharge gene back to idle.
    pub fn is_at_min_soc(&self) -> bool {
        self.soc_pct.as_percent() <= self.min_soc_pct.as_percent() + 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BatteryConfig {
        BatteryConfig {
            capacity_wh: 10_000.0,
            min_soc_pct: 10.0,
            max_soc_pct: 95.0,
            initial_soc_pct: 50.0,
            charge_efficiency: 0.95,
            discharge_efficiency: 0.95,
            max_charge_power_w: 5_000.0,
            max_discharge_power_w: 5_000.0,
            measurement_key_soc_factor: None,
        }
    }

    #[test]
    fn rejects_inverted_soc_range() {
        let mut c = config();
        c.min_soc_pct = 90.0;
        c.max_soc_pct = 10.0;
        assert!(matches!(
            Battery::new(&c),
            Err(DeviceInvariantError::SocRangeInverted { .. })
        ));
    }

    #[test]
    fn charge_then_discharge_never_exceeds_bounds() {
        let mut battery = Battery::new(&config()).unwrap();
        for _ in 0..20 {
            battery.apply_ac_charge(1.0);
            assert!(battery.soc_pct().as_percent() <= 95.0 + 1e-6);
        }
        for _ in 0..20 {
            battery.apply_discharge(true);
            assert!(battery.soc_pct().as_percent() >= 10.0 - 1e-6);
        }
    }

    #[test]
    fn ac_charge_reports_conversion_losses() {
        let mut battery = Battery::new(&config()).unwrap();
        let (drawn, losses) = battery.apply_ac_charge(1.0);
        assert!(drawn.as_watt_hours() > 0.0);
        assert!((losses.as_watt_hours() - drawn.as_watt_hours() * 0.05).abs() < 1e-6);
    }

    #[test]
    fn discharge_reports_conversion_losses() {
        let mut battery = Battery::new(&config()).unwrap();
        let (delivered, losses) = battery.apply_discharge(true);
        assert!(delivered.as_watt_hours() > 0.0);
        assert!(losses.as_watt_hours() > 0.0);
    }

    #[test]
    fn idle_does_not_change_soc() {
        let mut battery = Battery::new(&config()).unwrap();
        let before = battery.soc_pct().as_percent();
        battery.idle();
        assert_eq!(battery.soc_pct().as_percent(), before);
    }
}
