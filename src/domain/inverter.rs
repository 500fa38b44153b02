//! Inverter: routes DC-side PV production and battery AC flows into a single AC bus, clamped
//! to the inverter's rated AC output. Pure synchronous function, no hardware mode/status —
//! the fitness evaluator calls this inline on every individual.
use crate::domain::types::{Energy, Power};
use crate::error::DeviceInvariantError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InverterConfig {
    pub max_ac_power_w: f64,
    /// DC->AC conversion efficiency applied to PV energy that is not DC-coupled to the battery.
    pub efficiency: f64,
}

#[derive(Debug, Clone)]
pub struct Inverter {
    max_ac_power_w: Power,
    efficiency: f64,
}

/// Result of routing one hour of DC/AC power through the inverter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverterFlow {
    pub ac_output: Energy,
    pub curtailed: Energy,
}

impl Inverter {
    pub fn new(config: &InverterConfig) -> Result<Self, DeviceInvariantError> {
        if config.max_ac_power_w <= 0.0 {
            return Err(DeviceInvariantError::NonPositivePower {
                field: "max_ac_power_w",
                value: config.max_ac_power_w,
            });
        }
        if config.efficiency <= 0.0 || config.efficiency > 1.0 {
            return Err(DeviceInvariantError::InvalidEfficiency(config.efficiency));
        }
        Ok(Self {
            max_ac_power_w: Power::watts(config.max_ac_power_w),
            efficiency: config.efficiency,
        })
    }

    /// Convert `dc_input` PV energy not routed DC-to-battery into AC energy, clamped to the
    /// inverter's rated AC output for the hour. Any energy above the cap is curtailed.
    pub fn dc_to_ac(&self, dc_input: Energy) -> InverterFlow {
        let ac_capacity = Energy::from_power_one_hour(self.max_ac_power_w);
        let converted = Energy::watt_hours(dc_input.as_watt_hours().max(0.0) * self.efficiency);
        if converted.as_watt_hours() <= ac_capacity.as_watt_hours() {
            InverterFlow {
                ac_output: converted,
                curtailed: Energy::watt_hours(0.0),
            }
        } else {
            InverterFlow {
                ac_output: ac_capacity,
                curtailed: Energy::watt_hours(converted.as_watt_hours() - ac_capacity.as_watt_hours()),
            }
        }
    }

    pub fn max_ac_power_w(&self) -> Power {
        self.max_ac_power_w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_rated_ac_output() {
        let inverter = Inverter::new(&InverterConfig {
            max_ac_power_w: 5_000.0,
            efficiency: 0.97,
        })
        .unwrap();
        let flow = inverter.dc_to_ac(Energy::watt_hours(10_000.0));
        assert_eq!(flow.ac_output.as_watt_hours(), 5_000.0);
        assert!(flow.curtailed.as_watt_hours() > 0.0);
    }

    #[test]
    fn applies_efficiency_below_cap() {
        let inverter = Inverter::new(&InverterConfig {
            max_ac_power_w: 10_000.0,
            efficiency: 0.95,
        })
        .unwrap();
        let flow = inverter.dc_to_ac(Energy::watt_hours(1_000.0));
        assert_eq!(flow.ac_output.as_watt_hours(), 950.0);
        assert_eq!(flow.curtailed.as_watt_hours(), 0.0);
    }
}
