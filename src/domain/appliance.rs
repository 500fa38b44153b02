//! Schedulable home appliance (e.g. dishwasher): a fixed power profile that can be started
//! at any hour within `[earliest_start_hour, latest_start_hour]` — the genetic engine's
//! segment C optimizes exactly this one integer.
use crate::domain::types::{Energy, Power};
use crate::error::DeviceInvariantError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeApplianceConfig {
    pub duration_hours: usize,
    pub power_w: f64,
    pub earliest_start_hour: usize,
    pub latest_start_hour: usize,
}

#[derive(Debug, Clone)]
pub struct HomeAppliance {
    duration_hours: usize,
    power_w: Power,
    earliest_start_hour: usize,
    latest_start_hour: usize,
}

impl HomeAppliance {
    pub fn new(config: &HomeApplianceConfig) -> Result<Self, DeviceInvariantError> {
        if config.earliest_start_hour > config.latest_start_hour {
            return Err(DeviceInvariantError::ApplianceWindowInverted {
                earliest: config.earliest_start_hour,
                latest: config.latest_start_hour,
            });
        }
        if config.power_w <= 0.0 {
            return Err(DeviceInvariantError::NonPositivePower {
                field: "power_w",
                value: config.power_w,
            });
        }
        Ok(Self {
            duration_hours: config.duration_hours,
            power_w: Power::watts(config.power_w),
            earliest_start_hour: config.earliest_start_hour,
            latest_start_hour: config.latest_start_hour,
        })
    }

    pub fn earliest_start_hour(&self) -> usize {
        self.earliest_start_hour
    }

    pub fn latest_start_hour(&self) -> usize {
        self.latest_start_hour
    }

    pub fn clamp_start_hour(&self, hour: usize) -> usize {
        hour.clamp(self.earliest_start_hour, self.latest_start_hour)
    }

    /// Per-hour consumed energy over `horizon_hours` if the appliance starts at `start_hour`.
    pub fn energy_profile(&self, start_hour: usize, horizon_hours: usize) -> Vec<Energy> {
        let mut profile = vec![Energy::watt_hours(0.0); horizon_hours];
        let per_hour = Energy::from_power_one_hour(self.power_w);
        for h in start_hour..(start_hour + self.duration_hours).min(horizon_hours) {
            profile[h] = per_hour;
        }
        profile
    }
}
