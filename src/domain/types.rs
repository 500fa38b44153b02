//! Physical-unit newtypes and horizon/time helpers shared across the engine.
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Power in Watts (W).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Power(pub f64);

impl Power {
    pub fn watts(w: f64) -> Self {
        Self(w)
    }
    pub fn as_watts(&self) -> f64 {
        self.0
    }
}

impl Add for Power {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Power {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Energy in Watt-hours (Wh). One interval (3600s) of `Power` is one `Energy`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Energy(pub f64);

impl Energy {
    pub fn watt_hours(wh: f64) -> Self {
        Self(wh)
    }
    pub fn as_watt_hours(&self) -> f64 {
        self.0
    }

    /// Energy delivered by holding `power` for one hour (the engine's fixed interval).
    pub fn from_power_one_hour(power: Power) -> Self {
        Self(power.as_watts())
    }
}

impl Add for Energy {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Energy {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Percentage clamped to `[0, 100]` at construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Percentage(pub f64);

impl Percentage {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }
    pub fn as_percent(&self) -> f64 {
        self.0
    }
    pub fn as_ratio(&self) -> f64 {
        self.0 / 100.0
    }
}

/// The `H`-hour run horizon, anchored to start-of-day in the site timezone.
///
/// Per `spec.md` §9 (DST-aware horizon): the horizon is always `start_of_day(start) + H*1h`,
/// never `start + H*1h`, so DST transition days still produce exactly `H` hourly slots.
#[derive(Debug, Clone, Copy)]
pub struct Horizon {
    /// Number of hourly slots, `H`.
    pub hours: usize,
    /// Start of day (local time, represented as a UTC instant) the horizon begins at.
    pub start_of_day: DateTime<Utc>,
    /// Site timezone, retained as metadata on emitted instructions/plans.
    pub tz: Tz,
    /// `start_time.hour_of_day`: where the *executable* window begins.
    pub start_hour: usize,
}

impl Horizon {
    /// Build a horizon from a run start instant and a site timezone.
    pub fn new(run_start: DateTime<Utc>, tz: Tz, hours: usize) -> Self {
        let local = run_start.with_timezone(&tz);
        let start_hour = local.hour() as usize;
        let local_midnight = tz
            .with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0)
            .single()
            .unwrap_or(local);
        Self {
            hours,
            start_of_day: local_midnight.with_timezone(&Utc),
            tz,
            start_hour,
        }
    }

    /// Absolute timestamp (UTC) for the start of hour `h` (`h` in `[0, H)`).
    pub fn hour_timestamp(&self, h: usize) -> DateTime<Utc> {
        self.start_of_day + ChronoDuration::hours(h as i64)
    }

    /// The executable window: `[start_hour, hours)`.
    pub fn executable_hours(&self) -> std::ops::Range<usize> {
        self.start_hour..self.hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn percentage_clamps() {
        assert_eq!(Percentage::new(150.0).as_percent(), 100.0);
        assert_eq!(Percentage::new(-5.0).as_percent(), 0.0);
    }

    #[test]
    fn horizon_hour_timestamp_is_hourly_spaced() {
        let start = Utc.with_ymd_and_hms(2024, 6, 15, 13, 0, 0).unwrap();
        let horizon = Horizon::new(start, chrono_tz::Europe::Berlin, 48);
        assert_eq!(horizon.hours, 48);
        let h0 = horizon.hour_timestamp(0);
        let h1 = horizon.hour_timestamp(1);
        assert_eq!((h1 - h0).num_seconds(), 3600);
        assert_eq!(h0.hour(), 0);
    }

    #[test]
    fn horizon_start_hour_matches_local_wall_clock() {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 13, 0, 0).unwrap();
        let horizon = Horizon::new(start, chrono_tz::Europe::Berlin, 48);
        // Berlin is UTC+1 in January.
        assert_eq!(horizon.start_hour, 14);
    }
}
