//! Forecast input series consumed by the simulator: PV production, load, and import/export
//! prices, one value per horizon hour.
use crate::error::ForecastError;
use serde::{Deserialize, Serialize};

/// All forecast series the simulator needs for one run, already resolved to `Vec<f64>` of
/// length `horizon_hours` by the [`crate::assembler`] stage — this struct only validates shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub pv_production_w: Vec<f64>,
    pub load_w: Vec<f64>,
    pub price_import_eur_per_wh: Vec<f64>,
    pub price_export_eur_per_wh: Vec<f64>,
    #[serde(default)]
    pub temperature_c: Option<Vec<f64>>,
}

impl ForecastSeries {
    /// Validate that every series has exactly `horizon_hours` finite entries.
    pub fn validate(&self, horizon_hours: usize) -> Result<(), ForecastError> {
        Self::validate_series("pv_production_w", &self.pv_production_w, horizon_hours)?;
        Self::validate_series("load_w", &self.load_w, horizon_hours)?;
        Self::validate_series(
            "price_import_eur_per_wh",
            &self.price_import_eur_per_wh,
            horizon_hours,
        )?;
        Self::validate_series(
            "price_export_eur_per_wh",
            &self.price_export_eur_per_wh,
            horizon_hours,
        )?;
        if let Some(temp) = &self.temperature_c {
            Self::validate_series("temperature_c", temp, horizon_hours)?;
        }
        Ok(())
    }

    fn validate_series(name: &'static str, series: &[f64], expected: usize) -> Result<(), ForecastError> {
        if series.len() != expected {
            return Err(ForecastError::LengthMismatch {
                series: name,
                expected,
                got: series.len(),
            });
        }
        if let Some(index) = series.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite { series: name, index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> ForecastSeries {
        ForecastSeries {
            pv_production_w: vec![0.0; n],
            load_w: vec![500.0; n],
            price_import_eur_per_wh: vec![0.0003; n],
            price_export_eur_per_wh: vec![0.00008; n],
            temperature_c: None,
        }
    }

    #[test]
    fn validate_accepts_matching_lengths() {
        assert!(series(48).validate(48).is_ok());
    }

    #[test]
    fn validate_rejects_length_mismatch() {
        let err = series(24).validate(48).unwrap_err();
        assert!(matches!(err, ForecastError::LengthMismatch { series: "pv_production_w", .. }));
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let mut s = series(4);
        s.load_w[2] = f64::NAN;
        let err = s.validate(4).unwrap_err();
        assert!(matches!(err, ForecastError::NonFinite { series: "load_w", index: 2 }));
    }
}
