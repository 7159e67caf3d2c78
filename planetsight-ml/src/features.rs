use serde::{Deserialize, Serialize};

use crate::error::{MlError, MlResult};

pub const TRANSIT_FEATURE_COUNT: usize = 3;
pub const TRANSIT_FEATURE_NAMES: [&str; TRANSIT_FEATURE_COUNT] =
    ["koi_period", "koi_prad", "koi_depth"];

pub const ANALYZE_FEATURE_COUNT: usize = 4;
pub const ANALYZE_FEATURE_NAMES: [&str; ANALYZE_FEATURE_COUNT] =
    ["koi_prad", "koi_teq", "koi_depth", "koi_duration"];

/// Orbital period (days), planetary radius (Earth radii) and transit depth (ppm).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitFeatures {
    pub koi_period: f64,
    pub koi_prad: f64,
    pub koi_depth: f64,
}

impl TransitFeatures {
    pub fn new(koi_period: f64, koi_prad: f64, koi_depth: f64) -> MlResult<Self> {
        ensure_finite(&[koi_period, koi_prad, koi_depth])?;
        Ok(Self {
            koi_period,
            koi_prad,
            koi_depth,
        })
    }

    pub fn to_vector(&self) -> [f64; TRANSIT_FEATURE_COUNT] {
        [self.koi_period, self.koi_prad, self.koi_depth]
    }
}

/// Inputs accepted by the analyze endpoint. Order matches [`ANALYZE_FEATURE_NAMES`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeFeatures {
    pub koi_prad: f64,
    pub koi_teq: f64,
    pub koi_depth: f64,
    pub koi_duration: f64,
}

impl AnalyzeFeatures {
    pub fn new(koi_prad: f64, koi_teq: f64, koi_depth: f64, koi_duration: f64) -> MlResult<Self> {
        ensure_finite(&[koi_prad, koi_teq, koi_depth, koi_duration])?;
        Ok(Self {
            koi_prad,
            koi_teq,
            koi_depth,
            koi_duration,
        })
    }

    pub fn to_vector(&self) -> [f64; ANALYZE_FEATURE_COUNT] {
        [self.koi_prad, self.koi_teq, self.koi_depth, self.koi_duration]
    }
}

/// Returns the index of the first non-finite value as an error.
pub fn ensure_finite(values: &[f64]) -> MlResult<()> {
    match values.iter().position(|value| !value.is_finite()) {
        Some(index) => Err(MlError::NonFiniteFeature { index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transit_features_reject_non_finite_values() {
        let err = TransitFeatures::new(1.0, f64::NAN, 3.0).unwrap_err();
        assert!(matches!(err, MlError::NonFiniteFeature { index: 1 }));
        assert!(TransitFeatures::new(1.0, 2.0, f64::INFINITY).is_err());
    }

    #[test]
    fn vectors_follow_positional_order() {
        let transit = TransitFeatures::new(10.5, 1.2, 250.0).unwrap();
        assert_eq!(transit.to_vector(), [10.5, 1.2, 250.0]);

        let analyze = AnalyzeFeatures::new(1.2, 500.0, 200.0, 5.0).unwrap();
        assert_eq!(analyze.to_vector(), [1.2, 500.0, 200.0, 5.0]);
    }
}
