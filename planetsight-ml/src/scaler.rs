use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{ensure_dimension, MlError, MlResult};

/// Per-feature mean and standard deviation learned from training data.
///
/// Standard deviations are never zero: a zero (or NaN) spread is stored as `1.0`,
/// so constant columns pass through centred but unscaled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Scaler {
    /// Fits column statistics using the sample standard deviation (divisor `max(1, n - 1)`).
    pub fn fit(dataset: &Dataset) -> MlResult<Self> {
        if dataset.is_empty() {
            return Err(MlError::EmptyDataset);
        }
        let n = dataset.len();
        let dimension = dataset.dimension();
        let samples = dataset.samples();

        let mut mean = vec![0.0; dimension];
        let mut std = vec![0.0; dimension];
        for j in 0..dimension {
            let sum: f64 = samples.iter().map(|sample| sample.features[j]).sum();
            mean[j] = sum / n as f64;

            let squared: f64 = samples
                .iter()
                .map(|sample| {
                    let delta = sample.features[j] - mean[j];
                    delta * delta
                })
                .sum();
            std[j] = spread_or_unit((squared / n.saturating_sub(1).max(1) as f64).sqrt());

            if !mean[j].is_finite() {
                return Err(MlError::NonFiniteStatistic { name: "mean", index: j });
            }
            if !std[j].is_finite() {
                return Err(MlError::NonFiniteStatistic { name: "std", index: j });
            }
        }

        Ok(Self { mean, std })
    }

    /// Rebuilds a scaler from externally held parameters.
    pub fn from_parts(mean: Vec<f64>, std: Vec<f64>) -> MlResult<Self> {
        ensure_dimension(mean.len(), std.len())?;
        if mean.iter().any(|value| !value.is_finite()) {
            return Err(MlError::InvalidParameters(
                "mean entries must be finite".to_string(),
            ));
        }
        let std = std.into_iter().map(spread_or_unit).collect();
        Ok(Self { mean, std })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn transform(&self, features: &[f64]) -> MlResult<Vec<f64>> {
        ensure_dimension(self.dimension(), features.len())?;
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(value, (mean, std))| (value - mean) / std)
            .collect())
    }
}

fn spread_or_unit(std: f64) -> f64 {
    if std == 0.0 || std.is_nan() {
        1.0
    } else {
        std
    }
}
