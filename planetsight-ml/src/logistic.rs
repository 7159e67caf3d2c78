use serde::{Deserialize, Serialize};

use crate::dataset::Sample;
use crate::error::{ensure_dimension, MlError, MlResult};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 400,
            learning_rate: 0.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn feature_count(&self) -> usize {
        self.weights.len()
    }

    pub fn predict_probability(&self, features: &[f64]) -> MlResult<f64> {
        ensure_dimension(self.weights.len(), features.len())?;
        let probability = sigmoid(self.bias + dot(&self.weights, features));
        if probability.is_nan() {
            return Err(MlError::NonFiniteScore);
        }
        Ok(probability)
    }
}

/// Full-batch gradient descent on standardized samples, starting from zero weights.
pub fn train(samples: &[Sample], settings: TrainingSettings) -> MlResult<LogisticModel> {
    let first = samples.first().ok_or(MlError::EmptyDataset)?;
    let feature_len = first.features.len();
    let mut weights = vec![0.0; feature_len];
    let mut bias = 0.0;

    let step = settings.learning_rate / samples.len() as f64;

    for _ in 0..settings.epochs {
        let mut grad_w = vec![0.0; feature_len];
        let mut grad_b = 0.0;

        for sample in samples {
            ensure_dimension(feature_len, sample.features.len())?;
            let prediction = sigmoid(bias + dot(&weights, &sample.features));
            let error = prediction - sample.target();

            for (grad, value) in grad_w.iter_mut().zip(sample.features.iter()) {
                *grad += error * value;
            }
            grad_b += error;
        }

        for (weight, grad) in weights.iter_mut().zip(grad_w.iter()) {
            *weight -= step * grad;
        }
        bias -= step * grad_b;
    }

    if let Some(index) = weights.iter().position(|weight| !weight.is_finite()) {
        return Err(MlError::NonFiniteStatistic { name: "weight", index });
    }
    if !bias.is_finite() {
        return Err(MlError::NonFiniteStatistic { name: "bias", index: 0 });
    }
    Ok(LogisticModel { weights, bias })
}

/// Plain logistic function; relies on IEEE saturation for very large `|z|`.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub(crate) fn dot(weights: &[f64], features: &[f64]) -> f64 {
    weights
        .iter()
        .zip(features.iter())
        .map(|(w, f)| w * f)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold_samples() -> Vec<Sample> {
        (0..100)
            .map(|i| {
                let x = i as f64 / 100.0 - 0.5;
                Sample::new(vec![x; 3], x > 0.0)
            })
            .collect()
    }

    #[test]
    fn logistic_model_can_fit_simple_data() {
        let dataset = threshold_samples();
        let model = train(&dataset, TrainingSettings::default()).unwrap();
        assert!(model.predict_probability(&dataset[10].features).unwrap() < 0.5);
        assert!(model.predict_probability(&dataset[90].features).unwrap() > 0.5);
    }

    #[test]
    fn training_is_deterministic() {
        let dataset = threshold_samples();
        let first = train(&dataset, TrainingSettings::default()).unwrap();
        let second = train(&dataset, TrainingSettings::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_epochs_leave_model_at_origin() {
        let settings = TrainingSettings {
            epochs: 0,
            ..TrainingSettings::default()
        };
        let model = train(&threshold_samples(), settings).unwrap();
        assert_eq!(model.weights, vec![0.0; 3]);
        assert_eq!(model.bias, 0.0);
        assert_eq!(model.predict_probability(&[1.0, 2.0, 3.0]).unwrap(), 0.5);
    }

    #[test]
    fn single_epoch_matches_hand_computed_step() {
        let samples = vec![Sample::new(vec![1.0], true), Sample::new(vec![-1.0], false)];
        let settings = TrainingSettings {
            epochs: 1,
            learning_rate: 0.5,
        };
        let model = train(&samples, settings).unwrap();
        // a = 0.5 for both rows: grad_w = (-0.5)(1) + (0.5)(-1) = -1, grad_b = 0
        assert!((model.weights[0] - 0.25).abs() < 1e-12);
        assert_eq!(model.bias, 0.0);
    }

    #[test]
    fn train_rejects_empty_input() {
        assert!(matches!(
            train(&[], TrainingSettings::default()),
            Err(MlError::EmptyDataset)
        ));
    }

    #[test]
    fn opposing_infinite_terms_are_rejected() {
        let model = LogisticModel::new(vec![10.0, 10.0, 0.0], 0.0);
        let err = model.predict_probability(&[1e308, -1e308, 0.0]).unwrap_err();
        assert!(matches!(err, MlError::NonFiniteScore));
        assert_eq!(model.predict_probability(&[1e308, 0.0, 0.0]).unwrap(), 1.0);
    }

    #[test]
    fn diverging_training_is_rejected() {
        // the summed gradient overflows on the first epoch
        let samples = vec![Sample::new(vec![f64::MAX], true); 3];
        let err = train(&samples, TrainingSettings::default()).unwrap_err();
        assert!(matches!(err, MlError::NonFiniteStatistic { name: "weight", index: 0 }));
    }

    #[test]
    fn sigmoid_saturates_without_overflow_guard() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
    }
}
