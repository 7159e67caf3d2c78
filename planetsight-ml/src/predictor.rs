use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{MlError, MlResult};
use crate::logistic::{train, LogisticModel, TrainingSettings};
use crate::scaler::Scaler;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionSettings {
    pub probability_threshold: f64,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            probability_threshold: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub probability: f64,
    pub label: bool,
}

impl Prediction {
    pub fn is_planet(&self) -> bool {
        self.label
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub trained_at: String,
    pub features: Vec<String>,
    pub samples: usize,
}

/// Scores an already standardized vector with the default 0.5 threshold.
pub fn predict(model: &LogisticModel, standardized: &[f64]) -> MlResult<Prediction> {
    predict_with(model, standardized, PredictionSettings::default())
}

fn predict_with(
    model: &LogisticModel,
    standardized: &[f64],
    settings: PredictionSettings,
) -> MlResult<Prediction> {
    let probability = model.predict_probability(standardized)?;
    Ok(Prediction {
        probability,
        label: probability >= settings.probability_threshold,
    })
}

/// A scaler and model fitted together, applied as one unit at inference time.
#[derive(Clone, Debug)]
pub struct TransitPredictor {
    scaler: Scaler,
    model: LogisticModel,
    metadata: Option<ModelMetadata>,
    settings: PredictionSettings,
}

impl TransitPredictor {
    pub fn new(scaler: Scaler, model: LogisticModel) -> MlResult<Self> {
        if scaler.dimension() != model.feature_count() {
            return Err(MlError::DimensionMismatch {
                expected: model.feature_count(),
                found: scaler.dimension(),
            });
        }
        Ok(Self {
            scaler,
            model,
            metadata: None,
            settings: PredictionSettings::default(),
        })
    }

    /// Fits the scaler, standardizes the dataset and trains the model on it.
    pub fn fit(dataset: &Dataset, settings: TrainingSettings) -> MlResult<Self> {
        let scaler = Scaler::fit(dataset)?;
        let standardized = dataset.standardize(&scaler)?;
        debug!(
            target: "planetsight_ml::predictor",
            "Training on {} standardized samples (epochs={}, learning_rate={})",
            standardized.len(),
            settings.epochs,
            settings.learning_rate
        );
        let model = train(standardized.samples(), settings)?;
        Self::new(scaler, model)
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_threshold(mut self, probability_threshold: f64) -> Self {
        self.settings.probability_threshold = probability_threshold;
        self
    }

    pub fn settings(&self) -> PredictionSettings {
        self.settings
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn model(&self) -> &LogisticModel {
        &self.model
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    pub fn predict_standardized(&self, standardized: &[f64]) -> MlResult<Prediction> {
        predict_with(&self.model, standardized, self.settings)
    }

    /// Standardizes raw features with the training scaler before scoring.
    pub fn predict_raw(&self, features: &[f64]) -> MlResult<Prediction> {
        let standardized = self.scaler.transform(features)?;
        let prediction = self.predict_standardized(&standardized)?;
        trace!(
            target: "planetsight_ml::predictor",
            "features={:?} standardized={:?} probability={:.4}",
            features,
            standardized,
            prediction.probability
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;

    fn separable_dataset() -> Dataset {
        let samples = (0..10)
            .map(|i| {
                let planet = i % 2 == 1;
                let offset = i as f64 * 0.01;
                let features = if planet {
                    vec![10.0 + offset, 2.0 + offset, 300.0 + offset]
                } else {
                    vec![1.0 + offset, 1.0 + offset, 100.0 + offset]
                };
                Sample::new(features, planet)
            })
            .collect();
        Dataset::new(samples).unwrap()
    }

    #[test]
    fn end_to_end_separates_class_means() {
        let predictor = TransitPredictor::fit(&separable_dataset(), TrainingSettings::default()).unwrap();

        let planet = predictor.predict_raw(&[10.0, 2.0, 300.0]).unwrap();
        assert!(planet.is_planet());
        assert!(planet.probability > 0.5);

        let false_positive = predictor.predict_raw(&[1.0, 1.0, 100.0]).unwrap();
        assert!(!false_positive.is_planet());
        assert!(false_positive.probability < 0.5);
    }

    #[test]
    fn predict_rejects_dimension_mismatch() {
        let model = LogisticModel::new(vec![1.0, 2.0, 3.0], 0.0);
        assert!(matches!(
            predict(&model, &[1.0]),
            Err(MlError::DimensionMismatch {
                expected: 3,
                found: 1
            })
        ));
    }

    #[test]
    fn label_uses_inclusive_threshold() {
        let model = LogisticModel::new(vec![0.0], 0.0);
        let prediction = predict(&model, &[42.0]).unwrap();
        assert_eq!(prediction.probability, 0.5);
        assert!(prediction.label);
    }

    #[test]
    fn new_rejects_mismatched_parts() {
        let scaler = Scaler::from_parts(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let model = LogisticModel::new(vec![1.0, 1.0, 1.0], 0.0);
        assert!(TransitPredictor::new(scaler, model).is_err());
    }

    #[test]
    fn fit_rejects_columns_that_overflow_statistics() {
        let samples = (0..10)
            .map(|i| Sample::new(vec![1.7e308, i as f64, 100.0], i % 2 == 0))
            .collect();
        let err = TransitPredictor::fit(&Dataset::new(samples).unwrap(), TrainingSettings::default())
            .unwrap_err();
        assert!(matches!(err, MlError::NonFiniteStatistic { name: "mean", index: 0 }));
    }

    #[test]
    fn predict_raw_rejects_undefined_scores() {
        let scaler = Scaler::from_parts(vec![0.0; 3], vec![1.0; 3]).unwrap();
        let predictor = TransitPredictor::new(scaler, LogisticModel::new(vec![10.0, 10.0, 0.0], 0.0)).unwrap();
        let err = predictor.predict_raw(&[1e308, -1e308, 0.0]).unwrap_err();
        assert!(matches!(err, MlError::NonFiniteScore));
    }

    #[test]
    fn fit_propagates_empty_dataset() {
        let err = TransitPredictor::fit(&Dataset::default(), TrainingSettings::default()).unwrap_err();
        assert!(matches!(err, MlError::EmptyDataset));
    }
}
