pub mod dataset;
pub mod error;
pub mod features;
pub mod logistic;
pub mod predictor;
pub mod scaler;

pub use dataset::{CsvColumns, Dataset, Sample};
pub use error::{MlError, MlResult};
pub use features::{AnalyzeFeatures, TransitFeatures, TRANSIT_FEATURE_COUNT, TRANSIT_FEATURE_NAMES};
pub use logistic::{LogisticModel, TrainingSettings};
pub use predictor::{ModelMetadata, Prediction, PredictionSettings, TransitPredictor};
pub use scaler::Scaler;
