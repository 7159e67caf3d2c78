use std::sync::{Arc, PoisonError, RwLock};

use planetsight_ml::{CsvColumns, TrainingSettings, TransitPredictor};

use crate::analyzer::{self, TransitAnalyzer};
use crate::config::{ApiMode, DatasetSource, ServerConfig};

/// Holds the most recently trained predictor; replacing it is a single pointer swap.
#[derive(Clone, Default)]
pub struct ModelStore {
    current: Arc<RwLock<Option<Arc<TransitPredictor>>>>,
}

impl ModelStore {
    pub fn current(&self) -> Option<Arc<TransitPredictor>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, predictor: TransitPredictor) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(predictor));
    }

    pub fn is_trained(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub mode: ApiMode,
    pub source: DatasetSource,
    pub columns: CsvColumns,
    pub min_samples: usize,
    pub training: TrainingSettings,
}

impl From<&ServerConfig> for ServiceSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            mode: config.mode,
            source: config.dataset.source.clone(),
            columns: config.dataset.columns(),
            min_samples: config.dataset.min_samples,
            training: config.training.to_training_settings(config.mode),
        }
    }
}

/// Shared handle passed to every route.
#[derive(Clone)]
pub struct AppState {
    pub models: ModelStore,
    pub settings: Arc<ServiceSettings>,
    pub analyzer: Arc<dyn TransitAnalyzer>,
}

impl AppState {
    pub fn new(settings: ServiceSettings, analyzer: Arc<dyn TransitAnalyzer>) -> Self {
        Self {
            models: ModelStore::default(),
            settings: Arc::new(settings),
            analyzer,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(ServiceSettings::from(config), analyzer::from_config(&config.analyzer))
    }
}

#[cfg(test)]
mod tests {
    use planetsight_ml::{LogisticModel, Scaler};

    use super::*;

    fn predictor(bias: f64) -> TransitPredictor {
        let scaler = Scaler::from_parts(vec![0.0], vec![1.0]).unwrap();
        TransitPredictor::new(scaler, LogisticModel::new(vec![1.0], bias)).unwrap()
    }

    #[test]
    fn replace_swaps_whole_predictor() {
        let store = ModelStore::default();
        assert!(!store.is_trained());
        assert!(store.current().is_none());

        store.replace(predictor(1.0));
        let held = store.current().unwrap();
        store.replace(predictor(-1.0));

        assert_eq!(held.model().bias, 1.0);
        assert_eq!(store.current().unwrap().model().bias, -1.0);
    }

    #[test]
    fn clones_share_the_same_store() {
        let store = ModelStore::default();
        let other = store.clone();
        other.replace(predictor(0.0));
        assert!(store.is_trained());
    }

    #[test]
    fn stateless_mode_trains_with_fewer_default_epochs() {
        let mut config = ServerConfig::default();
        assert_eq!(ServiceSettings::from(&config).training.epochs, 400);
        config.mode = ApiMode::Stateless;
        assert_eq!(ServiceSettings::from(&config).training.epochs, 250);
    }

    #[test]
    fn separate_states_are_isolated() {
        let config = ServerConfig::default();
        let first = AppState::from_config(&config);
        let second = AppState::from_config(&config);
        first.models.replace(predictor(0.0));
        assert!(!second.models.is_trained());
    }
}
