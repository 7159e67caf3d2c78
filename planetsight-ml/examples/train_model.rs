use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use log::info;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;

use planetsight_ml::dataset::{load_csv, shuffle_split, CsvColumns, Dataset, Sample};
use planetsight_ml::logistic::TrainingSettings;
use planetsight_ml::predictor::TransitPredictor;

fn main() -> Result<()> {
    let _ = env_logger::builder().format_timestamp_millis().try_init();

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/train_model.toml"));
    let config = load_config(&config_path)?;
    config.training.validate()?;

    info!("starting training run using {}", config_path.display());

    let RunConfig { dataset, training } = config;

    let columns = dataset.columns();
    let data = load_csv(&dataset.path, &columns)
        .with_context(|| format!("load dataset {}", dataset.path.display()))?;
    ensure!(!data.is_empty(), "dataset {} has no usable rows", dataset.path.display());
    info!("collected {} samples", data.len());

    let settings = training.to_training_settings();
    let cv_scores = k_fold_cross_validation(
        data.samples(),
        settings,
        training.k_folds,
        training.cross_validation_seed,
    )?;
    match spread(&cv_scores) {
        Some((centre, deviation)) => info!(
            "{}-fold cross-validation accuracy {:.4} +/- {:.4}",
            cv_scores.len(),
            centre,
            deviation
        ),
        None => info!("cross-validation skipped (insufficient samples)"),
    }

    let (train_set, test_set) =
        shuffle_split(data.into_samples(), training.test_ratio, training.cross_validation_seed)?;
    info!(
        "training with {} samples, testing on {} samples",
        train_set.len(),
        test_set.len()
    );

    let predictor = TransitPredictor::fit(&Dataset::new(train_set)?, settings)?
        .with_threshold(training.probability_threshold);
    let counts = Confusion::tally(&predictor, &test_set)?;
    info!(
        "test precision {:.4}, recall {:.4} @ threshold {:.3} ({:?})",
        counts.precision(),
        counts.recall(),
        predictor.settings().probability_threshold,
        counts
    );

    let parameters = serde_json::json!({
        "model": { "w": predictor.model().weights, "b": predictor.model().bias },
        "mean": predictor.scaler().mean(),
        "std": predictor.scaler().std(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&parameters).context("serialize model parameters")?
    );

    Ok(())
}

fn load_config(path: &Path) -> Result<RunConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read config at {}", path.display()))?;
    toml::from_str(&content).context("parse TOML configuration")
}

fn k_fold_cross_validation(
    samples: &[Sample],
    settings: TrainingSettings,
    k: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    if k < 2 || samples.len() < k {
        return Ok(Vec::new());
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut shuffled = samples.to_vec();
    shuffled.shuffle(&mut rng);

    let fold_size = (shuffled.len() + k - 1) / k;
    let mut accuracies = Vec::with_capacity(k);

    for fold in 0..k {
        let start = fold * fold_size;
        if start >= shuffled.len() {
            break;
        }
        let end = ((fold + 1) * fold_size).min(shuffled.len());
        let test_slice = &shuffled[start..end];
        let mut train_data = Vec::with_capacity(shuffled.len() - test_slice.len());
        train_data.extend_from_slice(&shuffled[..start]);
        train_data.extend_from_slice(&shuffled[end..]);
        if train_data.is_empty() || test_slice.is_empty() {
            continue;
        }

        let predictor = TransitPredictor::fit(&Dataset::new(train_data)?, settings)?;
        accuracies.push(classification_accuracy(&predictor, test_slice)?);
    }

    Ok(accuracies)
}

fn classification_accuracy(predictor: &TransitPredictor, data: &[Sample]) -> Result<f64> {
    let counts = Confusion::tally(predictor, data)?;
    Ok((counts.hits + counts.correct_rejections) as f64 / data.len() as f64)
}

/// Population mean and deviation of the fold scores; `None` when no fold ran.
fn spread(scores: &[f64]) -> Option<(f64, f64)> {
    if scores.is_empty() {
        return None;
    }
    let n = scores.len() as f64;
    let centre = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|score| (score - centre).powi(2)).sum::<f64>() / n;
    Some((centre, variance.sqrt()))
}

/// Planet/non-planet outcome counts over a held-out set.
#[derive(Debug, Default)]
struct Confusion {
    hits: usize,
    false_alarms: usize,
    misses: usize,
    correct_rejections: usize,
}

impl Confusion {
    fn tally(predictor: &TransitPredictor, data: &[Sample]) -> Result<Self> {
        let mut counts = Self::default();
        for sample in data {
            let slot = match (predictor.predict_raw(&sample.features)?.is_planet(), sample.label) {
                (true, true) => &mut counts.hits,
                (true, false) => &mut counts.false_alarms,
                (false, true) => &mut counts.misses,
                (false, false) => &mut counts.correct_rejections,
            };
            *slot += 1;
        }
        Ok(counts)
    }

    // An empty denominator counts as perfect.
    fn precision(&self) -> f64 {
        ratio(self.hits, self.hits + self.false_alarms)
    }

    fn recall(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        1.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Deserialize)]
struct RunConfig {
    dataset: DatasetSection,
    #[serde(default)]
    training: TrainingSection,
}

#[derive(Debug, Deserialize)]
struct DatasetSection {
    path: PathBuf,
    #[serde(default)]
    feature_columns: Option<Vec<String>>,
    #[serde(default)]
    label_column: Option<String>,
}

impl DatasetSection {
    fn columns(&self) -> CsvColumns {
        let defaults = CsvColumns::default();
        CsvColumns {
            features: self.feature_columns.clone().unwrap_or(defaults.features),
            label: self.label_column.clone().unwrap_or(defaults.label),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TrainingSection {
    epochs: usize,
    learning_rate: f64,
    test_ratio: f64,
    probability_threshold: f64,
    k_folds: usize,
    cross_validation_seed: u64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        let settings = TrainingSettings::default();
        Self {
            epochs: settings.epochs,
            learning_rate: settings.learning_rate,
            test_ratio: 0.2,
            probability_threshold: 0.5,
            k_folds: 5,
            cross_validation_seed: 0xABCD,
        }
    }
}

impl TrainingSection {
    fn to_training_settings(&self) -> TrainingSettings {
        TrainingSettings {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..1.0).contains(&self.test_ratio),
            "test_ratio must be between 0 and 1 (exclusive)"
        );
        ensure!(self.k_folds >= 2, "k_folds must be at least 2");
        ensure!(self.learning_rate > 0.0, "learning_rate must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.probability_threshold),
            "probability_threshold must be within [0, 1]"
        );
        Ok(())
    }
}
