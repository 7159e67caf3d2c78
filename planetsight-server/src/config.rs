use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use planetsight_ml::{CsvColumns, TrainingSettings};
use serde::Deserialize;

/// Which train/predict contract is mounted at `/api/train` and `/api/predict`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// The server trains and keeps the model in memory.
    #[default]
    Stateful,
    /// Clients carry the model parameters; the server keeps nothing.
    Stateless,
}

impl ApiMode {
    /// Epoch count used when `[training].epochs` is left unset.
    pub fn default_epochs(self) -> usize {
        match self {
            ApiMode::Stateful => TrainingSettings::default().epochs,
            ApiMode::Stateless => 250,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub mode: ApiMode,
    pub dataset: DatasetSection,
    pub training: TrainingSection,
    pub analyzer: AnalyzerSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            mode: ApiMode::default(),
            dataset: DatasetSection::default(),
            training: TrainingSection::default(),
            analyzer: AnalyzerSection::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        toml::from_str(&content).context("parse TOML configuration")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.training.epochs != Some(0), "training.epochs must be positive");
        ensure!(
            self.training.learning_rate > 0.0 && self.training.learning_rate.is_finite(),
            "training.learning_rate must be a positive number"
        );
        ensure!(self.dataset.min_samples >= 1, "dataset.min_samples must be at least 1");
        ensure!(
            !self.dataset.feature_columns.is_empty(),
            "dataset.feature_columns must name at least one column"
        );
        if let AnalyzerSection::Command {
            program,
            max_workers,
            timeout_ms,
            ..
        } = &self.analyzer
        {
            ensure!(!program.is_empty(), "analyzer.program must not be empty");
            ensure!(*max_workers >= 1, "analyzer.max_workers must be at least 1");
            ensure!(*timeout_ms > 0, "analyzer.timeout_ms must be positive");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatasetSource {
    File { path: PathBuf },
    Url { url: String },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatasetSection {
    pub source: DatasetSource,
    pub feature_columns: Vec<String>,
    pub label_column: String,
    pub min_samples: usize,
}

impl Default for DatasetSection {
    fn default() -> Self {
        let columns = CsvColumns::default();
        Self {
            source: DatasetSource::File {
                path: PathBuf::from("data/sample_koi.csv"),
            },
            feature_columns: columns.features,
            label_column: columns.label,
            min_samples: 10,
        }
    }
}

impl DatasetSection {
    pub fn columns(&self) -> CsvColumns {
        CsvColumns {
            features: self.feature_columns.clone(),
            label: self.label_column.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    /// Unset means the mounted mode's default (400 stateful, 250 stateless).
    pub epochs: Option<usize>,
    pub learning_rate: f64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            epochs: None,
            learning_rate: TrainingSettings::default().learning_rate,
        }
    }
}

impl TrainingSection {
    pub fn to_training_settings(self, mode: ApiMode) -> TrainingSettings {
        TrainingSettings {
            epochs: self.epochs.unwrap_or_else(|| mode.default_epochs()),
            learning_rate: self.learning_rate,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnalyzerSection {
    #[default]
    Disabled,
    Fallback,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_max_workers")]
        max_workers: usize,
    },
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_workers() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.mode, ApiMode::Stateful);
        assert_eq!(config.dataset.min_samples, 10);
        assert_eq!(config.training.epochs, None);
        assert_eq!(config.training.to_training_settings(config.mode).epochs, 400);
        assert_eq!(config.analyzer, AnalyzerSection::Disabled);
        assert_eq!(config.dataset.columns(), CsvColumns::default());
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_configuration() {
        let config: ServerConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:8080"
            mode = "stateless"

            [dataset]
            source = { kind = "url", url = "http://localhost:3000/data/sample_koi.csv" }
            min_samples = 3

            [training]
            learning_rate = 0.1

            [analyzer]
            kind = "command"
            program = "python3"
            args = ["analyze.py"]
            "#,
        )
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.mode, ApiMode::Stateless);
        assert!(matches!(config.dataset.source, DatasetSource::Url { .. }));
        assert_eq!(config.training.epochs, None);
        assert_eq!(
            config.training.to_training_settings(config.mode),
            TrainingSettings {
                epochs: 250,
                learning_rate: 0.1,
            }
        );
        assert_eq!(
            config.analyzer,
            AnalyzerSection::Command {
                program: "python3".to_string(),
                args: vec!["analyze.py".to_string()],
                timeout_ms: 10_000,
                max_workers: 2,
            }
        );
    }

    #[test]
    fn explicit_epochs_override_either_mode() {
        let config: ServerConfig = toml::from_str(
            r#"
            mode = "stateless"
            [training]
            epochs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.training.to_training_settings(ApiMode::Stateless).epochs, 600);
        assert_eq!(config.training.to_training_settings(ApiMode::Stateful).epochs, 600);
    }

    #[test]
    fn validate_rejects_bad_training_values() {
        let mut config = ServerConfig::default();
        config.training.learning_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.training.epochs = Some(0);
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.analyzer = AnalyzerSection::Command {
            program: "sh".to_string(),
            args: Vec::new(),
            timeout_ms: 100,
            max_workers: 0,
        };
        assert!(config.validate().is_err());
    }
}
