use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the standardization, training and prediction pipeline.
#[derive(Error, Debug)]
pub enum MlError {
    #[error("failed to read dataset at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset is missing column `{0}`")]
    MissingColumn(String),
    #[error("dataset contains no usable samples")]
    EmptyDataset,
    #[error("expected {expected} features but found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("feature {index} is not a finite number")]
    NonFiniteFeature { index: usize },
    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),
    #[error("{name} {index} overflowed to a non-finite value")]
    NonFiniteStatistic { name: &'static str, index: usize },
    #[error("score is not a finite number")]
    NonFiniteScore,
}

pub type MlResult<T> = Result<T, MlError>;

pub(crate) fn ensure_dimension(expected: usize, found: usize) -> MlResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(MlError::DimensionMismatch { expected, found })
    }
}
