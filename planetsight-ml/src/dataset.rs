use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{MlError, MlResult};
use crate::features::TRANSIT_FEATURE_NAMES;
use crate::scaler::Scaler;

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub features: Vec<f64>,
    pub label: bool,
}

impl Sample {
    pub fn new(features: Vec<f64>, label: bool) -> Self {
        Self { features, label }
    }

    pub fn target(&self) -> f64 {
        if self.label {
            1.0
        } else {
            0.0
        }
    }
}

/// Labelled feature rows sharing a single dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    samples: Vec<Sample>,
    dimension: usize,
}

impl Dataset {
    /// Builds a dataset, rejecting rows whose length differs from the first row.
    pub fn new(samples: Vec<Sample>) -> MlResult<Self> {
        let dimension = samples.first().map_or(0, |sample| sample.features.len());
        for sample in &samples {
            if sample.features.len() != dimension {
                return Err(MlError::DimensionMismatch {
                    expected: dimension,
                    found: sample.features.len(),
                });
            }
        }
        Ok(Self { samples, dimension })
    }

    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<bool>) -> MlResult<Self> {
        if rows.len() != labels.len() {
            return Err(MlError::DimensionMismatch {
                expected: rows.len(),
                found: labels.len(),
            });
        }
        Self::new(
            rows.into_iter()
                .zip(labels)
                .map(|(features, label)| Sample::new(features, label))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Returns a copy with every row passed through `scaler`.
    pub fn standardize(&self, scaler: &Scaler) -> MlResult<Dataset> {
        let samples = self
            .samples
            .iter()
            .map(|sample| {
                Ok(Sample {
                    features: scaler.transform(&sample.features)?,
                    label: sample.label,
                })
            })
            .collect::<MlResult<Vec<_>>>()?;
        Ok(Dataset {
            samples,
            dimension: scaler.dimension(),
        })
    }
}

/// Header names used to pull features and labels out of a CSV file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvColumns {
    pub features: Vec<String>,
    pub label: String,
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            features: TRANSIT_FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            label: "planet_candidate".to_string(),
        }
    }
}

pub fn load_csv(path: &Path, columns: &CsvColumns) -> MlResult<Dataset> {
    let file = File::open(path).map_err(|source| MlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv(file, columns)
}

/// Parses a headed CSV, silently dropping rows with non-finite features or a label outside {0, 1}.
pub fn read_csv<R: Read>(reader: R, columns: &CsvColumns) -> MlResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| MlError::MissingColumn(name.to_string()))
    };
    let feature_idx = columns
        .features
        .iter()
        .map(|name| position(name))
        .collect::<MlResult<Vec<_>>>()?;
    let label_idx = position(&columns.label)?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for (row_no, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                debug!(target: "planetsight_ml::dataset", "skipping row {}: {}", row_no, err);
                skipped += 1;
                continue;
            }
        };

        let features: Option<Vec<f64>> = feature_idx
            .iter()
            .map(|&idx| record.get(idx).and_then(parse_finite))
            .collect();
        let label = record.get(label_idx).and_then(parse_label);

        match (features, label) {
            (Some(features), Some(label)) => samples.push(Sample { features, label }),
            _ => {
                debug!(target: "planetsight_ml::dataset", "skipping unparsable row {}", row_no);
                skipped += 1;
            }
        }
    }

    debug!(
        target: "planetsight_ml::dataset",
        "loaded {} samples ({} skipped)",
        samples.len(),
        skipped
    );
    Dataset::new(samples)
}

fn parse_finite(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_label(field: &str) -> Option<bool> {
    match field.parse::<i64>().ok()? {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

/// Seeded shuffle, then holds out the last `test_ratio` share of rows.
///
/// At least one row always stays on the training side.
pub fn shuffle_split(
    mut samples: Vec<Sample>,
    test_ratio: f64,
    seed: u64,
) -> MlResult<(Vec<Sample>, Vec<Sample>)> {
    if !(0.0..1.0).contains(&test_ratio) {
        return Err(MlError::InvalidParameters(format!(
            "test ratio {test_ratio} is outside [0, 1)"
        )));
    }
    samples.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));
    let held_out = ((samples.len() as f64 * test_ratio).round() as usize)
        .min(samples.len().saturating_sub(1));
    let keep = samples.len() - held_out;
    let test = samples.split_off(keep);
    Ok((samples, test))
}
