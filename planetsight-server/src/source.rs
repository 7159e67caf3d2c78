//! Dataset retrieval from a local file or a static CSV served over HTTP.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use log::info;
use planetsight_ml::dataset::{load_csv, read_csv};
use planetsight_ml::{CsvColumns, Dataset, MlError};
use thiserror::Error;

use crate::config::DatasetSource;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_DATASET_BYTES: usize = 32 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error(transparent)]
    Dataset(#[from] MlError),
}

fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

/// Loads the dataset synchronously; call from a blocking context.
pub fn load_dataset(source: &DatasetSource, columns: &CsvColumns) -> Result<Dataset, SourceError> {
    match source {
        DatasetSource::File { path } => {
            info!(target: "planetsight_server::source", "Loading dataset from {}", path.display());
            Ok(load_csv(path, columns)?)
        }
        DatasetSource::Url { url } => {
            info!(target: "planetsight_server::source", "Fetching dataset from {}", url);
            let bytes = fetch(url).map_err(|message| SourceError::Fetch {
                url: url.clone(),
                message,
            })?;
            Ok(read_csv(bytes.as_slice(), columns)?)
        }
    }
}

fn fetch(url: &str) -> Result<Vec<u8>, String> {
    let response = agent().get(url).call().map_err(|err| err.to_string())?;
    read_limited(response.into_reader(), MAX_DATASET_BYTES).map_err(|err| err.to_string())
}

fn read_limited(reader: impl Read, max_bytes: usize) -> io::Result<Vec<u8>> {
    let mut limited = reader.take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("response exceeded {max_bytes} bytes"),
        ));
    }
    Ok(bytes)
}
