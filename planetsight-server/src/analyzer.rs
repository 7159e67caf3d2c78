//! Strategies that turn the four analyze features into a three-way disposition.
//!
//! The external model is treated as a single `analyze(features) -> outcome`
//! capability; [`CommandAnalyzer`] bounds how many collaborator processes may
//! run at once instead of spawning one per request without limit.

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use planetsight_ml::AnalyzeFeatures;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::AnalyzerSection;

const RESULT_START: &str = "RESULT_START";
const RESULT_END: &str = "RESULT_END";
const ERROR_START: &str = "ERROR_START";
const ERROR_END: &str = "ERROR_END";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Disposition {
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "CANDIDATE")]
    Candidate,
    #[serde(rename = "FALSE POSITIVE")]
    FalsePositive,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClassProbabilities {
    pub confirmed: f64,
    pub candidate: f64,
    pub false_positive: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub prediction: Disposition,
    pub confidence: f64,
    pub probabilities: ClassProbabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Any further keys the collaborator reports, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Analyzer unavailable")]
    Unavailable,
    #[error("Failed to execute analyzer")]
    Spawn(#[source] io::Error),
    #[error("Analyzer execution failed")]
    Failed { details: String },
    #[error("Model execution failed")]
    Model { details: String },
    #[error("Analyzer timed out")]
    Timeout(Duration),
    #[error("Could not parse model output")]
    Unparsable { details: String },
}

impl AnalyzerError {
    /// Diagnostic text returned to the caller alongside the error.
    pub fn details(&self) -> String {
        match self {
            AnalyzerError::Unavailable => "no analyzer is configured for this server".to_string(),
            AnalyzerError::Spawn(err) => err.to_string(),
            AnalyzerError::Failed { details }
            | AnalyzerError::Model { details }
            | AnalyzerError::Unparsable { details } => details.clone(),
            AnalyzerError::Timeout(limit) => {
                format!("analyzer did not finish within {} ms", limit.as_millis())
            }
        }
    }
}

#[async_trait]
pub trait TransitAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, features: &AnalyzeFeatures) -> Result<AnalysisOutcome, AnalyzerError>;
}

pub fn from_config(section: &AnalyzerSection) -> Arc<dyn TransitAnalyzer> {
    match section {
        AnalyzerSection::Disabled => Arc::new(UnavailableAnalyzer),
        AnalyzerSection::Fallback => Arc::new(FallbackAnalyzer),
        AnalyzerSection::Command {
            program,
            args,
            timeout_ms,
            max_workers,
        } => Arc::new(CommandAnalyzer::new(
            program.clone(),
            args.clone(),
            Duration::from_millis(*timeout_ms),
            *max_workers,
        )),
    }
}

pub struct UnavailableAnalyzer;

#[async_trait]
impl TransitAnalyzer for UnavailableAnalyzer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn analyze(&self, _features: &AnalyzeFeatures) -> Result<AnalysisOutcome, AnalyzerError> {
        Err(AnalyzerError::Unavailable)
    }
}

/// Neutral answer used when no trained three-class model is available.
pub struct FallbackAnalyzer;

#[async_trait]
impl TransitAnalyzer for FallbackAnalyzer {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn analyze(&self, _features: &AnalyzeFeatures) -> Result<AnalysisOutcome, AnalyzerError> {
        Ok(AnalysisOutcome {
            prediction: Disposition::Candidate,
            confidence: 0.5,
            probabilities: ClassProbabilities {
                confirmed: 0.33,
                candidate: 0.34,
                false_positive: 0.33,
            },
            note: Some("Using fallback prediction - model not available".to_string()),
            extra: Map::new(),
        })
    }
}

/// Runs an external program per request, feeding the features as JSON on stdin.
///
/// The program answers on stdout, either with a bare JSON outcome or with the
/// outcome wrapped in `RESULT_START`/`RESULT_END` lines; text wrapped in
/// `ERROR_START`/`ERROR_END` reports a model failure.
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    workers: Semaphore,
}

impl CommandAnalyzer {
    pub fn new(program: String, args: Vec<String>, timeout: Duration, max_workers: usize) -> Self {
        Self {
            program,
            args,
            timeout,
            workers: Semaphore::new(max_workers.max(1)),
        }
    }
}

#[async_trait]
impl TransitAnalyzer for CommandAnalyzer {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn analyze(&self, features: &AnalyzeFeatures) -> Result<AnalysisOutcome, AnalyzerError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| AnalyzerError::Unavailable)?;

        let payload = serde_json::to_vec(features).map_err(|err| AnalyzerError::Failed {
            details: err.to_string(),
        })?;

        debug!(
            target: "planetsight_server::analyzer",
            "Running {} {:?} for {:?}",
            self.program,
            self.args,
            features
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AnalyzerError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&payload).await {
                if err.kind() != io::ErrorKind::BrokenPipe {
                    return Err(AnalyzerError::Spawn(err));
                }
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalyzerError::Timeout(self.timeout))?
            .map_err(AnalyzerError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                target: "planetsight_server::analyzer",
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr
            );
            let details = if stderr.is_empty() {
                format!("process exited with {}", output.status)
            } else {
                stderr
            };
            return Err(AnalyzerError::Failed { details });
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_output(stdout: &str) -> Result<AnalysisOutcome, AnalyzerError> {
    if let Some(message) = between(stdout, ERROR_START, ERROR_END) {
        return Err(AnalyzerError::Model {
            details: message.to_string(),
        });
    }
    let payload = between(stdout, RESULT_START, RESULT_END).unwrap_or_else(|| stdout.trim());
    serde_json::from_str(payload).map_err(|err| AnalyzerError::Unparsable {
        details: format!("{err}; output: {}", stdout.trim()),
    })
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let begin = text.find(start)? + start.len();
    let len = text[begin..].find(end)?;
    Some(text[begin..begin + len].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTCOME: &str = r#"{"prediction":"FALSE POSITIVE","confidence":0.8,"probabilities":{"confirmed":0.05,"candidate":0.15,"false_positive":0.8}}"#;

    fn features() -> AnalyzeFeatures {
        AnalyzeFeatures::new(1.2, 500.0, 200.0, 5.0).unwrap()
    }

    #[test]
    fn parses_marked_result() {
        let stdout = format!("warming up\nRESULT_START\n{OUTCOME}\nRESULT_END\n");
        let outcome = parse_output(&stdout).unwrap();
        assert_eq!(outcome.prediction, Disposition::FalsePositive);
        assert_eq!(outcome.probabilities.false_positive, 0.8);
        assert!(outcome.note.is_none());
        assert!(outcome.extra.is_empty());
    }

    #[test]
    fn unknown_collaborator_keys_are_passed_through() {
        let stdout = r#"{"prediction":"CONFIRMED","confidence":0.9,"probabilities":{"confirmed":0.9,"candidate":0.05,"false_positive":0.05},"model_version":"v3","feature_importance":{"koi_prad":0.4}}"#;
        let outcome = parse_output(stdout).unwrap();
        assert_eq!(outcome.extra["model_version"], Value::from("v3"));

        let echoed = serde_json::to_value(&outcome).unwrap();
        assert_eq!(echoed["model_version"], Value::from("v3"));
        assert_eq!(echoed["feature_importance"]["koi_prad"], Value::from(0.4));
        assert_eq!(echoed["prediction"], Value::from("CONFIRMED"));
        assert!(echoed.get("extra").is_none());
    }

    #[test]
    fn parses_bare_json_result() {
        let outcome = parse_output(OUTCOME).unwrap();
        assert_eq!(outcome.confidence, 0.8);
    }

    #[test]
    fn error_markers_become_model_errors() {
        let err = parse_output("ERROR_START\nmodel files missing\nERROR_END\n").unwrap_err();
        assert!(matches!(&err, AnalyzerError::Model { details } if details == "model files missing"));
    }

    #[test]
    fn garbage_output_is_unparsable() {
        let err = parse_output("Traceback (most recent call last)").unwrap_err();
        assert!(matches!(err, AnalyzerError::Unparsable { .. }));
        assert!(err.details().contains("Traceback"));
    }

    #[tokio::test]
    async fn fallback_returns_neutral_candidate() {
        let outcome = FallbackAnalyzer.analyze(&features()).await.unwrap();
        assert_eq!(outcome.prediction, Disposition::Candidate);
        assert!(outcome.note.is_some());
    }

    #[tokio::test]
    async fn unavailable_analyzer_has_details() {
        let err = UnavailableAnalyzer.analyze(&features()).await.unwrap_err();
        assert!(!err.details().is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let analyzer = CommandAnalyzer::new(
            "/nonexistent/planetsight-analyzer".to_string(),
            Vec::new(),
            Duration::from_secs(5),
            1,
        );
        let err = analyzer.analyze(&features()).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Spawn(_)));
    }

    #[cfg(unix)]
    fn shell(script: &str, timeout: Duration) -> CommandAnalyzer {
        CommandAnalyzer::new(
            "sh".to_string(),
            vec!["-c".to_string(), script.to_string()],
            timeout,
            2,
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_reads_features_and_parses_stdout() {
        let script = format!(
            "grep -q koi_teq && printf 'RESULT_START\\n%s\\nRESULT_END\\n' '{OUTCOME}'"
        );
        let outcome = shell(&script, Duration::from_secs(5))
            .analyze(&features())
            .await
            .unwrap();
        assert_eq!(outcome.prediction, Disposition::FalsePositive);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = shell("cat >/dev/null; echo boom >&2; exit 3", Duration::from_secs(5))
            .analyze(&features())
            .await
            .unwrap_err();
        assert!(matches!(&err, AnalyzerError::Failed { details } if details == "boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let err = shell("sleep 5", Duration::from_millis(100))
            .analyze(&features())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Timeout(_)));
    }
}
