use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use planetsight_ml::features::ANALYZE_FEATURE_NAMES;
use planetsight_ml::{
    AnalyzeFeatures, LogisticModel, ModelMetadata, Prediction, Scaler, TransitFeatures,
    TransitPredictor, TRANSIT_FEATURE_NAMES,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};

use crate::analyzer::AnalysisOutcome;
use crate::config::ApiMode;
use crate::error::ApiError;
use crate::source;
use crate::state::{AppState, ServiceSettings};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let (train, predict) = match state.settings.mode {
        ApiMode::Stateful => (post(train_stateful), post(predict_stateful)),
        ApiMode::Stateless => (post(train_stateless), post(predict_stateless)),
    };

    Router::new()
        .route("/api/status", get(status).fallback(method_not_allowed))
        .route("/api/train", train.fallback(method_not_allowed))
        .route("/api/predict", predict.fallback(method_not_allowed))
        .route("/api/analyze", post(analyze).fallback(method_not_allowed))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: &'static str,
    model_trained: bool,
}

#[derive(Debug, Serialize)]
struct TrainResponse {
    ok: bool,
    samples: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct ModelParams {
    w: Vec<f64>,
    b: f64,
}

#[derive(Debug, Serialize)]
struct TrainParamsResponse {
    ok: bool,
    samples: usize,
    model: ModelParams,
    mean: Vec<f64>,
    std: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct StatelessParams {
    model: ModelParams,
    mean: Vec<f64>,
    std: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    probability: f64,
    is_planet: bool,
}

impl From<Prediction> for PredictResponse {
    fn from(value: Prediction) -> Self {
        Self {
            probability: value.probability,
            is_planet: value.is_planet(),
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        model_trained: state.models.is_trained(),
    })
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn train_stateful(State(state): State<AppState>) -> Result<Json<TrainResponse>, ApiError> {
    let predictor = fit_from_source(&state).await?;
    let samples = log_trained("Stored", &predictor);
    state.models.replace(predictor);
    Ok(Json(TrainResponse { ok: true, samples }))
}

async fn train_stateless(
    State(state): State<AppState>,
) -> Result<Json<TrainParamsResponse>, ApiError> {
    let predictor = fit_from_source(&state).await?;
    let samples = log_trained("Returning parameters for", &predictor);
    Ok(Json(TrainParamsResponse {
        ok: true,
        samples,
        model: ModelParams {
            w: predictor.model().weights.clone(),
            b: predictor.model().bias,
        },
        mean: predictor.scaler().mean().to_vec(),
        std: predictor.scaler().std().to_vec(),
    }))
}

/// Logs the metadata of a freshly fitted model and returns its sample count.
fn log_trained(action: &str, predictor: &TransitPredictor) -> usize {
    match predictor.metadata() {
        Some(metadata) => {
            info!(
                target: "planetsight_server::routes",
                "{} model trained at {} on {} samples (features: {})",
                action,
                metadata.trained_at,
                metadata.samples,
                metadata.features.join(", ")
            );
            metadata.samples
        }
        None => 0,
    }
}

async fn predict_stateful(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let body = parse_body(&body)?;
    let predictor = state.models.current().ok_or(ApiError::NotTrained)?;
    let features = transit_features(&body)?;
    let prediction = predictor.predict_raw(&features.to_vector())?;
    Ok(Json(prediction.into()))
}

async fn predict_stateless(body: Bytes) -> Result<Json<PredictResponse>, ApiError> {
    let body = parse_body(&body)?;
    let params: StatelessParams = serde_json::from_value(Value::Object(body.clone()))
        .map_err(|_| ApiError::Validation("Model parameters required".to_string()))?;
    let features = transit_features(&body)?;

    let scaler = Scaler::from_parts(params.mean, params.std)?;
    let predictor = TransitPredictor::new(scaler, LogisticModel::new(params.model.w, params.model.b))?;
    let prediction = predictor.predict_raw(&features.to_vector())?;
    Ok(Json(prediction.into()))
}

async fn analyze(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let body = parse_body(&body)?;
    let fields = ANALYZE_FEATURE_NAMES.map(|name| body.get(name).filter(|value| !value.is_null()));
    if fields.iter().any(Option::is_none) {
        return Err(ApiError::Validation(format!(
            "All parameters are required: {}",
            ANALYZE_FEATURE_NAMES.join(", ")
        )));
    }
    let [koi_prad, koi_teq, koi_depth, koi_duration] = fields.map(|value| value.and_then(coerce_number));
    let invalid = || ApiError::Validation("All parameters must be valid numbers".to_string());
    let features = AnalyzeFeatures::new(
        koi_prad.ok_or_else(invalid)?,
        koi_teq.ok_or_else(invalid)?,
        koi_depth.ok_or_else(invalid)?,
        koi_duration.ok_or_else(invalid)?,
    )
    .map_err(|_| invalid())?;

    match state.analyzer.analyze(&features).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => {
            warn!(
                target: "planetsight_server::routes",
                "{} analyzer failed: {} ({})",
                state.analyzer.name(),
                err,
                err.details()
            );
            Err(err.into())
        }
    }
}

async fn fit_from_source(state: &AppState) -> Result<TransitPredictor, ApiError> {
    let settings = Arc::clone(&state.settings);
    tokio::task::spawn_blocking(move || fit_blocking(&settings))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
}

fn fit_blocking(settings: &ServiceSettings) -> Result<TransitPredictor, ApiError> {
    let dataset = source::load_dataset(&settings.source, &settings.columns)?;
    if dataset.len() < settings.min_samples {
        return Err(ApiError::Resource(format!(
            "Dataset too small: {} usable rows, at least {} required",
            dataset.len(),
            settings.min_samples
        )));
    }

    let predictor = TransitPredictor::fit(&dataset, settings.training)?;
    let trained_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(predictor.with_metadata(ModelMetadata {
        trained_at,
        features: settings.columns.features.clone(),
        samples: dataset.len(),
    }))
}

/// Parses a JSON object body; an empty body reads as `{}`.
fn parse_body(bytes: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(_) => Err(ApiError::Validation("Invalid JSON in request body".to_string())),
    }
}

fn transit_features(body: &Map<String, Value>) -> Result<TransitFeatures, ApiError> {
    let invalid = || ApiError::Validation("Invalid feature values".to_string());
    let [koi_period, koi_prad, koi_depth] = TRANSIT_FEATURE_NAMES.map(|name| body.get(name).and_then(coerce_number));
    TransitFeatures::new(
        koi_period.ok_or_else(invalid)?,
        koi_prad.ok_or_else(invalid)?,
        koi_depth.ok_or_else(invalid)?,
    )
    .map_err(|_| invalid())
}

/// Accepts JSON numbers and numeric strings; everything else is rejected.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
