use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::{sync::Arc, time::{SystemTime, UNIX_EPOCH}};

use crate::error::PipelineError;
use crate::form::{take_field, CarForm};
use crate::narrative::Narrative;
use crate::pipeline::{Feature, Pipeline, PipelineOptions, PipelineOutput};
use crate::report::REPORT_FILENAME;
use crate::types::{FeatureRecord, ForecastSeries};

// ---------- Request/Response types ----------

// Form fields at the top level, plus an optional feature selector
#[derive(Debug)]
pub struct PredictRequest {
    pub form: CarForm,
    pub feature: Option<Feature>,
}

impl PredictRequest {
    pub fn from_json(body: Value) -> Result<Self, PipelineError> {
        let mut obj = into_object(body)?;
        let form = CarForm::take_from(&mut obj)?;
        let mut feature: Option<Feature> = None;
        take_field(&mut obj, "feature", &mut feature)?;
        Ok(Self { form, feature })
    }
}

fn into_object(body: Value) -> Result<Map<String, Value>, PipelineError> {
    match body {
        Value::Object(obj) => Ok(obj),
        other => Err(PipelineError::invalid(
            "body",
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Serialize)]
struct PredictOut {
    t: i64,
    predicted_price: f64,
    currency: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    forecast: Option<ForecastSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sell_before: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    narrative: Option<Narrative>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_error: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(e: PipelineError) -> ApiError {
    let status = if e.is_invalid_input() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::warn!(status = status.as_u16(), "request failed: {}", e);
    (status, Json(json!({ "error": e.to_string() })))
}

// Unparseable bodies keep axum's status but answer in the same JSON shape
fn rejection_error(rej: JsonRejection) -> ApiError {
    let status = rej.status();
    let message = format!("invalid body: {}", rej.body_text());
    tracing::warn!(status = status.as_u16(), "request failed: {}", message);
    (status, Json(json!({ "error": message })))
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(v)| v).map_err(rejection_error)
}

fn form_body(body: Result<Json<Value>, JsonRejection>) -> Result<CarForm, ApiError> {
    let mut obj = into_object(json_body(body)?).map_err(api_error)?;
    CarForm::take_from(&mut obj).map_err(api_error)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/form/defaults", get(form_defaults))
        .route("/predict", post(predict))
        .route("/chart", post(chart))
        .route("/report", post(report))
        .with_state(state)
}

// ---------- Handlers ----------

async fn health() -> &'static str {
    "ok"
}

async fn form_defaults() -> Json<CarForm> {
    Json(CarForm::default())
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictOut>, ApiError> {
    let payload = PredictRequest::from_json(json_body(body)?).map_err(api_error)?;
    let record = payload.form.validate().map_err(api_error)?;
    let options = match payload.feature {
        Some(feature) => PipelineOptions::for_feature(feature),
        None => PipelineOptions {
            forecast: true,
            advisory: true,
            narrative: true,
            ..PipelineOptions::default()
        },
    };

    let out = state.pipeline.run(&record, options).await.map_err(api_error)?;
    Ok(Json(PredictOut {
        t: now_ms(),
        predicted_price: out.prediction.price,
        currency: "Lakhs",
        forecast: out.forecast,
        sell_before: out.sell_before,
        narrative: out.narrative,
        report_error: out.report.and_then(|r| r.err()).map(|e| e.to_string()),
    }))
}

async fn run_for(
    state: &AppState,
    form: CarForm,
    feature: Feature,
) -> Result<(FeatureRecord, PipelineOutput), ApiError> {
    let record = form.validate().map_err(api_error)?;
    let out = state
        .pipeline
        .run(&record, PipelineOptions::for_feature(feature))
        .await
        .map_err(api_error)?;
    Ok((record, out))
}

async fn chart(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (_, out) = run_for(&state, form_body(body)?, Feature::DepreciationGraph).await?;
    let png = out
        .chart_png
        .ok_or_else(|| api_error(PipelineError::Chart("no chart produced".to_string())))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn report(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (record, out) = run_for(&state, form_body(body)?, Feature::DownloadReport).await?;
    let pdf = match out.report {
        Some(Ok(pdf)) => pdf,
        Some(Err(e)) => return Err(api_error(e)),
        None => return Err(api_error(PipelineError::Report("no report produced".to_string()))),
    };
    tracing::info!(company = record.company(), bytes = pdf.len(), "serving report");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", REPORT_FILENAME),
            ),
        ],
        pdf,
    )
        .into_response())
}
