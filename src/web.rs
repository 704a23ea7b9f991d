//! JSON API for the map, card and statistics pages.
//!
//! Handlers fetch the full collection on every request and hand it to the
//! aggregators; the pool is the only shared state.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::aggregation::aggregate;
use crate::case_store;
use crate::config::AggregatorConfig;
use crate::db_connect::{get_pool_status, PgPool};
use crate::errors::CaseError;
use crate::filter::{FieldContains, RecordPredicate};
use crate::models::{CaseField, CaseSelector, CaseSummary, NewCase, RawRecord};
use crate::statistics::{historical_summary, tally, HistoricalSummary, StatisticsSnapshot};

pub struct AppState {
    pub pool: PgPool,
    pub config: AggregatorConfig,
}

/// Error returned by handlers; rendered as `{"success": false, "message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<CaseError> for ApiError {
    fn from(e: CaseError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(e) => match e.downcast_ref::<CaseError>() {
                Some(CaseError::MissingCaseId)
                | Some(CaseError::UnknownField(_))
                | Some(CaseError::Filter { .. })
                | Some(CaseError::InvalidPayload(_)) => {
                    warn!("Rejected request: {}", e);
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                Some(CaseError::AmbiguousCase { .. }) => {
                    warn!("Rejected update: {}", e);
                    (StatusCode::CONFLICT, e.to_string())
                }
                _ => {
                    error!("Request failed: {:#}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
                }
            },
        };
        (status, Json(json!({"success": false, "message": message}))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    filter_field: Option<String>,
    filter_values: Option<String>,
    fields: Option<String>,
}

impl FilterQuery {
    fn predicate(&self) -> Result<Option<FieldContains>, CaseError> {
        match (&self.filter_field, &self.filter_values) {
            (Some(field), Some(values)) => FieldContains::parse(field, values).map(Some),
            (None, None) => Ok(None),
            (Some(field), None) => Err(CaseError::Filter {
                field: field.clone(),
                reason: "filter_values is required with filter_field".to_string(),
            }),
            (None, Some(_)) => Err(CaseError::Filter {
                field: String::new(),
                reason: "filter_field is required with filter_values".to_string(),
            }),
        }
    }

    fn fields(&self) -> Result<Vec<CaseField>, CaseError> {
        match &self.fields {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::parse::<CaseField>)
                .collect(),
            None => Ok(CaseField::STATISTICS.to_vec()),
        }
    }
}

fn write_ok(message: String) -> Json<Value> {
    info!("{}", message);
    Json(json!({"success": true, "message": message}))
}

// --- Read handlers ---

pub async fn api_cases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<Vec<CaseSummary>>, ApiError> {
    let predicate = params.predicate()?;
    let records = case_store::fetch_all_records(&state.pool).await?;
    let cases = aggregate(
        &records,
        predicate.as_ref().map(|p| p as &dyn RecordPredicate),
        &state.config,
    );
    Ok(Json(cases))
}

pub async fn api_customize_cases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CaseSummary>>, ApiError> {
    let records = case_store::fetch_all_records(&state.pool).await?;
    let filter = FieldContains::community_initiative();
    let cases = aggregate(
        &records,
        Some(&filter as &dyn RecordPredicate),
        &state.config.customization_view(),
    );
    Ok(Json(cases))
}

pub async fn api_statistics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<StatisticsSnapshot>, ApiError> {
    let predicate = params.predicate()?;
    let fields = params.fields()?;
    let records = case_store::fetch_all_records(&state.pool).await?;
    let snapshot = tally(
        &records,
        &fields,
        predicate.as_ref().map(|p| p as &dyn RecordPredicate),
        &state.config,
    );
    Ok(Json(snapshot))
}

pub async fn api_historical_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HistoricalSummary>, ApiError> {
    let records = case_store::fetch_all_records(&state.pool).await?;
    Ok(Json(historical_summary(&records, None, &state.config)))
}

pub async fn api_case_detail(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<Json<Vec<case_store::StoredRecord>>, ApiError> {
    let rows = case_store::get_case(&state.pool, &case_id).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("事例 {} が見つかりません。", case_id)));
    }
    Ok(Json(rows))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (total, idle, in_use) = get_pool_status(&state.pool);
    Json(json!({"status": "ok", "connections": {"total": total, "idle": idle, "in_use": in_use}}))
}

// --- Write handlers ---

pub async fn api_add_case(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewCase>,
) -> Result<Json<Value>, ApiError> {
    let record = body.into_record()?;
    let document_id = case_store::insert_record(&state.pool, &record).await?;
    Ok(write_ok(format!(
        "事例 {} が追加されました。(document {})",
        record.case_id, document_id
    )))
}

/// Splits an update body into the document selector and the replacement record.
fn parse_update(body: Value) -> Result<(CaseSelector, RawRecord), CaseError> {
    let selector: CaseSelector = serde_json::from_value(body.clone())
        .map_err(|e| CaseError::InvalidPayload(format!("update selector: {}", e)))?;
    let payload: NewCase = serde_json::from_value(body)
        .map_err(|e| CaseError::InvalidPayload(format!("update payload: {}", e)))?;
    Ok((selector, payload.into_record()?))
}

pub async fn api_update_case(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let (selector, record) = parse_update(body)?;
    let updated = case_store::update_records(&state.pool, &selector, &record).await?;
    if updated == 0 {
        return Err(ApiError::NotFound(format!("事例 {} が見つかりません。", record.case_id)));
    }
    Ok(write_ok(format!("事例 {} が更新されました。", record.case_id)))
}

pub async fn api_delete_case(
    State(state): State<Arc<AppState>>,
    Json(selector): Json<CaseSelector>,
) -> Result<Json<Value>, ApiError> {
    let deleted = case_store::delete_records(&state.pool, &selector).await?;
    let label = selector
        .case_id
        .clone()
        .or_else(|| selector.document_id.map(|id| id.to_string()))
        .unwrap_or_default();
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("事例 {} が見つかりません。", label)));
    }
    Ok(write_ok(format!("事例 {} が削除されました。", label)))
}

pub fn router(state: Arc<AppState>, image_dir: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/cases", get(api_cases))
        .route("/api/customize_cases", get(api_customize_cases))
        .route("/api/statistics", get(api_statistics))
        .route("/api/historical_summary", get(api_historical_summary))
        .route("/api/case/{case_id}", get(api_case_detail))
        .route("/api/cases/add", post(api_add_case))
        .route("/api/cases/update", post(api_update_case))
        .route("/api/cases/delete", post(api_delete_case))
        .nest_service("/images", ServeDir::new(image_dir))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
