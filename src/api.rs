use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::fetch::types::CascadeReport;
use crate::metrics::Metrics;
use crate::sentiment::SentimentReport;
use crate::service::{DatasetSummary, FeedService, ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeedService>,
}

/// JSON API without `/metrics`.
pub fn router(service: Arc<FeedService>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/datasets", get(list_datasets))
        .route("/instruments/{dataset}", get(instruments))
        .route("/sentiment", get(sentiment))
        .route("/admin/cache/clear", post(clear_cache))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { service })
}

/// JSON API plus the Prometheus scrape endpoint.
pub fn router_with_metrics(service: Arc<FeedService>, metrics: &Metrics) -> Router {
    router(service).merge(metrics.router())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::UnknownDataset(_) => ApiError::NotFound(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

async fn list_datasets(State(state): State<AppState>) -> Json<Vec<DatasetSummary>> {
    Json(state.service.datasets())
}

#[derive(Debug, Deserialize)]
struct InstrumentsQuery {
    #[serde(default)]
    q: Option<String>,
}

async fn instruments(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Query(params): Query<InstrumentsQuery>,
) -> Result<Json<CascadeReport>, ApiError> {
    let report = state
        .service
        .instruments(&dataset, params.q.as_deref())
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct SentimentQuery {
    #[serde(default)]
    topic: Option<String>,
}

async fn sentiment(
    State(state): State<AppState>,
    Query(params): Query<SentimentQuery>,
) -> Result<Json<SentimentReport>, ApiError> {
    let topic = params.topic.unwrap_or_default();
    if topic.trim().is_empty() {
        return Err(ApiError::BadRequest("missing ?topic=".into()));
    }
    Ok(Json(state.service.sentiment(&topic).await))
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    #[serde(default)]
    dataset: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearResp {
    scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
}

async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearQuery>,
) -> Result<Json<ClearResp>, ApiError> {
    match params.dataset {
        Some(ds) => {
            if state.service.config().dataset(&ds).is_none() {
                return Err(ServiceError::UnknownDataset(ds).into());
            }
            let removed = state.service.invalidate_dataset(&ds);
            Ok(Json(ClearResp {
                scope: ds,
                removed: Some(removed),
            }))
        }
        None => {
            state.service.invalidate_all();
            Ok(Json(ClearResp {
                scope: "all".into(),
                removed: None,
            }))
        }
    }
}
