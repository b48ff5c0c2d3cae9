//! HTTP surface (component I's Axum half, §6). The verdict computation
//! itself lives in [`crate::aggregator`]; these handlers only parse query
//! parameters, pick a status code, and pick a JSON/HTML rendering — the
//! same thin-wrapper-over-core-logic shape as the teacher's
//! `core::router::core_app_router` handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::aggregator::{Aggregator, GtgOutcome};
use crate::html;
use crate::registry::Registry;

pub struct AppState {
    pub registry: Arc<Registry>,
    pub aggregator: Aggregator,
    #[cfg(feature = "metrics")]
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    categories: Option<String>,
    #[serde(default = "default_cache")]
    cache: bool,
}

fn default_cache() -> bool {
    true
}

impl HealthQuery {
    fn category_list(&self) -> Vec<String> {
        match &self.categories {
            None => vec!["default".to_string()],
            Some(raw) => {
                let split: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if split.is_empty() {
                    vec!["default".to_string()]
                } else {
                    split
                }
            }
        }
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

/// `GET /` and `GET /__health` (§6).
pub async fn health(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HealthQuery>,
) -> Response {
    let categories = query.category_list();
    let Ok(result) = state.aggregator.health_result(&categories, query.cache).await else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if wants_json(&headers) {
        Json(result).into_response()
    } else {
        Html(html::render("Coco Aggregate Healthcheck", &result)).into_response()
    }
}

/// `GET /__gtg` (§4.I "/__gtg specifics").
pub async fn gtg(State(state): State<Arc<AppState>>, Query(query): Query<HealthQuery>) -> StatusCode {
    let categories = query.category_list();
    match state.aggregator.gtg(&categories, query.cache).await {
        GtgOutcome::Ok => StatusCode::OK,
        GtgOutcome::BadRequest => StatusCode::BAD_REQUEST,
        GtgOutcome::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Ambient Prometheus endpoint, not part of spec.md's tested core but
/// carried per the "ambient stack regardless of non-goals" rule.
#[cfg(feature = "metrics")]
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

pub fn router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/", get(health))
        .route("/__health", get(health))
        .route("/__gtg", get(gtg));

    #[cfg(feature = "metrics")]
    let router = router.route("/actuator/metrics", get(metrics));

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false).level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().include_headers(false).level(Level::INFO)),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
