//! HTTP API for dashboards and external tools.
//!
//! JSON endpoints over the aggregator and alert engine, a server-sent event
//! stream mirroring the internal event bus, and the WebSocket upgrade for the
//! real-time broadcast server.

use crate::aggregation::MetricsAggregator;
use crate::alerts::AlertEngine;
use crate::core::types::{TestFilters, TestStatus};
use crate::core::{AbPulseError, Result};
use crate::events::{AnalyticsEvent, EventBus};
use crate::realtime::RealtimeServer;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handler state.
#[derive(Clone)]
struct ApiState {
    aggregator: Arc<MetricsAggregator>,
    alerts: Arc<AlertEngine>,
    events: Arc<EventBus>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    #[serde(rename = "activeConnections")]
    active_connections: usize,
    #[serde(rename = "unacknowledgedAlerts")]
    unacknowledged_alerts: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: status.as_u16(),
        }),
    )
        .into_response()
}

fn internal_error(e: AbPulseError) -> axum::response::Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Query parameters accepted by the list/rollup endpoints.
#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    /// Comma-separated status list, e.g. `active,completed`.
    status: Option<String>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    min_revenue: Option<f64>,
    min_significance: Option<f64>,
}

impl FilterQuery {
    fn into_filters(self) -> TestFilters {
        let statuses = self.status.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(TestStatus::parse_lenient)
                .collect()
        });
        TestFilters {
            date_from: self.date_from,
            date_to: self.date_to,
            statuses,
            min_revenue: self.min_revenue,
            min_significance: self.min_significance,
        }
    }
}

/// Query parameters for revenue attribution.
#[derive(Debug, Deserialize)]
struct RevenueQuery {
    #[serde(rename = "testId")]
    test_id: Option<String>,
}

/// Build the full application router, WebSocket endpoint included.
pub fn router(
    aggregator: Arc<MetricsAggregator>,
    alerts: Arc<AlertEngine>,
    events: Arc<EventBus>,
    realtime: Arc<RealtimeServer>,
) -> Router {
    let state = ApiState {
        aggregator,
        alerts,
        events,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tests", get(list_tests_handler))
        .route("/api/tests/:id", get(get_test_handler))
        .route("/api/executive-summary", get(executive_summary_handler))
        .route("/api/psychographic-insights", get(psychographic_handler))
        .route("/api/revenue-attribution", get(revenue_handler))
        .route("/api/real-time", get(real_time_handler))
        .route("/api/alerts", get(list_alerts_handler))
        .route("/api/alerts/:id/acknowledge", post(acknowledge_handler))
        .route("/api/cache/clear", post(clear_cache_handler))
        .route("/api/events", get(events_handler))
        .with_state(state)
        .merge(crate::realtime::router(realtime))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Bind and serve until the shutdown future resolves.
pub async fn serve(
    app: Router,
    bind_address: std::net::IpAddr,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    tracing::info!("serving HTTP API on http://{}", addr);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        AbPulseError::config(format!("failed to bind {}: {}", addr, e))
    })?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(AbPulseError::Io)?;
    Ok(())
}

/// GET /health
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_connections: state.events.listener_count(),
        unacknowledged_alerts: state.alerts.unacknowledged_count(),
    })
}

/// GET /api/tests
async fn list_tests_handler(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> impl IntoResponse {
    match state.aggregator.get_test_list(&params.into_filters()).await {
        Ok(tests) => Json(tests).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/tests/:id
async fn get_test_handler(
    State(state): State<ApiState>,
    Path(test_id): Path<String>,
) -> impl IntoResponse {
    match state.aggregator.get_test_metrics(&test_id).await {
        Ok(Some(test)) => Json(test).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("test '{}' not found", test_id),
        ),
        Err(e) => internal_error(e),
    }
}

/// GET /api/executive-summary
async fn executive_summary_handler(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> impl IntoResponse {
    match state
        .aggregator
        .get_executive_summary(&params.into_filters())
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/psychographic-insights
async fn psychographic_handler(
    State(state): State<ApiState>,
    Query(params): Query<FilterQuery>,
) -> impl IntoResponse {
    match state
        .aggregator
        .get_psychographic_insights(&params.into_filters())
        .await
    {
        Ok(insights) => Json(insights).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/revenue-attribution
async fn revenue_handler(
    State(state): State<ApiState>,
    Query(params): Query<RevenueQuery>,
) -> impl IntoResponse {
    match state
        .aggregator
        .get_revenue_attribution(params.test_id.as_deref())
        .await
    {
        Ok(Some(attribution)) => Json(attribution).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!(
                "test '{}' not found",
                params.test_id.as_deref().unwrap_or_default()
            ),
        ),
        Err(e) => internal_error(e),
    }
}

/// GET /api/real-time
async fn real_time_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state
        .aggregator
        .get_real_time_metrics(state.alerts.unacknowledged_count())
        .await
    {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/alerts
async fn list_alerts_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.alerts.alerts())
}

/// POST /api/alerts/:id/acknowledge
async fn acknowledge_handler(
    State(state): State<ApiState>,
    Path(alert_id): Path<String>,
) -> impl IntoResponse {
    // Acknowledging is idempotent; unknown ids and repeats both succeed.
    let transitioned = state.alerts.acknowledge(&alert_id);
    Json(serde_json::json!({ "acknowledged": true, "changed": transitioned }))
}

/// POST /api/cache/clear
async fn clear_cache_handler(State(state): State<ApiState>) -> impl IntoResponse {
    state.aggregator.clear_cache();
    Json(serde_json::json!({ "cleared": true }))
}

/// GET /api/events - server-sent event mirror of the internal bus.
async fn events_handler(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (guard, rx) = state.events.subscribe().split();
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        // The guard rides along in the closure so the bus registration lives
        // as long as the stream does.
        let _ = &guard;
        Ok(sse_event(&event))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

fn sse_event(event: &AnalyticsEvent) -> Event {
    let (name, payload) = match event {
        AnalyticsEvent::NewAlert(alert) => ("new_alert", serde_json::to_value(alert)),
        AnalyticsEvent::AlertAcknowledged(alert) => {
            ("alert_acknowledged", serde_json::to_value(alert))
        },
        AnalyticsEvent::RealTimeUpdate(snapshot) => {
            ("realtime-metrics", serde_json::to_value(snapshot))
        },
        AnalyticsEvent::AnalyticsError { operation, message } => (
            "analytics_error",
            Ok(serde_json::json!({ "operation": operation, "message": message })),
        ),
        AnalyticsEvent::MetricsUpdated => ("metrics_updated", Ok(serde_json::json!({}))),
    };

    let data = payload
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}
