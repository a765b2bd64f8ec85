//! HTTP surface: probes, metrics, order events and opt-out management.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use domain_notifications::{
    DeliveryStats, MessagingTransport, NotificationError, NotificationServices, OrderLinks,
    QueueStats, QueuedNotification, StatsPeriod,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub services: NotificationServices,
    pub transport: Arc<dyn MessagingTransport>,
    /// Absent when running against in-memory stores.
    pub db: Option<DatabaseConnection>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::InvalidPhone(_) => ApiError::BadRequest(err.to_string()),
            NotificationError::NotFound(_) | NotificationError::OrderNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_handler))
        .route("/queue/stats", get(queue_stats))
        .route("/queue/retry-failed", post(retry_failed))
        .route("/delivery/stats", get(delivery_stats))
        .route("/orders/{id}/notifications", get(order_notifications))
        .route("/events/orders/{id}/status", post(order_status_changed))
        .route("/events/orders/{id}/created", post(order_created))
        .route("/opt-outs", post(opt_out))
        .route("/opt-outs/{phone}", delete(opt_in))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
    pub auto_processing: bool,
}

/// Liveness: always OK while the process serves requests.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        auto_processing: state.services.queue.is_auto_processing(),
    })
}

/// Readiness: the database answers and the WhatsApp instance is connected.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match &state.db {
        Some(db) => db.ping().await.is_ok(),
        None => true,
    };
    let transport = state.transport.health_check().await.unwrap_or(false);

    let status = if database && transport {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "database": database,
            "transport": { "name": state.transport.name(), "connected": transport },
        })),
    )
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.services.queue.get_queue_stats().await?))
}

async fn retry_failed(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let reset = state.services.queue.retry_failed_notifications().await?;
    Ok(Json(json!({ "reset": reset })))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

async fn delivery_stats(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<DeliveryStats>> {
    let period = match query.period.as_deref() {
        None => StatsPeriod::Last24Hours,
        Some(raw) => StatsPeriod::from_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("Unknown period '{}'", raw)))?,
    };
    Ok(Json(state.services.monitor.get_delivery_stats(period).await?))
}

async fn order_notifications(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Vec<QueuedNotification>>> {
    Ok(Json(
        state.services.queue.get_order_notifications(order_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub new_status: String,
    pub old_status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventAccepted {
    pub notification_id: Option<Uuid>,
}

async fn order_status_changed(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(change): Json<StatusChange>,
) -> (StatusCode, Json<EventAccepted>) {
    let notification_id = state
        .services
        .trigger
        .on_order_status_change(order_id, &change.new_status, change.old_status.as_deref())
        .await;
    (StatusCode::ACCEPTED, Json(EventAccepted { notification_id }))
}

async fn order_created(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    links: Option<Json<OrderLinks>>,
) -> (StatusCode, Json<EventAccepted>) {
    let links = links.map(|Json(l)| l).unwrap_or_default();
    let notification_id = state
        .services
        .trigger
        .on_order_created_with_links(order_id, links)
        .await;
    (StatusCode::ACCEPTED, Json(EventAccepted { notification_id }))
}

#[derive(Debug, Deserialize)]
pub struct OptOutRequest {
    pub phone: String,
    pub reason: Option<String>,
}

async fn opt_out(
    State(state): State<AppState>,
    Json(request): Json<OptOutRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let cancelled = state
        .services
        .opt_outs
        .opt_out(&request.phone, request.reason)
        .await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

async fn opt_in(State(state): State<AppState>, Path(phone): Path<String>) -> ApiResult<StatusCode> {
    if state.services.opt_outs.opt_in(&phone).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No opt-out recorded for {}", phone)))
    }
}
