//! HTTP handlers.
//!
//! The ingress route answers in plain text, the way upload clients expect.
//! The `/api/v1` routes wrap their payload in the JSON `ApiResponse`.

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::warn;

use fleetgate_core::{FleetSnapshot, derive_identifier};
use fleetgate_metrics::Gauge;

use crate::ApiState;
use crate::error::GatewayError;

/// Multipart field that carries the uploaded work item.
pub const UPLOAD_FIELD: &str = "inputFile";

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for a failed submission.
pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::EmptyPayload | GatewayError::InvalidIdentifier(_) => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::InFlight(_) => StatusCode::CONFLICT,
        GatewayError::Encode(_) | GatewayError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

// ── Ingress ────────────────────────────────────────────────────

/// POST /
///
/// Accepts a multipart upload in the `inputFile` field and answers
/// `"<identifier>:<result>"` once the worker tier has responded.
pub async fn submit(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((file_name, bytes));
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read upload");
                        return text(e.status(), e.body_text());
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return text(e.status(), e.body_text());
            }
        }
    }

    let Some((file_name, payload)) = upload else {
        return text(StatusCode::BAD_REQUEST, "No file uploaded.");
    };
    let Some(identifier) = derive_identifier(&file_name) else {
        return text(
            StatusCode::BAD_REQUEST,
            format!("Invalid file name {file_name:?}."),
        );
    };

    match state.gateway.submit(&identifier, &payload).await {
        Ok(result) => text(StatusCode::OK, format!("{identifier}:{result}")),
        Err(e) => {
            let status = status_for(&e);
            let body = match e {
                GatewayError::Encode(_) | GatewayError::Publish(_) => "Server error".to_string(),
                other => other.to_string(),
            };
            text(status, body)
        }
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Fleet ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FleetStatus {
    pub tag: String,
    #[serde(flatten)]
    pub snapshot: FleetSnapshot,
    pub active: u32,
    pub pending_requests: u64,
    pub in_flight: usize,
    pub stored_results: usize,
}

/// GET /api/v1/fleet
pub async fn fleet_status(State(state): State<ApiState>) -> Response {
    let snapshot = match state.directory.snapshot().await {
        Ok(s) => s,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response();
        }
    };
    let pending_requests = match state.gateway.requests().approximate_depth().await {
        Ok(n) => n,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response();
        }
    };

    ApiResponse::ok(FleetStatus {
        tag: state.directory.tag().to_string(),
        active: snapshot.active(),
        snapshot,
        pending_requests,
        in_flight: state.gateway.in_flight(),
        stored_results: state.gateway.store().len().await,
    })
    .into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let stored = state.gateway.store().len().await;
    state.metrics.set(Gauge::StoredResults, stored as u64);

    let body = fleetgate_metrics::render_prometheus(&state.metrics);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use fleetgate_core::{FleetTag, InstanceState};
    use fleetgate_fleet::{FleetDirectory, MemoryProvisioner};
    use fleetgate_metrics::ControllerMetrics;
    use fleetgate_queue::{MemoryQueue, MessageQueue};
    use fleetgate_results::ResultStore;
    use tokio_util::sync::CancellationToken;

    use crate::gateway::Gateway;

    async fn test_state() -> ApiState {
        let tag = FleetTag::new("Name", "app-tier-instance");
        let provisioner = MemoryProvisioner::manual();
        provisioner.insert("i-1", InstanceState::Running, &tag).await;
        provisioner.insert("i-2", InstanceState::Stopped, &tag).await;

        let metrics = Arc::new(ControllerMetrics::new());
        let requests = MemoryQueue::new("requests", Duration::from_secs(30));
        requests.send("queued".to_string()).await.unwrap();

        let gateway = Gateway::new(
            Arc::new(requests),
            ResultStore::new(),
            metrics.clone(),
            None,
            CancellationToken::new(),
        );
        ApiState {
            gateway: Arc::new(gateway),
            directory: FleetDirectory::new(Arc::new(provisioner), tag),
            metrics,
        }
    }

    #[test]
    fn statuses_for_errors() {
        assert_eq!(status_for(&GatewayError::EmptyPayload), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&GatewayError::InFlight("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&GatewayError::DeadlineExceeded {
                identifier: "x".into(),
                deadline: Duration::from_secs(1),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&GatewayError::Cancelled("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn fleet_status_reports_snapshot() {
        let state = test_state().await;
        let resp = fleet_status(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["running"], 1);
        assert_eq!(json["data"]["stopped"], 1);
        assert_eq!(json["data"]["active"], 1);
        assert_eq!(json["data"]["pending_requests"], 1);
        assert_eq!(json["data"]["tag"], "Name=app-tier-instance");
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = test_state().await;
        state.gateway.store().insert("cat1", "dog").await;

        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("fleetgate_stored_results 1"));
    }
}
