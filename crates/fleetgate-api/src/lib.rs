//! fleetgate-api — HTTP surface of the controller.
//!
//! [`Gateway`] is the submission path: publish a work item to the request
//! queue, then wait on the result store for the matching answer. The axum
//! router exposes it alongside fleet status and Prometheus metrics.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/` | Multipart upload (`inputFile`), answers `<identifier>:<result>` |
//! | GET | `/healthz` | Liveness |
//! | GET | `/api/v1/fleet` | Fleet snapshot, request queue depth, in-flight count |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! # Ingress status codes
//!
//! | Status | When |
//! |---|---|
//! | 200 | Result received |
//! | 400 | No `inputFile`, empty payload, or unusable file name |
//! | 409 | A submission with the same identifier is still waiting |
//! | 500 | The request could not be published |
//! | 503 | The controller is shutting down |
//! | 504 | The configured deadline passed without a result |

pub mod error;
pub mod gateway;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use fleetgate_fleet::FleetDirectory;
use fleetgate_metrics::ControllerMetrics;

pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<Gateway>,
    pub directory: FleetDirectory,
    pub metrics: Arc<ControllerMetrics>,
}

/// Build the complete router (ingress + status + metrics).
///
/// Uploads larger than `max_upload_bytes` are rejected before they reach
/// the gateway.
pub fn build_router(state: ApiState, max_upload_bytes: usize) -> Router {
    let api_routes = Router::new()
        .route("/fleet", get(handlers::fleet_status))
        .with_state(state.clone());

    Router::new()
        .route(
            "/",
            post(handlers::submit).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
        .nest("/api/v1", api_routes)
}
