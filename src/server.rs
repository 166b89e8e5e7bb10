//! HTTP API for the portal front end.
//!
//! Thin request/response marshaling: every AP endpoint maps 1:1 to a
//! controller operation and returns its success flag plus message or
//! error. The client-radio endpoints wrap the scan/connection helpers.
//! Secrets never leave the process; config reads mask the passphrase.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::{ApConfig, ApConfigUpdate};
use crate::controller::{ApController, ApStatus, OpOutcome};
use crate::{connection, scan};

#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn from_outcome(outcome: OpOutcome) -> (StatusCode, Json<Self>) {
        if outcome.success {
            (
                StatusCode::OK,
                Json(Self {
                    success: true,
                    message: Some(outcome.message),
                    error: None,
                }),
            )
        } else {
            (
                StatusCode::BAD_REQUEST,
                Json(Self {
                    success: false,
                    message: None,
                    error: Some(outcome.message),
                }),
            )
        }
    }

    fn internal_error(err: impl ToString) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                success: false,
                message: None,
                error: Some(err.to_string()),
            }),
        )
    }
}

/// Builds the API router around a shared controller instance.
pub fn router(controller: Arc<ApController>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ap/status", get(ap_status))
        .route("/api/ap/start", post(ap_start))
        .route("/api/ap/stop", post(ap_stop))
        .route("/api/ap/config", get(ap_config).post(ap_config_update))
        .route("/api/ap/monitor/start", post(monitor_start))
        .route("/api/ap/monitor/stop", post(monitor_stop))
        .route("/api/scan", get(client_scan))
        .route("/api/connect", post(client_connect))
        .route("/api/status", get(client_status))
        .route("/api/disconnect", post(client_disconnect))
        .layer(cors)
        .with_state(controller)
}

/// Serves the API until `shutdown` is cancelled.
pub async fn run_server(
    controller: Arc<ApController>,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(controller);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

async fn ap_status(State(controller): State<Arc<ApController>>) -> Json<ApStatus> {
    Json(controller.status().await)
}

async fn ap_start(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    ApiResponse::from_outcome(controller.setup().await)
}

async fn ap_stop(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    ApiResponse::from_outcome(controller.teardown().await)
}

async fn ap_config(State(controller): State<Arc<ApController>>) -> Json<ApConfig> {
    Json(controller.current_config().await.masked())
}

async fn ap_config_update(
    State(controller): State<Arc<ApController>>,
    Json(update): Json<ApConfigUpdate>,
) -> impl IntoResponse {
    ApiResponse::from_outcome(controller.update_config(update).await)
}

async fn monitor_start(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    ApiResponse::from_outcome(controller.start_monitoring().await)
}

async fn monitor_stop(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    ApiResponse::from_outcome(controller.stop_monitoring().await)
}

#[derive(Serialize)]
struct ScanResponse {
    success: bool,
    networks: Vec<scan::Network>,
}

async fn client_scan(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    let interface = controller.radio_assignment().await.client_interface;
    match scan::scan_networks(&interface).await {
        Ok(networks) => (
            StatusCode::OK,
            Json(ScanResponse {
                success: true,
                networks,
            }),
        )
            .into_response(),
        Err(err) => {
            error!(%err, "network scan failed");
            ApiResponse::internal_error(err).into_response()
        }
    }
}

#[derive(Deserialize)]
struct ConnectRequest {
    ssid: String,
    #[serde(default)]
    password: String,
}

async fn client_connect(
    State(controller): State<Arc<ApController>>,
    Json(request): Json<ConnectRequest>,
) -> impl IntoResponse {
    if request.ssid.is_empty() {
        return ApiResponse::from_outcome(OpOutcome::fail("SSID is required"));
    }

    let interface = controller.radio_assignment().await.client_interface;
    match connection::connect(&interface, &request.ssid, &request.password).await {
        Ok(()) => ApiResponse::from_outcome(OpOutcome::ok(format!(
            "Successfully connected to {}",
            request.ssid
        ))),
        Err(err) => ApiResponse::from_outcome(OpOutcome::fail(err.to_string())),
    }
}

#[derive(Serialize)]
struct ClientStatusResponse {
    success: bool,
    status: connection::ConnectionStatus,
}

async fn client_status(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    let interface = controller.radio_assignment().await.client_interface;
    match connection::status(&interface).await {
        Ok(status) => (
            StatusCode::OK,
            Json(ClientStatusResponse {
                success: true,
                status,
            }),
        )
            .into_response(),
        Err(err) => {
            error!(%err, "status query failed");
            ApiResponse::internal_error(err).into_response()
        }
    }
}

async fn client_disconnect(State(controller): State<Arc<ApController>>) -> impl IntoResponse {
    let interface = controller.radio_assignment().await.client_interface;
    match connection::disconnect(&interface).await {
        Ok(()) => ApiResponse::from_outcome(OpOutcome::ok("Disconnected from WiFi")),
        Err(err) => ApiResponse::from_outcome(OpOutcome::fail(err.to_string())),
    }
}
