//! `GET /health` and `GET /metrics`: worker fleet health and Prometheus
//! metrics for external monitors, both behind the health allow-list.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    infrastructure::dto::http::HealthResponse,
    ui::state::AppState,
};

use super::error::ApiError;

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; frame-ancestors 'none'";
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn worker_health(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let ip = peer.ip().to_canonical();
    let response = if state.health_allowed_ips.contains(&ip) {
        let report = state.get_health_usecase.execute().await;
        let status = if report.healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(HealthResponse::from(report))).into_response()
    } else {
        tracing::warn!("Health check rejected for {}", ip);
        ApiError::forbidden("Forbidden").into_response()
    };
    with_security_headers(response)
}

pub async fn worker_metrics(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let ip = peer.ip().to_canonical();
    let response = if state.health_allowed_ips.contains(&ip) {
        match state.metrics.encode() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                ApiError::internal("Failed to encode metrics").into_response()
            }
        }
    } else {
        tracing::warn!("Metrics scrape rejected for {}", ip);
        ApiError::forbidden("Forbidden").into_response()
    };
    with_security_headers(response)
}

fn with_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    response
}
