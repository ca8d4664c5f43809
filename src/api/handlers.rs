use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::params::{StatsQuery, ValidationError, WhoamiQuery};
use crate::client_ip::{resolve_client_ip, user_agent};
use crate::dispatcher::{VisitDispatcher, WhoamiResponse};
use crate::stats::{StatsAggregator, StatsResult};

pub struct AppState {
    pub dispatcher: VisitDispatcher,
    pub stats: StatsAggregator,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn validation_error(err: ValidationError) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Report the caller's IP and geolocation, and record the visit in the background
pub async fn whoami(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<WhoamiQuery>,
) -> Result<Json<WhoamiResponse>, ApiError> {
    let dedup_seconds = query.validate().map_err(validation_error)?;

    let ip = resolve_client_ip(&headers, addr);
    let ua = user_agent(&headers);

    let response = state.dispatcher.handle(ip, ua, dedup_seconds).await;
    Ok(Json(response))
}

/// Visit counts over a recent window
pub async fn visit_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResult>, ApiError> {
    let (top_n, hours) = query.validate().map_err(validation_error)?;

    match state.stats.stats(top_n, hours).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to compute visit stats");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to retrieve visit stats".to_string(),
                }),
            ))
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}
