use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use super::tools::{self, ToolStatus};
use crate::config::ServerConfig;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tools: Vec<ToolStatus>,
}

pub struct RootController;

impl RootController {
    pub async fn root() -> Response {
        (StatusCode::OK, "Clip backend is running").into_response()
    }

    /// Reports whether both external tools can be launched. The service
    /// itself is up either way, so this always answers 200.
    pub async fn health_check(config: &ServerConfig) -> Response {
        let tools = tools::probe_all(config).await;
        let status = if tools.iter().all(|t| t.available) { "ok" } else { "degraded" };
        (StatusCode::OK, Json(HealthResponse { status, tools })).into_response()
    }
}
