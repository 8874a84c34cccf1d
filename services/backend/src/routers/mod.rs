pub mod media;
pub mod root;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::controllers::PipelineController;
pub use media::media_routes;
pub use root::{health_check_route, root_route};

/// Shared by every handler; built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub pipeline: Arc<PipelineController>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let pipeline = Arc::new(PipelineController::new(config.clone()));
        Self { config, pipeline }
    }
}

pub fn app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_route))
        .route("/health", get(health_check_route))
        .merge(media_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn missing_tools_state() -> AppState {
        let config = ServerConfig::from_lookup(|key| match key {
            "YTDLP_PATH" => Some("/definitely/not/yt-dlp".to_string()),
            "FFMPEG_PATH" => Some("/definitely/not/ffmpeg".to_string()),
            _ => None,
        })
        .unwrap();
        AppState::new(config)
    }

    #[tokio::test]
    async fn root_answers() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app(missing_tools_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_missing_tools_as_degraded() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(missing_tools_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "degraded");
        let names: Vec<&str> = value["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["yt-dlp", "ffmpeg"]);
        assert_eq!(value["tools"][0]["available"], false);
    }
}
