use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Everything that can end a job before its output is streamed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Failed to prepare workspace {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {tool}: {source}")]
    ToolLaunch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("yt-dlp exited with {}: {stderr}", describe_exit(.exit_code))]
    Retrieval { exit_code: Option<i32>, stderr: String },

    #[error("{tool} reported success but {} was not produced", .path.display())]
    ToolOutputMissing { tool: &'static str, path: PathBuf },

    #[error("ffmpeg exited with {}: {stderr}", describe_exit(.exit_code))]
    Transform { exit_code: Option<i32>, stderr: String },

    #[error("Failed to stream output: {0}")]
    Stream(#[source] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl PipelineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Pipeline failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
