// Media job routes
use axum::{
    body::Bytes,
    extract::State,
    response::Response,
    routing::post,
    Router,
};
use tracing::{info, warn};

use crate::controllers::stream::stream_output;
use crate::error::PipelineError;
use crate::models::job::{JobKind, JobRequest};
use crate::routers::AppState;

pub fn media_routes() -> Router<AppState> {
    Router::new()
        .route("/trim", post(trim_route))
        .route("/merge", post(merge_route))
        .route("/extract-audio", post(extract_audio_route))
        .route("/speed", post(speed_route))
        .route("/add-music", post(add_music_route))
}

pub async fn trim_route(State(state): State<AppState>, body: Bytes) -> Result<Response, PipelineError> {
    run_job(&state, JobKind::Trim, &body).await
}

pub async fn merge_route(State(state): State<AppState>, body: Bytes) -> Result<Response, PipelineError> {
    run_job(&state, JobKind::Merge, &body).await
}

pub async fn extract_audio_route(State(state): State<AppState>, body: Bytes) -> Result<Response, PipelineError> {
    run_job(&state, JobKind::ExtractAudio, &body).await
}

pub async fn speed_route(State(state): State<AppState>, body: Bytes) -> Result<Response, PipelineError> {
    run_job(&state, JobKind::ChangeSpeed, &body).await
}

pub async fn add_music_route(State(state): State<AppState>, body: Bytes) -> Result<Response, PipelineError> {
    run_job(&state, JobKind::AddMusic, &body).await
}

async fn run_job(state: &AppState, kind: JobKind, body: &[u8]) -> Result<Response, PipelineError> {
    let job = JobRequest::parse(kind, body).inspect_err(|e| {
        warn!("Rejected {:?} request: {}", kind, e);
    })?;
    info!("{:?} request accepted: {:?}", kind, job);

    let finished = state.pipeline.run(&job).await?;
    stream_output(finished).await
}
