// Response streamer
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::pipeline::FinishedJob;
use crate::error::PipelineError;

/// Turns a finished job into a streaming file response. The workspace guard
/// moves into the body, so it is released when the body finishes or is
/// dropped by a disconnecting client.
pub async fn stream_output(job: FinishedJob) -> Result<Response, PipelineError> {
    let FinishedJob {
        workspace,
        output_path,
        output,
    } = job;

    let file = match tokio::fs::File::open(&output_path).await {
        Ok(file) => file,
        Err(e) => {
            workspace.release().await;
            return Err(PipelineError::Stream(e));
        }
    };
    let length = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            workspace.release().await;
            return Err(PipelineError::Stream(e));
        }
    };

    let body = async_stream::stream! {
        // Moved in here: a dropped body still releases through the guard
        let workspace = workspace;
        let mut chunks = ReaderStream::new(file);
        while let Some(chunk) = chunks.next().await {
            if let Err(e) = &chunk {
                warn!("Read error while streaming {}: {}", output_path.display(), e);
            }
            let failed = chunk.is_err();
            yield chunk;
            if failed {
                break;
            }
        }
        debug!("Finished streaming {}", output_path.display());
        drop(chunks);
        workspace.release().await;
    };

    let disposition = format!("attachment; filename=\"{}\"", output.file_name);
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(output.content_type))
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(body))
        .map_err(|e| PipelineError::Stream(std::io::Error::other(e)))?;
    Ok(response)
}
