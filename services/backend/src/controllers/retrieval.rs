// Retrieval stage: yt-dlp downloads into the workspace
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use super::process;
use crate::config::RetrievalOptions;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSelector {
    /// Single-file mp4 capped at 720p; no merge step needed.
    Progressive,
    /// Best video up to 1080p plus best audio, merged into mp4.
    MergedVideo,
    /// Audio track only.
    AudioOnly,
}

impl FormatSelector {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatSelector::Progressive => {
                "best[height<=720][ext=mp4]/worst[height>=360][ext=mp4]/worst[ext=mp4]/best"
            }
            FormatSelector::MergedVideo => {
                "bestvideo[height<=1080][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<=1080]+bestaudio"
            }
            FormatSelector::AudioOnly => "bestaudio[ext=m4a]/bestaudio",
        }
    }
}

/// One download: where from, which format, where to.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalStep {
    pub url: Url,
    pub format: FormatSelector,
    pub file_name: &'static str,
}

pub struct Retriever<'a> {
    pub ytdlp: &'a Path,
    pub ffmpeg: &'a Path,
    pub options: &'a RetrievalOptions,
    pub output_limit: usize,
}

impl Retriever<'_> {
    /// Builds the yt-dlp argument vector for one step.
    pub fn args(&self, step: &RetrievalStep, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--format".into(),
            step.format.as_str().into(),
        ];
        if step.format == FormatSelector::MergedVideo {
            args.push("--merge-output-format".into());
            args.push("mp4".into());
        }
        // A bare name is left to yt-dlp's own PATH lookup
        if self.ffmpeg.components().count() > 1 {
            args.push("--ffmpeg-location".into());
            args.push(self.ffmpeg.into());
        }
        args.extend(
            ["--no-playlist", "--no-part", "--no-mtime", "--no-progress"]
                .into_iter()
                .map(OsString::from),
        );
        args.push("--socket-timeout".into());
        args.push(self.options.socket_timeout_secs.to_string().into());
        args.push("--retries".into());
        args.push(self.options.retries.to_string().into());
        if let Some(agent) = &self.options.user_agent {
            args.push("--user-agent".into());
            args.push(agent.into());
        }
        for header in &self.options.headers {
            args.push("--add-header".into());
            args.push(header.into());
        }
        if self.options.no_check_certificates {
            args.push("--no-check-certificates".into());
        }
        args.extend(self.options.extra_args.iter().map(OsString::from));
        args.push("--output".into());
        args.push(dest.into());
        // Nothing after "--" is read as an option
        args.push("--".into());
        args.push(step.url.as_str().into());
        args
    }

    /// Downloads one source into `workspace`, returning the local file.
    pub async fn fetch(&self, step: &RetrievalStep, workspace: &Path) -> Result<PathBuf, PipelineError> {
        let dest = workspace.join(step.file_name);
        let args = self.args(step, &dest);
        info!("Downloading {} -> {}", step.url, dest.display());
        debug!("yt-dlp args: {:?}", args);

        let output = process::run(self.ytdlp, &args, workspace, self.output_limit)
            .await
            .map_err(|source| PipelineError::ToolLaunch { tool: "yt-dlp", source })?;

        if !output.success() {
            warn!("yt-dlp failed for {}: {}", step.url, output.stderr.trim());
            return Err(PipelineError::Retrieval {
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(PipelineError::ToolOutputMissing { tool: "yt-dlp", path: dest });
        }
        info!("Downloaded: {}", dest.display());
        Ok(dest)
    }
}
