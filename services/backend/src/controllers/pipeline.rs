// Pipeline runner: workspace -> retrieval -> transform
use futures_util::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use super::retrieval::{FormatSelector, RetrievalStep, Retriever};
use super::transform::{Recipe, Transformer};
use super::workspace::{Workspace, WorkspaceManager};
use crate::config::ServerConfig;
use crate::error::PipelineError;
use crate::models::job::{JobKind, JobRequest, OutputFile};

/// Everything one job needs to run: what to download and how to transform it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub kind: JobKind,
    pub retrievals: Vec<RetrievalStep>,
    pub recipe: Recipe,
}

impl JobPlan {
    pub fn for_job(job: &JobRequest) -> Self {
        let step = |url: &url::Url, format, file_name| RetrievalStep {
            url: url.clone(),
            format,
            file_name,
        };
        let (retrievals, recipe) = match job {
            JobRequest::Trim { url, start, end } => (
                vec![step(url, FormatSelector::Progressive, "video.mp4")],
                Recipe::Trim {
                    start: *start,
                    duration: end - start,
                },
            ),
            JobRequest::Merge { first, second } => (
                vec![
                    step(first, FormatSelector::MergedVideo, "video1.mp4"),
                    step(second, FormatSelector::MergedVideo, "video2.mp4"),
                ],
                Recipe::Concat,
            ),
            JobRequest::ExtractAudio { url } => (
                vec![step(url, FormatSelector::AudioOnly, "source.m4a")],
                Recipe::ExtractAudio,
            ),
            JobRequest::ChangeSpeed { url, speed } => (
                vec![step(url, FormatSelector::MergedVideo, "video.mp4")],
                Recipe::ChangeSpeed { speed: *speed },
            ),
            JobRequest::AddMusic { video_url, music_url } => (
                vec![
                    step(video_url, FormatSelector::MergedVideo, "video.mp4"),
                    step(music_url, FormatSelector::AudioOnly, "music.m4a"),
                ],
                Recipe::MixMusic,
            ),
        };
        JobPlan {
            kind: job.kind(),
            retrievals,
            recipe,
        }
    }
}

/// A job whose output is ready. Holds the workspace until it is streamed.
#[derive(Debug)]
pub struct FinishedJob {
    pub workspace: Workspace,
    pub output_path: PathBuf,
    pub output: OutputFile,
}

pub struct PipelineController {
    config: Arc<ServerConfig>,
    workspaces: WorkspaceManager,
}

impl PipelineController {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let workspaces = WorkspaceManager::new(config.workspace_root.clone());
        Self { config, workspaces }
    }

    /// Runs a validated job up to (not including) streaming. On error the
    /// workspace has already been released.
    pub async fn run(&self, job: &JobRequest) -> Result<FinishedJob, PipelineError> {
        let plan = JobPlan::for_job(job);
        let workspace = self.workspaces.acquire(plan.kind.workspace_prefix()).await?;

        match self.execute(&plan, workspace.path()).await {
            Ok(output_path) => {
                info!("{:?} job finished: {}", plan.kind, output_path.display());
                Ok(FinishedJob {
                    workspace,
                    output_path,
                    output: plan.kind.output(),
                })
            }
            Err(e) => {
                error!("{:?} job failed: {}", plan.kind, e);
                workspace.release().await;
                Err(e)
            }
        }
    }

    async fn execute(&self, plan: &JobPlan, dir: &Path) -> Result<PathBuf, PipelineError> {
        let retriever = Retriever {
            ytdlp: &self.config.ytdlp_path,
            ffmpeg: &self.config.ffmpeg_path,
            options: &self.config.retrieval,
            output_limit: self.config.output_limit,
        };
        // Independent downloads run concurrently; the first failure wins
        let inputs = try_join_all(plan.retrievals.iter().map(|step| retriever.fetch(step, dir))).await?;

        let transformer = Transformer {
            ffmpeg: &self.config.ffmpeg_path,
            output_limit: self.config.output_limit,
        };
        transformer
            .apply(&plan.recipe, &inputs, dir, plan.kind.output().file_name)
            .await
    }
}
