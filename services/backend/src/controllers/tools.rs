// External tool discovery and yt-dlp bootstrap
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use super::process;
use crate::config::ServerConfig;

const PROBE_OUTPUT_LIMIT: usize = 4096;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    pub path: String,
    pub available: bool,
    pub version: Option<String>,
}

/// Runs `<program> <version_flag>` and reports the first line it prints.
pub async fn probe(name: &str, program: &Path, version_flag: &str) -> ToolStatus {
    let cwd = std::env::temp_dir();
    let (available, version) = match process::run(program, [version_flag], &cwd, PROBE_OUTPUT_LIMIT).await {
        Ok(output) if output.success() => {
            let version = output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string);
            (true, version)
        }
        Ok(output) => {
            warn!("{} {} exited with {:?}", name, version_flag, output.exit_code);
            (false, None)
        }
        Err(e) => {
            warn!("{} is not runnable at {}: {}", name, program.display(), e);
            (false, None)
        }
    };
    ToolStatus {
        name: name.to_string(),
        path: program.display().to_string(),
        available,
        version,
    }
}

pub async fn probe_all(config: &ServerConfig) -> Vec<ToolStatus> {
    let (ytdlp, ffmpeg) = tokio::join!(
        probe("yt-dlp", &config.ytdlp_path, "--version"),
        probe("ffmpeg", &config.ffmpeg_path, "-version"),
    );
    vec![ytdlp, ffmpeg]
}

/// A bare program name is resolved through PATH, so only explicit paths can
/// be installed to.
fn is_explicit_path(path: &Path) -> bool {
    path.components().count() > 1 || path.is_absolute()
}

/// Downloads yt-dlp to the configured path when auto-install is enabled and
/// nothing is there yet. Returns the installed path, if any.
pub async fn ensure_ytdlp(config: &ServerConfig) -> anyhow::Result<Option<PathBuf>> {
    let target = &config.ytdlp_path;
    if !config.ytdlp_auto_install || !is_explicit_path(target) {
        return Ok(None);
    }
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        return Ok(None);
    }

    info!("Downloading yt-dlp from {} to {}", config.ytdlp_download_url, target.display());
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(Duration::from_secs(120))
        .build()?;
    let response = client
        .get(&config.ytdlp_download_url)
        .send()
        .await?
        .error_for_status()
        .context("yt-dlp download was rejected")?;
    let bytes = response.bytes().await?;

    let temp_path = target.with_extension("tmp");
    tokio::fs::write(&temp_path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    if let Err(e) = tokio::fs::rename(&temp_path, target).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e).context("Failed to move yt-dlp into place");
    }

    let status = probe("yt-dlp", target, "--version").await;
    if !status.available {
        error!("Downloaded yt-dlp does not run, removing it");
        let _ = tokio::fs::remove_file(target).await;
        anyhow::bail!("yt-dlp downloaded to {} but failed to run", target.display());
    }
    info!("yt-dlp installed, version: {}", status.version.as_deref().unwrap_or("unknown"));
    Ok(Some(target.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn only_explicit_paths_are_installable() {
        assert!(!is_explicit_path(Path::new("yt-dlp")));
        assert!(is_explicit_path(Path::new("bin/yt-dlp")));
        assert!(is_explicit_path(Path::new("/opt/tools/yt-dlp")));
    }

    #[tokio::test]
    async fn probe_reports_missing_tool() {
        let status = probe("yt-dlp", Path::new("/definitely/not/yt-dlp"), "--version").await;
        assert!(!status.available);
        assert_eq!(status.version, None);
        assert_eq!(status.path, "/definitely/not/yt-dlp");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_reads_first_version_line() {
        let status = probe("sh", Path::new("/bin/echo"), "2024.10.07").await;
        assert!(status.available);
        assert_eq!(status.version.as_deref(), Some("2024.10.07"));
    }

    #[tokio::test]
    async fn ensure_ytdlp_is_a_noop_without_auto_install() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::from_lookup(|key| match key {
            "YTDLP_PATH" => Some(dir.path().join("bin/yt-dlp").display().to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(ensure_ytdlp(&config).await.unwrap(), None);
        assert!(!dir.path().join("bin").exists());
    }
}
