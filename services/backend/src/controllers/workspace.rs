// Scratch workspace lifecycle
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;

/// Creates per-job scratch directories under a single root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Tools run with the workspace as their working directory, so the
    /// root is made absolute up front.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    /// Creates a fresh `<prefix><uuid>` directory. The returned guard owns it.
    pub async fn acquire(&self, prefix: &str) -> Result<Workspace, PipelineError> {
        let path = self.root.join(format!("{}{}", prefix, Uuid::new_v4().simple()));
        // create_dir (not create_dir_all) so an existing path is an error
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| PipelineError::Workspace {
                path: path.clone(),
                source,
            })?;
        info!("Workspace created: {}", path.display());
        Ok(Workspace { path: Some(path) })
    }
}

/// Removes a workspace tree. Never fails: a missing path is fine and any
/// other error is logged. Blocking; async callers go through [`Workspace`].
fn remove_tree(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => info!("Workspace removed: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Workspace already gone: {}", path.display());
        }
        Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
    }
}

/// Exclusive owner of one scratch directory. Dropping it removes the
/// directory, which covers panics, cancelled requests and aborted streams.
#[derive(Debug)]
pub struct Workspace {
    path: Option<PathBuf>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Removes the directory on the blocking pool and waits for it.
    pub async fn release(mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || remove_tree(&path)).await {
            error!("Workspace removal task failed: {}", e);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        // Large media trees must not stall a runtime worker
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_tree(&path));
            }
            Err(_) => remove_tree(&path),
        }
    }
}

/// Drop hands removal to the blocking pool, so give it a moment.
#[cfg(test)]
pub(crate) async fn wait_until_removed(path: &Path) {
    for _ in 0..200 {
        if !path.exists() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("{} was not removed", path.display());
}
