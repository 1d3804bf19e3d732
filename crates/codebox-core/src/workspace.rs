//! Per-request scratch directories
//!
//! A `Workspace` owns a `tempfile::TempDir`; the directory and everything the
//! sandbox wrote into it are removed when the value is dropped, on every exit
//! path of the caller. `close` does the same but reports failures, which the
//! drop guard cannot.

use crate::errors::CodeboxError;
use crate::request::ExecutionRequest;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub const WORKSPACE_PREFIX: &str = "codebox-";

/// Staged source for exactly one request.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    source_path: PathBuf,
    request_id: Uuid,
    owner: Option<String>,
}

impl Workspace {
    pub fn root_path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// `uid:gid` owning the directory. The sandbox runs as this user so that
    /// anything it creates can be removed afterwards.
    pub fn owner(&self) -> Option<String> {
        self.owner.clone()
    }

    /// Remove the directory now.
    pub fn close(self) -> Result<(), CodeboxError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            CodeboxError::staging(format!(
                "Failed to remove workspace {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Host side of the bind mount. Docker bind specs are plain strings.
    pub fn host_path_str(&self) -> Result<&str, CodeboxError> {
        self.dir
            .path()
            .to_str()
            .ok_or_else(|| CodeboxError::staging("Workspace path is not valid UTF-8"))
    }
}

/// Allocates workspaces under one parent directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    parent_dir: PathBuf,
    file_name: String,
}

impl WorkspaceManager {
    pub fn new(parent_dir: Option<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            parent_dir: parent_dir.unwrap_or_else(std::env::temp_dir),
            file_name: file_name.into(),
        }
    }

    pub async fn stage(&self, request: &ExecutionRequest) -> Result<Workspace, CodeboxError> {
        fs::create_dir_all(&self.parent_dir).await.map_err(|e| {
            CodeboxError::staging(format!(
                "Failed to create workspace parent {}: {}",
                self.parent_dir.display(),
                e
            ))
        })?;

        let dir = Builder::new()
            .prefix(&format!("{}{}-", WORKSPACE_PREFIX, request.short_id()))
            .tempdir_in(&self.parent_dir)
            .map_err(|e| CodeboxError::staging(format!("Failed to create workspace: {}", e)))?;

        // From here on `dir` is dropped (and removed) if any step fails.
        let source_path = dir.path().join(&self.file_name);
        let mut file = fs::File::create(&source_path).await.map_err(|e| {
            CodeboxError::staging(format!("Failed to create {}: {}", source_path.display(), e))
        })?;
        file.write_all(request.source_text().as_bytes())
            .await
            .map_err(|e| CodeboxError::staging(format!("Failed to write source: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| CodeboxError::staging(format!("Failed to flush source: {}", e)))?;

        // Rootless engines may map the container user to another host uid.
        #[cfg(unix)]
        let owner = {
            use std::os::unix::fs::{MetadataExt, PermissionsExt};
            fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))
                .await
                .map_err(|e| CodeboxError::staging(format!("Failed to open up workspace: {}", e)))?;
            fs::set_permissions(&source_path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| CodeboxError::staging(format!("Failed to open up source: {}", e)))?;
            let meta = fs::metadata(dir.path())
                .await
                .map_err(|e| CodeboxError::staging(format!("Failed to inspect workspace: {}", e)))?;
            Some(format!("{}:{}", meta.uid(), meta.gid()))
        };
        #[cfg(not(unix))]
        let owner = None;

        log::debug!(
            "Staged request {} into {}",
            request.id(),
            dir.path().display()
        );

        Ok(Workspace {
            dir,
            source_path,
            request_id: request.id(),
            owner,
        })
    }
}
