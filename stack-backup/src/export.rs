//! Volume export: one gzip tarball per named volume, written into the run workspace.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::{volume_archive_name, RunTimestamp};
use crate::process;
use crate::utils::errors::{BackupError, Result};

/// Produces `workspace/file_name`, a gzip tar of the full contents of `volume`.
#[async_trait]
pub trait VolumeExporter: Send + Sync {
    async fn export_volume(
        &self,
        volume: &str,
        workspace: &Path,
        file_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Exports through a throwaway helper container that mounts the volume read-only.
#[derive(Debug, Clone)]
pub struct DockerVolumeExporter {
    docker: String,
    image: String,
}

impl DockerVolumeExporter {
    pub fn new(docker: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            image: image.into(),
        }
    }

    /// `docker run` arguments for exporting `volume` into `workspace/file_name`.
    pub fn run_args(&self, container: &str, volume: &str, workspace: &Path, file_name: &str) -> Vec<String> {
        let (uid, gid) = current_owner();
        let script = format!(
            "tar czf /backup/{file_name} -C /volume . && chown {uid}:{gid} /backup/{file_name}"
        );
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container.to_string(),
            "-v".to_string(),
            format!("{volume}:/volume:ro"),
            "-v".to_string(),
            format!("{}:/backup", workspace.display()),
            self.image.clone(),
            "sh".to_string(),
            "-c".to_string(),
            script,
        ]
    }

    async fn ensure_exists(&self, volume: &str) -> Result<()> {
        let args = vec!["volume".to_string(), "inspect".to_string(), volume.to_string()];
        let out = process::run(&self.docker, &args, None)
            .await
            .map_err(|e| BackupError::export(volume, e.to_string()))?;
        if !out.success() {
            return Err(BackupError::export(
                volume,
                format!("volume does not exist ({})", out.diagnostic()),
            ));
        }
        Ok(())
    }

    async fn force_remove(&self, container: &str) {
        let args = vec!["rm".to_string(), "-f".to_string(), container.to_string()];
        match process::run(&self.docker, &args, None).await {
            Ok(out) if out.success() => info!("Removed helper container {}", container),
            Ok(out) => warn!("Could not remove helper container {}: {}", container, out.diagnostic()),
            Err(e) => warn!("Could not remove helper container {}: {}", container, e),
        }
    }
}

#[async_trait]
impl VolumeExporter for DockerVolumeExporter {
    async fn export_volume(
        &self,
        volume: &str,
        workspace: &Path,
        file_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_exists(volume).await?;

        let container = format!("stack-backup-export-{}", uuid::Uuid::new_v4().simple());
        let args = self.run_args(&container, volume, workspace, file_name);

        let out = tokio::select! {
            result = process::run(&self.docker, &args, None) => {
                result.map_err(|e| BackupError::export(volume, e.to_string()))?
            }
            _ = cancel.cancelled() => {
                self.force_remove(&container).await;
                return Err(BackupError::Interrupted);
            }
        };

        if !out.success() {
            return Err(BackupError::export(volume, out.diagnostic()));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn current_owner() -> (u32, u32) {
    (
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    )
}

#[cfg(not(unix))]
fn current_owner() -> (u32, u32) {
    (0, 0)
}

/// Export every volume, in sorted order, into `workspace`.
///
/// The first failure aborts the remaining exports; the failed volume's
/// partial output is removed so the workspace only holds complete exports.
pub async fn export_all(
    exporter: &dyn VolumeExporter,
    volumes: &[String],
    workspace: &Path,
    at: RunTimestamp,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let mut ordered = volumes.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut exported = Vec::with_capacity(ordered.len());

    for volume in &ordered {
        if cancel.is_cancelled() {
            return Err(BackupError::Interrupted);
        }

        let file_name = volume_archive_name(volume, at);
        let dest = workspace.join(&file_name);
        info!("Exporting volume: {}", volume);

        let result = exporter
            .export_volume(volume, workspace, &file_name, cancel)
            .await
            .and_then(|()| {
                if dest.is_file() {
                    Ok(())
                } else {
                    Err(BackupError::export(
                        volume.as_str(),
                        format!("export produced no output at {}", dest.display()),
                    ))
                }
            });

        if let Err(e) = result {
            if dest.exists() {
                let _ = std::fs::remove_file(&dest);
            }
            return Err(e);
        }

        info!("Volume {} exported to: {}", volume, dest.display());
        exported.push(dest);
    }

    Ok(exported)
}
