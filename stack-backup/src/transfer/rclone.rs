//! rclone-backed remote transfer.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{RemoteEntry, RemoteLocation, RemoteTransfer};
use crate::process;
use crate::utils::errors::{BackupError, Result};

/// Shells out to `rclone`; remote configuration and auth are rclone's business.
#[derive(Debug, Clone)]
pub struct Rclone {
    program: String,
    extra_args: Vec<String>,
}

impl Rclone {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    pub fn upload_args(&self, local: &Path, location: &RemoteLocation, name: &str) -> Vec<String> {
        self.with_extra(vec![
            "copyto".to_string(),
            local.to_string_lossy().into_owned(),
            location.entry(name),
        ])
    }

    pub fn list_args(&self, location: &RemoteLocation) -> Vec<String> {
        self.with_extra(vec![
            "lsjson".to_string(),
            location.target(),
            "--files-only".to_string(),
        ])
    }

    pub fn delete_args(&self, location: &RemoteLocation, entry: &str) -> Vec<String> {
        self.with_extra(vec!["deletefile".to_string(), location.entry(entry)])
    }

    fn with_extra(&self, mut args: Vec<String>) -> Vec<String> {
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn call(&self, args: &[String]) -> Result<process::CommandOutput> {
        let out = process::run(&self.program, args, None)
            .await
            .map_err(|e| BackupError::Transfer(format!("cannot run {}: {}", self.program, e)))?;
        if !out.success() {
            return Err(BackupError::Transfer(format!(
                "{} failed: {}",
                process::render(&self.program, args),
                out.diagnostic()
            )));
        }
        Ok(out)
    }
}

/// Parse `rclone lsjson` output.
pub fn parse_listing(stdout: &str) -> Result<Vec<RemoteEntry>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(stdout)
        .map_err(|e| BackupError::Transfer(format!("unexpected rclone listing: {}", e)))
}

#[async_trait]
impl RemoteTransfer for Rclone {
    async fn upload(
        &self,
        local: &Path,
        location: &RemoteLocation,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = self.upload_args(local, location, name);
        tokio::select! {
            result = self.call(&args) => result?,
            _ = cancel.cancelled() => return Err(BackupError::Interrupted),
        };
        info!("Uploaded {} to {}", local.display(), location.entry(name));
        Ok(())
    }

    async fn list(&self, location: &RemoteLocation) -> Result<Vec<RemoteEntry>> {
        let out = self.call(&self.list_args(location)).await?;
        parse_listing(&out.stdout)
    }

    async fn delete(&self, location: &RemoteLocation, entry: &str) -> Result<()> {
        self.call(&self.delete_args(location, entry)).await?;
        Ok(())
    }
}
