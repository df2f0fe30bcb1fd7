//! Backs up every project under a common root, one after the other.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::compose::project_identity;
use crate::executor::{BackupPipeline, BackupRequest, PipelineReport};
use crate::transfer::RemoteLocation;
use crate::utils::errors::{BackupError, Result};

/// Per-project outcomes of a run, in processing order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<PipelineReport>,
    /// Projects never attempted because of an interrupt
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn any_failed(&self) -> bool {
        self.reports.iter().any(|r| !r.succeeded()) || !self.skipped.is_empty()
    }

    /// Every project succeeded and every stopped stack is running again.
    pub fn all_clean(&self) -> bool {
        self.skipped.is_empty() && self.reports.iter().all(PipelineReport::is_clean)
    }

    pub fn interrupted(&self) -> bool {
        !self.skipped.is_empty() || self.reports.iter().any(PipelineReport::interrupted)
    }

    /// Human-readable table, one row per project.
    pub fn render(&self) -> String {
        let width = self
            .reports
            .iter()
            .map(|r| r.project.len())
            .chain(self.skipped.iter().map(String::len))
            .chain(std::iter::once("PROJECT".len()))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:<28}  DETAIL", "PROJECT", "STATUS");
        for report in &self.reports {
            let detail = match report.error() {
                Some(e) => e.to_string(),
                None => report.archive_name.clone(),
            };
            let _ = writeln!(out, "{:<width$}  {:<28}  {}", report.project, report.status(), detail);
            for warning in &report.warnings {
                let _ = writeln!(out, "{:<width$}  {:<28}  {}", "", "", warning);
            }
            if let Some(ws) = &report.workspace {
                let _ = writeln!(out, "{:<width$}  {:<28}  workspace kept at {}", "", "", ws.display());
            }
        }
        for name in &self.skipped {
            let _ = writeln!(out, "{:<width$}  {:<28}  not attempted", name, "skipped");
        }
        out
    }
}

/// Immediate subdirectories of `root`, sorted by name.
pub fn list_project_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        BackupError::Configuration(format!(
            "cannot read projects root {}: {}",
            root.display(),
            e
        ))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    if dirs.is_empty() {
        return Err(BackupError::Configuration(format!(
            "no project directories under {}",
            root.display()
        )));
    }
    Ok(dirs)
}

/// Run `pipeline` for every project under `root`, uploading each to
/// `prefix/<project identity>`. A failing project never stops the batch;
/// an interrupt does.
pub async fn run_all(
    pipeline: &BackupPipeline,
    root: &Path,
    prefix: &RemoteLocation,
    keep: usize,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    let dirs = list_project_dirs(root)?;
    info!("Found {} project directories under {}", dirs.len(), root.display());

    let mut summary = BatchSummary::default();
    for dir in dirs {
        let label = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        if cancel.is_cancelled() {
            summary.skipped.push(label);
            continue;
        }

        let identity = match project_identity(&dir) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Project {} failed: {}", label, e);
                summary.reports.push(PipelineReport::rejected(label, e));
                continue;
            }
        };

        let request = BackupRequest {
            remote: prefix.child(&identity),
            project_dir: dir,
            keep,
        };
        let report = pipeline.run(&request).await;
        if !report.succeeded() {
            warn!("Project {} failed: {}", report.project, report.status());
        }
        summary.reports.push(report);
    }

    if !summary.skipped.is_empty() {
        warn!("Interrupted; skipped {} project(s)", summary.skipped.len());
    }
    Ok(summary)
}
