//! Backup pipeline: one project, from declaration to uploaded archive.
//!
//! The run is an explicit state machine over [`Stage`]. Any failure moves to
//! the failed exit, which restarts the stack if it was stopped and not yet
//! started again, then keeps the workspace on disk.

pub mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::{archive_name, bundle_files, snapshot_name, zip_directory, RunTimestamp};
use crate::compose::{discover_volumes, unnamed_volume_keys, Project};
use crate::export::{export_all, VolumeExporter};
use crate::rotation;
use crate::stack::StackLifecycle;
use crate::transfer::{RemoteLocation, RemoteTransfer};
use crate::utils::errors::{BackupError, Result};

pub use report::{Outcome, PipelineReport, PipelineWarning, Stage};

/// One project to back up.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub project_dir: PathBuf,
    /// Folder receiving this project's archives
    pub remote: RemoteLocation,
    pub keep: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Parent of per-run workspaces; must not be inside any project
    pub workspace_root: PathBuf,
}

/// The external collaborators a pipeline drives.
#[derive(Clone)]
pub struct Backends {
    pub stack: Arc<dyn StackLifecycle>,
    pub exporter: Arc<dyn VolumeExporter>,
    pub transfer: Arc<dyn RemoteTransfer>,
}

/// Everything one run accumulates; owned by that run alone.
struct RunContext {
    at: RunTimestamp,
    project: Option<Project>,
    volumes: Vec<String>,
    workspace: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    exports: Vec<PathBuf>,
    archive: Option<PathBuf>,
    stack_stopped: bool,
    start_attempted: bool,
    warnings: Vec<PipelineWarning>,
}

impl RunContext {
    fn new(at: RunTimestamp) -> Self {
        Self {
            at,
            project: None,
            volumes: Vec::new(),
            workspace: None,
            snapshot: None,
            exports: Vec::new(),
            archive: None,
            stack_stopped: false,
            start_attempted: false,
            warnings: Vec::new(),
        }
    }

    fn project(&self) -> Result<&Project> {
        self.project
            .as_ref()
            .ok_or_else(|| BackupError::Configuration("project not discovered".into()))
    }

    fn workspace(&self) -> Result<&Path> {
        self.workspace
            .as_deref()
            .ok_or_else(|| BackupError::Archive("workspace not created".into()))
    }
}

pub struct BackupPipeline {
    backends: Backends,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl BackupPipeline {
    pub fn new(backends: Backends, settings: PipelineSettings, cancel: CancellationToken) -> Self {
        Self {
            backends,
            settings,
            cancel,
        }
    }

    /// Run the pipeline for one project. Never panics on backend failure;
    /// the outcome is in the returned report.
    pub async fn run(&self, request: &BackupRequest) -> PipelineReport {
        let run_id = Uuid::new_v4();
        let label = request
            .project_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.project_dir.display().to_string());
        let span = info_span!("backup", project = %label, run_id = %run_id);

        self.execute(request, run_id, label).instrument(span).await
    }

    async fn execute(&self, request: &BackupRequest, run_id: Uuid, label: String) -> PipelineReport {
        let started = Instant::now();
        let mut ctx = RunContext::new(RunTimestamp::now());
        info!("Starting backup of {} (timestamp {})", request.project_dir.display(), ctx.at);

        let mut stage = Stage::Discover;
        let failure = loop {
            // Start is never skipped once the stack is down
            if stage != Stage::StackUp && self.cancel.is_cancelled() {
                break Some((stage, BackupError::Interrupted));
            }

            info!("Stage {}", stage);
            match self.enter(stage, &mut ctx, request).await {
                Ok(()) => match stage.next() {
                    Some(next) => stage = next,
                    None => break None,
                },
                Err(e) => break Some((stage, e)),
            }
        };

        let outcome = match failure {
            None => Outcome::Succeeded,
            Some((stage, error)) => {
                error!("Backup failed at {}: {}", stage, error);
                self.restart_after_failure(&mut ctx).await;
                Outcome::Failed { stage, error }
            }
        };

        let workspace = ctx.workspace.take().filter(|ws| ws.exists());
        if let Some(ws) = &workspace {
            warn!("Workspace retained at {}", ws.display());
        }
        for warning in &ctx.warnings {
            warn!("{}", warning);
        }

        let project = ctx.project.as_ref().map(|p| p.name.clone()).unwrap_or(label);
        let archive_name = if ctx.project.is_some() {
            archive_name(&project, ctx.at)
        } else {
            String::new()
        };

        if matches!(outcome, Outcome::Succeeded) {
            info!(
                "Backup of {} complete: {} in {:.1}s",
                project,
                request.remote.entry(&archive_name),
                started.elapsed().as_secs_f64()
            );
        }

        PipelineReport {
            project,
            run_id,
            archive_name,
            outcome,
            warnings: ctx.warnings,
            workspace,
            duration: started.elapsed(),
        }
    }

    /// Transition function: perform `stage` against the run context.
    async fn enter(&self, stage: Stage, ctx: &mut RunContext, request: &BackupRequest) -> Result<()> {
        match stage {
            Stage::Discover => self.discover(ctx, request),
            Stage::SnapshotProject => self.snapshot_project(ctx).await,
            Stage::StackDown => {
                let project = ctx.project()?;
                info!("Stopping stack {}", project.name);
                self.backends.stack.stop(project).await?;
                ctx.stack_stopped = true;
                Ok(())
            }
            Stage::ExportVolumes => {
                if ctx.volumes.is_empty() {
                    info!("No named volumes to export");
                    return Ok(());
                }
                let exports = export_all(
                    self.backends.exporter.as_ref(),
                    &ctx.volumes,
                    ctx.workspace()?,
                    ctx.at,
                    &self.cancel,
                )
                .await?;
                ctx.exports = exports;
                Ok(())
            }
            Stage::StackUp => {
                self.start_stack(ctx).await;
                Ok(())
            }
            Stage::AssembleArchive => {
                let snapshot = ctx
                    .snapshot
                    .clone()
                    .ok_or_else(|| BackupError::Archive("project snapshot missing".into()))?;
                let mut files = vec![snapshot];
                files.extend(ctx.exports.iter().cloned());

                let dest = ctx.workspace()?.join(archive_name(&ctx.project()?.name, ctx.at));
                let target = dest.clone();
                run_blocking(move || bundle_files(&files, &target)).await?;
                ctx.archive = Some(dest);
                Ok(())
            }
            Stage::Upload => {
                let archive = ctx
                    .archive
                    .as_deref()
                    .ok_or_else(|| BackupError::Archive("archive not assembled".into()))?;
                let name = archive_name(&ctx.project()?.name, ctx.at);
                info!("Uploading {} to {}", name, request.remote);
                self.backends
                    .transfer
                    .upload(archive, &request.remote, &name, &self.cancel)
                    .await
            }
            Stage::Rotate => {
                let project = ctx.project()?.name.clone();
                if let Err(e) = rotation::rotate(
                    self.backends.transfer.as_ref(),
                    &request.remote,
                    &project,
                    request.keep,
                )
                .await
                {
                    ctx.warnings.push(PipelineWarning::Rotation(e.to_string()));
                }
                Ok(())
            }
            Stage::Cleanup => {
                if let Some(ws) = ctx.workspace.clone() {
                    match std::fs::remove_dir_all(&ws) {
                        Ok(()) => {
                            info!("Removed workspace {}", ws.display());
                            ctx.workspace = None;
                        }
                        Err(e) => ctx.warnings.push(PipelineWarning::Cleanup(format!(
                            "{}: {}",
                            ws.display(),
                            e
                        ))),
                    }
                }
                Ok(())
            }
        }
    }

    fn discover(&self, ctx: &mut RunContext, request: &BackupRequest) -> Result<()> {
        if request.keep < 1 {
            return Err(BackupError::Configuration(
                "retention count must be at least 1".into(),
            ));
        }

        let project = Project::load(&request.project_dir)?;
        let root = resolve(&self.settings.workspace_root);
        if root.starts_with(&project.dir) {
            return Err(BackupError::Configuration(format!(
                "workspace directory {} lies inside project {}",
                root.display(),
                project.dir.display()
            )));
        }

        let declaration = project.read_declaration()?;
        let volumes = discover_volumes(&declaration)?;
        for key in unnamed_volume_keys(&declaration) {
            warn!(
                "Volume '{}' has no explicit name; compose creates it as '{}_{}'. \
                 Set `name:` under top-level volumes if the export cannot find it",
                key, project.name, key
            );
        }
        info!(
            "Project {} ({}): {} named volume(s) {:?}",
            project.name,
            project.compose_file.display(),
            volumes.len(),
            volumes
        );

        ctx.volumes = volumes;
        ctx.project = Some(project);
        Ok(())
    }

    async fn snapshot_project(&self, ctx: &mut RunContext) -> Result<()> {
        let project = ctx.project()?;
        let workspace = self.settings.workspace_root.join(format!(
            "stack-backup-{}-{}-{}",
            project.name,
            ctx.at,
            &Uuid::new_v4().simple().to_string()[..8]
        ));
        std::fs::create_dir_all(&self.settings.workspace_root)?;
        std::fs::create_dir(&workspace)?;
        info!("Workspace {}", workspace.display());

        let dest = workspace.join(snapshot_name(&project.name, ctx.at));
        let project_dir = project.dir.clone();
        ctx.workspace = Some(workspace);

        let target = dest.clone();
        run_blocking(move || zip_directory(&project_dir, &target)).await?;
        ctx.snapshot = Some(dest);
        Ok(())
    }

    async fn start_stack(&self, ctx: &mut RunContext) {
        let Some(project) = ctx.project.as_ref() else {
            return;
        };
        ctx.start_attempted = true;
        info!("Starting stack {}", project.name);
        if let Err(e) = self.backends.stack.start(project).await {
            error!("Stack {} is DOWN: {}", project.name, e);
            ctx.warnings.push(PipelineWarning::StackRestart(e.to_string()));
        }
    }

    async fn restart_after_failure(&self, ctx: &mut RunContext) {
        if ctx.stack_stopped && !ctx.start_attempted {
            warn!("Restarting stack after failure");
            self.start_stack(ctx).await;
        }
    }
}

/// Run archive work off the async runtime threads.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BackupError::Archive(format!("archive task failed: {}", e)))?
}

/// Canonical form of `path`, resolving through its parent when it does not exist yet.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(real) = path.canonicalize() {
        return real;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => resolve(parent).join(name),
        _ => path.to_path_buf(),
    }
}
