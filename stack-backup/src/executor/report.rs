//! What a pipeline run reports back to its caller.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::utils::errors::{BackupError, ErrorKind};

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Discover,
    SnapshotProject,
    StackDown,
    ExportVolumes,
    StackUp,
    AssembleArchive,
    Upload,
    Rotate,
    Cleanup,
}

impl Stage {
    /// The state entered after this one succeeds; `None` after `Cleanup`.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Discover => Some(Stage::SnapshotProject),
            Stage::SnapshotProject => Some(Stage::StackDown),
            Stage::StackDown => Some(Stage::ExportVolumes),
            Stage::ExportVolumes => Some(Stage::StackUp),
            Stage::StackUp => Some(Stage::AssembleArchive),
            Stage::AssembleArchive => Some(Stage::Upload),
            Stage::Upload => Some(Stage::Rotate),
            Stage::Rotate => Some(Stage::Cleanup),
            Stage::Cleanup => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discover => "discover",
            Stage::SnapshotProject => "snapshot-project",
            Stage::StackDown => "stack-down",
            Stage::ExportVolumes => "export-volumes",
            Stage::StackUp => "stack-up",
            Stage::AssembleArchive => "assemble-archive",
            Stage::Upload => "upload",
            Stage::Rotate => "rotate",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Problems that did not fail the run but must stay visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// The stack was stopped and could not be brought back up
    StackRestart(String),
    Rotation(String),
    Cleanup(String),
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::StackRestart(detail) => write!(f, "stack restart failed: {}", detail),
            PipelineWarning::Rotation(detail) => write!(f, "rotation incomplete: {}", detail),
            PipelineWarning::Cleanup(detail) => write!(f, "cleanup failed: {}", detail),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed { stage: Stage, error: BackupError },
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub project: String,
    pub run_id: Uuid,
    /// Final archive name; empty when the run failed before naming it
    pub archive_name: String,
    pub outcome: Outcome,
    pub warnings: Vec<PipelineWarning>,
    /// Workspace left on disk for manual recovery
    pub workspace: Option<PathBuf>,
    pub duration: Duration,
}

impl PipelineReport {
    /// A project turned away before its pipeline could start.
    pub fn rejected(project: impl Into<String>, error: BackupError) -> Self {
        Self {
            project: project.into(),
            run_id: Uuid::new_v4(),
            archive_name: String::new(),
            outcome: Outcome::Failed {
                stage: Stage::Discover,
                error,
            },
            warnings: Vec::new(),
            workspace: None,
            duration: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded)
    }

    pub fn error(&self) -> Option<&BackupError> {
        match &self.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(BackupError::kind)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed { stage, .. } => Some(*stage),
        }
    }

    pub fn restart_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, PipelineWarning::StackRestart(_)))
    }

    pub fn interrupted(&self) -> bool {
        self.error_kind() == Some(ErrorKind::Interrupted)
    }

    /// Succeeded and left no stack down.
    pub fn is_clean(&self) -> bool {
        self.succeeded() && !self.restart_failed()
    }

    /// One-line status for summaries.
    pub fn status(&self) -> String {
        match &self.outcome {
            Outcome::Succeeded if self.restart_failed() => "ok (stack down)".to_string(),
            Outcome::Succeeded if !self.warnings.is_empty() => "ok (warnings)".to_string(),
            Outcome::Succeeded => "ok".to_string(),
            Outcome::Failed { stage, error } => format!("{} at {}", error.kind(), stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: Outcome, warnings: Vec<PipelineWarning>) -> PipelineReport {
        PipelineReport {
            project: "wiki".into(),
            run_id: Uuid::new_v4(),
            archive_name: String::new(),
            outcome,
            warnings,
            workspace: None,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_stage_order() {
        let mut stages = vec![Stage::Discover];
        while let Some(next) = stages.last().and_then(|s| s.next()) {
            stages.push(next);
        }
        assert_eq!(stages.len(), 9);
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stages.last(), Some(&Stage::Cleanup));
    }

    #[test]
    fn test_restart_failure_is_not_clean() {
        let r = report(
            Outcome::Succeeded,
            vec![PipelineWarning::StackRestart("boom".into())],
        );
        assert!(r.succeeded());
        assert!(!r.is_clean());
        assert_eq!(r.status(), "ok (stack down)");
    }

    #[test]
    fn test_cleanup_failure_keeps_success_with_warning() {
        let mut r = report(
            Outcome::Succeeded,
            vec![PipelineWarning::Cleanup("/tmp/ws: busy".into())],
        );
        r.workspace = Some(PathBuf::from("/tmp/ws"));
        assert!(r.is_clean());
        assert_eq!(r.status(), "ok (warnings)");
    }

    #[test]
    fn test_rejected_report() {
        let r = PipelineReport::rejected("odd", BackupError::Configuration("bad name".into()));
        assert_eq!(r.failed_stage(), Some(Stage::Discover));
        assert_eq!(r.error_kind(), Some(ErrorKind::Configuration));
        assert!(r.workspace.is_none());
    }

    #[test]
    fn test_failed_status() {
        let r = report(
            Outcome::Failed {
                stage: Stage::Upload,
                error: BackupError::Transfer("offline".into()),
            },
            vec![],
        );
        assert!(!r.is_clean());
        assert_eq!(r.failed_stage(), Some(Stage::Upload));
        assert_eq!(r.status(), "TransferError at upload");
    }
}
