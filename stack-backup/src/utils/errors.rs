//! Error kinds for the backup workflow.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Stack control error ({action} {project}): {detail}")]
    StackControl {
        action: StackAction,
        project: String,
        detail: String,
    },

    #[error("Export error (volume {volume}): {detail}")]
    Export { volume: String, detail: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Rotation error: {}", .failures.join("; "))]
    Rotation { failures: Vec<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interrupted")]
    Interrupted,
}

/// Which side of the stop/start bracket failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Stop,
    Start,
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackAction::Stop => f.write_str("stop"),
            StackAction::Start => f.write_str("start"),
        }
    }
}

/// Copyable discriminant of [`BackupError`], used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    StackControl,
    Export,
    Archive,
    Transfer,
    Rotation,
    Io,
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::StackControl => "StackControlError",
            ErrorKind::Export => "ExportError",
            ErrorKind::Archive => "ArchiveError",
            ErrorKind::Transfer => "TransferError",
            ErrorKind::Rotation => "RotationError",
            ErrorKind::Io => "IoError",
            ErrorKind::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Configuration(_) => ErrorKind::Configuration,
            BackupError::StackControl { .. } => ErrorKind::StackControl,
            BackupError::Export { .. } => ErrorKind::Export,
            BackupError::Archive(_) => ErrorKind::Archive,
            BackupError::Transfer(_) => ErrorKind::Transfer,
            BackupError::Rotation { .. } => ErrorKind::Rotation,
            BackupError::Io(_) => ErrorKind::Io,
            BackupError::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub fn export(volume: impl Into<String>, detail: impl Into<String>) -> Self {
        BackupError::Export {
            volume: volume.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
