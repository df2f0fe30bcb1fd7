//! Stack Backup Library
//!
//! Point-in-time backups of compose stacks: project files plus every named
//! volume, bundled into one zip, uploaded with rclone and rotated by count.

pub mod archive;
pub mod compose;
pub mod config;
pub mod executor;
pub mod export;
pub mod fs;
pub mod process;
pub mod rotation;
pub mod runner;
pub mod shutdown;
pub mod stack;
pub mod transfer;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use executor::{Backends, BackupPipeline, BackupRequest, PipelineReport, PipelineSettings};
pub use utils::errors::{BackupError, ErrorKind};
pub type Result<T> = std::result::Result<T, BackupError>;
