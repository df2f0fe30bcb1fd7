//! Utility modules shared by the backup workflow.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, ErrorKind, Result, StackAction};
