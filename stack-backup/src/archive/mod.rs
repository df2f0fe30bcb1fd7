//! Archive building: artifact names and zip assembly.

pub mod builder;
pub mod naming;

pub use builder::{bundle_files, zip_directory, ArchiveSummary};
pub use naming::{
    archive_name, parse_archive_timestamp, snapshot_name, volume_archive_name, RunTimestamp,
};
