//! Zip assembly.
//!
//! Archives are written to `<dest>.partial` and renamed into place only once
//! complete, so `dest` either exists in full or not at all.

use chrono::{Datelike, Local, Timelike};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::fs::walker::{calculate_total_size, walk_directory, EntryKind};
use crate::utils::errors::{BackupError, Result};

/// Entries above this size need zip64 records.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// What went into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Recursively archive everything under `source` into `dest`, preserving relative paths.
pub fn zip_directory(source: &Path, dest: &Path) -> Result<ArchiveSummary> {
    let entries = walk_directory(source).map_err(|e| {
        BackupError::Archive(format!("cannot walk {}: {}", source.display(), e))
    })?;
    let bytes = calculate_total_size(&entries);

    write_atomically(dest, |zip| {
        for entry in &entries {
            let name = entry.archive_name();
            let mut options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(entry.size >= ZIP64_THRESHOLD);
            if let Some(mode) = entry.permissions {
                options = options.unix_permissions(mode);
            }
            if let Some(stamp) = entry.modified.and_then(zip_timestamp) {
                options = options.last_modified_time(stamp);
            }

            match &entry.kind {
                EntryKind::Dir => zip.add_directory(name, options)?,
                EntryKind::File => {
                    zip.start_file(name, options)?;
                    let mut file = File::open(&entry.path)?;
                    io::copy(&mut file, zip)?;
                }
                EntryKind::Symlink { target } => {
                    zip.add_symlink(name, target.to_string_lossy().into_owned(), options)?
                }
            }
        }
        Ok(())
    })?;

    info!(
        "Zipped {} ({} entries, {} bytes) into {}",
        source.display(),
        entries.len(),
        bytes,
        dest.display()
    );

    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        entries: entries.len(),
        bytes,
    })
}

/// Store `files` side by side at the top level of `dest`.
///
/// Inputs are already compressed, so they are stored without recompression.
pub fn bundle_files(files: &[PathBuf], dest: &Path) -> Result<ArchiveSummary> {
    let mut bytes = 0u64;

    write_atomically(dest, |zip| {
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{} has no file name", path.display()),
                    )
                })?;
            let mut file = File::open(path)?;
            let size = file.metadata()?.len();

            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .large_file(size >= ZIP64_THRESHOLD);
            debug!("Adding {} ({} bytes)", name, size);
            zip.start_file(name, options)?;
            io::copy(&mut file, zip)?;
            bytes += size;
        }
        Ok(())
    })?;

    info!(
        "Bundled {} artifacts ({} bytes) into {}",
        files.len(),
        bytes,
        dest.display()
    );

    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        entries: files.len(),
        bytes,
    })
}

/// Path of the in-progress file for `dest`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

fn write_atomically<F>(dest: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut ZipWriter<BufWriter<File>>) -> ZipResult<()>,
{
    let partial = partial_path(dest);

    let result = (|| -> ZipResult<()> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(&partial)?));
        fill(&mut zip)?;
        let file = zip.finish()?.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        std::fs::rename(&partial, dest)?;
        Ok(())
    })();

    result.map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        BackupError::Archive(format!("cannot write {}: {}", dest.display(), e))
    })
}

/// Zip timestamps are local time with 2-second resolution, 1980..=2107.
fn zip_timestamp(at: SystemTime) -> Option<zip::DateTime> {
    let local: chrono::DateTime<Local> = at.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}
