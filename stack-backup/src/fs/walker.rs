//! Directory traversal for project snapshots.
//!
//! Every regular file, directory and symbolic link under the root is reported
//! (hidden files and VCS directories included); links are never followed.
//! Sockets, FIFOs and device nodes are skipped: they hold no data to archive
//! and opening a FIFO would block.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// What kind of filesystem object an entry is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink { target: PathBuf },
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// Size in bytes (0 for directories and links)
    pub size: u64,

    pub kind: EntryKind,

    /// Unix mode bits, when the platform has them
    pub permissions: Option<u32>,

    /// Last modification time
    pub modified: Option<std::time::SystemTime>,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        // walkdir does not follow links, so this is the link's own metadata
        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let kind = if metadata.file_type().is_symlink() {
            EntryKind::Symlink {
                target: std::fs::read_link(&path)?,
            }
        } else if metadata.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            path,
            relative_path,
            kind,
            permissions,
            modified: metadata.modified().ok(),
        })
    }

    /// Relative path with `/` separators, as stored in archives.
    pub fn archive_name(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walk a directory tree and collect every entry below the root, sorted by path.
///
/// # Example
/// ```no_run
/// use stack_backup::fs::walker::walk_directory;
/// use std::path::Path;
///
/// let entries = walk_directory(Path::new("/srv/wiki")).unwrap();
/// println!("Found {} entries", entries.len());
/// ```
pub fn walk_directory(root: &Path) -> std::io::Result<Vec<FileInfo>> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
            warn!("Skipping special file {}", entry.path().display());
            continue;
        }
        entries.push(FileInfo::from_entry(&entry, root)?);
    }

    Ok(entries)
}

/// Calculate total size of all regular files in a directory
pub fn calculate_total_size(entries: &[FileInfo]) -> u64 {
    entries.iter().map(|e| e.size).sum()
}
