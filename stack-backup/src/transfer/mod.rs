//! Remote object store access.

pub mod rclone;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::utils::errors::Result;

pub use rclone::Rclone;

/// A folder on a configured remote, e.g. `s3backup:` + `stacks/wiki`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    /// Remote name, without the trailing colon
    pub remote: String,

    /// Folder inside the remote; empty for the remote root
    pub path: String,
}

impl RemoteLocation {
    pub fn new(remote: impl AsRef<str>, path: impl AsRef<str>) -> Self {
        Self {
            remote: remote.as_ref().trim_end_matches(':').to_string(),
            path: path.as_ref().trim_matches('/').to_string(),
        }
    }

    /// `remote:path`
    pub fn target(&self) -> String {
        format!("{}:{}", self.remote, self.path)
    }

    /// `remote:path/name`
    pub fn entry(&self, name: &str) -> String {
        if self.path.is_empty() {
            format!("{}:{}", self.remote, name)
        } else {
            format!("{}:{}/{}", self.remote, self.path, name)
        }
    }

    /// The sub-folder `segment` of this location.
    pub fn child(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        let path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", self.path, segment)
        };
        Self {
            remote: self.remote.clone(),
            path,
        }
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target())
    }
}

/// One object in a remote listing (the `rclone lsjson` shape).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEntry {
    /// Path relative to the listed folder
    #[serde(rename = "Path")]
    pub path: String,

    #[serde(rename = "Size", default)]
    pub size: i64,

    #[serde(rename = "IsDir", default)]
    pub is_dir: bool,
}

impl RemoteEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            is_dir: false,
        }
    }
}

/// Upload, list and delete against a remote.
#[async_trait]
pub trait RemoteTransfer: Send + Sync {
    /// Copy `local` to `location/name`.
    async fn upload(
        &self,
        local: &Path,
        location: &RemoteLocation,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Files directly inside `location`.
    async fn list(&self, location: &RemoteLocation) -> Result<Vec<RemoteEntry>>;

    /// Delete `location/entry`.
    async fn delete(&self, location: &RemoteLocation, entry: &str) -> Result<()>;
}
