//! Count-based retention of remote archives.
//!
//! Ordering comes from the timestamp embedded in each archive name, never
//! from remote modification times, which differ between backends.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::archive::parse_archive_timestamp;
use crate::transfer::{RemoteEntry, RemoteLocation, RemoteTransfer};
use crate::utils::errors::{BackupError, Result};

/// Which of a project's remote archives survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
    /// Newest archives, oldest first
    pub retained: Vec<String>,
    /// Archives to delete, oldest first
    pub expired: Vec<String>,
}

/// Outcome of a rotation that completed without deletion failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSummary {
    pub retained: usize,
    pub deleted: Vec<String>,
}

/// Decide which archives of `project` to delete so that only the newest `keep` remain.
///
/// Entries that are not `<project>-YYYYMMDD-HHMMSS.zip` files are ignored.
pub fn plan_rotation(entries: &[RemoteEntry], project: &str, keep: usize) -> Result<RotationPlan> {
    if keep < 1 {
        return Err(BackupError::Configuration(
            "retention count must be at least 1".into(),
        ));
    }

    let mut archives: Vec<(NaiveDateTime, &str)> = entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .filter_map(|entry| {
            parse_archive_timestamp(&entry.path, project).map(|at| (at, entry.path.as_str()))
        })
        .collect();
    archives.sort();
    archives.dedup();

    let cut = archives.len().saturating_sub(keep);
    let (expired, retained) = archives.split_at(cut);

    Ok(RotationPlan {
        retained: retained.iter().map(|(_, name)| name.to_string()).collect(),
        expired: expired.iter().map(|(_, name)| name.to_string()).collect(),
    })
}

/// Enforce retention for `project` at `location`.
///
/// Every expired archive is attempted; failures are collected and reported
/// together as a single [`BackupError::Rotation`].
pub async fn rotate(
    transfer: &dyn RemoteTransfer,
    location: &RemoteLocation,
    project: &str,
    keep: usize,
) -> Result<RotationSummary> {
    info!("Listing backups at {} ...", location);
    let entries = transfer.list(location).await.map_err(|e| BackupError::Rotation {
        failures: vec![format!("cannot list {}: {}", location, e)],
    })?;

    let plan = plan_rotation(&entries, project, keep)?;
    if plan.expired.is_empty() {
        info!(
            "Found {} backups; nothing to delete (keep={})",
            plan.retained.len(),
            keep
        );
        return Ok(RotationSummary {
            retained: plan.retained.len(),
            deleted: Vec::new(),
        });
    }

    info!(
        "Keeping newest {} backups, deleting {} older backups",
        plan.retained.len(),
        plan.expired.len()
    );

    let mut deleted = Vec::new();
    let mut failures = Vec::new();
    for name in plan.expired {
        match transfer.delete(location, &name).await {
            Ok(()) => {
                info!("Deleted {}", location.entry(&name));
                deleted.push(name);
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", location.entry(&name), e);
                failures.push(format!("{}: {}", name, e));
            }
        }
    }

    if !failures.is_empty() {
        return Err(BackupError::Rotation { failures });
    }

    Ok(RotationSummary {
        retained: plan.retained.len(),
        deleted,
    })
}
