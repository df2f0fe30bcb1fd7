//! Deterministic artifact names.
//!
//! All names produced during one run embed the same [`RunTimestamp`], and the
//! timestamp format sorts lexicographically in chronological order.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// `YYYYMMDD-HHMMSS`, UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

const TIMESTAMP_LEN: usize = 15;
const ARCHIVE_EXTENSION: &str = ".zip";

/// The instant a pipeline run started, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunTimestamp(DateTime<Utc>);

impl RunTimestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

/// Final uploadable archive: `<project>-<timestamp>.zip`.
pub fn archive_name(project: &str, at: RunTimestamp) -> String {
    format!("{project}-{at}{ARCHIVE_EXTENSION}")
}

/// Zip of the project directory: `<project>-project-<timestamp>.zip`.
pub fn snapshot_name(project: &str, at: RunTimestamp) -> String {
    format!("{project}-project-{at}{ARCHIVE_EXTENSION}")
}

/// Compressed tar of one volume: `volume-<volume>-<timestamp>.tar.gz`.
pub fn volume_archive_name(volume: &str, at: RunTimestamp) -> String {
    format!("volume-{volume}-{at}.tar.gz")
}

/// Timestamp embedded in `name` if it is one of `project`'s archives.
///
/// Anything else in the same remote folder (other projects, stray files,
/// `<project>-project-...` snapshots) yields `None`.
pub fn parse_archive_timestamp(name: &str, project: &str) -> Option<NaiveDateTime> {
    let stamp = name
        .strip_prefix(project)?
        .strip_prefix('-')?
        .strip_suffix(ARCHIVE_EXTENSION)?;

    let well_formed = stamp.len() == TIMESTAMP_LEN
        && stamp.char_indices().all(|(i, c)| {
            if i == 8 {
                c == '-'
            } else {
                c.is_ascii_digit()
            }
        });
    if !well_formed {
        return None;
    }

    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}
