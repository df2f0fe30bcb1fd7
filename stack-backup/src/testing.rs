//! In-memory stand-ins for docker, compose and rclone used by unit tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::compose::Project;
use crate::export::VolumeExporter;
use crate::stack::StackLifecycle;
use crate::transfer::{RemoteEntry, RemoteLocation, RemoteTransfer};
use crate::utils::errors::{BackupError, Result, StackAction};

/// Ordered log of side effects shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Debug, Default)]
pub struct FakeStack {
    journal: Journal,
    fail_stop: bool,
    fail_start: bool,
}

impl FakeStack {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn act(&self, project: &Project, action: StackAction, fail: bool) -> Result<()> {
        self.journal.record(format!("{}:{}", action, project.name));
        if fail {
            return Err(BackupError::StackControl {
                action,
                project: project.name.clone(),
                detail: "simulated failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StackLifecycle for FakeStack {
    async fn stop(&self, project: &Project) -> Result<()> {
        self.act(project, StackAction::Stop, self.fail_stop)
    }

    async fn start(&self, project: &Project) -> Result<()> {
        self.act(project, StackAction::Start, self.fail_start)
    }
}

/// Writes a small file per exported volume.
#[derive(Debug, Default)]
pub struct FakeExporter {
    journal: Journal,
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
    cancel_on: Option<(String, CancellationToken)>,
    silent: bool,
}

impl FakeExporter {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Leaves partial output for `volume` behind, then fails.
    pub fn failing_on(volume: &str) -> Self {
        Self {
            fail_on: Some(volume.to_string()),
            ..Default::default()
        }
    }

    /// Reports success without producing any output.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Default::default()
        }
    }

    pub fn fail_on(mut self, volume: &str) -> Self {
        self.fail_on = Some(volume.to_string());
        self
    }

    /// Fires `token` while exporting `volume`, as a signal arriving mid-export would.
    pub fn cancel_on(mut self, volume: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((volume.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VolumeExporter for FakeExporter {
    async fn export_volume(
        &self,
        volume: &str,
        workspace: &Path,
        file_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(volume.to_string());
        self.journal.record(format!("export:{}", volume));

        if let Some((target, token)) = &self.cancel_on {
            if target == volume {
                token.cancel();
            }
        }
        if cancel.is_cancelled() {
            return Err(BackupError::Interrupted);
        }

        if self.silent {
            return Ok(());
        }
        std::fs::write(workspace.join(file_name), format!("tar of {}", volume))?;

        if self.fail_on.as_deref() == Some(volume) {
            return Err(BackupError::export(volume, "simulated failure"));
        }
        Ok(())
    }
}

/// A remote kept in memory, keyed by location target.
#[derive(Debug, Default)]
pub struct FakeTransfer {
    journal: Journal,
    store: Mutex<BTreeMap<String, BTreeSet<String>>>,
    fail_upload: bool,
    cancel_on_upload: Option<CancellationToken>,
    fail_list: bool,
    fail_delete: BTreeSet<String>,
}

impl FakeTransfer {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// Fires `token` once an upload begins, as a signal arriving mid-transfer would.
    pub fn cancel_on_upload(mut self, token: CancellationToken) -> Self {
        self.cancel_on_upload = Some(token);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_delete(mut self, names: &[&str]) -> Self {
        self.fail_delete = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn seed(&self, location: &RemoteLocation, names: &[&str]) {
        let mut store = self.store.lock().unwrap();
        let folder = store.entry(location.target()).or_default();
        folder.extend(names.iter().map(|n| n.to_string()));
    }

    /// Files at `location`, sorted by name.
    pub fn remote_files(&self, location: &RemoteLocation) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .get(&location.target())
            .map(|folder| folder.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteTransfer for FakeTransfer {
    async fn upload(
        &self,
        local: &Path,
        location: &RemoteLocation,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.journal.record(format!("upload:{}", location.entry(name)));
        if let Some(token) = &self.cancel_on_upload {
            token.cancel();
        }
        if cancel.is_cancelled() {
            return Err(BackupError::Interrupted);
        }
        if self.fail_upload {
            return Err(BackupError::Transfer("simulated upload failure".into()));
        }
        if !local.is_file() {
            return Err(BackupError::Transfer(format!(
                "{} does not exist",
                local.display()
            )));
        }
        self.seed(location, &[name]);
        Ok(())
    }

    async fn list(&self, location: &RemoteLocation) -> Result<Vec<RemoteEntry>> {
        self.journal.record(format!("list:{}", location));
        if self.fail_list {
            return Err(BackupError::Transfer("simulated listing failure".into()));
        }
        // Reverse order so callers cannot rely on the backend sorting for them
        let mut files = self.remote_files(location);
        files.reverse();
        Ok(files.into_iter().map(RemoteEntry::file).collect())
    }

    async fn delete(&self, location: &RemoteLocation, entry: &str) -> Result<()> {
        self.journal.record(format!("delete:{}", location.entry(entry)));
        if self.fail_delete.contains(entry) {
            return Err(BackupError::Transfer(format!(
                "simulated failure deleting {}",
                entry
            )));
        }
        let mut store = self.store.lock().unwrap();
        if let Some(folder) = store.get_mut(&location.target()) {
            folder.remove(entry);
        }
        Ok(())
    }
}
