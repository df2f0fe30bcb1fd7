//! Stack lifecycle: bringing a compose project down and back up.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::compose::Project;
use crate::process;
use crate::utils::errors::{BackupError, Result, StackAction};

/// Stops and starts a project's stack. Implementations never retry.
#[async_trait]
pub trait StackLifecycle: Send + Sync {
    /// Bring the stack down.
    async fn stop(&self, project: &Project) -> Result<()>;

    /// Bring the stack up, detached.
    async fn start(&self, project: &Project) -> Result<()>;
}

/// Drives the compose CLI (`docker compose` or `docker-compose`).
#[derive(Debug, Clone)]
pub struct ComposeStack {
    /// Program followed by its leading arguments, e.g. `["docker", "compose"]`
    command: Vec<String>,
}

impl ComposeStack {
    /// Use an explicit compose invocation.
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(BackupError::Configuration(
                "compose command must not be empty".into(),
            ));
        }
        Ok(Self { command })
    }

    /// Prefer the `docker compose` plugin, fall back to standalone `docker-compose`.
    pub async fn detect(docker_program: &str) -> Result<Self> {
        let candidates: [(&str, &[&str]); 2] =
            [(docker_program, &["compose"]), ("docker-compose", &[])];

        for (program, leading) in candidates {
            let mut command = vec![program.to_string()];
            command.extend(leading.iter().map(|s| s.to_string()));
            let mut args = command[1..].to_vec();
            args.push("version".to_string());

            match process::run(program, &args, None).await {
                Ok(out) if out.success() => {
                    info!("Using compose command: {}", command.join(" "));
                    return Ok(Self { command });
                }
                Ok(out) => warn!("{} unavailable: {}", command.join(" "), out.diagnostic()),
                Err(e) => warn!("{} unavailable: {}", command.join(" "), e),
            }
        }

        Err(BackupError::Configuration(
            "neither 'docker compose' nor 'docker-compose' is available".into(),
        ))
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Full argument vector (after the program) for `action` on `project`.
    pub fn args_for(&self, project: &Project, action: StackAction) -> Vec<String> {
        let mut args: Vec<String> = self.command[1..].to_vec();
        args.push("-f".to_string());
        args.push(project.compose_file.to_string_lossy().into_owned());
        match action {
            StackAction::Stop => args.push("down".to_string()),
            StackAction::Start => {
                args.push("up".to_string());
                args.push("-d".to_string());
            }
        }
        args
    }

    async fn invoke(&self, project: &Project, action: StackAction) -> Result<()> {
        let args = self.args_for(project, action);
        let failure = |detail: String| BackupError::StackControl {
            action,
            project: project.name.clone(),
            detail,
        };

        let out = process::run(&self.command[0], &args, Some(&project.dir))
            .await
            .map_err(|e| failure(e.to_string()))?;
        if !out.success() {
            return Err(failure(out.diagnostic()));
        }
        Ok(())
    }
}

#[async_trait]
impl StackLifecycle for ComposeStack {
    async fn stop(&self, project: &Project) -> Result<()> {
        self.invoke(project, StackAction::Stop).await
    }

    async fn start(&self, project: &Project) -> Result<()> {
        self.invoke(project, StackAction::Start).await
    }
}
