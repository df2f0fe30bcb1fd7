//! Configuration management for stack-backup.
//!
//! Built-in defaults, then an optional TOML file, then `STACK_BACKUP__*`
//! environment variables (e.g. `STACK_BACKUP__RCLONE__PROGRAM`).

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::errors::{BackupError, Result};

pub const ENV_PREFIX: &str = "STACK_BACKUP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub rclone: RcloneConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker CLI binary
    #[serde(default = "default_docker_program")]
    pub program: String,

    /// Explicit compose invocation, e.g. `["docker-compose"]`. Auto-detected when unset.
    #[serde(default)]
    pub compose_command: Option<Vec<String>>,

    /// Image used for the throwaway volume export container
    #[serde(default = "default_helper_image")]
    pub helper_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcloneConfig {
    /// rclone binary
    #[serde(default = "default_rclone_program")]
    pub program: String,

    /// Appended to every rclone invocation (e.g. `--config`, `--bwlimit`)
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Number of remote archives to retain per project
    #[serde(default = "default_keep")]
    pub keep: usize,

    /// Parent directory for run workspaces (system temp dir when unset)
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_docker_program() -> String {
    "docker".to_string()
}

fn default_helper_image() -> String {
    "alpine".to_string()
}

fn default_rclone_program() -> String {
    "rclone".to_string()
}

fn default_keep() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            program: default_docker_program(),
            compose_command: None,
            helper_image: default_helper_image(),
        }
    }
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            program: default_rclone_program(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
            workspace_dir: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration, layering an optional TOML file and the environment over defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(BackupError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| BackupError::Configuration(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| BackupError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment layering).
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| BackupError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BackupError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup.keep < 1 {
            return Err(BackupError::Configuration(
                "backup.keep must be at least 1".into(),
            ));
        }
        if let Some(argv) = &self.docker.compose_command {
            if argv.is_empty() {
                return Err(BackupError::Configuration(
                    "docker.compose_command must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Directory under which per-run workspaces are created.
    pub fn workspace_root(&self) -> PathBuf {
        self.backup
            .workspace_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.docker.program, "docker");
        assert_eq!(config.docker.helper_image, "alpine");
        assert!(config.docker.compose_command.is_none());
        assert_eq!(config.rclone.program, "rclone");
        assert_eq!(config.backup.keep, 4);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.workspace_root(), std::env::temp_dir());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [rclone]
            extra_args = ["--config", "/etc/rclone.conf"]

            [backup]
            keep = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.backup.keep, 7);
        assert_eq!(config.rclone.program, "rclone");
        assert_eq!(config.rclone.extra_args, vec!["--config", "/etc/rclone.conf"]);
        assert_eq!(config.docker.helper_image, "alpine");
    }

    #[test]
    fn test_keep_zero_rejected() {
        let err = Config::from_toml("[backup]\nkeep = 0\n").unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() -> std::io::Result<()> {
        let mut file = NamedTempFile::with_suffix(".toml")?;
        writeln!(file, "[docker]\ncompose_command = [\"docker-compose\"]")?;
        file.flush()?;

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(
            config.docker.compose_command,
            Some(vec!["docker-compose".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = Config::load(Some(Path::new("/nonexistent/stack-backup.toml"))).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let rendered = Config::default().to_toml().unwrap();
        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.backup.keep, 4);
    }
}
