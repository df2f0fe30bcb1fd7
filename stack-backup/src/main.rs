//! stack-backup - command line entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use stack_backup::config::Config;
use stack_backup::export::DockerVolumeExporter;
use stack_backup::runner::{self, BatchSummary};
use stack_backup::stack::ComposeStack;
use stack_backup::transfer::{Rclone, RemoteLocation};
use stack_backup::{shutdown, utils, Backends, BackupPipeline, BackupRequest, PipelineSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "STACK_BACKUP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up a single project
    Backup {
        /// Directory holding the compose file
        project_dir: PathBuf,
        /// rclone remote name
        remote: String,
        /// Folder on the remote (may be empty)
        remote_path: String,
        /// Number of archives to keep on the remote
        #[arg(short, long)]
        keep: Option<usize>,
    },

    /// Back up every project under a root directory
    BackupAll {
        /// rclone remote name
        remote: String,
        /// Folder on the remote; each project goes to <prefix>/<project>
        remote_path_prefix: String,
        /// Directory whose subdirectories are projects
        projects_root: PathBuf,
        /// Number of archives to keep per project
        #[arg(short, long)]
        keep: Option<usize>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("stack-backup v{}", env!("CARGO_PKG_VERSION"));

    let cancel = shutdown::install();

    let summary = match cli.command {
        Command::Backup {
            project_dir,
            remote,
            remote_path,
            keep,
        } => {
            let request = BackupRequest {
                project_dir,
                remote: RemoteLocation::new(remote, remote_path),
                keep: keep.unwrap_or(config.backup.keep),
            };
            let pipeline = build_pipeline(&config, &cancel).await?;
            BatchSummary {
                reports: vec![pipeline.run(&request).await],
                skipped: Vec::new(),
            }
        }
        Command::BackupAll {
            remote,
            remote_path_prefix,
            projects_root,
            keep,
        } => {
            let pipeline = build_pipeline(&config, &cancel).await?;
            runner::run_all(
                &pipeline,
                &projects_root,
                &RemoteLocation::new(remote, remote_path_prefix),
                keep.unwrap_or(config.backup.keep),
                &cancel,
            )
            .await?
        }
        Command::ShowConfig => {
            print!("{}", config.to_toml()?);
            return Ok(ExitCode::SUCCESS);
        }
    };

    println!();
    print!("{}", summary.render());

    if cancel.is_cancelled() || summary.interrupted() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    if summary.all_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn build_pipeline(config: &Config, cancel: &CancellationToken) -> Result<BackupPipeline> {
    Ok(BackupPipeline::new(
        backends(config).await?,
        PipelineSettings {
            workspace_root: config.workspace_root(),
        },
        cancel.clone(),
    ))
}

async fn backends(config: &Config) -> Result<Backends> {
    let stack = match &config.docker.compose_command {
        Some(argv) => ComposeStack::new(argv.clone())?,
        None => ComposeStack::detect(&config.docker.program).await?,
    };

    Ok(Backends {
        stack: Arc::new(stack),
        exporter: Arc::new(DockerVolumeExporter::new(
            config.docker.program.clone(),
            config.docker.helper_image.clone(),
        )),
        transfer: Arc::new(Rclone::new(
            config.rclone.program.clone(),
            config.rclone.extra_args.clone(),
        )),
    })
}
