#![forbid(unsafe_code)]

//! `procwarden` — process-supervisor binary.
//!
//! `start` acquires the project lock and runs the supervisor event loop
//! (or degrades to an "already running" warning). `stop`, `reload`,
//! `restart`, and `status` act as clients against the running owner via
//! the control channel.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use procwarden::client::{self, ServerStatus};
use procwarden::config::GlobalConfig;
use procwarden::supervisor::Supervisor;
use procwarden::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "procwarden",
    about = "Process supervisor for long-running application workers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "procwarden.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured project root.
    #[arg(long)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: ServerCommand,
}

#[derive(Debug, Subcommand)]
enum ServerCommand {
    /// Acquire ownership and run the supervisor until stopped.
    Start {
        /// Detach into the background and return immediately.
        #[arg(short = 'd', long)]
        daemon: bool,
    },

    /// Gracefully stop the running server.
    Stop,

    /// Recycle the worker session without downtime.
    Reload,

    /// Stop the worker session and launch a fresh one.
    Restart,

    /// Report whether the server is running.
    Status,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load(&args.config)?;

    // Override project root from CLI if provided.
    if let Some(project) = args.project {
        config.project_root = project
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid project override: {err}")))?;
    }
    let config = Arc::new(config);

    match args.command {
        ServerCommand::Start { daemon } => start(&args.config, config, daemon).await,
        ServerCommand::Stop => {
            if client::stop(&config).await? {
                println!("the server is stopping");
            } else {
                warn!("the server is not running");
            }
            Ok(())
        }
        ServerCommand::Reload => {
            if client::reload(&config).await? {
                println!("the server is reloading");
            } else {
                warn!("the server is not running");
            }
            Ok(())
        }
        ServerCommand::Restart => {
            if client::restart(&config).await? {
                println!("the server is restarting");
            } else {
                warn!("the server is not running");
            }
            Ok(())
        }
        ServerCommand::Status => {
            match client::status(&config).await? {
                ServerStatus::NotRunning => println!("the server is not running"),
                ServerStatus::Running { detail } => {
                    println!("the server is running");
                    if let Some(data) = detail {
                        println!("{}", serde_json::to_string_pretty(&data).unwrap_or_default());
                    }
                }
            }
            Ok(())
        }
    }
}

async fn start(config_path: &Path, config: Arc<GlobalConfig>, daemon: bool) -> Result<()> {
    if client::server_is_running(&config)? {
        warn!("the server is already running");
        return Ok(());
    }

    if daemon {
        return spawn_daemon(config_path, &config);
    }

    Supervisor::new(config).start().await
}

/// Relaunch this executable detached, with output redirected to the
/// configured daemon log file.
fn spawn_daemon(config_path: &Path, config: &GlobalConfig) -> Result<()> {
    let exe = std::env::current_exe()
        .map_err(|err| AppError::Config(format!("cannot resolve own executable: {err}")))?;
    let config_path = config_path
        .canonicalize()
        .map_err(|err| AppError::Config(format!("cannot resolve config path: {err}")))?;

    let log_path = config.daemon_log_path();
    let log = std::fs::File::create(&log_path)
        .map_err(|err| AppError::Io(format!("cannot create '{}': {err}", log_path.display())))?;
    let log_err = log
        .try_clone()
        .map_err(|err| AppError::Io(format!("cannot duplicate log handle: {err}")))?;

    let mut cmd = std::process::Command::new(exe);
    cmd.arg("--config")
        .arg(&config_path)
        .arg("start")
        .current_dir(&config.project_root)
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(log_err);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd
        .spawn()
        .map_err(|err| AppError::Session(format!("failed to spawn daemon: {err}")))?;

    println!(
        "server started in background (pid {}), log: {}",
        child.id(),
        log_path.display()
    );
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
