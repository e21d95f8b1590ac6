//! monkeyd - Typewriting Monkey Streaming Daemon
//!
//! CLI entry point: foreground serving and daemon lifecycle management.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{info, warn};

use monkeyd::backend::{Backend, FileBackend};
use monkeyd::cli::{Cli, Command, DaemonCommand, OutputFormat};
use monkeyd::config::Config;
use monkeyd::daemon::{PidFile, log_path};
use monkeyd::engine::{EngineConfig, StreamEngine};
use monkeyd::server::{self, AppState};
use monkeyd::store::{ChunkStore, ChunkStoreConfig};
use monkeyd::words::{Dictionary, WORD_FLUSH_INTERVAL, WordStore};

fn setup_logging(verbose: bool, to_file: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_file {
        let log_path = log_path();
        if let Some(dir) = log_path.parent() {
            fs::create_dir_all(dir).context("Failed to create log directory")?;
        }
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;
        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The forked daemon logs to a file; everything else to the terminal.
    let to_file = matches!(cli.command, Some(Command::RunDaemon));
    setup_logging(cli.verbose, to_file).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Serve) => run_server(&config).await,
        Some(Command::Daemon { command }) => match command {
            DaemonCommand::Start => cmd_start().await,
            DaemonCommand::Stop => cmd_stop().await,
            DaemonCommand::Status { format } => cmd_status(format).await,
        },
        Some(Command::RunDaemon) => cmd_run_daemon(&config).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Start the daemon in the background
async fn cmd_start() -> Result<()> {
    let pidfile = PidFile::new();

    if let Some(pid) = pidfile.live_pid() {
        println!("monkeyd is already running (PID: {})", pid);
        return Ok(());
    }

    let pid = pidfile.spawn_daemon()?;
    println!("monkeyd started (PID: {})", pid);
    println!("Logs: {}", log_path().display());
    Ok(())
}

/// Stop the daemon
async fn cmd_stop() -> Result<()> {
    let pidfile = PidFile::new();

    if pidfile.live_pid().is_none() {
        println!("monkeyd is not running");
        return Ok(());
    }

    let pid = pidfile.stop_daemon()?;
    println!("monkeyd stopped (was PID: {})", pid);
    Ok(())
}

/// Show daemon status
async fn cmd_status(format: OutputFormat) -> Result<()> {
    let pidfile = PidFile::new();
    let pid = pidfile.live_pid();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": pid.is_some(),
                "pid": pid,
                "pid_file": pidfile.path().to_string_lossy()
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("monkeyd status");
            println!("--------------");
            match pid {
                Some(pid) => {
                    println!("Status: running");
                    println!("PID: {}", pid);
                }
                None => println!("Status: stopped"),
            }
            println!("PID file: {}", pidfile.path().display());
        }
    }

    Ok(())
}

/// Run as the daemon process (internal command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    PidFile::new().adopt()?;

    run_server(config).await
}

/// Resolves when the process is asked to terminate (ctrl-c or SIGTERM).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Bring up the full stack and serve until a termination signal.
async fn run_server(config: &Config) -> Result<()> {
    info!("monkeyd starting...");

    let backend = Arc::new(
        FileBackend::open(PathBuf::from(&config.storage.data_dir)).context("Failed to open document backend")?,
    ) as Backend;

    let store = ChunkStore::create(backend.clone(), ChunkStoreConfig::default())
        .await
        .context("Failed to recover chunk store")?;

    let dict = Arc::new(Dictionary::load(&config.storage.dictionary_path).context("Failed to load dictionary")?);

    let word_store = WordStore::create(backend, WORD_FLUSH_INTERVAL);

    let engine_config = EngineConfig {
        test_mode: config.stream.test_mode,
        ..Default::default()
    };
    let engine = StreamEngine::bootstrap(store.clone(), word_store, dict, engine_config)
        .await
        .context("Startup reconciliation failed")?;
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run());

    let state = Arc::new(AppState {
        engine: handle.clone(),
        store,
    });

    let addr: std::net::SocketAddr = format!("{}:{}", config.http.bind, config.http.port)
        .parse()
        .context("Invalid bind address")?;

    info!(%addr, "monkeyd running");
    server::serve(addr, state, shutdown_signal()).await?;

    warn!("Shutdown signal received");
    handle.shutdown().await?;
    engine_task.await.context("Engine task panicked")?;

    info!("monkeyd stopped");
    Ok(())
}
