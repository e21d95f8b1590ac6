//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// monkeyd - typewriting monkey streaming daemon
#[derive(Debug, Parser)]
#[command(name = "monkeyd", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a config file (default: monkeyd.yml, then
    /// ~/.config/monkeyd/monkeyd.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the streaming service in the foreground
    Serve,

    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Internal: entry point for the forked daemon process
    #[command(hide = true)]
    RunDaemon,
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve() {
        let cli = Cli::try_parse_from(["monkeyd", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Serve)));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parses_daemon_commands() {
        let cli = Cli::try_parse_from(["monkeyd", "daemon", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Daemon {
                command: DaemonCommand::Start
            })
        ));

        let cli = Cli::try_parse_from(["monkeyd", "-v", "daemon", "status", "--format", "json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Some(Command::Daemon {
                command: DaemonCommand::Status {
                    format: OutputFormat::Json
                }
            })
        ));
    }

    #[test]
    fn test_cli_accepts_config_path() {
        let cli = Cli::try_parse_from(["monkeyd", "--config", "/etc/monkeyd.yml", "serve"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/monkeyd.yml")));
    }
}
