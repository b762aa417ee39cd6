use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "ferry.toml";

/// Top-level CLI for the ferry bulk manager.
#[derive(Debug, Parser)]
#[command(name = "ferry", version)]
#[command(
    about = "Fetch a backlog of URLs, upload them to a remote, verify, then clean up",
    long_about = None
)]
pub struct Cli {
    /// Configuration file. When omitted, `ferry.toml` is used and created
    /// with defaults if it does not exist.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `ferry_core=trace` (overrides RUST_LOG).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// Process the backlog (default).
    Run {
        /// Run a single cycle and exit instead of looping.
        #[arg(long)]
        once: bool,
    },

    /// Write a default configuration file and exit.
    Setup {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Show completion and failure counts, and items that gave up.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Clear the failure history of a URL so it is retried.
    Reset {
        /// Source URL, exactly as listed in the backlog.
        url: String,

        /// Also forget a completion so the URL is processed again.
        #[arg(long)]
        completed: bool,
    },

    /// Run the health checks and report every failure.
    Check,
}

impl Cli {
    pub fn command(&self) -> CliCommand {
        self.command
            .clone()
            .unwrap_or(CliCommand::Run { once: false })
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["ferry"]).unwrap();
        assert_eq!(cli.command(), CliCommand::Run { once: false });
        assert_eq!(cli.config_path(), PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_run_once_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ferry",
            "run",
            "--once",
            "--config",
            "/etc/ferry.toml",
            "--log-format",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.command(), CliCommand::Run { once: true });
        assert_eq!(cli.config_path(), PathBuf::from("/etc/ferry.toml"));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_reset_arguments() {
        let cli =
            Cli::try_parse_from(["ferry", "reset", "https://a.example/x", "--completed"]).unwrap();
        assert_eq!(
            cli.command(),
            CliCommand::Reset {
                url: "https://a.example/x".to_string(),
                completed: true
            }
        );
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["ferry", "--log-format", "xml"]).is_err());
    }
}
