//! Command-line interface definitions
//!
//! Provides CLI argument parsing using clap for the Copilot bridge.

use std::path::PathBuf;

use clap::Parser;

use crate::types::BridgeConfig;

const DEFAULT_LINGER_SECS: u64 = 10;

/// Copilot bridge - relay prompts to an interactive assistant CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "copilot-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Assistant executable (overrides COPILOT_CLI_PATH)
    #[arg(long, value_name = "PATH")]
    pub cli_path: Option<String>,

    /// Argument passed to the assistant executable (repeatable,
    /// overrides COPILOT_CLI_ARGS)
    #[arg(long = "cli-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub cli_args: Vec<String>,

    /// Print segment operations as JSON lines instead of plain text
    #[arg(long)]
    pub json: bool,

    /// Text put in front of the first message of every answer
    #[arg(long, value_name = "TEXT", default_value = "")]
    pub prefix: String,

    /// Seconds to wait for the last answer after end of input
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_LINGER_SECS)]
    pub linger_secs: u64,

    /// Enable diagnostic mode (auto-log to temp file)
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long)]
    pub quiet: bool,

    /// OpenTelemetry OTLP endpoint (e.g., http://localhost:4317)
    /// When otel feature is enabled, this configures the OTLP exporter.
    /// When otel feature is disabled, this argument is accepted but ignored.
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// OpenTelemetry service name
    #[arg(long, value_name = "NAME", default_value = "copilot-bridge")]
    pub otel_service_name: String,
}

#[allow(clippy::derivable_impls)]
impl Default for Cli {
    fn default() -> Self {
        Self {
            cli_path: None,
            cli_args: Vec::new(),
            json: false,
            prefix: String::new(),
            linger_secs: DEFAULT_LINGER_SECS,
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
            otel_endpoint: None,
            otel_service_name: "copilot-bridge".to_string(),
        }
    }
}

impl Cli {
    /// Build the bridge configuration
    ///
    /// Starts from the environment (see [`BridgeConfig::from_env`]); command
    /// line values take priority.
    pub fn bridge_config(&self) -> BridgeConfig {
        self.apply_overrides(BridgeConfig::from_env())
    }

    fn apply_overrides(&self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(path) = &self.cli_path {
            config.cli_path.clone_from(path);
        }
        if !self.cli_args.is_empty() {
            config.cli_args.clone_from(&self.cli_args);
        }
        config
    }

    /// Check if diagnostic mode is enabled (output to file)
    ///
    /// Returns true if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Check if OpenTelemetry tracing is enabled
    ///
    /// Returns true if `--otel-endpoint` is specified and the otel feature is enabled.
    #[cfg(feature = "otel")]
    pub fn is_otel_enabled(&self) -> bool {
        self.otel_endpoint.is_some()
    }

    /// Check if OpenTelemetry tracing is enabled (always false without otel feature)
    /// Note: --otel-endpoint argument is still accepted but ignored when feature is disabled
    #[cfg(not(feature = "otel"))]
    pub fn is_otel_enabled(&self) -> bool {
        if self.otel_endpoint.is_some() {
            tracing::warn!("--otel-endpoint specified but otel feature is not enabled, ignoring");
        }
        false
    }

    /// Log level from `-q` / `-v` (ERROR, INFO, DEBUG, then TRACE)
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Diagnostic log file, `copilot-bridge-{timestamp}.log` in the temp
    /// directory unless `--log-dir` / `--log-file` say otherwise
    pub fn log_path(&self) -> PathBuf {
        let dir = self
            .log_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("copilot-bridge-{timestamp}.log")
        });

        dir.join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cli() {
        let cli = Cli::default();
        assert!(!cli.is_diagnostic());
        assert_eq!(cli.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_parse_bridge_flags() {
        let cli = Cli::parse_from([
            "copilot-bridge",
            "--cli-path",
            "/opt/gh",
            "--cli-arg",
            "copilot",
            "--cli-arg",
            "--banner",
            "--json",
            "--prefix",
            "<@U42> ",
        ]);
        assert_eq!(cli.cli_path.as_deref(), Some("/opt/gh"));
        assert_eq!(cli.cli_args, vec!["copilot", "--banner"]);
        assert!(cli.json);
        assert_eq!(cli.prefix, "<@U42> ");
        assert_eq!(cli.linger_secs, 10);
    }

    #[test]
    fn test_overrides_take_priority() {
        let cli = Cli {
            cli_path: Some("/opt/copilot".to_string()),
            cli_args: vec!["--allow-all-tools".to_string()],
            ..Default::default()
        };
        let base = BridgeConfig::new("copilot").with_args(["--banner"]);
        let config = cli.apply_overrides(base);
        assert_eq!(config.cli_path, "/opt/copilot");
        assert_eq!(config.cli_args, vec!["--allow-all-tools"]);

        let config = Cli::default().apply_overrides(BridgeConfig::new("gh").with_args(["copilot"]));
        assert_eq!(config.cli_path, "gh");
        assert_eq!(config.cli_args, vec!["copilot"]);
    }

    #[test]
    fn test_logging_flags_for_bridge_runs() {
        let cli = Cli::parse_from([
            "copilot-bridge",
            "-vv",
            "--log-dir",
            "/var/log/copilot-bridge",
            "--linger-secs",
            "3",
        ]);
        assert!(cli.is_diagnostic());
        assert_eq!(cli.log_level(), tracing::Level::TRACE);
        assert_eq!(cli.linger_secs, 3);

        let path = cli.log_path();
        assert!(path.starts_with("/var/log/copilot-bridge"));
        let name = path.file_name().and_then(|name| name.to_str()).unwrap();
        assert!(name.starts_with("copilot-bridge-") && name.ends_with(".log"));

        let quiet = Cli::parse_from(["copilot-bridge", "--json", "-q"]);
        assert!(!quiet.is_diagnostic());
        assert_eq!(quiet.log_level(), tracing::Level::ERROR);
    }
}
