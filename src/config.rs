//! Configuration module for the lew echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use lew::echo::DEFAULT_MAX_PENDING;
use lew::runtime::{
    DEFAULT_BACKLOG, DEFAULT_EVENTS_CAPACITY, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
    DEFAULT_READ_BUFFER_SIZE,
};
use lew::ServerOptions;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "lew")]
#[command(version = "0.1.0")]
#[command(about = "Single-threaded event-driven TCP echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (empty or omitted binds all interfaces)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen backlog
    #[arg(short, long)]
    pub backlog: Option<u32>,

    /// Largest single read per connection, in bytes
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// Maximum number of simultaneously open connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Readiness events fetched per poll
    #[arg(long)]
    pub events_capacity: Option<usize>,

    /// Unsent bytes allowed per echo connection before it is closed
    #[arg(long)]
    pub max_pending: Option<usize>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default)]
    pub host: Option<String>,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Largest single read per connection
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Maximum number of open connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Readiness events fetched per poll
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            backlog: default_backlog(),
            read_buffer_size: default_read_buffer_size(),
            max_connections: default_max_connections(),
            events_capacity: default_events_capacity(),
        }
    }
}

/// Echo listener configuration
#[derive(Debug, Deserialize)]
pub struct EchoConfig {
    /// Unsent bytes allowed per connection
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_events_capacity() -> usize {
    DEFAULT_EVENTS_CAPACITY
}

fn default_max_pending() -> usize {
    DEFAULT_MAX_PENDING
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Option<String>,
    pub port: u16,
    pub backlog: u32,
    pub read_buffer_size: usize,
    pub max_connections: usize,
    pub events_capacity: usize,
    pub max_pending: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args over TOML values.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            read_buffer_size: cli
                .read_buffer_size
                .unwrap_or(toml_config.server.read_buffer_size),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            events_capacity: cli
                .events_capacity
                .unwrap_or(toml_config.server.events_capacity),
            max_pending: cli.max_pending.unwrap_or(toml_config.echo.max_pending),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Options for binding the server.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.host.clone(),
            port: self.port,
            backlog: self.backlog,
            read_buffer_size: self.read_buffer_size,
            max_connections: self.max_connections,
            events_capacity: self.events_capacity,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, None);
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.backlog, 32);
        assert_eq!(config.server.read_buffer_size, 8192);
        assert_eq!(config.echo.max_pending, 64 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 7000
            backlog = 128
            read_buffer_size = 4096

            [echo]
            max_pending = 1024

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.server.read_buffer_size, 4096);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.echo.max_pending, 1024);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::parse_from(["lew", "--port", "8000", "--log-level", "trace"]);
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 7000
            backlog = 16

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.port, 8000);
        assert_eq!(config.backlog, 16);
        assert_eq!(config.log_level, "trace");

        let options = config.server_options();
        assert_eq!(options.port, 8000);
        assert_eq!(options.backlog, 16);
        assert_eq!(options.read_buffer_size, 8192);
    }

    #[test]
    fn test_explicit_cli_info_overrides_toml_level() {
        let cli = CliArgs::parse_from(["lew", "--log-level", "info"]);
        let toml_config: TomlConfig = toml::from_str("[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_default_log_level_without_flag_or_file() {
        let config = Config::merge(CliArgs::parse_from(["lew"]), TomlConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_log_level_used_without_cli_flag() {
        let cli = CliArgs::parse_from(["lew"]);
        let toml_config: TomlConfig = toml::from_str("[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.port, 9999);
        assert_eq!(config.host, None);
    }
}
