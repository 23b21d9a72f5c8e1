//! Command-line surface of the correlator binary.

use std::net::IpAddr;

use clap::{Parser, Subcommand};

use crate::config::{Config, LogFormat, LogLevel, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};
use crate::ids::IdStrategy;
use crate::types::{DEFAULT_GAP_THRESHOLD_MS, DEFAULT_WINDOW_HOURS};

#[derive(Parser, Debug)]
#[command(
  name = "incident-correlator",
  about = "Groups heat-pump alerts into per-site incidents",
  version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
  /// PostgreSQL connection string
  #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
  pub database_url: Option<String>,

  /// Lookback window in hours
  #[arg(long, env = "SWEEP_WINDOW_HOURS", default_value_t = DEFAULT_WINDOW_HOURS, global = true)]
  pub window_hours: u32,

  /// Max gap between consecutive alerts of one incident, in milliseconds
  #[arg(long, env = "SWEEP_GAP_THRESHOLD_MS", default_value_t = DEFAULT_GAP_THRESHOLD_MS, global = true)]
  pub gap_threshold_ms: i64,

  /// Incident id scheme
  #[arg(long, env = "ID_STRATEGY", value_enum, default_value_t = IdStrategy::Random, global = true)]
  pub id_strategy: IdStrategy,

  /// Connection pool size
  #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS, global = true)]
  pub max_connections: u32,

  #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info, global = true)]
  pub log_level: LogLevel,

  #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
  pub log_format: LogFormat,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Run one sweep and print `{"created":N,"assigned":M}` to stdout
  Sweep,
  /// Serve the HTTP hook (`GET /health`, `POST /sweep`)
  Serve {
    #[arg(long, env = "BIND_HOST", default_value = "127.0.0.1")]
    host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
  },
  /// Create the incident tables if missing
  Migrate,
}

impl Cli {
  pub fn config(&self) -> Config {
    let mut config = Config {
      window_hours: self.window_hours,
      gap_threshold_ms: self.gap_threshold_ms,
      id_strategy: self.id_strategy,
      database_url: self.database_url.clone(),
      max_connections: self.max_connections,
      log_level: self.log_level,
      log_format: self.log_format,
      ..Config::default()
    };
    if let Command::Serve { host, port } = &self.command {
      config.bind_addr = (*host, *port).into();
    }
    config
  }
}
