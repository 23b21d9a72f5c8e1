//! Correlator configuration with sane defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::ids::IdStrategy;
use crate::types::{SweepParams, DEFAULT_GAP_THRESHOLD_MS, DEFAULT_WINDOW_HOURS};

pub const DEFAULT_PORT: u16 = 5005;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Error,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Error => "error",
      Self::Warn => "warn",
      Self::Info => "info",
      Self::Debug => "debug",
      Self::Trace => "trace",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  /// Flattened JSON lines for log aggregation.
  Json,
  /// Human-readable output.
  #[default]
  Text,
}

/// Runtime settings for the correlator binary.
#[derive(Debug, Clone)]
pub struct Config {
  /// Lookback window for each sweep, in hours.
  pub window_hours: u32,
  /// Max gap between consecutive alerts of one incident, in milliseconds (inclusive).
  pub gap_threshold_ms: i64,
  /// How new incident ids are generated.
  pub id_strategy: IdStrategy,
  pub database_url: Option<String>,
  pub max_connections: u32,
  /// Address of the HTTP hook; loopback by default (internal only).
  pub bind_addr: SocketAddr,
  pub log_level: LogLevel,
  pub log_format: LogFormat,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      window_hours: DEFAULT_WINDOW_HOURS,
      gap_threshold_ms: DEFAULT_GAP_THRESHOLD_MS,
      id_strategy: IdStrategy::Random,
      database_url: None,
      max_connections: DEFAULT_MAX_CONNECTIONS,
      bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
      log_level: LogLevel::Info,
      log_format: LogFormat::Text,
    }
  }
}

impl Config {
  pub fn sweep_params(&self) -> SweepParams {
    SweepParams {
      window_hours: self.window_hours,
      gap_threshold_ms: self.gap_threshold_ms,
    }
  }
}
