//! Structured logging setup.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LogLevel};

/// Install the global subscriber, logging to stderr so stdout stays free for
/// the sweep summary.
///
/// `RUST_LOG` wins over `level` when set. Call once at startup.
pub fn init(level: LogLevel, format: LogFormat) -> Result<(), TryInitError> {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

  let registry = tracing_subscriber::registry().with(env_filter);

  match format {
    LogFormat::Json => registry
      .with(
        fmt::layer()
          .json()
          .flatten_event(true)
          .with_target(true)
          .with_ansi(false)
          .with_writer(std::io::stderr),
      )
      .try_init(),
    LogFormat::Text => registry
      .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
      .try_init(),
  }
}
