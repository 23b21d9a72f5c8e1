//! Structured error types for the correlator.
//!
//! Bad rows are not errors: they come back as `parse::Parsed::Skip` and the sweep
//! carries on. Everything here aborts the sweep it happens in.

use thiserror::Error;

/// Persistence failures. Fatal for the current sweep.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("database: {0}")]
  Database(#[from] sqlx_core::Error),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("schema: {0}")]
  Schema(String),
}

impl StoreError {
  pub fn unavailable(msg: impl Into<String>) -> Self {
    Self::Unavailable(msg.into())
  }
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("store: {0}")]
  Store(#[from] StoreError),

  #[error("invalid sweep parameters: {0}")]
  InvalidParams(String),
}

impl EngineError {
  pub fn invalid_params(msg: impl Into<String>) -> Self {
    Self::InvalidParams(msg.into())
  }
}
