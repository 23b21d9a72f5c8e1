//! HTTP hook for schedulers that trigger sweeps over the network.
//!
//! `POST /sweep` runs one sweep and answers with `{"created":N,"assigned":M}`.
//! Overlapping requests get `409 Conflict`; exclusion across processes is the
//! deployment's job.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::IncidentStore;
use crate::types::{ErrorOutput, SweepParams};

pub struct AppState<S> {
  engine: Engine<S>,
  defaults: SweepParams,
  in_flight: Mutex<()>,
}

impl<S: IncidentStore> AppState<S> {
  pub fn new(engine: Engine<S>, defaults: SweepParams) -> Self {
    Self {
      engine,
      defaults,
      in_flight: Mutex::new(()),
    }
  }
}

pub fn router<S: IncidentStore + 'static>(state: Arc<AppState<S>>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/sweep", post(sweep::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

pub async fn health() -> &'static str {
  "ok"
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(ErrorOutput::new(message))).into_response()
}

/// Empty body means the configured defaults.
fn parse_params(body: &[u8], defaults: SweepParams) -> Result<SweepParams, serde_json::Error> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(defaults);
  }
  serde_json::from_slice(body)
}

async fn sweep<S: IncidentStore + 'static>(
  State(state): State<Arc<AppState<S>>>,
  body: Bytes,
) -> Response {
  let params = match parse_params(&body, state.defaults) {
    Ok(p) => p,
    Err(e) => return error(StatusCode::BAD_REQUEST, format!("json parse: {}", e)),
  };

  let _guard = match state.in_flight.try_lock() {
    Ok(guard) => guard,
    Err(_) => {
      tracing::warn!("sweep requested while another is running");
      return error(StatusCode::CONFLICT, "a sweep is already running");
    }
  };

  match state.engine.run_sweep(params).await {
    Ok(report) => (StatusCode::OK, Json(report.summary())).into_response(),
    Err(EngineError::InvalidParams(msg)) => error(StatusCode::BAD_REQUEST, msg),
    Err(e) => {
      tracing::error!(error = %e, "sweep failed");
      error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
  }
}
