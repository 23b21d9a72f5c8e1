//! Binary entrypoint: one-shot sweep, HTTP hook, or schema setup.

use std::sync::Arc;

use clap::Parser;

use incident_correlator::cli::{Cli, Command};
use incident_correlator::server::{self, AppState};
use incident_correlator::{logging, Engine, PgStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();
  let config = cli.config();
  logging::init(config.log_level, config.log_format)?;

  let database_url = config.database_url.as_deref().ok_or("DATABASE_URL must be set")?;
  let store = PgStore::connect(database_url, config.max_connections).await?;

  match cli.command {
    Command::Migrate => {
      store.ensure_schema().await?;
    }
    Command::Sweep => {
      let engine = Engine::new(store, config.id_strategy.generator());
      let report = engine.run_sweep(config.sweep_params()).await?;
      println!("{}", serde_json::to_string(&report.summary())?);
    }
    Command::Serve { .. } => {
      let engine = Engine::new(store, config.id_strategy.generator());
      let state = Arc::new(AppState::new(engine, config.sweep_params()));
      let app = server::router(state);

      let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
      tracing::info!(addr = %config.bind_addr, "incident-correlator listening");
      axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    }
  }

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
  }
}
