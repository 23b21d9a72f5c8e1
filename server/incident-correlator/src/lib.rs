//! Heat-pump fleet incident correlator.
//!
//! Groups raw per-device alerts into per-site incidents: alerts at one site that
//! open within a gap threshold of each other share an incident, and an incident
//! resolves once none of its alerts is open or acknowledged. Each sweep is a single
//! idempotent pass over a lookback window; scheduling is up to the caller.

pub mod cli;
pub mod clustering;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod logging;
pub mod parse;
pub mod resolution;
pub mod server;
pub mod store;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use error::{EngineError, StoreError};
pub use ids::{DerivedIds, IdGenerator, RandomIds, SequentialIds};
pub use store::{IncidentStore, MemoryStore, PgStore};
pub use types::{SweepParams, SweepReport, SweepSummary};
