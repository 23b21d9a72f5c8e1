//! Persistence port: the narrow interface the engine reads and writes through.
//!
//! Writes must be idempotent so a sweep retried after a partial failure converges:
//! incident creation and link insertion are create-if-absent, `last_alert_at` and
//! `resolved_at` are derived-field overwrites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::resolution::{self, Verdict};
use crate::types::*;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait IncidentStore: Send + Sync {
  /// Alerts opened at or after `since` that have no incident link yet, ordered by
  /// `(site_id, opened_at)`. Rows without a resolvable site may be filtered here.
  /// Implementations may return some older rows too; the engine re-checks the window
  /// on parsed instants.
  async fn select_unlinked_alerts(&self, since: DateTime<Utc>) -> Result<Vec<AlertRow>, StoreError>;

  /// Unresolved incidents whose `last_alert_at` is at or after `since`.
  async fn select_open_incidents(&self, since: DateTime<Utc>) -> Result<Vec<IncidentRow>, StoreError>;

  /// Insert an incident unless one with the same id exists. Returns whether a row
  /// was inserted.
  async fn create_incident(&self, incident: &NewIncident) -> Result<bool, StoreError>;

  /// Link an alert to an incident. No-op when the alert is already linked.
  async fn link_alert_idempotent(&self, incident_id: &str, alert_id: &str) -> Result<(), StoreError>;

  /// Move `last_alert_at` forward to `at` (never backwards) and bump `updated_at`.
  async fn update_incident_last_alert(
    &self,
    incident_id: &str,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<(), StoreError>;

  /// Unresolved incidents started at or after `since`, with their linked alerts.
  ///
  /// An incident that keeps chaining alerts for longer than the sweep window drops
  /// out of this selection and stays open; size `window_hours` above the longest
  /// expected incident.
  async fn select_resolution_candidates(
    &self,
    since: DateTime<Utc>,
  ) -> Result<Vec<ResolutionCandidate>, StoreError>;

  /// Set `resolved_at` if still unset and bump `updated_at`.
  async fn mark_resolved(
    &self,
    incident_id: &str,
    resolved_at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<(), StoreError>;

  /// Resolve every open incident in the window whose linked alerts are all closed.
  async fn resolve_stale_incidents(
    &self,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<ResolveOutcome, StoreError> {
    let mut outcome = ResolveOutcome::default();
    for candidate in self.select_resolution_candidates(since).await? {
      match resolution::evaluate(&candidate) {
        Verdict::Resolve(at) => {
          self.mark_resolved(&candidate.incident_id, at, now).await?;
          tracing::debug!(incident_id = %candidate.incident_id, resolved_at = %at, "incident resolved");
          outcome.resolved += 1;
        }
        Verdict::StillActive => {}
        Verdict::Skip(reason) => {
          tracing::warn!(%reason, "skipping incident in resolution pass");
          outcome.skipped += 1;
        }
      }
    }
    Ok(outcome)
  }
}
