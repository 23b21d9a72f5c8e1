//! Core types for the correlator (raw store rows + parsed internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw rows (what the store hands over; nothing validated yet)
// ---------------------------------------------------------------------------

/// One alert row as read from the store. The ingestion pipeline owns these rows,
/// so any field except the id may be missing or malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertRow {
  pub alert_id: String,
  pub device_id: Option<String>,
  pub site_id: Option<String>,
  pub opened_at: Option<String>,
  pub closed_at: Option<String>,
  pub state: Option<String>,
}

/// An open (unresolved) incident candidate for the active-incident table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentRow {
  pub incident_id: String,
  pub site_id: Option<String>,
  pub last_alert_at: Option<String>,
}

/// An open incident plus the lifecycle fields of every alert linked to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionCandidate {
  pub incident_id: String,
  pub last_alert_at: Option<String>,
  pub alerts: Vec<LinkedAlertRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedAlertRow {
  pub alert_id: String,
  pub state: Option<String>,
  pub closed_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Alert state (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
  Open,
  Acknowledged,
  Closed,
}

impl AlertState {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "open" => Some(Self::Open),
      "acknowledged" | "ack" => Some(Self::Acknowledged),
      "closed" => Some(Self::Closed),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Acknowledged => "acknowledged",
      Self::Closed => "closed",
    }
  }

  /// Open and acknowledged alerts keep their incident alive.
  pub fn is_active(self) -> bool {
    !matches!(self, Self::Closed)
  }
}

// ---------------------------------------------------------------------------
// Parsed internal types
// ---------------------------------------------------------------------------

/// Canonical alert after parsing. Only alerts with a resolvable site get here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
  pub alert_id: String,
  pub device_id: Option<String>,
  pub site_id: String,
  pub opened_at: DateTime<Utc>,
  pub closed_at: Option<DateTime<Utc>>,
  pub state: AlertState,
}

/// The incident new alerts of a site merge into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveIncident {
  pub incident_id: String,
  pub last_alert_at: DateTime<Utc>,
}

/// Everything the store needs to insert an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncident {
  pub incident_id: String,
  pub site_id: String,
  pub started_at: DateTime<Utc>,
  pub last_alert_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sweep parameters + results
// ---------------------------------------------------------------------------

pub const DEFAULT_WINDOW_HOURS: u32 = 48;
pub const DEFAULT_GAP_THRESHOLD_MS: i64 = 600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepParams {
  pub window_hours: u32,
  pub gap_threshold_ms: i64,
}

impl Default for SweepParams {
  fn default() -> Self {
    Self {
      window_hours: DEFAULT_WINDOW_HOURS,
      gap_threshold_ms: DEFAULT_GAP_THRESHOLD_MS,
    }
  }
}

/// What a sweep changed: incidents created and alerts assigned to an incident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
  pub created: u64,
  pub assigned: u64,
}

/// Full account of one sweep, for logs and the trigger surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub created: u64,
  pub assigned: u64,
  pub resolved: u64,
  pub skipped_alerts: u64,
  pub skipped_incidents: u64,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl SweepReport {
  pub fn summary(&self) -> SweepSummary {
    SweepSummary {
      created: self.created,
      assigned: self.assigned,
    }
  }
}

/// Result of one resolution pass over open incidents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
  pub resolved: u64,
  pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Trigger surface wrappers
// ---------------------------------------------------------------------------

/// Structured error body for the HTTP hook and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alert_state_parses_loosely() {
    assert_eq!(AlertState::from_str_loose("OPEN"), Some(AlertState::Open));
    assert_eq!(AlertState::from_str_loose(" acknowledged "), Some(AlertState::Acknowledged));
    assert_eq!(AlertState::from_str_loose("ack"), Some(AlertState::Acknowledged));
    assert_eq!(AlertState::from_str_loose("closed"), Some(AlertState::Closed));
    assert_eq!(AlertState::from_str_loose("snoozed"), None);
  }

  #[test]
  fn only_closed_is_terminal() {
    assert!(AlertState::Open.is_active());
    assert!(AlertState::Acknowledged.is_active());
    assert!(!AlertState::Closed.is_active());
  }

  #[test]
  fn summary_serializes_as_created_assigned() {
    let json = serde_json::to_string(&SweepSummary { created: 2, assigned: 3 }).unwrap();
    assert_eq!(json, r#"{"created":2,"assigned":3}"#);
  }

  #[test]
  fn params_fill_missing_fields_with_defaults() {
    let p: SweepParams = serde_json::from_str(r#"{"window_hours": 6}"#).unwrap();
    assert_eq!(p.window_hours, 6);
    assert_eq!(p.gap_threshold_ms, DEFAULT_GAP_THRESHOLD_MS);
  }
}
