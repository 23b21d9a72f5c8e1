//! Parse raw store rows into canonical models.
//!
//! A row that cannot be parsed is not an error: it becomes `Parsed::Skip`, is left
//! out of this sweep, and is picked up again once the underlying data is fixed.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::*;

/// Outcome of parsing one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
  Valid(T),
  Skip(SkipReason),
}

impl<T> Parsed<T> {
  pub fn is_skip(&self) -> bool {
    matches!(self, Self::Skip(_))
  }
}

/// Why a row was left out of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
  pub row_id: String,
  pub field: &'static str,
  pub reason: String,
}

impl SkipReason {
  fn new(row_id: &str, field: &'static str, reason: impl Into<String>) -> Self {
    Self {
      row_id: row_id.to_string(),
      field,
      reason: reason.into(),
    }
  }
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}: {}", self.row_id, self.field, self.reason)
  }
}

/// Parse a timestamp written as RFC 3339 or as PostgreSQL renders `timestamptz::text`
/// (`2025-01-15 10:30:00.123+00`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Blank strings count as missing.
fn present(v: &Option<String>) -> Option<&str> {
  v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required_timestamp(
  row_id: &str,
  field: &'static str,
  v: &Option<String>,
) -> Result<DateTime<Utc>, SkipReason> {
  let raw = present(v).ok_or_else(|| SkipReason::new(row_id, field, "missing"))?;
  parse_timestamp(raw).ok_or_else(|| SkipReason::new(row_id, field, format!("unparseable timestamp {:?}", raw)))
}

fn optional_timestamp(
  row_id: &str,
  field: &'static str,
  v: &Option<String>,
) -> Result<Option<DateTime<Utc>>, SkipReason> {
  match present(v) {
    Some(raw) => parse_timestamp(raw)
      .map(Some)
      .ok_or_else(|| SkipReason::new(row_id, field, format!("unparseable timestamp {:?}", raw))),
    None => Ok(None),
  }
}

fn required_state(row_id: &str, v: &Option<String>) -> Result<AlertState, SkipReason> {
  let raw = present(v).ok_or_else(|| SkipReason::new(row_id, "state", "missing"))?;
  AlertState::from_str_loose(raw)
    .ok_or_else(|| SkipReason::new(row_id, "state", format!("expected open|acknowledged|closed, got {:?}", raw)))
}

fn try_alert(row: &AlertRow) -> Result<Alert, SkipReason> {
  let id = row.alert_id.as_str();
  if id.trim().is_empty() {
    return Err(SkipReason::new(id, "alert_id", "missing"));
  }
  let site_id = present(&row.site_id).ok_or_else(|| SkipReason::new(id, "site_id", "no resolvable site"))?;
  let opened_at = required_timestamp(id, "opened_at", &row.opened_at)?;
  let closed_at = optional_timestamp(id, "closed_at", &row.closed_at)?;
  let state = required_state(id, &row.state)?;

  Ok(Alert {
    alert_id: row.alert_id.clone(),
    device_id: present(&row.device_id).map(str::to_string),
    site_id: site_id.to_string(),
    opened_at,
    closed_at,
    state,
  })
}

/// Parse an alert row. Alerts without a resolvable site are skipped.
pub fn parse_alert(row: &AlertRow) -> Parsed<Alert> {
  match try_alert(row) {
    Ok(alert) => Parsed::Valid(alert),
    Err(reason) => Parsed::Skip(reason),
  }
}

/// Parse an open-incident candidate into `(site_id, ActiveIncident)`.
pub fn parse_active_incident(row: &IncidentRow) -> Parsed<(String, ActiveIncident)> {
  let id = row.incident_id.as_str();
  let site_id = match present(&row.site_id) {
    Some(s) => s.to_string(),
    None => return Parsed::Skip(SkipReason::new(id, "site_id", "missing")),
  };
  match required_timestamp(id, "last_alert_at", &row.last_alert_at) {
    Ok(last_alert_at) => Parsed::Valid((
      site_id,
      ActiveIncident {
        incident_id: row.incident_id.clone(),
        last_alert_at,
      },
    )),
    Err(reason) => Parsed::Skip(reason),
  }
}

/// Lifecycle fields of a linked alert, as the resolution check needs them.
pub(crate) fn parse_linked_alert(
  row: &LinkedAlertRow,
) -> Result<(AlertState, Option<DateTime<Utc>>), SkipReason> {
  let state = required_state(&row.alert_id, &row.state)?;
  let closed_at = optional_timestamp(&row.alert_id, "closed_at", &row.closed_at)?;
  Ok((state, closed_at))
}

pub(crate) fn parse_required_timestamp(
  row_id: &str,
  field: &'static str,
  v: &Option<String>,
) -> Result<DateTime<Utc>, SkipReason> {
  required_timestamp(row_id, field, v)
}
