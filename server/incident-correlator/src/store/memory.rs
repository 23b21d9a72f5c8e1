//! In-memory store for tests and local experiments.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::StoreError;
use crate::parse::parse_timestamp;
use crate::store::IncidentStore;
use crate::types::*;

/// An incident as the store keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentRecord {
  pub incident_id: String,
  pub site_id: String,
  pub started_at: DateTime<Utc>,
  pub last_alert_at: DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
  pub incident_id: String,
  pub alert_id: String,
}

#[derive(Debug, Default)]
struct Tables {
  alerts: Vec<AlertRow>,
  incidents: HashMap<String, IncidentRecord>,
  links: Vec<Link>,
  failing: Option<&'static str>,
}

impl Tables {
  fn check(&self, op: &'static str) -> Result<(), StoreError> {
    match self.failing {
      Some(f) if f == op || f == "*" => Err(StoreError::unavailable(format!("{} failed (injected)", op))),
      _ => Ok(()),
    }
  }

  fn linked_incident(&self, alert_id: &str) -> Option<&str> {
    self
      .links
      .iter()
      .find(|l| l.alert_id == alert_id)
      .map(|l| l.incident_id.as_str())
  }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Tables> {
    // A poisoned lock only means a test panicked mid-write; the data is still usable.
    self.tables.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn insert_alert(&self, row: AlertRow) {
    self.lock().alerts.push(row);
  }

  /// Convenience: an open alert with RFC 3339 `opened_at`.
  pub fn insert_open_alert(&self, alert_id: &str, site_id: &str, opened_at: DateTime<Utc>) {
    self.insert_alert(AlertRow {
      alert_id: alert_id.to_string(),
      device_id: None,
      site_id: Some(site_id.to_string()),
      opened_at: Some(rfc3339(opened_at)),
      closed_at: None,
      state: Some(AlertState::Open.as_str().to_string()),
    });
  }

  pub fn set_alert_state(&self, alert_id: &str, state: AlertState, closed_at: Option<DateTime<Utc>>) {
    let mut t = self.lock();
    if let Some(row) = t.alerts.iter_mut().find(|a| a.alert_id == alert_id) {
      row.state = Some(state.as_str().to_string());
      row.closed_at = closed_at.map(rfc3339);
    }
  }

  pub fn close_alert(&self, alert_id: &str, closed_at: DateTime<Utc>) {
    self.set_alert_state(alert_id, AlertState::Closed, Some(closed_at));
  }

  /// Put an incident in place directly, bypassing the engine.
  pub fn seed_incident(&self, record: IncidentRecord) {
    self.lock().incidents.insert(record.incident_id.clone(), record);
  }

  /// Link directly, bypassing the engine. Still refuses a second link per alert.
  pub fn seed_link(&self, incident_id: &str, alert_id: &str) {
    let mut t = self.lock();
    if t.linked_incident(alert_id).is_none() {
      t.links.push(Link {
        incident_id: incident_id.to_string(),
        alert_id: alert_id.to_string(),
      });
    }
  }

  /// Make the named operation (or `"*"` for all) fail with `StoreError::Unavailable`.
  pub fn fail_on(&self, op: &'static str) {
    self.lock().failing = Some(op);
  }

  pub fn heal(&self) {
    self.lock().failing = None;
  }

  /// All incidents, ordered by `(site_id, started_at, incident_id)`.
  pub fn incidents(&self) -> Vec<IncidentRecord> {
    let mut out: Vec<IncidentRecord> = self.lock().incidents.values().cloned().collect();
    out.sort_by(|a, b| {
      a.site_id
        .cmp(&b.site_id)
        .then(a.started_at.cmp(&b.started_at))
        .then_with(|| a.incident_id.cmp(&b.incident_id))
    });
    out
  }

  pub fn incident(&self, incident_id: &str) -> Option<IncidentRecord> {
    self.lock().incidents.get(incident_id).cloned()
  }

  pub fn links(&self) -> Vec<Link> {
    self.lock().links.clone()
  }

  /// Alert ids linked to one incident, sorted.
  pub fn linked_alerts(&self, incident_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = self
      .lock()
      .links
      .iter()
      .filter(|l| l.incident_id == incident_id)
      .map(|l| l.alert_id.clone())
      .collect();
    ids.sort();
    ids
  }
}

#[async_trait]
impl IncidentStore for MemoryStore {
  async fn select_unlinked_alerts(&self, since: DateTime<Utc>) -> Result<Vec<AlertRow>, StoreError> {
    let t = self.lock();
    t.check("select_unlinked_alerts")?;
    // Unparseable opened_at rows are returned so the engine can report them.
    let mut rows: Vec<AlertRow> = t
      .alerts
      .iter()
      .filter(|a| t.linked_incident(&a.alert_id).is_none())
      .filter(|a| {
        a.opened_at
          .as_deref()
          .and_then(parse_timestamp)
          .map_or(true, |opened| opened >= since)
      })
      .cloned()
      .collect();
    rows.sort_by(|a, b| {
      a.site_id
        .cmp(&b.site_id)
        .then_with(|| a.opened_at.cmp(&b.opened_at))
    });
    Ok(rows)
  }

  async fn select_open_incidents(&self, since: DateTime<Utc>) -> Result<Vec<IncidentRow>, StoreError> {
    let t = self.lock();
    t.check("select_open_incidents")?;
    Ok(
      t.incidents
        .values()
        .filter(|i| i.resolved_at.is_none() && i.last_alert_at >= since)
        .map(|i| IncidentRow {
          incident_id: i.incident_id.clone(),
          site_id: Some(i.site_id.clone()),
          last_alert_at: Some(rfc3339(i.last_alert_at)),
        })
        .collect(),
    )
  }

  async fn create_incident(&self, incident: &NewIncident) -> Result<bool, StoreError> {
    let mut t = self.lock();
    t.check("create_incident")?;
    match t.incidents.entry(incident.incident_id.clone()) {
      Entry::Occupied(_) => Ok(false),
      Entry::Vacant(slot) => {
        slot.insert(IncidentRecord {
          incident_id: incident.incident_id.clone(),
          site_id: incident.site_id.clone(),
          started_at: incident.started_at,
          last_alert_at: incident.last_alert_at,
          resolved_at: None,
          created_at: incident.created_at,
          updated_at: incident.created_at,
        });
        Ok(true)
      }
    }
  }

  async fn link_alert_idempotent(&self, incident_id: &str, alert_id: &str) -> Result<(), StoreError> {
    let mut t = self.lock();
    t.check("link_alert_idempotent")?;
    if t.linked_incident(alert_id).is_none() {
      t.links.push(Link {
        incident_id: incident_id.to_string(),
        alert_id: alert_id.to_string(),
      });
    }
    Ok(())
  }

  async fn update_incident_last_alert(
    &self,
    incident_id: &str,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<(), StoreError> {
    let mut t = self.lock();
    t.check("update_incident_last_alert")?;
    if let Some(inc) = t.incidents.get_mut(incident_id) {
      inc.last_alert_at = inc.last_alert_at.max(at);
      inc.updated_at = now;
    }
    Ok(())
  }

  async fn select_resolution_candidates(
    &self,
    since: DateTime<Utc>,
  ) -> Result<Vec<ResolutionCandidate>, StoreError> {
    let t = self.lock();
    t.check("select_resolution_candidates")?;
    let mut out: Vec<ResolutionCandidate> = t
      .incidents
      .values()
      .filter(|i| i.resolved_at.is_none() && i.started_at >= since)
      .map(|i| ResolutionCandidate {
        incident_id: i.incident_id.clone(),
        last_alert_at: Some(rfc3339(i.last_alert_at)),
        alerts: t
          .links
          .iter()
          .filter(|l| l.incident_id == i.incident_id)
          .map(|l| match t.alerts.iter().find(|a| a.alert_id == l.alert_id) {
            Some(a) => LinkedAlertRow {
              alert_id: a.alert_id.clone(),
              state: a.state.clone(),
              closed_at: a.closed_at.clone(),
            },
            // Link to a vanished alert row: same shape as the LEFT JOIN in Postgres.
            None => LinkedAlertRow {
              alert_id: l.alert_id.clone(),
              ..Default::default()
            },
          })
          .collect(),
      })
      .collect();
    out.sort_by(|a, b| a.incident_id.cmp(&b.incident_id));
    Ok(out)
  }

  async fn mark_resolved(
    &self,
    incident_id: &str,
    resolved_at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<(), StoreError> {
    let mut t = self.lock();
    t.check("mark_resolved")?;
    if let Some(inc) = t.incidents.get_mut(incident_id) {
      if inc.resolved_at.is_none() {
        inc.resolved_at = Some(resolved_at);
        inc.updated_at = now;
      }
    }
    Ok(())
  }
}
