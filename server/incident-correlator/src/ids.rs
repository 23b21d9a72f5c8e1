//! Incident identifier generation, injected into the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Alert;

/// Source of incident ids. `founder` is the alert that opens the incident.
pub trait IdGenerator: Send + Sync {
  fn incident_id(&self, founder: &Alert) -> String;
}

/// Random UUID v4 per incident.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
  fn incident_id(&self, _founder: &Alert) -> String {
    Uuid::new_v4().to_string()
  }
}

/// Stable id derived from the founding alert, so re-creating the same incident
/// after a crashed sweep hits the same row.
///
/// `inc-` followed by the first 32 hex chars of blake3(site_id | started_at | alert_id).
/// The alert id keeps a late alert that shares a start time with an older,
/// already resolved incident from landing on that incident's row.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedIds;

impl IdGenerator for DerivedIds {
  fn incident_id(&self, founder: &Alert) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(founder.site_id.as_bytes());
    hasher.update(b"|");
    hasher.update(started_at(founder.opened_at).as_bytes());
    hasher.update(b"|");
    hasher.update(founder.alert_id.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("inc-{}", &hex[..32])
  }
}

fn started_at(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Deterministic `inc-1`, `inc-2`, ... for tests and dry runs.
#[derive(Debug, Default)]
pub struct SequentialIds {
  next: AtomicU64,
}

impl SequentialIds {
  pub fn new() -> Self {
    Self::default()
  }
}

impl IdGenerator for SequentialIds {
  fn incident_id(&self, _founder: &Alert) -> String {
    let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
    format!("inc-{}", n)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
  #[default]
  Random,
  Derived,
}

impl IdStrategy {
  pub fn generator(self) -> Arc<dyn IdGenerator> {
    match self {
      Self::Random => Arc::new(RandomIds),
      Self::Derived => Arc::new(DerivedIds),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::AlertState;
  use chrono::{Duration, TimeZone};

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  fn founder(id: &str, site: &str, opened_at: DateTime<Utc>) -> Alert {
    Alert {
      alert_id: id.into(),
      device_id: None,
      site_id: site.into(),
      opened_at,
      closed_at: None,
      state: AlertState::Open,
    }
  }

  #[test]
  fn derived_ids_are_stable() {
    let a = DerivedIds.incident_id(&founder("a1", "site-1", t0()));
    let b = DerivedIds.incident_id(&founder("a1", "site-1", t0()));
    assert_eq!(a, b);
    assert!(a.starts_with("inc-"));
    assert_eq!(a.len(), 4 + 32);
    assert!(a[4..].chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn derived_ids_differ_by_site_start_and_founder() {
    let base = DerivedIds.incident_id(&founder("a1", "site-1", t0()));
    assert_ne!(base, DerivedIds.incident_id(&founder("a1", "site-2", t0())));
    assert_ne!(
      base,
      DerivedIds.incident_id(&founder("a1", "site-1", t0() + Duration::milliseconds(1)))
    );
    assert_ne!(base, DerivedIds.incident_id(&founder("a2", "site-1", t0())));
  }

  #[test]
  fn random_ids_are_uuids() {
    let alert = founder("a1", "site-1", t0());
    let id = RandomIds.incident_id(&alert);
    assert!(Uuid::parse_str(&id).is_ok());
    assert_ne!(id, RandomIds.incident_id(&alert));
  }

  #[test]
  fn sequential_ids_count_up() {
    let ids = SequentialIds::new();
    let alert = founder("a1", "s", t0());
    assert_eq!(ids.incident_id(&alert), "inc-1");
    assert_eq!(ids.incident_id(&alert), "inc-2");
  }
}
