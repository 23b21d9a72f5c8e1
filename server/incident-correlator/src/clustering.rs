//! Single-linkage temporal clustering of alerts into per-site incidents.
//!
//! An alert joins its site's active incident when it opened no later than
//! `gap_threshold` after that incident's last alert; otherwise it starts a new one.
//! Nothing here touches the store: the engine feeds alerts in `(site, opened_at)`
//! order and persists what each `Assignment` says.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::ids::IdGenerator;
use crate::types::{ActiveIncident, Alert, NewIncident};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Merge,
  Create,
}

/// Merge-or-create for one alert. Inclusive: a gap equal to the threshold merges.
/// Alerts older than the incident's last alert (negative gap) merge too.
pub fn decide(
  previous_last_alert_at: Option<DateTime<Utc>>,
  opened_at: DateTime<Utc>,
  gap_threshold: Duration,
) -> Decision {
  match previous_last_alert_at {
    Some(last) if opened_at - last <= gap_threshold => Decision::Merge,
    _ => Decision::Create,
  }
}

/// What to persist for one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
  /// Incident the alert gets linked to.
  pub incident_id: String,
  /// Set when the alert opened a new incident.
  pub created: Option<NewIncident>,
  /// Set when the incident's `last_alert_at` moved forward to this value.
  pub advanced_to: Option<DateTime<Utc>>,
}

/// Per-site linkage state for one pass: `site_id -> active incident`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteStates {
  sites: HashMap<String, ActiveIncident>,
}

impl SiteStates {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build the table from open-incident candidates. When a site has several,
  /// the one with the greatest `last_alert_at` wins (ties: greatest id).
  pub fn select_active<I>(candidates: I) -> Self
  where
    I: IntoIterator<Item = (String, ActiveIncident)>,
  {
    let mut sites: HashMap<String, ActiveIncident> = HashMap::new();
    for (site_id, candidate) in candidates {
      match sites.get(&site_id) {
        Some(current)
          if (current.last_alert_at, &current.incident_id)
            >= (candidate.last_alert_at, &candidate.incident_id) => {}
        _ => {
          sites.insert(site_id, candidate);
        }
      }
    }
    Self { sites }
  }

  pub fn get(&self, site_id: &str) -> Option<&ActiveIncident> {
    self.sites.get(site_id)
  }

  pub fn len(&self) -> usize {
    self.sites.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sites.is_empty()
  }

  /// Place one alert and update the table in place.
  pub fn assign(
    &mut self,
    alert: &Alert,
    gap_threshold: Duration,
    ids: &dyn IdGenerator,
    now: DateTime<Utc>,
  ) -> Assignment {
    if let Some(state) = self.sites.get_mut(&alert.site_id) {
      if decide(Some(state.last_alert_at), alert.opened_at, gap_threshold) == Decision::Merge {
        let advanced_to = if alert.opened_at > state.last_alert_at {
          state.last_alert_at = alert.opened_at;
          Some(alert.opened_at)
        } else {
          None
        };
        return Assignment {
          incident_id: state.incident_id.clone(),
          created: None,
          advanced_to,
        };
      }
    }

    let incident_id = ids.incident_id(alert);
    self.sites.insert(
      alert.site_id.clone(),
      ActiveIncident {
        incident_id: incident_id.clone(),
        last_alert_at: alert.opened_at,
      },
    );
    Assignment {
      incident_id: incident_id.clone(),
      created: Some(NewIncident {
        incident_id,
        site_id: alert.site_id.clone(),
        started_at: alert.opened_at,
        last_alert_at: alert.opened_at,
        created_at: now,
      }),
      advanced_to: None,
    }
  }
}

/// Order alerts the way the clustering pass needs them: by site, then opened_at,
/// then id so equal timestamps always come out the same way.
pub fn sort_for_clustering(alerts: &mut [Alert]) {
  alerts.sort_by(|a, b| {
    a.site_id
      .cmp(&b.site_id)
      .then(a.opened_at.cmp(&b.opened_at))
      .then_with(|| a.alert_id.cmp(&b.alert_id))
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::SequentialIds;
  use crate::types::AlertState;
  use chrono::TimeZone;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  fn gap() -> Duration {
    Duration::milliseconds(600_000)
  }

  fn alert(id: &str, site: &str, offset_ms: i64) -> Alert {
    Alert {
      alert_id: id.into(),
      device_id: None,
      site_id: site.into(),
      opened_at: t0() + Duration::milliseconds(offset_ms),
      closed_at: None,
      state: AlertState::Open,
    }
  }

  #[test]
  fn no_previous_incident_creates() {
    assert_eq!(decide(None, t0(), gap()), Decision::Create);
  }

  #[test]
  fn same_timestamp_merges() {
    assert_eq!(decide(Some(t0()), t0(), gap()), Decision::Merge);
  }

  #[test]
  fn boundary_gap_merges() {
    let at = t0() + gap();
    assert_eq!(decide(Some(t0()), at, gap()), Decision::Merge);
    let past = at + Duration::milliseconds(1);
    assert_eq!(decide(Some(t0()), past, gap()), Decision::Create);
  }

  #[test]
  fn older_alert_merges() {
    let earlier = t0() - Duration::hours(2);
    assert_eq!(decide(Some(t0()), earlier, gap()), Decision::Merge);
  }

  #[test]
  fn merge_then_split() {
    let ids = SequentialIds::new();
    let mut states = SiteStates::new();

    let a = states.assign(&alert("a", "s", 0), gap(), &ids, t0());
    let b = states.assign(&alert("b", "s", 60_000), gap(), &ids, t0());
    let c = states.assign(&alert("c", "s", 700_000), gap(), &ids, t0());

    assert_eq!(a.incident_id, "inc-1");
    assert!(a.created.is_some());
    assert_eq!(a.advanced_to, None);

    assert_eq!(b.incident_id, "inc-1");
    assert!(b.created.is_none());
    assert_eq!(b.advanced_to, Some(t0() + Duration::milliseconds(60_000)));

    assert_eq!(c.incident_id, "inc-2");
    let created = c.created.unwrap();
    assert_eq!(created.started_at, t0() + Duration::milliseconds(700_000));
    assert_eq!(created.last_alert_at, created.started_at);
    assert_eq!(created.site_id, "s");
  }

  #[test]
  fn chain_of_small_gaps_stays_one_incident() {
    let ids = SequentialIds::new();
    let mut states = SiteStates::new();
    for (i, offset) in [0, 500_000, 1_000_000, 1_500_000].iter().enumerate() {
      let out = states.assign(&alert(&format!("a{}", i), "s", *offset), gap(), &ids, t0());
      assert_eq!(out.incident_id, "inc-1");
    }
    assert_eq!(
      states.get("s").unwrap().last_alert_at,
      t0() + Duration::milliseconds(1_500_000)
    );
  }

  #[test]
  fn sites_are_independent() {
    let ids = SequentialIds::new();
    let mut states = SiteStates::new();
    let a = states.assign(&alert("a", "north", 0), gap(), &ids, t0());
    let b = states.assign(&alert("b", "south", 1_000), gap(), &ids, t0());
    assert_ne!(a.incident_id, b.incident_id);
    assert!(b.created.is_some());
    assert_eq!(states.len(), 2);
  }

  #[test]
  fn seeded_state_is_merged_into() {
    let ids = SequentialIds::new();
    let mut states = SiteStates::select_active(vec![(
      "s".to_string(),
      ActiveIncident {
        incident_id: "existing".into(),
        last_alert_at: t0(),
      },
    )]);
    let out = states.assign(&alert("a", "s", 300_000), gap(), &ids, t0());
    assert_eq!(out.incident_id, "existing");
    assert!(out.created.is_none());
    assert_eq!(out.advanced_to, Some(t0() + Duration::milliseconds(300_000)));
  }

  #[test]
  fn older_alert_does_not_move_last_alert_back() {
    let ids = SequentialIds::new();
    let mut states = SiteStates::select_active(vec![(
      "s".to_string(),
      ActiveIncident {
        incident_id: "existing".into(),
        last_alert_at: t0(),
      },
    )]);
    let out = states.assign(&alert("late", "s", -3_600_000), gap(), &ids, t0());
    assert_eq!(out.incident_id, "existing");
    assert_eq!(out.advanced_to, None);
    assert_eq!(states.get("s").unwrap().last_alert_at, t0());
  }

  #[test]
  fn select_active_keeps_latest_per_site() {
    let states = SiteStates::select_active(vec![
      (
        "s".to_string(),
        ActiveIncident {
          incident_id: "old".into(),
          last_alert_at: t0(),
        },
      ),
      (
        "s".to_string(),
        ActiveIncident {
          incident_id: "new".into(),
          last_alert_at: t0() + Duration::hours(1),
        },
      ),
      (
        "s".to_string(),
        ActiveIncident {
          incident_id: "older".into(),
          last_alert_at: t0() - Duration::hours(1),
        },
      ),
    ]);
    assert_eq!(states.len(), 1);
    assert_eq!(states.get("s").unwrap().incident_id, "new");
  }

  #[test]
  fn sort_orders_by_site_then_time_then_id() {
    let mut alerts = vec![
      alert("z", "b", 0),
      alert("y", "a", 5_000),
      alert("x", "a", 5_000),
      alert("w", "a", 0),
    ];
    sort_for_clustering(&mut alerts);
    let order: Vec<&str> = alerts.iter().map(|a| a.alert_id.as_str()).collect();
    assert_eq!(order, vec!["w", "x", "y", "z"]);
  }
}
