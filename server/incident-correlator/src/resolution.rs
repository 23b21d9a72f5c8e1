//! Resolution check for open incidents, recomputed from scratch every sweep.

use chrono::{DateTime, Utc};

use crate::parse::{self, SkipReason};
use crate::types::ResolutionCandidate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  /// Every linked alert is closed; resolve at this time.
  Resolve(DateTime<Utc>),
  /// At least one linked alert is open or acknowledged.
  StillActive,
  /// Some field could not be parsed; leave the incident open this pass.
  Skip(SkipReason),
}

/// Decide whether an open incident can be resolved.
///
/// `resolved_at = max(latest linked closed_at, last_alert_at)`; with no closed_at
/// anywhere that is just `last_alert_at`. An incident with no links resolves too:
/// none of its alerts is active.
pub fn evaluate(candidate: &ResolutionCandidate) -> Verdict {
  let last_alert_at = match parse::parse_required_timestamp(
    &candidate.incident_id,
    "last_alert_at",
    &candidate.last_alert_at,
  ) {
    Ok(t) => t,
    Err(reason) => return Verdict::Skip(reason),
  };

  let mut latest_close: Option<DateTime<Utc>> = None;
  for linked in &candidate.alerts {
    let (state, closed_at) = match parse::parse_linked_alert(linked) {
      Ok(v) => v,
      Err(reason) => return Verdict::Skip(reason),
    };
    if state.is_active() {
      return Verdict::StillActive;
    }
    latest_close = latest_close.max(closed_at);
  }

  Verdict::Resolve(latest_close.map_or(last_alert_at, |c| c.max(last_alert_at)))
}
