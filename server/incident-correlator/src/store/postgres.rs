//! PostgreSQL implementation of the incident store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgPoolOptions, PgRow, Postgres};

use crate::error::StoreError;
use crate::store::IncidentStore;
use crate::types::*;

const SCHEMA: &str = include_str!("../../migrations/0001_incidents.sql");

/// Split the schema file into executable statements, dropping comment-only chunks.
fn schema_statements(sql: &str) -> Vec<String> {
  sql
    .split(';')
    .map(|chunk| {
      chunk
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
    })
    .filter(|s| !s.is_empty())
    .collect()
}

pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[tracing::instrument(skip(database_url), level = "info")]
  pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .connect(database_url)
      .await?;
    tracing::info!(max_connections, "connected to postgres");
    Ok(Self { pool })
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  /// Create the tables and indexes if missing. Safe to run on every start.
  #[tracing::instrument(skip(self), level = "info")]
  pub async fn ensure_schema(&self) -> Result<(), StoreError> {
    for stmt in schema_statements(SCHEMA) {
      query::<Postgres>(&stmt)
        .execute(&self.pool)
        .await
        .map_err(|e| {
          tracing::error!(error = %e, "schema statement failed");
          StoreError::Schema(e.to_string())
        })?;
    }
    tracing::info!("schema up to date");
    Ok(())
  }
}

/// Lower bound for the text comparison on `alerts.opened_at`.
///
/// The column is ISO-8601 text in whatever offset the ingestion pipeline wrote, so
/// a full-timestamp string comparison misorders rows with non-UTC offsets. Comparing
/// against the calendar date a day before `since` keeps every row whose instant is
/// in the window (offsets stay within a day of UTC) and still uses the index; the
/// engine drops the surplus after parsing.
fn opened_at_floor(since: DateTime<Utc>) -> String {
  since
    .checked_sub_signed(Duration::days(1))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
    .format("%Y-%m-%d")
    .to_string()
}

fn alert_row(row: &PgRow) -> Result<AlertRow, StoreError> {
  Ok(AlertRow {
    alert_id: row.try_get("alert_id")?,
    device_id: row.try_get("device_id")?,
    site_id: row.try_get("site_id")?,
    opened_at: row.try_get("opened_at")?,
    closed_at: row.try_get("closed_at")?,
    state: row.try_get("state")?,
  })
}

#[async_trait]
impl IncidentStore for PgStore {
  #[tracing::instrument(skip(self), level = "debug")]
  async fn select_unlinked_alerts(&self, since: DateTime<Utc>) -> Result<Vec<AlertRow>, StoreError> {
    let floor = opened_at_floor(since);
    let rows = query::<Postgres>(
      r#"
      SELECT
        a.alert_id,
        a.device_id,
        COALESCE(NULLIF(a.site_id, ''), d.site_id) AS site_id,
        a.opened_at,
        a.closed_at,
        a.state
      FROM alerts a
      LEFT JOIN devices d ON d.device_id = a.device_id
      WHERE a.opened_at >= $1
        AND COALESCE(NULLIF(a.site_id, ''), d.site_id) IS NOT NULL
        AND NOT EXISTS (
          SELECT 1 FROM incident_alerts l WHERE l.alert_id = a.alert_id
        )
      ORDER BY 3, a.opened_at
      "#,
    )
    .bind(floor)
    .fetch_all(&self.pool)
    .await?;

    let alerts = rows.iter().map(alert_row).collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(count = alerts.len(), "unlinked alerts loaded");
    Ok(alerts)
  }

  #[tracing::instrument(skip(self), level = "debug")]
  async fn select_open_incidents(&self, since: DateTime<Utc>) -> Result<Vec<IncidentRow>, StoreError> {
    let rows = query::<Postgres>(
      r#"
      SELECT incident_id, site_id, last_alert_at::text AS last_alert_at
      FROM incidents
      WHERE resolved_at IS NULL AND last_alert_at >= $1
      "#,
    )
    .bind(since)
    .fetch_all(&self.pool)
    .await?;

    rows
      .iter()
      .map(|row| -> Result<IncidentRow, StoreError> {
        Ok(IncidentRow {
          incident_id: row.try_get("incident_id")?,
          site_id: row.try_get("site_id")?,
          last_alert_at: row.try_get("last_alert_at")?,
        })
      })
      .collect()
  }

  #[tracing::instrument(skip(self, incident), fields(incident_id = %incident.incident_id), level = "debug")]
  async fn create_incident(&self, incident: &NewIncident) -> Result<bool, StoreError> {
    let result = query::<Postgres>(
      r#"
      INSERT INTO incidents (incident_id, site_id, started_at, last_alert_at, created_at, updated_at)
      VALUES ($1, $2, $3, $4, $5, $5)
      ON CONFLICT (incident_id) DO NOTHING
      "#,
    )
    .bind(&incident.incident_id)
    .bind(&incident.site_id)
    .bind(incident.started_at)
    .bind(incident.last_alert_at)
    .bind(incident.created_at)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  #[tracing::instrument(skip(self), level = "debug")]
  async fn link_alert_idempotent(&self, incident_id: &str, alert_id: &str) -> Result<(), StoreError> {
    // No conflict target: covers both the pair key and the one-link-per-alert index.
    query::<Postgres>(
      "INSERT INTO incident_alerts (incident_id, alert_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(incident_id)
    .bind(alert_id)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[tracing::instrument(skip(self), level = "debug")]
  async fn update_incident_last_alert(
    &self,
    incident_id: &str,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<(), StoreError> {
    query::<Postgres>(
      r#"
      UPDATE incidents
      SET last_alert_at = GREATEST(last_alert_at, $2), updated_at = $3
      WHERE incident_id = $1
      "#,
    )
    .bind(incident_id)
    .bind(at)
    .bind(now)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[tracing::instrument(skip(self), level = "debug")]
  async fn select_resolution_candidates(
    &self,
    since: DateTime<Utc>,
  ) -> Result<Vec<ResolutionCandidate>, StoreError> {
    let incidents = query::<Postgres>(
      r#"
      SELECT incident_id, last_alert_at::text AS last_alert_at
      FROM incidents
      WHERE resolved_at IS NULL AND started_at >= $1
      ORDER BY incident_id
      "#,
    )
    .bind(since)
    .fetch_all(&self.pool)
    .await?;

    let links = query::<Postgres>(
      r#"
      SELECT l.incident_id, l.alert_id, a.state, a.closed_at
      FROM incident_alerts l
      JOIN incidents i ON i.incident_id = l.incident_id
      LEFT JOIN alerts a ON a.alert_id = l.alert_id
      WHERE i.resolved_at IS NULL AND i.started_at >= $1
      ORDER BY l.incident_id, l.alert_id
      "#,
    )
    .bind(since)
    .fetch_all(&self.pool)
    .await?;

    let mut linked: HashMap<String, Vec<LinkedAlertRow>> = HashMap::new();
    for row in &links {
      let incident_id: String = row.try_get("incident_id")?;
      linked.entry(incident_id).or_default().push(LinkedAlertRow {
        alert_id: row.try_get("alert_id")?,
        state: row.try_get("state")?,
        closed_at: row.try_get("closed_at")?,
      });
    }

    incidents
      .iter()
      .map(|row| -> Result<ResolutionCandidate, StoreError> {
        let incident_id: String = row.try_get("incident_id")?;
        let alerts = linked.remove(&incident_id).unwrap_or_default();
        Ok(ResolutionCandidate {
          incident_id,
          last_alert_at: row.try_get("last_alert_at")?,
          alerts,
        })
      })
      .collect()
  }

  #[tracing::instrument(skip(self), level = "debug")]
  async fn mark_resolved(
    &self,
    incident_id: &str,
    resolved_at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<(), StoreError> {
    query::<Postgres>(
      r#"
      UPDATE incidents
      SET resolved_at = $2, updated_at = $3
      WHERE incident_id = $1 AND resolved_at IS NULL
      "#,
    )
    .bind(incident_id)
    .bind(resolved_at)
    .bind(now)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn schema_splits_into_statements() {
    let stmts = schema_statements(SCHEMA);
    assert!(stmts.iter().all(|s| !s.starts_with("--")));
    assert!(stmts.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS incidents")));
    assert!(stmts
      .iter()
      .any(|s| s.contains("CREATE UNIQUE INDEX IF NOT EXISTS incident_alerts_alert_id")));
    assert_eq!(stmts.len(), 7);
  }

  #[test]
  fn floor_keeps_rows_written_with_offsets() {
    use chrono::TimeZone;

    let since = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
    let floor = opened_at_floor(since);
    assert_eq!(floor, "2025-01-14");

    // 11:00Z and 10:30Z, written with offsets that sort below `since` as text.
    assert!("2025-01-15T09:00:00-02:00" >= floor.as_str());
    assert!("2025-01-14T22:30:00-12:00" >= floor.as_str());
    assert!("2025-01-15 10:30:00+00" >= floor.as_str());
    assert!("2025-01-13T23:59:59Z" < floor.as_str());
  }

  #[test]
  fn comment_only_chunks_are_dropped() {
    let stmts = schema_statements("-- just a note\n;\nSELECT 1;\n-- trailing\n");
    assert_eq!(stmts, vec!["SELECT 1".to_string()]);
  }
}
