use crate::cycle::CYCLE_LENGTH_DAYS;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Alert, AlertKind, AlertSeverity, AppendMetricPayload, CreateProjectPayload, Cycle, Decision, DecisionKind,
    DecisionOrigin, DecisionOutcome, Metric, MetricAggregate, Project, ProjectAlert, ProjectState, ProjectSummary,
    RecordDecisionPayload, RejectedDecision,
};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;";

const PROJECT_COLUMNS: &str = "id, name, hypothesis, start_date, state, cycle_id, version, created_at";
const METRIC_COLUMNS: &str = "id, project_id, date, revenue, hours, conversions, notes, created_at";
const ALERT_COLUMNS: &str =
    "id, project_id, kind, severity, message, resolved, resolved_at, auto_resolved, created_at";
const DECISION_COLUMNS: &str =
    "id, project_id, kind, justification, origin, outcome, rejection_reason, proposal_id, created_at";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(CONNECTION_PRAGMAS).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    /// Runs read-only queries against one consistent snapshot.
    pub fn read<T>(&self, op: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        op(&*tx)
    }

    /// Runs `op` inside an immediate transaction. Commits on `Ok`; any error
    /// rolls back every statement `op` executed before it is returned.
    pub fn write<T>(
        &self,
        operation: &str,
        op: impl FnOnce(&Transaction<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback() {
                    tracing::error!(operation, error = %rollback_error, "rollback failed");
                }
                tracing::error!(operation, error = %error, "transaction rolled back");
                Err(error)
            }
        }
    }
}

pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn insert_cycle(conn: &Connection, start_date: NaiveDate, now: DateTime<Utc>) -> AppResult<Cycle> {
    let end_date = start_date + Duration::days(CYCLE_LENGTH_DAYS);
    conn.execute("UPDATE cycles SET active = 0 WHERE active = 1", [])?;
    conn.execute(
        "INSERT INTO cycles (start_date, end_date, active, created_at) VALUES (?1, ?2, 1, ?3)",
        params![format_date(start_date), format_date(end_date), timestamp(now)],
    )?;

    Ok(Cycle {
        id: conn.last_insert_rowid(),
        start_date,
        end_date,
        active: true,
        created_at: now,
    })
}

pub fn active_cycle(conn: &Connection) -> AppResult<Option<Cycle>> {
    let cycle = conn
        .query_row(
            "SELECT id, start_date, end_date, active, created_at
             FROM cycles WHERE active = 1 ORDER BY id DESC LIMIT 1",
            [],
            parse_cycle_row,
        )
        .optional()?;
    Ok(cycle)
}

pub fn insert_project(conn: &Connection, payload: &CreateProjectPayload, now: DateTime<Utc>) -> AppResult<Project> {
    let cycle_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM cycles WHERE active = 1 ORDER BY start_date DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    conn.execute(
        "INSERT INTO projects (name, hypothesis, start_date, state, cycle_id, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![
            payload.name,
            payload.hypothesis,
            format_date(payload.start_date),
            payload.state.as_str(),
            cycle_id,
            timestamp(now),
        ],
    )?;

    Ok(Project {
        id: conn.last_insert_rowid(),
        name: payload.name.clone(),
        hypothesis: payload.hypothesis.clone(),
        start_date: payload.start_date,
        state: payload.state,
        cycle_id,
        version: 1,
        created_at: now,
    })
}

pub fn get_project(conn: &Connection, project_id: i64) -> AppResult<Option<Project>> {
    let project = conn
        .query_row(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            [project_id],
            parse_project_row,
        )
        .optional()?;
    Ok(project)
}

pub fn require_project(conn: &Connection, project_id: i64) -> AppResult<Project> {
    get_project(conn, project_id)?.ok_or_else(|| AppError::NotFound(format!("project {}", project_id)))
}

pub fn list_projects(conn: &Connection, state: Option<ProjectState>) -> AppResult<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM projects
         WHERE (?1 IS NULL OR state = ?1)
         ORDER BY created_at DESC, id DESC",
        PROJECT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([state.map(ProjectState::as_str)], parse_project_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Unconditional state write; every write bumps `version`.
pub fn set_project_state(conn: &Connection, project_id: i64, state: ProjectState) -> AppResult<Project> {
    let changed = conn.execute(
        "UPDATE projects SET state = ?1, version = version + 1 WHERE id = ?2",
        params![state.as_str(), project_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("project {}", project_id)));
    }
    require_project(conn, project_id)
}

pub fn delete_project(conn: &Connection, project_id: i64) -> AppResult<bool> {
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
    Ok(changed > 0)
}

pub fn project_summaries(conn: &Connection) -> AppResult<Vec<ProjectSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, hypothesis, state, version, start_date,
                total_revenue, total_hours, total_conversions, metric_count, last_metric_date
         FROM v_project_summary
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let last_date = row
                .get::<_, Option<String>>(10)?
                .map(|raw| parse_date(&raw))
                .transpose()?;
            Ok(ProjectSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                hypothesis: row.get(2)?,
                state: parse_state(&row.get::<_, String>(3)?)?,
                version: row.get(4)?,
                start_date: parse_date(&row.get::<_, String>(5)?)?,
                aggregate: MetricAggregate::from_totals(
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    last_date,
                ),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StateCounts {
    pub in_play: i64,
    pub winners: i64,
    pub killed: i64,
    pub paused: i64,
}

pub fn state_counts(conn: &Connection) -> AppResult<StateCounts> {
    let counts = conn.query_row(
        "SELECT
           COUNT(CASE WHEN state IN ('active', 'mvp') THEN 1 END),
           COUNT(CASE WHEN state = 'winner' THEN 1 END),
           COUNT(CASE WHEN state = 'killed' THEN 1 END),
           COUNT(CASE WHEN state = 'paused' THEN 1 END)
         FROM projects",
        [],
        |row| {
            Ok(StateCounts {
                in_play: row.get(0)?,
                winners: row.get(1)?,
                killed: row.get(2)?,
                paused: row.get(3)?,
            })
        },
    )?;
    Ok(counts)
}

/// A killed project with the justification of its latest kill decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KilledProject {
    pub project_id: i64,
    pub name: String,
    pub reason: Option<String>,
}

pub fn killed_projects(conn: &Connection, limit: usize) -> AppResult<Vec<KilledProject>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name,
                (SELECT d.justification FROM decisions d
                 WHERE d.project_id = p.id AND d.kind = 'kill'
                 ORDER BY d.created_at DESC, d.id DESC LIMIT 1)
         FROM projects p
         WHERE p.state = 'killed'
         ORDER BY p.id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(KilledProject {
                project_id: row.get(0)?,
                name: row.get(1)?,
                reason: row.get::<_, Option<String>>(2)?.filter(|reason| !reason.trim().is_empty()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Raw activity markers for one project. Dates stay unparsed so the zombie
/// scan can skip a corrupt row without failing the whole query.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub project_id: i64,
    pub name: String,
    pub state: ProjectState,
    pub start_date: String,
    pub last_metric: Option<String>,
    pub last_decision: Option<String>,
}

pub fn activity_candidates(conn: &Connection) -> AppResult<Vec<ActivityRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.state, p.start_date,
                (SELECT MAX(m.date) FROM metrics m WHERE m.project_id = p.id),
                (SELECT MAX(d.created_at) FROM decisions d WHERE d.project_id = p.id)
         FROM projects p
         ORDER BY p.id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ActivityRow {
                project_id: row.get(0)?,
                name: row.get(1)?,
                state: parse_state(&row.get::<_, String>(2)?)?,
                start_date: row.get(3)?,
                last_metric: row.get(4)?,
                last_decision: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_metric(conn: &Connection, payload: &AppendMetricPayload, now: DateTime<Utc>) -> AppResult<Metric> {
    conn.execute(
        "INSERT INTO metrics (project_id, date, revenue, hours, conversions, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            payload.project_id,
            format_date(payload.date),
            payload.revenue,
            payload.hours,
            payload.conversions,
            payload.notes,
            timestamp(now),
        ],
    )?;

    Ok(Metric {
        id: conn.last_insert_rowid(),
        project_id: payload.project_id,
        date: payload.date,
        revenue: payload.revenue,
        hours: payload.hours,
        conversions: payload.conversions,
        notes: payload.notes.clone(),
        created_at: now,
    })
}

pub fn list_metrics(conn: &Connection, project_id: i64) -> AppResult<Vec<Metric>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM metrics WHERE project_id = ?1 ORDER BY date DESC, id DESC",
        METRIC_COLUMNS
    ))?;
    let rows = stmt
        .query_map([project_id], parse_metric_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn aggregate_metrics(conn: &Connection, project_id: i64) -> AppResult<MetricAggregate> {
    let aggregate = conn.query_row(
        "SELECT COALESCE(SUM(revenue), 0.0), COALESCE(SUM(hours), 0.0), COALESCE(SUM(conversions), 0),
                COUNT(*), MAX(date)
         FROM metrics WHERE project_id = ?1",
        [project_id],
        |row| {
            let last_date = row
                .get::<_, Option<String>>(4)?
                .map(|raw| parse_date(&raw))
                .transpose()?;
            Ok(MetricAggregate::from_totals(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                last_date,
            ))
        },
    )?;
    Ok(aggregate)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowTotals {
    pub revenue: f64,
    pub hours: f64,
    pub days_with_metrics: i64,
}

pub fn metric_totals_since(conn: &Connection, since: NaiveDate) -> AppResult<WindowTotals> {
    let totals = conn.query_row(
        "SELECT COALESCE(SUM(revenue), 0.0), COALESCE(SUM(hours), 0.0), COUNT(DISTINCT date)
         FROM metrics WHERE date >= ?1",
        [format_date(since)],
        |row| {
            Ok(WindowTotals {
                revenue: row.get(0)?,
                hours: row.get(1)?,
                days_with_metrics: row.get(2)?,
            })
        },
    )?;
    Ok(totals)
}

pub fn list_alerts(conn: &Connection, project_id: i64, only_unresolved: bool) -> AppResult<Vec<Alert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM alerts
         WHERE project_id = ?1 AND (?2 = 0 OR resolved = 0)
         ORDER BY created_at DESC, id DESC",
        ALERT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![project_id, only_unresolved], parse_alert_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_alert(
    conn: &Connection,
    project_id: i64,
    kind: AlertKind,
    message: &str,
    now: DateTime<Utc>,
) -> AppResult<Alert> {
    let severity = kind.severity();
    conn.execute(
        "INSERT INTO alerts (project_id, kind, severity, message, resolved, auto_resolved, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
        params![project_id, kind.as_str(), severity.as_str(), message, timestamp(now)],
    )?;

    Ok(Alert {
        id: conn.last_insert_rowid(),
        project_id,
        kind,
        severity,
        message: message.to_string(),
        resolved: false,
        resolved_at: None,
        auto_resolved: false,
        created_at: now,
    })
}

/// Marks an open alert resolved. Returns false when it was already resolved
/// or does not exist.
pub fn resolve_alert(conn: &Connection, alert_id: i64, automatic: bool, now: DateTime<Utc>) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE alerts SET resolved = 1, resolved_at = ?1, auto_resolved = ?2
         WHERE id = ?3 AND resolved = 0",
        params![timestamp(now), automatic, alert_id],
    )?;
    Ok(changed > 0)
}

pub fn list_unresolved_alerts(conn: &Connection) -> AppResult<Vec<ProjectAlert>> {
    let columns = ALERT_COLUMNS
        .split(", ")
        .map(|column| format!("a.{}", column))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, p.name FROM alerts a
         JOIN projects p ON p.id = a.project_id
         WHERE a.resolved = 0
         ORDER BY a.created_at DESC, a.id DESC",
        columns
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ProjectAlert {
                alert: parse_alert_row(row)?,
                project_name: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_unresolved_alerts(conn: &Connection) -> AppResult<i64> {
    let count = conn.query_row("SELECT COUNT(1) FROM alerts WHERE resolved = 0", [], |row| row.get(0))?;
    Ok(count)
}

pub fn insert_decision(conn: &Connection, payload: &RecordDecisionPayload, now: DateTime<Utc>) -> AppResult<Decision> {
    conn.execute(
        "INSERT INTO decisions (project_id, kind, justification, origin, outcome, rejection_reason, proposal_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            payload.project_id,
            payload.kind.as_str(),
            payload.justification,
            payload.origin.as_str(),
            payload.outcome.map(DecisionOutcome::as_str),
            payload.rejection_reason,
            payload.proposal_id,
            timestamp(now),
        ],
    )?;

    Ok(Decision {
        id: conn.last_insert_rowid(),
        project_id: payload.project_id,
        kind: payload.kind,
        justification: payload.justification.clone(),
        origin: payload.origin,
        outcome: payload.outcome,
        rejection_reason: payload.rejection_reason.clone(),
        proposal_id: payload.proposal_id,
        created_at: now,
    })
}

pub fn get_decision(conn: &Connection, decision_id: i64) -> AppResult<Option<Decision>> {
    let decision = conn
        .query_row(
            &format!("SELECT {} FROM decisions WHERE id = ?1", DECISION_COLUMNS),
            [decision_id],
            parse_decision_row,
        )
        .optional()?;
    Ok(decision)
}

pub fn list_decisions(conn: &Connection, project_id: i64) -> AppResult<Vec<Decision>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM decisions WHERE project_id = ?1 ORDER BY created_at DESC, id DESC",
        DECISION_COLUMNS
    ))?;
    let rows = stmt
        .query_map([project_id], parse_decision_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn pending_proposals(conn: &Connection) -> AppResult<Vec<Decision>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM decisions d
         WHERE d.origin = 'ai' AND d.outcome IS NULL
           AND NOT EXISTS (SELECT 1 FROM decisions r WHERE r.proposal_id = d.id)
         ORDER BY d.created_at DESC, d.id DESC",
        DECISION_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], parse_decision_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn has_response(conn: &Connection, proposal_id: i64) -> AppResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(1) FROM decisions WHERE proposal_id = ?1",
        [proposal_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn rejections_since(conn: &Connection, since: DateTime<Utc>) -> AppResult<Vec<RejectedDecision>> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.project_id, p.name, d.kind, d.justification, d.rejection_reason, d.created_at
         FROM decisions d
         JOIN projects p ON p.id = d.project_id
         WHERE d.outcome = 'rejected' AND d.created_at >= ?1
         ORDER BY d.created_at DESC, d.id DESC",
    )?;
    let rows = stmt
        .query_map([timestamp(since)], |row| {
            Ok(RejectedDecision {
                decision_id: row.get(0)?,
                project_id: row.get(1)?,
                project_name: row.get(2)?,
                kind: parse_decision_kind(&row.get::<_, String>(3)?)?,
                justification: row.get(4)?,
                rejection_reason: row.get(5)?,
                created_at: parse_time(&row.get::<_, String>(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn parse_cycle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cycle> {
    Ok(Cycle {
        id: row.get(0)?,
        start_date: parse_date(&row.get::<_, String>(1)?)?,
        end_date: parse_date(&row.get::<_, String>(2)?)?,
        active: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        hypothesis: row.get(2)?,
        start_date: parse_date(&row.get::<_, String>(3)?)?,
        state: parse_state(&row.get::<_, String>(4)?)?,
        cycle_id: row.get(5)?,
        version: row.get(6)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_metric_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Metric> {
    Ok(Metric {
        id: row.get(0)?,
        project_id: row.get(1)?,
        date: parse_date(&row.get::<_, String>(2)?)?,
        revenue: row.get(3)?,
        hours: row.get(4)?,
        conversions: row.get(5)?,
        notes: row.get(6)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let kind_raw: String = row.get(2)?;
    let severity_raw: String = row.get(3)?;
    Ok(Alert {
        id: row.get(0)?,
        project_id: row.get(1)?,
        kind: AlertKind::parse(&kind_raw).ok_or_else(|| invalid_text(format!("Unknown alert kind '{}'", kind_raw)))?,
        severity: AlertSeverity::parse(&severity_raw)
            .ok_or_else(|| invalid_text(format!("Unknown alert severity '{}'", severity_raw)))?,
        message: row.get(4)?,
        resolved: row.get(5)?,
        resolved_at: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
        auto_resolved: row.get(7)?,
        created_at: parse_time(&row.get::<_, String>(8)?)?,
    })
}

fn parse_decision_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Decision> {
    let origin_raw: String = row.get(4)?;
    Ok(Decision {
        id: row.get(0)?,
        project_id: row.get(1)?,
        kind: parse_decision_kind(&row.get::<_, String>(2)?)?,
        justification: row.get(3)?,
        origin: DecisionOrigin::parse(&origin_raw)
            .ok_or_else(|| invalid_text(format!("Unknown decision origin '{}'", origin_raw)))?,
        outcome: row
            .get::<_, Option<String>>(5)?
            .map(|raw| {
                DecisionOutcome::parse(&raw).ok_or_else(|| invalid_text(format!("Unknown decision outcome '{}'", raw)))
            })
            .transpose()?,
        rejection_reason: row.get(6)?,
        proposal_id: row.get(7)?,
        created_at: parse_time(&row.get::<_, String>(8)?)?,
    })
}

fn parse_state(raw: &str) -> rusqlite::Result<ProjectState> {
    ProjectState::parse(raw).ok_or_else(|| invalid_text(format!("Unknown project state '{}'", raw)))
}

fn parse_decision_kind(raw: &str) -> rusqlite::Result<DecisionKind> {
    DecisionKind::parse(raw).ok_or_else(|| invalid_text(format!("Unknown decision kind '{}'", raw)))
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| invalid_text(error.to_string()))
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| invalid_text(error.to_string()))
}

fn invalid_text(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::{
        activity_candidates, aggregate_metrics, delete_project, insert_alert, insert_cycle, insert_decision,
        insert_metric, insert_project, list_alerts, list_decisions, list_metrics, project_summaries, rejections_since,
        set_project_state, Database,
    };
    use crate::errors::ErrorKind;
    use crate::models::{
        AlertKind, AppendMetricPayload, CreateProjectPayload, DecisionKind, DecisionOrigin, DecisionOutcome,
        ProjectState, RecordDecisionPayload,
    };
    use chrono::{Duration, NaiveDate, Utc};

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    fn project_payload(name: &str) -> CreateProjectPayload {
        CreateProjectPayload {
            name: name.to_string(),
            hypothesis: "People will pay for weekly digests".to_string(),
            start_date: date("2026-01-01"),
            state: ProjectState::Active,
        }
    }

    fn metric_payload(project_id: i64, day: &str, revenue: f64, hours: f64) -> AppendMetricPayload {
        AppendMetricPayload {
            project_id,
            date: date(day),
            revenue,
            hours,
            conversions: 1,
            notes: String::new(),
        }
    }

    #[test]
    fn new_cycle_deactivates_previous_and_projects_link_to_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let first = db
            .write("cycle", |tx| insert_cycle(tx, date("2026-01-01"), Utc::now()))
            .expect("first cycle");
        let second = db
            .write("cycle", |tx| insert_cycle(tx, date("2026-04-01"), Utc::now()))
            .expect("second cycle");
        assert_eq!(second.end_date, date("2026-06-30"));

        let active = db.read(super::active_cycle).expect("active").expect("exists");
        assert_eq!(active.id, second.id);
        assert_ne!(active.id, first.id);

        let project = db
            .write("project", |tx| insert_project(tx, &project_payload("digest"), Utc::now()))
            .expect("project");
        assert_eq!(project.cycle_id, Some(second.id));
        assert_eq!(project.version, 1);
    }

    #[test]
    fn aggregate_sums_all_metrics_and_floors_roi() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let project = db
            .write("project", |tx| insert_project(tx, &project_payload("digest"), Utc::now()))
            .expect("project");

        let empty = db.read(|conn| aggregate_metrics(conn, project.id)).expect("aggregate");
        assert_eq!(empty.count, 0);
        assert_eq!(empty.roi, 0.0);
        assert!(empty.last_date.is_none());

        db.write("metrics", |tx| {
            insert_metric(tx, &metric_payload(project.id, "2026-01-02", 300.0, 0.0), Utc::now())?;
            insert_metric(tx, &metric_payload(project.id, "2026-01-05", 200.0, 0.0), Utc::now())
        })
        .expect("metrics");

        let aggregate = db.read(|conn| aggregate_metrics(conn, project.id)).expect("aggregate");
        assert_eq!(aggregate.count, 2);
        assert_eq!(aggregate.total_revenue, 500.0);
        assert_eq!(aggregate.total_conversions, 2);
        assert_eq!(aggregate.roi, 0.0);
        assert_eq!(aggregate.last_date, Some(date("2026-01-05")));

        let metrics = db.read(|conn| list_metrics(conn, project.id)).expect("list");
        assert_eq!(metrics[0].date, date("2026-01-05"));
    }

    #[test]
    fn failed_write_rolls_back_every_statement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let project = db
            .write("project", |tx| insert_project(tx, &project_payload("digest"), Utc::now()))
            .expect("project");

        let result = db.write("metrics", |tx| {
            insert_metric(tx, &metric_payload(project.id, "2026-01-02", 10.0, 1.0), Utc::now())?;
            insert_metric(tx, &metric_payload(9_999, "2026-01-02", 10.0, 1.0), Utc::now())
        });
        assert_eq!(result.expect_err("foreign key").kind(), ErrorKind::Storage);

        let metrics = db.read(|conn| list_metrics(conn, project.id)).expect("list");
        assert!(metrics.is_empty());
    }

    #[test]
    fn state_writes_bump_version_and_delete_cascades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let project = db
            .write("project", |tx| insert_project(tx, &project_payload("digest"), Utc::now()))
            .expect("project");

        let updated = db
            .write("state", |tx| set_project_state(tx, project.id, ProjectState::Paused))
            .expect("state");
        assert_eq!(updated.version, 2);
        let same_state = db
            .write("state", |tx| set_project_state(tx, project.id, ProjectState::Paused))
            .expect("state");
        assert_eq!(same_state.version, 3);

        db.write("children", |tx| {
            insert_metric(tx, &metric_payload(project.id, "2026-01-02", 10.0, 1.0), Utc::now())?;
            insert_alert(tx, project.id, AlertKind::InsufficientData, "need more", Utc::now())?;
            insert_decision(
                tx,
                &RecordDecisionPayload {
                    project_id: project.id,
                    kind: DecisionKind::Kill,
                    justification: "no traction".to_string(),
                    outcome: Some(DecisionOutcome::Postponed),
                    origin: DecisionOrigin::Manual,
                    rejection_reason: None,
                    proposal_id: None,
                },
                Utc::now(),
            )
        })
        .expect("children");

        assert!(db.write("delete", |tx| delete_project(tx, project.id)).expect("delete"));
        db.read(|conn| {
            assert!(list_metrics(conn, project.id)?.is_empty());
            assert!(list_alerts(conn, project.id, false)?.is_empty());
            assert!(list_decisions(conn, project.id)?.is_empty());
            Ok(())
        })
        .expect("cascade");
    }

    #[test]
    fn summaries_and_rejections_join_project_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let project = db
            .write("project", |tx| insert_project(tx, &project_payload("digest"), Utc::now()))
            .expect("project");
        let old = Utc::now() - Duration::days(45);
        db.write("decisions", |tx| {
            insert_metric(tx, &metric_payload(project.id, "2026-01-02", 100.0, 4.0), Utc::now())?;
            for (created_at, reason) in [(old, "too early"), (Utc::now(), "ads still running")] {
                insert_decision(
                    tx,
                    &RecordDecisionPayload {
                        project_id: project.id,
                        kind: DecisionKind::Kill,
                        justification: "flat revenue".to_string(),
                        outcome: Some(DecisionOutcome::Rejected),
                        origin: DecisionOrigin::Ai,
                        rejection_reason: Some(reason.to_string()),
                        proposal_id: None,
                    },
                    created_at,
                )?;
            }
            Ok(())
        })
        .expect("seed");

        let summaries = db.read(project_summaries).expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].aggregate.roi, 25.0);

        let recent = db
            .read(|conn| rejections_since(conn, Utc::now() - Duration::days(30)))
            .expect("rejections");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].project_name, "digest");
        assert_eq!(recent[0].rejection_reason.as_deref(), Some("ads still running"));

        let candidates = db.read(activity_candidates).expect("candidates");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].last_metric.as_deref(), Some("2026-01-02"));
        assert!(candidates[0].last_decision.is_some());
    }
}
