use crate::db::{self, ActivityRow};
use crate::errors::AppResult;
use crate::models::ProjectState;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zombie {
    pub project_id: i64,
    pub name: String,
    pub state: ProjectState,
    pub last_activity: NaiveDate,
    pub idle_days: i64,
}

/// Projects still in play whose latest metric or decision is at least
/// `inactivity_days` old. Without any activity the start date counts.
pub fn detect(conn: &Connection, inactivity_days: i64, today: NaiveDate) -> AppResult<Vec<Zombie>> {
    let mut zombies = Vec::new();
    let candidates = db::activity_candidates(conn)?
        .into_iter()
        .filter(|candidate| candidate.state.is_fluid());
    for candidate in candidates {
        let last_activity = match last_activity(&candidate) {
            Ok(date) => date,
            Err(raw) => {
                tracing::warn!(
                    project_id = candidate.project_id,
                    value = %raw,
                    "unparseable activity date; skipping zombie check"
                );
                continue;
            }
        };
        let idle_days = (today - last_activity).num_days();
        if idle_days >= inactivity_days {
            zombies.push(Zombie {
                project_id: candidate.project_id,
                name: candidate.name,
                state: candidate.state,
                last_activity,
                idle_days,
            });
        }
    }
    Ok(zombies)
}

/// Latest activity date for a candidate, or the raw value that failed to parse.
fn last_activity(candidate: &ActivityRow) -> Result<NaiveDate, String> {
    let recorded = [candidate.last_metric.as_deref(), candidate.last_decision.as_deref()];
    let mut latest: Option<NaiveDate> = None;
    for raw in recorded.into_iter().flatten() {
        let date = activity_date(raw).ok_or_else(|| raw.to_string())?;
        latest = Some(latest.map_or(date, |current| current.max(date)));
    }
    match latest {
        Some(date) => Ok(date),
        None => activity_date(&candidate.start_date).ok_or_else(|| candidate.start_date.clone()),
    }
}

/// Dates and RFC 3339 timestamps both start with `YYYY-MM-DD`.
fn activity_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
