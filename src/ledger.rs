use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Decision, DecisionOrigin, DecisionOutcome, ProjectState, RecordDecisionPayload, RejectedDecision,
};
use crate::validation;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: ProjectState,
    pub to: ProjectState,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedDecision {
    pub decision: Decision,
    pub state_change: Option<StateChange>,
}

/// Appends a decision. An accepted kill, scale or pause also moves the project
/// to its target state; both writes share the caller's transaction.
pub fn record(conn: &Connection, payload: &RecordDecisionPayload, now: DateTime<Utc>) -> AppResult<RecordedDecision> {
    let project = db::require_project(conn, payload.project_id)?;
    if payload.origin == DecisionOrigin::Manual && payload.outcome.is_none() {
        return Err(AppError::validation(
            "outcome",
            "",
            "manual decisions need an outcome (accepted, rejected or postponed)",
        ));
    }
    let rejection_reason = validation::rejection_reason(payload.outcome, payload.rejection_reason.as_deref())?;
    let payload = RecordDecisionPayload {
        justification: payload.justification.trim().to_string(),
        rejection_reason,
        ..payload.clone()
    };

    let decision = db::insert_decision(conn, &payload, now)?;
    let state_change = match (decision.outcome, decision.kind.target_state()) {
        (Some(DecisionOutcome::Accepted), Some(target)) => {
            let updated = db::set_project_state(conn, project.id, target)?;
            tracing::info!(
                project_id = project.id,
                decision_id = decision.id,
                from = project.state.as_str(),
                to = target.as_str(),
                version = updated.version,
                "decision accepted; project state updated"
            );
            Some(StateChange {
                from: project.state,
                to: target,
                version: updated.version,
            })
        }
        _ => None,
    };

    Ok(RecordedDecision { decision, state_change })
}

/// Answers a pending AI proposal with a new ledger row linked to it.
pub fn respond(
    conn: &Connection,
    proposal_id: i64,
    outcome: DecisionOutcome,
    rejection_reason: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<RecordedDecision> {
    let proposal = db::get_decision(conn, proposal_id)?
        .ok_or_else(|| AppError::NotFound(format!("decision {}", proposal_id)))?;
    if proposal.origin != DecisionOrigin::Ai || proposal.outcome.is_some() {
        return Err(AppError::validation(
            "proposal_id",
            proposal_id,
            "only pending AI proposals can be answered",
        ));
    }
    if db::has_response(conn, proposal_id)? {
        return Err(AppError::validation(
            "proposal_id",
            proposal_id,
            "this proposal has already been answered",
        ));
    }

    record(
        conn,
        &RecordDecisionPayload {
            project_id: proposal.project_id,
            kind: proposal.kind,
            justification: proposal.justification,
            outcome: Some(outcome),
            origin: DecisionOrigin::Ai,
            rejection_reason: rejection_reason.map(str::to_string),
            proposal_id: Some(proposal_id),
        },
        now,
    )
}

pub fn recent_rejections(conn: &Connection, days: i64, now: DateTime<Utc>) -> AppResult<Vec<RejectedDecision>> {
    if days < 0 {
        return Err(AppError::validation("days", days, "cannot be negative"));
    }
    let since = Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| AppError::validation("days", days, "window reaches past the supported date range"))?;
    db::rejections_since(conn, since)
}

#[cfg(test)]
mod tests {
    use super::{recent_rejections, record, respond};
    use crate::db::{self, Database};
    use crate::errors::ErrorKind;
    use crate::models::{
        CreateProjectPayload, DecisionKind, DecisionOrigin, DecisionOutcome, ProjectState, RecordDecisionPayload,
    };
    use chrono::{NaiveDate, Utc};

    fn setup() -> (tempfile::TempDir, Database, i64) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let project_id = db
            .write("project", |tx| {
                db::insert_project(
                    tx,
                    &CreateProjectPayload {
                        name: "digest".to_string(),
                        hypothesis: "Writers pay for weekly digests".to_string(),
                        start_date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
                        state: ProjectState::Active,
                    },
                    Utc::now(),
                )
            })
            .expect("project")
            .id;
        (dir, db, project_id)
    }

    fn manual(project_id: i64, kind: DecisionKind, outcome: DecisionOutcome, reason: Option<&str>) -> RecordDecisionPayload {
        RecordDecisionPayload {
            project_id,
            kind,
            justification: "ROI under target for six weeks".to_string(),
            outcome: Some(outcome),
            origin: DecisionOrigin::Manual,
            rejection_reason: reason.map(str::to_string),
            proposal_id: None,
        }
    }

    #[test]
    fn accepted_kill_moves_project_and_bumps_version() {
        let (_dir, db, project_id) = setup();
        let recorded = db
            .write("decision", |tx| {
                record(tx, &manual(project_id, DecisionKind::Kill, DecisionOutcome::Accepted, None), Utc::now())
            })
            .expect("record");
        let change = recorded.state_change.expect("state change");
        assert_eq!(change.from, ProjectState::Active);
        assert_eq!(change.to, ProjectState::Killed);
        assert_eq!(change.version, 2);

        let iterate = db
            .write("decision", |tx| {
                record(tx, &manual(project_id, DecisionKind::Iterate, DecisionOutcome::Accepted, None), Utc::now())
            })
            .expect("iterate");
        assert!(iterate.state_change.is_none());
        let project = db.read(|conn| db::require_project(conn, project_id)).expect("project");
        assert_eq!(project.state, ProjectState::Killed);
        assert_eq!(project.version, 2);
    }

    #[test]
    fn rejection_without_reason_writes_nothing() {
        let (_dir, db, project_id) = setup();
        let error = db
            .write("decision", |tx| {
                record(tx, &manual(project_id, DecisionKind::Kill, DecisionOutcome::Rejected, None), Utc::now())
            })
            .expect_err("reason required");
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(db.read(|conn| db::list_decisions(conn, project_id)).expect("list").is_empty());
    }

    #[test]
    fn rejections_window_excludes_other_outcomes() {
        let (_dir, db, project_id) = setup();
        db.write("decisions", |tx| {
            record(
                tx,
                &manual(project_id, DecisionKind::Kill, DecisionOutcome::Rejected, Some("launch is next week")),
                Utc::now(),
            )?;
            record(tx, &manual(project_id, DecisionKind::Pause, DecisionOutcome::Postponed, None), Utc::now())
        })
        .expect("seed");

        let rejections = db.read(|conn| recent_rejections(conn, 30, Utc::now())).expect("rejections");
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].kind, DecisionKind::Kill);
        assert_eq!(rejections[0].rejection_reason.as_deref(), Some("launch is next week"));
    }

    #[test]
    fn rejections_window_out_of_range_is_validation_error() {
        let (_dir, db, _project_id) = setup();
        for days in [-1, 200_000_000, i64::MAX] {
            let error = db
                .read(|conn| recent_rejections(conn, days, Utc::now()))
                .expect_err("out of range");
            assert_eq!(error.kind(), ErrorKind::Validation);
        }
        assert!(db.read(|conn| recent_rejections(conn, 0, Utc::now())).expect("empty").is_empty());
    }

    #[test]
    fn responding_to_proposal_links_and_clears_pending() {
        let (_dir, db, project_id) = setup();
        let proposal = db
            .write("proposal", |tx| {
                db::insert_decision(
                    tx,
                    &RecordDecisionPayload {
                        project_id,
                        kind: DecisionKind::Scale,
                        justification: "ROI 62/h".to_string(),
                        outcome: None,
                        origin: DecisionOrigin::Ai,
                        rejection_reason: None,
                        proposal_id: None,
                    },
                    Utc::now(),
                )
            })
            .expect("proposal");
        assert_eq!(db.read(db::pending_proposals).expect("pending").len(), 1);

        let response = db
            .write("respond", |tx| respond(tx, proposal.id, DecisionOutcome::Accepted, None, Utc::now()))
            .expect("respond");
        assert_eq!(response.decision.proposal_id, Some(proposal.id));
        assert_eq!(response.decision.kind, DecisionKind::Scale);
        assert_eq!(response.state_change.map(|change| change.to), Some(ProjectState::Winner));
        assert!(db.read(db::pending_proposals).expect("pending").is_empty());

        let again = db.write("respond", |tx| respond(tx, proposal.id, DecisionOutcome::Rejected, Some("no"), Utc::now()));
        assert_eq!(again.expect_err("answered").kind(), ErrorKind::Validation);
    }
}
