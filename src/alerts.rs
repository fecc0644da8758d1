use crate::db;
use crate::errors::AppResult;
use crate::models::{Alert, AlertKind, MetricAggregate};
use crate::policy::Policy;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    InsufficientData,
    NoTimeRecorded,
}

impl ValidationOutcome {
    pub fn failing_kind(self) -> Option<AlertKind> {
        match self {
            Self::Valid => None,
            Self::InsufficientData => Some(AlertKind::InsufficientData),
            Self::NoTimeRecorded => Some(AlertKind::NoTimeRecorded),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: ValidationOutcome,
    pub message: String,
}

/// Checks run in priority order; the first failing one decides the outcome.
pub fn evaluate(aggregate: &MetricAggregate, min_metrics: u32) -> Evaluation {
    if aggregate.count < i64::from(min_metrics) {
        return Evaluation {
            outcome: ValidationOutcome::InsufficientData,
            message: format!(
                "Only {} metrics recorded. At least {} are needed for a reliable analysis.",
                aggregate.count, min_metrics
            ),
        };
    }
    if aggregate.total_hours <= 0.0 {
        return Evaluation {
            outcome: ValidationOutcome::NoTimeRecorded,
            message: "No time recorded. ROI cannot be computed without hours invested.".to_string(),
        };
    }
    Evaluation {
        outcome: ValidationOutcome::Valid,
        message: "Enough data for analysis".to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub create: Vec<AlertKind>,
    pub resolve: Vec<i64>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.resolve.is_empty()
    }
}

/// Opens an alert for every failing kind that has none yet and resolves every
/// unresolved alert whose kind is no longer failing.
pub fn plan_reconciliation(failing: &[AlertKind], unresolved: &[Alert]) -> ReconciliationPlan {
    let mut create = Vec::new();
    for kind in failing {
        let open = unresolved.iter().any(|alert| alert.kind == *kind);
        if !open && !create.contains(kind) {
            create.push(*kind);
        }
    }
    let resolve = unresolved
        .iter()
        .filter(|alert| !alert.resolved && !failing.contains(&alert.kind))
        .map(|alert| alert.id)
        .collect();
    ReconciliationPlan { create, resolve }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub project_id: i64,
    pub outcome: ValidationOutcome,
    pub message: String,
    pub aggregate: MetricAggregate,
    pub created: Vec<Alert>,
    pub resolved_alert_ids: Vec<i64>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.outcome == ValidationOutcome::Valid
    }
}

/// Validates a project and reconciles its alerts. The caller owns the
/// transaction so the aggregate read and the alert writes commit together.
pub fn validate_project(
    conn: &Connection,
    project_id: i64,
    policy: &Policy,
    now: DateTime<Utc>,
) -> AppResult<ValidationReport> {
    db::require_project(conn, project_id)?;
    let aggregate = db::aggregate_metrics(conn, project_id)?;
    let evaluation = evaluate(&aggregate, policy.min_metrics);
    let unresolved = db::list_alerts(conn, project_id, true)?;
    let failing: Vec<AlertKind> = evaluation.outcome.failing_kind().into_iter().collect();
    let plan = plan_reconciliation(&failing, &unresolved);

    let mut created = Vec::with_capacity(plan.create.len());
    for kind in plan.create {
        let alert = db::insert_alert(conn, project_id, kind, &evaluation.message, now)?;
        tracing::info!(project_id, alert_id = alert.id, kind = kind.as_str(), "alert opened");
        created.push(alert);
    }
    let mut resolved_alert_ids = Vec::with_capacity(plan.resolve.len());
    for alert_id in plan.resolve {
        if db::resolve_alert(conn, alert_id, true, now)? {
            tracing::info!(project_id, alert_id, "alert auto-resolved");
            resolved_alert_ids.push(alert_id);
        }
    }

    Ok(ValidationReport {
        project_id,
        outcome: evaluation.outcome,
        message: evaluation.message,
        aggregate,
        created,
        resolved_alert_ids,
    })
}
