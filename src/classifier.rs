use crate::alerts::{self, ValidationOutcome};
use crate::errors::AppResult;
use crate::models::{DecisionKind, MetricAggregate};
use crate::policy::{Policy, RoiThresholds};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Winner,
    Promising,
    Viable,
    NotViable,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Winner => "winner",
            Self::Promising => "promising",
            Self::Viable => "viable",
            Self::NotViable => "not_viable",
        }
    }

    pub fn suggested_decision(self) -> DecisionKind {
        match self {
            Self::Winner => DecisionKind::Scale,
            Self::Promising | Self::Viable => DecisionKind::Iterate,
            Self::NotViable => DecisionKind::Kill,
        }
    }
}

pub fn classify(roi: f64, thresholds: &RoiThresholds) -> Classification {
    if roi > thresholds.winner_above {
        Classification::Winner
    } else if roi > thresholds.promising_above {
        Classification::Promising
    } else if roi > thresholds.viable_above {
        Classification::Viable
    } else {
        Classification::NotViable
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    Analyzed {
        project_id: i64,
        classification: Classification,
        suggested_decision: DecisionKind,
        roi: f64,
        aggregate: MetricAggregate,
    },
    Blocked {
        project_id: i64,
        outcome: ValidationOutcome,
        message: String,
        aggregate: MetricAggregate,
    },
}

/// Validates first (reconciling alerts) and only classifies projects whose
/// data is sufficient.
pub fn analyze(conn: &Connection, project_id: i64, policy: &Policy, now: DateTime<Utc>) -> AppResult<Analysis> {
    let report = alerts::validate_project(conn, project_id, policy, now)?;
    if !report.is_valid() {
        return Ok(Analysis::Blocked {
            project_id,
            outcome: report.outcome,
            message: report.message,
            aggregate: report.aggregate,
        });
    }

    let classification = classify(report.aggregate.roi, &policy.roi);
    Ok(Analysis::Analyzed {
        project_id,
        classification,
        suggested_decision: classification.suggested_decision(),
        roi: report.aggregate.roi,
        aggregate: report.aggregate,
    })
}
