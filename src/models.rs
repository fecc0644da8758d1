use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Gemini,
    Claude,
    Custom,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Claude => "claude",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    Idea,
    Mvp,
    Active,
    Paused,
    Killed,
    Winner,
}

impl ProjectState {
    pub const ALL: [ProjectState; 6] = [
        Self::Idea,
        Self::Mvp,
        Self::Active,
        Self::Paused,
        Self::Killed,
        Self::Winner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Mvp => "mvp",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Killed => "killed",
            Self::Winner => "winner",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == raw)
    }

    /// States still in play: the zombie scan only looks at these.
    pub fn is_fluid(self) -> bool {
        matches!(self, Self::Idea | Self::Mvp | Self::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Killed | Self::Winner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    InsufficientData,
    NoTimeRecorded,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::NoTimeRecorded => "no_time_recorded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "insufficient_data" => Some(Self::InsufficientData),
            "no_time_recorded" => Some(Self::NoTimeRecorded),
            _ => None,
        }
    }

    pub fn severity(self) -> AlertSeverity {
        match self {
            Self::InsufficientData => AlertSeverity::Info,
            Self::NoTimeRecorded => AlertSeverity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Kill,
    Iterate,
    Scale,
    Pause,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kill => "kill",
            Self::Iterate => "iterate",
            Self::Scale => "scale",
            Self::Pause => "pause",
        }
    }

    /// Accepts the ledger vocabulary plus "winner", which models tend to answer
    /// with when asked to classify instead of decide.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kill" => Some(Self::Kill),
            "iterate" => Some(Self::Iterate),
            "scale" | "winner" => Some(Self::Scale),
            "pause" => Some(Self::Pause),
            _ => None,
        }
    }

    /// Project state an accepted decision moves to. Iterate is left to the user.
    pub fn target_state(self) -> Option<ProjectState> {
        match self {
            Self::Kill => Some(ProjectState::Killed),
            Self::Scale => Some(ProjectState::Winner),
            Self::Pause => Some(ProjectState::Paused),
            Self::Iterate => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    Ai,
    Manual,
}

impl DecisionOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ai" => Some(Self::Ai),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Accepted,
    Rejected,
    Postponed,
}

impl DecisionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Postponed => "postponed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "postponed" => Some(Self::Postponed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cycle {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub hypothesis: String,
    pub start_date: NaiveDate,
    pub state: ProjectState,
    pub cycle_id: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub id: i64,
    pub project_id: i64,
    pub date: NaiveDate,
    pub revenue: f64,
    pub hours: f64,
    pub conversions: i64,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: i64,
    pub project_id: i64,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub auto_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// An unresolved alert as shown on the portfolio-wide list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectAlert {
    pub project_name: String,
    #[serde(flatten)]
    pub alert: Alert,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: i64,
    pub project_id: i64,
    pub kind: DecisionKind,
    pub justification: String,
    pub origin: DecisionOrigin,
    /// `None` while an AI proposal waits for the user's answer.
    pub outcome: Option<DecisionOutcome>,
    pub rejection_reason: Option<String>,
    pub proposal_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedDecision {
    pub decision_id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub kind: DecisionKind,
    pub justification: String,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricAggregate {
    pub total_revenue: f64,
    pub total_hours: f64,
    pub total_conversions: i64,
    pub count: i64,
    pub last_date: Option<NaiveDate>,
    pub roi: f64,
}

impl MetricAggregate {
    pub fn from_totals(
        total_revenue: f64,
        total_hours: f64,
        total_conversions: i64,
        count: i64,
        last_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            total_revenue,
            total_hours,
            total_conversions,
            count,
            last_date,
            roi: roi(total_revenue, total_hours),
        }
    }
}

/// Revenue per hour, floored to zero when no time was recorded.
pub fn roi(total_revenue: f64, total_hours: f64) -> f64 {
    if total_hours > 0.0 {
        total_revenue / total_hours
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub hypothesis: String,
    pub state: ProjectState,
    pub version: i64,
    pub start_date: NaiveDate,
    pub aggregate: MetricAggregate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectPayload {
    pub name: String,
    pub hypothesis: String,
    pub start_date: NaiveDate,
    #[serde(default = "default_project_state")]
    pub state: ProjectState,
}

fn default_project_state() -> ProjectState {
    ProjectState::Idea
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendMetricPayload {
    pub project_id: i64,
    pub date: NaiveDate,
    pub revenue: f64,
    pub hours: f64,
    pub conversions: i64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDecisionPayload {
    pub project_id: i64,
    pub kind: DecisionKind,
    pub justification: String,
    pub outcome: Option<DecisionOutcome>,
    pub origin: DecisionOrigin,
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub proposal_id: Option<i64>,
}
