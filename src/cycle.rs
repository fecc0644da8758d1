use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CYCLE_LENGTH_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Exploration,
    Experimentation,
    Decision,
    Consolidation,
}

impl Phase {
    /// Days 1-14 explore, 15-45 experiment, 46-75 decide, the rest consolidates.
    /// A cycle that has not started yet reads as exploration.
    pub fn for_day(day: i64) -> Self {
        match day {
            i64::MIN..=14 => Self::Exploration,
            15..=45 => Self::Experimentation,
            46..=75 => Self::Decision,
            _ => Self::Consolidation,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exploration => "exploration",
            Self::Experimentation => "experimentation",
            Self::Decision => "decision",
            Self::Consolidation => "consolidation",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Exploration => "Exploration",
            Self::Experimentation => "Experimentation",
            Self::Decision => "Decision",
            Self::Consolidation => "Consolidation",
        }
    }

    pub fn suggested_tasks(self) -> &'static [&'static str] {
        match self {
            Self::Exploration => &[
                "Write a clear hypothesis for every new idea",
                "Design cheap validation experiments",
                "Define the minimum success metrics",
                "Research competitors and the market",
            ],
            Self::Experimentation => &[
                "Ship working MVPs",
                "Measure real conversions",
                "Record actionable feedback",
                "Iterate quickly on the data",
            ],
            Self::Decision => &[
                "Classify projects: kill / iterate / winner",
                "Back every decision with metrics",
                "Shut down projects without traction",
                "Double down on winners",
            ],
            Self::Consolidation => &[
                "Reduce unnecessary public exposure",
                "Improve user onboarding",
                "Minimize manual support",
                "Strengthen the competitive advantage",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: Phase,
    pub name: String,
    pub day: i64,
    pub days_remaining: i64,
    pub progress_pct: f64,
    pub suggested_tasks: Vec<String>,
}

/// Day of the cycle, 1 on the start date itself.
pub fn cycle_day(start_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - start_date).num_days() + 1
}

pub fn phase_status(start_date: NaiveDate, today: NaiveDate) -> PhaseStatus {
    let day = cycle_day(start_date, today);
    let phase = Phase::for_day(day);
    let progress_pct = (day as f64 / CYCLE_LENGTH_DAYS as f64 * 100.0).clamp(0.0, 100.0);

    PhaseStatus {
        phase,
        name: phase.label().to_string(),
        day,
        days_remaining: (CYCLE_LENGTH_DAYS - day + 1).max(0),
        progress_pct,
        suggested_tasks: phase.suggested_tasks().iter().map(|task| task.to_string()).collect(),
    }
}
