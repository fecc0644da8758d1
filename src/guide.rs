use crate::cycle::Phase;
use crate::models::{ProjectState, ProjectSummary};
use chrono::NaiveDate;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Days without a metric after which an active or mvp project counts as stalled.
const STALE_METRIC_DAYS: i64 = 2;

fn tips(phase: Phase) -> &'static [&'static str] {
    match phase {
        Phase::Exploration => &[
            "Fall in love with the problem, not the solution.",
            "Talk to at least five potential customers before writing any code.",
            "Set the success threshold: what number would validate the idea in 7 days?",
            "If the idea does not fit in one sentence, it is too complex.",
        ],
        Phase::Experimentation => &[
            "If the first version does not embarrass you, you shipped too late.",
            "Measure only what matters: is anyone willing to pay or subscribe?",
            "Do not automate anything you have not done by hand ten times.",
            "An MVP exists to reduce uncertainty, not to make money.",
        ],
        Phase::Decision => &[
            "A winner feels different: demand outruns your capacity.",
            "If ROI is still low after three pivots, kill it without mercy.",
            "Write down what the failed projects taught you; it is your best asset.",
            "Scaling a broken product only breaks it faster.",
        ],
        Phase::Consolidation => &[
            "Focus on a single acquisition channel until it works.",
            "Ask for brutally honest feedback, not compliments.",
            "Watch what users do, not what they say.",
            "Retention matters more than acquisition at this stage.",
        ],
    }
}

pub fn phase_tip(phase: Phase) -> String {
    tips(phase)
        .choose(&mut rand::rng())
        .map(|tip| tip.to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub phase: Phase,
    pub tip: String,
    pub recommendations: Vec<String>,
    pub in_play: usize,
}

/// Tip for the phase plus warnings about portfolio focus. Killed and winner
/// projects do not count against `max_active`.
pub fn guidance(phase: Phase, states: &[ProjectState], max_active: usize) -> Guidance {
    let in_play = states.iter().filter(|state| !state.is_terminal()).count();
    let mut recommendations = Vec::new();
    if in_play > max_active {
        recommendations.push(format!(
            "Too many projects in play ({}). Keep at most {} to focus your energy.",
            in_play, max_active
        ));
    } else if in_play == 0 {
        recommendations.push("The portfolio is empty. Time to plant a new idea.".to_string());
    }

    Guidance {
        phase,
        tip: phase_tip(phase),
        recommendations,
        in_play,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    pub title: String,
    pub description: String,
    pub urgency: Urgency,
    pub project_id: Option<i64>,
}

/// First active or mvp project without a metric in the last two days, or a
/// nudge to try something new when everything is up to date.
pub fn next_action(summaries: &[ProjectSummary], today: NaiveDate) -> NextAction {
    let stalled = summaries.iter().find(|summary| {
        matches!(summary.state, ProjectState::Active | ProjectState::Mvp)
            && summary
                .aggregate
                .last_date
                .map_or(true, |last| (today - last).num_days() > STALE_METRIC_DAYS)
    });

    match stalled {
        Some(summary) => NextAction {
            title: format!("Project \"{}\" is stalled", summary.name),
            description: "More than 48 hours without data. Is this experiment still alive?".to_string(),
            urgency: Urgency::Medium,
            project_id: Some(summary.id),
        },
        None => NextAction {
            title: "Explore a new channel".to_string(),
            description: "Everything is up to date. What small experiment could you launch today to gain traction?"
                .to_string(),
            urgency: Urgency::Low,
            project_id: None,
        },
    }
}

/// Conservative hours a project has likely consumed when none were logged.
pub fn estimate_minimum_hours(state: ProjectState, start_date: NaiveDate, today: NaiveDate) -> f64 {
    let days = (today - start_date).num_days().max(0) as f64;
    let hours_per_day = match state {
        ProjectState::Idea => 0.5,
        ProjectState::Mvp => 2.0,
        ProjectState::Active => 1.0,
        ProjectState::Paused | ProjectState::Killed | ProjectState::Winner => 0.0,
    };
    days * hours_per_day
}
