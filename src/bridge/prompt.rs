use crate::cycle::{phase_status, CYCLE_LENGTH_DAYS};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::ledger;
use crate::policy::Policy;
use crate::models::ProjectState;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const MIN_IDEAS: usize = 1;
pub const MAX_IDEAS: usize = 10;
const IDEA_CONTEXT_PROJECTS: usize = 5;
const IDEA_CONTEXT_KILLED: usize = 3;

const RESPONSE_CONTRACT: &str = r#"---

## RESPONSE FORMAT

Act as the strategic analyst of this 90-day portfolio. Base every decision on the
metrics above, point out missing data and never invent numbers.

Allowed decisions: kill, iterate, scale, pause.

Expected JSON:
{
  "resumen_ejecutivo": "Short summary of the current situation",
  "proyectos": [
    {
      "id": <numeric project id>,
      "decision": "kill|iterate|scale|pause",
      "justificacion": "Reasoning backed by the metrics"
    }
  ],
  "riesgos_detectados": ["portfolio-wide risk"]
}

IMPORTANT: respond ONLY with the JSON object, no text before or after it.
"#;

const DEEP_DIVE_QUESTIONS: &str = r#"---

## AI PROMPT

Analyze this project in depth against the 90-day rules.

### Key questions:

1. **Hypothesis**: do the numbers confirm or refute the original hypothesis?
2. **Traction**: is there evidence of real demand or just curiosity?
3. **Trend**: are the metrics improving, getting worse or flat?
4. **Efficiency**: does the ROI justify more time?
5. **Risks**: which dangerous dependencies exist?

### Your analysis must include:

- **Decision**: KILL | ITERATE | SCALE
- **Justification** based on specific entries of the history
- **Concrete actions** for the next 7 days
- **Metrics to watch** before the next decision
- **Decision threshold**: which number or event would trigger kill or scale

**Expected format**: structured answer in YAML or JSON.
"#;

const IDEA_FORMAT: &str = r#"RESPONSE FORMAT (JSON):
{
  "ideas": [
    {
      "nombre": "Descriptive project name",
      "descripcion": "What it is and what it does (1-2 sentences)",
      "hipotesis": "Who pays, how much, for which problem",
      "mercado_objetivo": "Specific user segment",
      "dificultad": "baja | media | alta",
      "tiempo_estimado_mvp": "Estimated days to a working MVP",
      "razon_sugerencia": "Why this is a good idea right now"
    }
  ]
}

Return ONLY the JSON, no extra text.
"#;

/// Whether generated ideas build on the current portfolio or start fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaContext {
    Related,
    Fresh,
}

/// Renders the analysis prompt. Needs an active cycle.
pub fn build(conn: &Connection, policy: &Policy, today: NaiveDate, now: DateTime<Utc>) -> AppResult<String> {
    let cycle = db::active_cycle(conn)?
        .ok_or_else(|| AppError::NotFound("no active cycle; start one before analyzing".to_string()))?;
    let phase = phase_status(cycle.start_date, today);
    let rejections = ledger::recent_rejections(conn, policy.rejection_window_days, now)?;
    let summaries = db::project_summaries(conn)?;

    let mut prompt = String::new();
    // fmt::Write into a String cannot fail.
    let _ = writeln!(prompt, "# PORTFOLIO ANALYSIS - {}\n", today.format("%Y-%m-%d"));
    let _ = writeln!(prompt, "## CYCLE CONTEXT");
    let _ = writeln!(prompt, "- Current day: {}/{}", phase.day, CYCLE_LENGTH_DAYS);
    let _ = writeln!(prompt, "- Phase: {}", phase.name);
    let _ = writeln!(prompt, "- Days remaining: {}", phase.days_remaining);
    let _ = writeln!(prompt, "- Cycle start date: {}\n", cycle.start_date.format("%Y-%m-%d"));

    if !rejections.is_empty() {
        let _ = writeln!(prompt, "## RECENTLY REJECTED DECISIONS");
        let _ = writeln!(
            prompt,
            "IMPORTANT: the user already rejected these recommendations. Do NOT propose the same \
             decision again unless the metrics changed drastically.\n"
        );
        for rejection in &rejections {
            let _ = writeln!(
                prompt,
                "- **{}** (id {}): {} recommendation rejected.",
                rejection.project_name,
                rejection.project_id,
                rejection.kind.as_str().to_uppercase()
            );
            let _ = writeln!(
                prompt,
                "  - Rejection reason: {}",
                rejection.rejection_reason.as_deref().unwrap_or("")
            );
            let _ = writeln!(prompt, "  - Date: {}", rejection.created_at.format("%Y-%m-%d %H:%M UTC"));
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "### Suggested tasks for this phase:");
    for (index, task) in phase.suggested_tasks.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", index + 1, task);
    }

    let _ = writeln!(prompt, "\n---\n\n## REGISTERED PROJECTS\n");
    if summaries.is_empty() {
        let _ = writeln!(prompt, "_No projects registered yet._\n");
    }
    for (index, summary) in summaries.iter().enumerate() {
        let aggregate = &summary.aggregate;
        let _ = writeln!(prompt, "### {}. {} (id {})\n", index + 1, summary.name, summary.id);
        let _ = writeln!(prompt, "- **Hypothesis**: {}", summary.hypothesis);
        let _ = writeln!(prompt, "- **State**: `{}`", summary.state.as_str());
        let _ = writeln!(prompt, "- **Start date**: {}", summary.start_date.format("%Y-%m-%d"));
        let _ = writeln!(prompt, "- **Consolidated metrics**:");
        let _ = writeln!(prompt, "  - Total revenue: ${:.2}", aggregate.total_revenue);
        let _ = writeln!(prompt, "  - Time invested: {:.1} hours", aggregate.total_hours);
        let _ = writeln!(prompt, "  - ROI: ${:.2}/hour", aggregate.roi);
        let _ = writeln!(prompt, "  - Total conversions: {}", aggregate.total_conversions);
        let _ = writeln!(prompt, "  - Metric records: {}", aggregate.count);
        match aggregate.last_date {
            Some(date) => {
                let _ = writeln!(prompt, "  - Last activity: {}", date.format("%Y-%m-%d"));
            }
            None => {
                let _ = writeln!(prompt, "  - No metrics recorded");
            }
        }
        prompt.push('\n');
    }

    prompt.push_str(RESPONSE_CONTRACT);
    Ok(prompt)
}

/// Deep-dive prompt for one project with its full metric history.
pub fn build_project(conn: &Connection, project_id: i64) -> AppResult<String> {
    let project = db::require_project(conn, project_id)?;
    let aggregate = db::aggregate_metrics(conn, project_id)?;
    let metrics = db::list_metrics(conn, project_id)?;

    let mut prompt = String::new();
    let _ = writeln!(prompt, "# DEEP DIVE: {}\n", project.name);
    let _ = writeln!(prompt, "## PROJECT\n");
    let _ = writeln!(prompt, "- **Original hypothesis**: {}", project.hypothesis);
    let _ = writeln!(prompt, "- **Start date**: {}", project.start_date.format("%Y-%m-%d"));
    let _ = writeln!(prompt, "- **Current state**: `{}`\n", project.state.as_str());
    let _ = writeln!(prompt, "## CONSOLIDATED METRICS\n");
    let _ = writeln!(prompt, "- **Total revenue**: ${:.2}", aggregate.total_revenue);
    let _ = writeln!(prompt, "- **Time invested**: {:.1} hours", aggregate.total_hours);
    let _ = writeln!(prompt, "- **ROI**: ${:.2}/hour", aggregate.roi);
    let _ = writeln!(prompt, "- **Total conversions**: {}", aggregate.total_conversions);
    let _ = writeln!(prompt, "- **Metric records**: {}\n", aggregate.count);
    let _ = writeln!(prompt, "## METRIC HISTORY\n");

    if metrics.is_empty() {
        let _ = writeln!(prompt, "_No metrics recorded for this project._\n");
    } else {
        let _ = writeln!(prompt, "| Date | Revenue | Hours | Conversions | Notes |");
        let _ = writeln!(prompt, "|------|---------|-------|-------------|-------|");
        for metric in &metrics {
            let notes = match metric.notes.trim() {
                "" => "-".to_string(),
                notes => table_cell(notes),
            };
            let _ = writeln!(
                prompt,
                "| {} | ${:.2} | {:.1} | {} | {} |",
                metric.date.format("%Y-%m-%d"),
                metric.revenue,
                metric.hours,
                metric.conversions,
                notes
            );
        }
        prompt.push('\n');
    }

    prompt.push_str(DEEP_DIVE_QUESTIONS);
    Ok(prompt)
}

/// Asks for `count` new project ideas. With projects in play the ideas should
/// complement them and avoid what got killed; otherwise they start fresh.
pub fn build_ideas(conn: &Connection, count: usize, year: i32) -> AppResult<(String, IdeaContext)> {
    let count = count.clamp(MIN_IDEAS, MAX_IDEAS);
    let mut current: Vec<_> = db::project_summaries(conn)?
        .into_iter()
        .filter(|summary| matches!(summary.state, ProjectState::Active | ProjectState::Mvp | ProjectState::Winner))
        .collect();
    current.sort_by(|a, b| b.aggregate.total_revenue.total_cmp(&a.aggregate.total_revenue));
    current.truncate(IDEA_CONTEXT_PROJECTS);

    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are an expert in SaaS and digital products for solo founders.\n");

    if current.is_empty() {
        let _ = writeln!(prompt, "CONTEXT:");
        let _ = writeln!(
            prompt,
            "The user is a technical solo founder starting a 90-day cycle with no active projects.\n"
        );
        let _ = writeln!(prompt, "TASK:");
        let _ = writeln!(prompt, "Generate {} SaaS or digital product ideas that:", count);
        let _ = writeln!(prompt, "1. Need no upfront capital");
        let _ = writeln!(prompt, "2. Can ship an MVP in under 30 days");
        let _ = writeln!(prompt, "3. Have validated demand in {}", year);
        let _ = writeln!(prompt, "4. Can charge from day one");
        let _ = writeln!(prompt, "5. Do not need a large team\n");
        let _ = writeln!(prompt, "CRITERIA:");
        let _ = writeln!(prompt, "- Prefer ideas with existing competitors (demand is proven)");
        let _ = writeln!(prompt, "- Avoid marketplaces and social networks (they need critical mass)");
        let _ = writeln!(prompt, "- Solve one specific problem very well\n");
        prompt.push_str(IDEA_FORMAT);
        return Ok((prompt, IdeaContext::Fresh));
    }

    let _ = writeln!(prompt, "CURRENT USER PROJECTS:");
    for summary in &current {
        let _ = writeln!(
            prompt,
            "- {}: {} (state: {}, revenue: ${:.2})",
            summary.name,
            summary.hypothesis,
            summary.state.as_str(),
            summary.aggregate.total_revenue
        );
    }
    let killed = db::killed_projects(conn, IDEA_CONTEXT_KILLED)?;
    if !killed.is_empty() {
        let _ = writeln!(prompt, "\nKILLED PROJECTS (lessons):");
        for project in &killed {
            let _ = writeln!(
                prompt,
                "- {}: {}",
                project.name,
                project.reason.as_deref().unwrap_or("no reason recorded")
            );
        }
    }
    let _ = writeln!(prompt, "\nTASK:");
    let _ = writeln!(prompt, "Generate {} NEW project ideas that:", count);
    let _ = writeln!(prompt, "1. Complement or relate to the current projects");
    let _ = writeln!(prompt, "2. Avoid the mistakes of the killed projects");
    let _ = writeln!(prompt, "3. Are viable for a technical solo founder");
    let _ = writeln!(prompt, "4. Can ship an MVP in under 30 days");
    let _ = writeln!(prompt, "5. Can make money early\n");
    let _ = writeln!(prompt, "MANDATORY CRITERIA:");
    let _ = writeln!(prompt, "- Do NOT suggest what the user already does");
    let _ = writeln!(prompt, "- Reuse existing assets and knowledge");
    let _ = writeln!(prompt, "- Consider cross-selling or bundling with successful projects\n");
    prompt.push_str(IDEA_FORMAT);
    Ok((prompt, IdeaContext::Related))
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::{build, build_ideas, build_project, IdeaContext};
    use crate::db::{self, Database};
    use crate::errors::ErrorKind;
    use crate::models::{
        AppendMetricPayload, CreateProjectPayload, DecisionKind, DecisionOrigin, DecisionOutcome, ProjectState,
        RecordDecisionPayload,
    };
    use crate::policy::Policy;
    use chrono::{Duration, Utc};

    fn seed_project(db: &Database, name: &str, state: ProjectState) -> i64 {
        db.write("project", |tx| {
            db::insert_project(
                tx,
                &CreateProjectPayload {
                    name: name.to_string(),
                    hypothesis: format!("People pay for {}", name),
                    start_date: Utc::now().date_naive() - Duration::days(10),
                    state,
                },
                Utc::now(),
            )
        })
        .expect("project")
        .id
    }

    #[test]
    fn requires_active_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let error = db
            .read(|conn| build(conn, &Policy::default(), Utc::now().date_naive(), Utc::now()))
            .expect_err("no cycle");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn renders_cycle_projects_and_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let today = Utc::now().date_naive();
        db.write("seed", |tx| {
            db::insert_cycle(tx, today - Duration::days(20), Utc::now())?;
            db::insert_project(
                tx,
                &CreateProjectPayload {
                    name: "digest".to_string(),
                    hypothesis: "Writers pay for weekly digests".to_string(),
                    start_date: today - Duration::days(20),
                    state: ProjectState::Mvp,
                },
                Utc::now(),
            )
        })
        .expect("seed");

        let prompt = db
            .read(|conn| build(conn, &Policy::default(), today, Utc::now()))
            .expect("prompt");
        assert!(prompt.contains("- Current day: 21/90"));
        assert!(prompt.contains("- Phase: Experimentation"));
        assert!(prompt.contains("### 1. digest (id 1)"));
        assert!(prompt.contains("No metrics recorded"));
        assert!(prompt.contains("\"resumen_ejecutivo\""));
        assert!(!prompt.contains("RECENTLY REJECTED"));
    }

    #[test]
    fn project_deep_dive_lists_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let missing = db.read(|conn| build_project(conn, 42)).expect_err("unknown project");
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let id = seed_project(&db, "digest", ProjectState::Active);
        let empty = db.read(|conn| build_project(conn, id)).expect("prompt");
        assert!(empty.contains("_No metrics recorded for this project._"));

        let today = Utc::now().date_naive();
        db.write("metrics", |tx| {
            for (days_ago, revenue, notes) in [(2, 30.0, ""), (1, 90.0, "launch | newsletter")] {
                db::insert_metric(
                    tx,
                    &AppendMetricPayload {
                        project_id: id,
                        date: today - Duration::days(days_ago),
                        revenue,
                        hours: 3.0,
                        conversions: 2,
                        notes: notes.to_string(),
                    },
                    Utc::now(),
                )?;
            }
            Ok(())
        })
        .expect("metrics");

        let prompt = db.read(|conn| build_project(conn, id)).expect("prompt");
        assert!(prompt.starts_with("# DEEP DIVE: digest"));
        assert!(prompt.contains("- **Original hypothesis**: People pay for digest"));
        assert!(prompt.contains("- **Total revenue**: $120.00"));
        assert!(prompt.contains("- **ROI**: $20.00/hour"));
        assert!(prompt.contains("- **Metric records**: 2"));
        assert!(prompt.contains("| $90.00 | 3.0 | 2 | launch \\| newsletter |"));
        assert!(prompt.contains("| $30.00 | 3.0 | 2 | - |"));
        assert!(prompt.contains("## AI PROMPT"));
    }

    #[test]
    fn idea_prompt_switches_on_portfolio_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let (prompt, context) = db.read(|conn| build_ideas(conn, 0, 2026)).expect("fresh");
        assert_eq!(context, IdeaContext::Fresh);
        assert!(prompt.contains("Generate 1 SaaS"));
        assert!(prompt.contains("validated demand in 2026"));
        assert!(prompt.contains("\"ideas\""));

        seed_project(&db, "digest", ProjectState::Active);
        seed_project(&db, "parked", ProjectState::Paused);
        let killed = seed_project(&db, "crm", ProjectState::Active);
        db.write("kill", |tx| {
            crate::ledger::record(
                tx,
                &RecordDecisionPayload {
                    project_id: killed,
                    kind: DecisionKind::Kill,
                    justification: "Nobody paid after six weeks".to_string(),
                    outcome: Some(DecisionOutcome::Accepted),
                    origin: DecisionOrigin::Manual,
                    rejection_reason: None,
                    proposal_id: None,
                },
                Utc::now(),
            )
        })
        .expect("kill");

        let (prompt, context) = db.read(|conn| build_ideas(conn, 25, 2026)).expect("related");
        assert_eq!(context, IdeaContext::Related);
        assert!(prompt.contains("Generate 10 NEW project ideas"));
        assert!(prompt.contains("- digest: People pay for digest (state: active"));
        assert!(!prompt.contains("- parked:"));
        assert!(prompt.contains("- crm: Nobody paid after six weeks"));
    }
}
