use crate::alerts::{self, ValidationReport};
use crate::bridge::invoke::{AiInvoker, CliInvoker};
use crate::bridge::{AiBridge, AnalysisRun, IdeaBatch};
use crate::classifier::{self, Analysis};
use crate::config::AppConfig;
use crate::cycle::{phase_status, PhaseStatus};
use crate::db::{self, Database, StateCounts};
use crate::errors::{AppError, AppResult};
use crate::guide::{self, Guidance, NextAction};
use crate::health::{self, HealthReport};
use crate::ledger::{self, RecordedDecision};
use crate::models::{
    roi, Alert, AppendMetricPayload, CreateProjectPayload, Cycle, Decision, DecisionOutcome, Metric,
    MetricAggregate, Project, ProjectAlert, ProjectState, ProjectSummary, RecordDecisionPayload, RejectedDecision,
};
use crate::validation;
use crate::zombie::{self, Zombie};
use chrono::{Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const OVERVIEW_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStatus {
    pub cycle: Cycle,
    pub phase: PhaseStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowSummary {
    pub days: i64,
    pub revenue: f64,
    pub hours: f64,
    pub roi: f64,
    pub days_with_metrics: i64,
    pub adherence_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub cycle: Option<CycleStatus>,
    pub projects: StateCounts,
    pub recent: WindowSummary,
    pub unresolved_alerts: i64,
}

/// Entry point for every portfolio operation. Owns the database handle and
/// the configured AI bridge.
pub struct PortfolioCore {
    db: Arc<Database>,
    config: AppConfig,
    bridge: AiBridge,
}

impl PortfolioCore {
    pub fn open(config: AppConfig) -> AppResult<Self> {
        let invoker = Arc::new(CliInvoker::new(config.ai.clone()));
        Self::with_invoker(config, invoker)
    }

    pub fn with_invoker(config: AppConfig, invoker: Arc<dyn AiInvoker>) -> AppResult<Self> {
        config.validate()?;
        let db = Arc::new(Database::new(&config.database_path())?);
        let bridge = AiBridge::new(db.clone(), config.policy.clone(), invoker);
        tracing::info!(path = %db.path().display(), "portfolio database opened");
        Ok(Self { db, config, bridge })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    // cycles

    pub fn start_cycle(&self, start_date: Option<NaiveDate>) -> AppResult<Cycle> {
        let start_date = start_date.unwrap_or_else(Self::today);
        let cycle = self
            .db
            .write("start_cycle", |tx| db::insert_cycle(tx, start_date, Utc::now()))?;
        tracing::info!(cycle_id = cycle.id, start_date = %cycle.start_date, end_date = %cycle.end_date, "cycle started");
        Ok(cycle)
    }

    pub fn active_cycle(&self) -> AppResult<Option<Cycle>> {
        self.db.read(db::active_cycle)
    }

    pub fn cycle_status(&self) -> AppResult<CycleStatus> {
        let cycle = self
            .active_cycle()?
            .ok_or_else(|| AppError::NotFound("no active cycle".to_string()))?;
        let phase = phase_status(cycle.start_date, Self::today());
        Ok(CycleStatus { cycle, phase })
    }

    // projects

    pub fn create_project(&self, payload: CreateProjectPayload) -> AppResult<Project> {
        let payload = validation::project_payload(&payload)?;
        self.db
            .write("create_project", |tx| db::insert_project(tx, &payload, Utc::now()))
    }

    pub fn get_project(&self, project_id: i64) -> AppResult<Project> {
        self.db.read(|conn| db::require_project(conn, project_id))
    }

    pub fn list_projects(&self, state: Option<ProjectState>) -> AppResult<Vec<Project>> {
        self.db.read(|conn| db::list_projects(conn, state))
    }

    pub fn set_project_state(&self, project_id: i64, state: ProjectState) -> AppResult<Project> {
        self.db
            .write("set_project_state", |tx| db::set_project_state(tx, project_id, state))
    }

    pub fn delete_project(&self, project_id: i64) -> AppResult<()> {
        let deleted = self
            .db
            .write("delete_project", |tx| db::delete_project(tx, project_id))?;
        if !deleted {
            return Err(AppError::NotFound(format!("project {}", project_id)));
        }
        Ok(())
    }

    pub fn project_summaries(&self) -> AppResult<Vec<ProjectSummary>> {
        self.db.read(db::project_summaries)
    }

    // metrics

    pub fn append_metric(&self, payload: AppendMetricPayload) -> AppResult<Metric> {
        validation::metric_payload(&payload, Self::today())?;
        self.db
            .write("append_metric", |tx| db::insert_metric(tx, &payload, Utc::now()))
    }

    pub fn list_metrics(&self, project_id: i64) -> AppResult<Vec<Metric>> {
        self.db.read(|conn| {
            db::require_project(conn, project_id)?;
            db::list_metrics(conn, project_id)
        })
    }

    pub fn aggregate(&self, project_id: i64) -> AppResult<MetricAggregate> {
        self.db.read(|conn| {
            db::require_project(conn, project_id)?;
            db::aggregate_metrics(conn, project_id)
        })
    }

    // validation and alerts

    pub fn validate(&self, project_id: i64) -> AppResult<ValidationReport> {
        self.db.write("validate_project", |tx| {
            alerts::validate_project(tx, project_id, &self.config.policy, Utc::now())
        })
    }

    pub fn list_alerts(&self, project_id: i64, only_unresolved: bool) -> AppResult<Vec<Alert>> {
        self.db
            .read(|conn| db::list_alerts(conn, project_id, only_unresolved))
    }

    pub fn list_unresolved_alerts(&self) -> AppResult<Vec<ProjectAlert>> {
        self.db.read(db::list_unresolved_alerts)
    }

    /// Manual resolution. Returns false when the alert was already resolved.
    pub fn resolve_alert(&self, alert_id: i64) -> AppResult<bool> {
        self.db
            .write("resolve_alert", |tx| db::resolve_alert(tx, alert_id, false, Utc::now()))
    }

    // classification and zombies

    pub fn analyze(&self, project_id: i64) -> AppResult<Analysis> {
        self.db.write("analyze_project", |tx| {
            classifier::analyze(tx, project_id, &self.config.policy, Utc::now())
        })
    }

    pub fn detect_zombies(&self, inactivity_days: Option<i64>) -> AppResult<Vec<Zombie>> {
        let inactivity_days = inactivity_days.unwrap_or(self.config.policy.zombie_inactivity_days);
        if inactivity_days < 0 {
            return Err(AppError::validation("inactivity_days", inactivity_days, "cannot be negative"));
        }
        self.db
            .read(|conn| zombie::detect(conn, inactivity_days, Self::today()))
    }

    // decisions

    pub fn record_decision(&self, payload: RecordDecisionPayload) -> AppResult<RecordedDecision> {
        self.db
            .write("record_decision", |tx| ledger::record(tx, &payload, Utc::now()))
    }

    pub fn respond_to_proposal(
        &self,
        proposal_id: i64,
        outcome: DecisionOutcome,
        rejection_reason: Option<&str>,
    ) -> AppResult<RecordedDecision> {
        self.db.write("respond_to_proposal", |tx| {
            ledger::respond(tx, proposal_id, outcome, rejection_reason, Utc::now())
        })
    }

    pub fn list_decisions(&self, project_id: i64) -> AppResult<Vec<Decision>> {
        self.db.read(|conn| db::list_decisions(conn, project_id))
    }

    pub fn recent_rejections(&self, days: Option<i64>) -> AppResult<Vec<RejectedDecision>> {
        let days = days.unwrap_or(self.config.policy.rejection_window_days);
        self.db
            .read(|conn| ledger::recent_rejections(conn, days, Utc::now()))
    }

    pub fn pending_proposals(&self) -> AppResult<Vec<Decision>> {
        self.db.read(db::pending_proposals)
    }

    // AI bridge

    pub fn manual_prompt(&self) -> AppResult<String> {
        self.bridge.build_prompt()
    }

    pub fn project_prompt(&self, project_id: i64) -> AppResult<String> {
        self.bridge.build_project_prompt(project_id)
    }

    pub fn run_analysis(&self) -> AppResult<AnalysisRun> {
        self.bridge.run()
    }

    pub fn ingest_response(&self, text: &str) -> AppResult<AnalysisRun> {
        self.bridge.ingest_response(text)
    }

    pub fn generate_ideas(&self, count: usize) -> AppResult<IdeaBatch> {
        self.bridge.ideas(count)
    }

    // dashboard helpers

    pub fn overview(&self) -> AppResult<Overview> {
        let today = Self::today();
        let (cycle, projects, totals, unresolved_alerts) = self.db.read(|conn| {
            Ok((
                db::active_cycle(conn)?,
                db::state_counts(conn)?,
                db::metric_totals_since(conn, today - Duration::days(OVERVIEW_WINDOW_DAYS))?,
                db::count_unresolved_alerts(conn)?,
            ))
        })?;

        Ok(Overview {
            cycle: cycle.map(|cycle| CycleStatus {
                phase: phase_status(cycle.start_date, today),
                cycle,
            }),
            projects,
            recent: WindowSummary {
                days: OVERVIEW_WINDOW_DAYS,
                revenue: totals.revenue,
                hours: totals.hours,
                roi: roi(totals.revenue, totals.hours),
                days_with_metrics: totals.days_with_metrics,
                adherence_pct: totals.days_with_metrics as f64 / OVERVIEW_WINDOW_DAYS as f64 * 100.0,
            },
            unresolved_alerts,
        })
    }

    pub fn guidance(&self) -> AppResult<Guidance> {
        let status = self.cycle_status()?;
        let states: Vec<ProjectState> = self
            .list_projects(None)?
            .into_iter()
            .map(|project| project.state)
            .collect();
        Ok(guide::guidance(
            status.phase.phase,
            &states,
            self.config.policy.max_active_projects,
        ))
    }

    pub fn next_action(&self) -> AppResult<NextAction> {
        Ok(guide::next_action(&self.project_summaries()?, Self::today()))
    }

    pub fn estimate_minimum_hours(&self, project_id: i64) -> AppResult<f64> {
        let project = self.get_project(project_id)?;
        Ok(guide::estimate_minimum_hours(project.state, project.start_date, Self::today()))
    }

    pub fn health(&self) -> HealthReport {
        health::check(&self.db, &self.config.log_dir())
    }
}
