use anyhow::Context;
use clap::{Parser, Subcommand};
use portfolio_cycle_lib::models::{
    AppendMetricPayload, CreateProjectPayload, DecisionKind, DecisionOrigin, DecisionOutcome, ProjectState,
    RecordDecisionPayload,
};
use portfolio_cycle_lib::{init_tracing, validation, AppConfig, AppError, PortfolioCore};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "portfolio-cycle",
    about = "Track side-projects through a 90-day kill / iterate / scale cycle",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true, env = "PORTFOLIO_CYCLE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `data_dir` from the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or inspect the 90-day cycle
    Cycle {
        #[command(subcommand)]
        subcommand: CycleSubcommand,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Record and list metrics
    Metric {
        #[command(subcommand)]
        subcommand: MetricSubcommand,
    },

    /// Check data sufficiency and reconcile alerts for a project
    Validate { project_id: i64 },

    /// Validate, then classify a project by ROI
    Analyze { project_id: i64 },

    /// List or resolve alerts
    Alert {
        #[command(subcommand)]
        subcommand: AlertSubcommand,
    },

    /// List projects without recent activity
    Zombies {
        /// Days without activity (default from policy)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Record decisions and answer AI proposals
    Decision {
        #[command(subcommand)]
        subcommand: DecisionSubcommand,
    },

    /// AI-assisted portfolio analysis
    Ai {
        #[command(subcommand)]
        subcommand: AiSubcommand,
    },

    /// Per-project aggregates
    Summary,

    /// Cycle, project counts and the last 30 days at a glance
    Overview,

    /// Phase tip and focus warnings
    Guide,

    /// The single most useful thing to do now
    Next,

    /// Estimated minimum hours spent on a project
    Estimate { project_id: i64 },

    /// Database and log directory health
    Health,
}

#[derive(Subcommand)]
enum CycleSubcommand {
    /// Start a new cycle, deactivating the current one
    Start {
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        start_date: Option<String>,
    },
    /// Current day, phase and suggested tasks
    Status,
}

#[derive(Subcommand)]
enum ProjectSubcommand {
    Create {
        name: String,
        hypothesis: String,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long, default_value = "idea")]
        state: String,
    },
    List {
        #[arg(long)]
        state: Option<String>,
    },
    Show {
        project_id: i64,
    },
    SetState {
        project_id: i64,
        state: String,
    },
    Delete {
        project_id: i64,
    },
}

#[derive(Subcommand)]
enum MetricSubcommand {
    Add {
        project_id: i64,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "0")]
        revenue: String,
        #[arg(long, default_value = "0")]
        hours: String,
        #[arg(long, default_value = "0")]
        conversions: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    List {
        project_id: i64,
    },
    Aggregate {
        project_id: i64,
    },
}

#[derive(Subcommand)]
enum AlertSubcommand {
    /// Unresolved alerts across projects, or every alert of one project
    List {
        #[arg(long)]
        project: Option<i64>,
        /// With --project, include resolved alerts
        #[arg(long)]
        all: bool,
    },
    Resolve {
        alert_id: i64,
    },
}

#[derive(Subcommand)]
enum DecisionSubcommand {
    Record {
        project_id: i64,
        /// kill, iterate, scale or pause
        kind: String,
        /// accepted, rejected or postponed
        outcome: String,
        #[arg(long, default_value = "")]
        justification: String,
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        project_id: i64,
    },
    Rejections {
        #[arg(long)]
        days: Option<i64>,
    },
    Pending,
    /// Accept, reject or postpone a pending AI proposal
    Respond {
        proposal_id: i64,
        outcome: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum AiSubcommand {
    /// Print the analysis prompt for pasting into any assistant
    Prompt {
        /// Deep dive into one project instead of the whole portfolio
        #[arg(long)]
        project: Option<i64>,
    },
    /// Run the configured AI CLI and store its recommendations
    Run,
    /// Store recommendations from a pasted answer (file or stdin)
    Ingest {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Ask the configured AI CLI for new project ideas
    Ideas {
        /// Number of ideas, 1 to 10
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Err(error) = init_tracing(&config.log_dir()) {
        eprintln!("warning: file logging disabled: {}", error);
    }
    let core = PortfolioCore::open(config)?;

    match cli.command {
        Commands::Cycle { subcommand } => match subcommand {
            CycleSubcommand::Start { start_date } => {
                let start_date = optional_date("start_date", start_date.as_deref())?;
                print_json(&core.start_cycle(start_date)?)
            }
            CycleSubcommand::Status => print_json(&core.cycle_status()?),
        },
        Commands::Project { subcommand } => run_project(&core, subcommand),
        Commands::Metric { subcommand } => run_metric(&core, subcommand),
        Commands::Validate { project_id } => print_json(&core.validate(project_id)?),
        Commands::Analyze { project_id } => print_json(&core.analyze(project_id)?),
        Commands::Alert { subcommand } => match subcommand {
            AlertSubcommand::List { project: Some(project_id), all } => {
                print_json(&core.list_alerts(project_id, !all)?)
            }
            AlertSubcommand::List { project: None, .. } => print_json(&core.list_unresolved_alerts()?),
            AlertSubcommand::Resolve { alert_id } => {
                print_json(&serde_json::json!({ "resolved": core.resolve_alert(alert_id)? }))
            }
        },
        Commands::Zombies { days } => print_json(&core.detect_zombies(days)?),
        Commands::Decision { subcommand } => run_decision(&core, subcommand),
        Commands::Ai { subcommand } => match subcommand {
            AiSubcommand::Prompt { project } => {
                let prompt = match project {
                    Some(project_id) => core.project_prompt(project_id)?,
                    None => core.manual_prompt()?,
                };
                println!("{}", prompt);
                Ok(())
            }
            AiSubcommand::Run => print_json(&core.run_analysis()?),
            AiSubcommand::Ingest { file } => {
                let text = match file {
                    Some(path) => std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                    None => {
                        let mut text = String::new();
                        std::io::stdin().read_to_string(&mut text)?;
                        text
                    }
                };
                print_json(&core.ingest_response(&text)?)
            }
            AiSubcommand::Ideas { count } => print_json(&core.generate_ideas(count)?),
        },
        Commands::Summary => print_json(&core.project_summaries()?),
        Commands::Overview => print_json(&core.overview()?),
        Commands::Guide => print_json(&core.guidance()?),
        Commands::Next => print_json(&core.next_action()?),
        Commands::Estimate { project_id } => print_json(&serde_json::json!({
            "project_id": project_id,
            "minimum_hours": core.estimate_minimum_hours(project_id)?,
        })),
        Commands::Health => print_json(&core.health()),
    }
}

fn run_project(core: &PortfolioCore, subcommand: ProjectSubcommand) -> anyhow::Result<()> {
    match subcommand {
        ProjectSubcommand::Create {
            name,
            hypothesis,
            start_date,
            state,
        } => {
            let start_date = optional_date("start_date", start_date.as_deref())?
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            print_json(&core.create_project(CreateProjectPayload {
                name,
                hypothesis,
                start_date,
                state: parse_state(&state)?,
            })?)
        }
        ProjectSubcommand::List { state } => {
            let state = state.as_deref().map(parse_state).transpose()?;
            print_json(&core.list_projects(state)?)
        }
        ProjectSubcommand::Show { project_id } => print_json(&core.get_project(project_id)?),
        ProjectSubcommand::SetState { project_id, state } => {
            print_json(&core.set_project_state(project_id, parse_state(&state)?)?)
        }
        ProjectSubcommand::Delete { project_id } => {
            core.delete_project(project_id)?;
            print_json(&serde_json::json!({ "deleted": project_id }))
        }
    }
}

fn run_metric(core: &PortfolioCore, subcommand: MetricSubcommand) -> anyhow::Result<()> {
    match subcommand {
        MetricSubcommand::Add {
            project_id,
            date,
            revenue,
            hours,
            conversions,
            notes,
        } => {
            let date = optional_date("date", date.as_deref())?.unwrap_or_else(|| chrono::Local::now().date_naive());
            print_json(&core.append_metric(AppendMetricPayload {
                project_id,
                date,
                revenue: validation::parse_number("revenue", &revenue)?,
                hours: validation::parse_number("hours", &hours)?,
                conversions: validation::parse_integer("conversions", &conversions)?,
                notes,
            })?)
        }
        MetricSubcommand::List { project_id } => print_json(&core.list_metrics(project_id)?),
        MetricSubcommand::Aggregate { project_id } => print_json(&core.aggregate(project_id)?),
    }
}

fn run_decision(core: &PortfolioCore, subcommand: DecisionSubcommand) -> anyhow::Result<()> {
    match subcommand {
        DecisionSubcommand::Record {
            project_id,
            kind,
            outcome,
            justification,
            reason,
        } => print_json(&core.record_decision(RecordDecisionPayload {
            project_id,
            kind: DecisionKind::parse(&kind)
                .ok_or_else(|| AppError::validation("kind", &kind, "expected kill, iterate, scale or pause"))?,
            justification,
            outcome: Some(parse_outcome(&outcome)?),
            origin: DecisionOrigin::Manual,
            rejection_reason: reason,
            proposal_id: None,
        })?),
        DecisionSubcommand::List { project_id } => print_json(&core.list_decisions(project_id)?),
        DecisionSubcommand::Rejections { days } => print_json(&core.recent_rejections(days)?),
        DecisionSubcommand::Pending => print_json(&core.pending_proposals()?),
        DecisionSubcommand::Respond {
            proposal_id,
            outcome,
            reason,
        } => print_json(&core.respond_to_proposal(proposal_id, parse_outcome(&outcome)?, reason.as_deref())?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

fn optional_date(field: &str, raw: Option<&str>) -> Result<Option<chrono::NaiveDate>, AppError> {
    raw.map(|raw| validation::parse_date(field, raw)).transpose()
}

fn parse_state(raw: &str) -> Result<ProjectState, AppError> {
    ProjectState::parse(raw.trim()).ok_or_else(|| {
        AppError::validation("state", raw, "expected idea, mvp, active, paused, killed or winner")
    })
}

fn parse_outcome(raw: &str) -> Result<DecisionOutcome, AppError> {
    DecisionOutcome::parse(raw.trim())
        .ok_or_else(|| AppError::validation("outcome", raw, "expected accepted, rejected or postponed"))
}
