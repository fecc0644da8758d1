pub mod invoke;
pub mod prompt;

use crate::db::{self, Database};
use crate::errors::{AppError, AppResult};
use crate::harness::structured_output::{extract_json, validate_structured_output, ExtractionStrategy};
use crate::models::{Decision, DecisionKind, DecisionOrigin, Provider, RecordDecisionPayload};
use crate::policy::Policy;
use chrono::{DateTime, Datelike, Local, Utc};
use invoke::AiInvoker;
use prompt::IdeaContext;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStage {
    BuildPrompt,
    Invoke,
    ExtractJson,
    ValidateSchema,
    Persist,
}

impl BridgeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildPrompt => "build_prompt",
            Self::Invoke => "invoke",
            Self::ExtractJson => "extract_json",
            Self::ValidateSchema => "validate_schema",
            Self::Persist => "persist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiResponse {
    #[serde(default, deserialize_with = "lenient_text")]
    pub resumen_ejecutivo: String,
    pub proyectos: Vec<AiVerdict>,
    #[serde(default, deserialize_with = "lenient_texts")]
    pub riesgos_detectados: Vec<String>,
}

/// One recommendation as the model wrote it. The id stays raw until persist
/// so a single malformed entry is skipped instead of failing the batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiVerdict {
    pub id: Value,
    #[serde(deserialize_with = "lenient_text")]
    pub decision: String,
    #[serde(deserialize_with = "lenient_text")]
    pub justificacion: String,
}

impl AiVerdict {
    /// Accepts `7`, `7.0` and `"7"`.
    pub fn project_id(&self) -> Option<i64> {
        match &self.id {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|id| id.fract() == 0.0 && id.abs() <= i64::MAX as f64)
                    .map(|id| id as i64)
            }),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedVerdict {
    pub project_id: Option<i64>,
    pub decision: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub provider: Option<Provider>,
    pub extraction: ExtractionStrategy,
    pub summary: String,
    pub risks: Vec<String>,
    pub persisted: Vec<Decision>,
    pub skipped: Vec<SkippedVerdict>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    #[serde(default, deserialize_with = "lenient_text")]
    pub nombre: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub descripcion: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub hipotesis: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub mercado_objetivo: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub dificultad: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub tiempo_estimado_mvp: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub razon_sugerencia: String,
}

#[derive(Debug, Deserialize)]
struct IdeaResponse {
    ideas: Vec<Idea>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaBatch {
    pub run_id: Uuid,
    pub provider: Option<Provider>,
    pub context: IdeaContext,
    pub extraction: ExtractionStrategy,
    pub ideas: Vec<Idea>,
    pub elapsed_ms: u64,
}

/// Presence checks only. Field types are coerced while decoding.
pub fn response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["resumen_ejecutivo", "proyectos", "riesgos_detectados"],
        "properties": {
            "proyectos": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "decision", "justificacion"]
                }
            }
        }
    })
}

pub fn idea_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["ideas"],
        "properties": {
            "ideas": {
                "type": "array",
                "items": { "type": "object" }
            }
        }
    })
}

/// Extracts, schema-checks and decodes a model answer. Any violation fails
/// the whole batch.
pub fn parse_response(text: &str) -> AppResult<(AiResponse, ExtractionStrategy)> {
    decode(text, &response_schema())
}

pub fn parse_ideas(text: &str) -> AppResult<(Vec<Idea>, ExtractionStrategy)> {
    let (response, strategy) = decode::<IdeaResponse>(text, &idea_schema())?;
    Ok((response.ideas, strategy))
}

fn decode<T: DeserializeOwned>(text: &str, schema: &Value) -> AppResult<(T, ExtractionStrategy)> {
    let (value, strategy) = extract_json(text).ok_or_else(|| {
        AppError::schema("no JSON object found in the AI response", Vec::new())
    })?;
    validate_structured_output(&value, schema)
        .map_err(|errors| AppError::schema("AI response did not match the expected format", errors))?;
    let decoded = serde_json::from_value::<T>(value)
        .map_err(|error| AppError::schema("AI response could not be decoded", vec![error.to_string()]))?;
    Ok((decoded, strategy))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(|value| value_text(&value))
}

fn lenient_texts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().map(value_text).collect(),
        Value::Null => Vec::new(),
        other => vec![value_text(&other)],
    })
}

/// Writes one pending AI proposal per verdict. Verdicts with an unusable id,
/// an unknown project or decision, or whose insert fails, are skipped.
pub fn persist(
    conn: &Connection,
    response: &AiResponse,
    now: DateTime<Utc>,
) -> AppResult<(Vec<Decision>, Vec<SkippedVerdict>)> {
    let mut persisted = Vec::new();
    let mut skipped = Vec::new();
    for verdict in &response.proyectos {
        let project_id = verdict.project_id();
        let skip = |reason: String| SkippedVerdict {
            project_id,
            decision: verdict.decision.clone(),
            reason,
        };
        let Some(project_id) = project_id else {
            tracing::warn!(id = %verdict.id, "AI verdict without a usable project id; skipped");
            skipped.push(skip(format!("invalid project id {}", verdict.id)));
            continue;
        };
        let Some(kind) = DecisionKind::parse(&verdict.decision) else {
            tracing::warn!(project_id, decision = %verdict.decision, "unknown AI decision; skipped");
            skipped.push(skip(format!("unknown decision '{}'", verdict.decision)));
            continue;
        };
        if db::get_project(conn, project_id)?.is_none() {
            tracing::warn!(project_id, "AI verdict for unknown project; skipped");
            skipped.push(skip("unknown project".to_string()));
            continue;
        }
        let payload = RecordDecisionPayload {
            project_id,
            kind,
            justification: verdict.justificacion.trim().to_string(),
            outcome: None,
            origin: DecisionOrigin::Ai,
            rejection_reason: None,
            proposal_id: None,
        };
        match db::insert_decision(conn, &payload, now) {
            Ok(decision) => persisted.push(decision),
            Err(error) => {
                tracing::warn!(project_id, error = %error, "AI verdict insert failed; skipped");
                skipped.push(skip(error.to_string()));
            }
        }
    }
    Ok((persisted, skipped))
}

/// Runs prompts through the configured invoker and turns the answers into
/// pending proposals or idea batches. No transaction stays open while the
/// external process runs.
pub struct AiBridge {
    db: Arc<Database>,
    policy: Policy,
    invoker: Arc<dyn AiInvoker>,
}

impl AiBridge {
    pub fn new(db: Arc<Database>, policy: Policy, invoker: Arc<dyn AiInvoker>) -> Self {
        Self { db, policy, invoker }
    }

    pub fn build_prompt(&self) -> AppResult<String> {
        self.db
            .read(|conn| prompt::build(conn, &self.policy, Local::now().date_naive(), Utc::now()))
    }

    pub fn build_project_prompt(&self, project_id: i64) -> AppResult<String> {
        self.db.read(|conn| prompt::build_project(conn, project_id))
    }

    /// Full automatic run against the configured invoker.
    pub fn run(&self) -> AppResult<AnalysisRun> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let prompt = self
            .build_prompt()
            .map_err(|error| log_stage_failure(run_id, BridgeStage::BuildPrompt, error))?;
        let answer = self
            .invoker
            .invoke(&prompt)
            .map_err(|error| log_stage_failure(run_id, BridgeStage::Invoke, error))?;
        self.complete(run_id, self.invoker.provider(), &answer, started)
    }

    /// Manual fallback: processes an answer the user pasted back.
    pub fn ingest_response(&self, text: &str) -> AppResult<AnalysisRun> {
        self.complete(Uuid::new_v4(), None, text, Instant::now())
    }

    fn complete(
        &self,
        run_id: Uuid,
        provider: Option<Provider>,
        answer: &str,
        started: Instant,
    ) -> AppResult<AnalysisRun> {
        let (response, extraction) = parse_response(answer).map_err(|error| {
            let stage = decode_stage(&error);
            log_stage_failure(run_id, stage, error)
        })?;
        let (persisted, skipped) = self
            .db
            .write("persist_ai_recommendations", |tx| persist(tx, &response, Utc::now()))
            .map_err(|error| log_stage_failure(run_id, BridgeStage::Persist, error))?;

        tracing::info!(
            run_id = %run_id,
            extraction = ?extraction,
            persisted = persisted.len(),
            skipped = skipped.len(),
            "AI analysis stored"
        );
        Ok(AnalysisRun {
            run_id,
            provider,
            extraction,
            summary: response.resumen_ejecutivo,
            risks: response.riesgos_detectados,
            persisted,
            skipped,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Asks for `count` project ideas, clamped to 1..=10. Nothing is stored.
    pub fn ideas(&self, count: usize) -> AppResult<IdeaBatch> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let (prompt, context) = self
            .db
            .read(|conn| prompt::build_ideas(conn, count, Local::now().year()))
            .map_err(|error| log_stage_failure(run_id, BridgeStage::BuildPrompt, error))?;
        let answer = self
            .invoker
            .invoke(&prompt)
            .map_err(|error| log_stage_failure(run_id, BridgeStage::Invoke, error))?;
        let (ideas, extraction) = parse_ideas(&answer).map_err(|error| {
            let stage = decode_stage(&error);
            log_stage_failure(run_id, stage, error)
        })?;

        tracing::info!(run_id = %run_id, context = ?context, ideas = ideas.len(), "AI ideas generated");
        Ok(IdeaBatch {
            run_id,
            provider: self.invoker.provider(),
            context,
            extraction,
            ideas,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn decode_stage(error: &AppError) -> BridgeStage {
    match error {
        AppError::AiSchema { errors, .. } if errors.is_empty() => BridgeStage::ExtractJson,
        _ => BridgeStage::ValidateSchema,
    }
}

fn log_stage_failure(run_id: Uuid, stage: BridgeStage, error: AppError) -> AppError {
    tracing::error!(run_id = %run_id, stage = stage.as_str(), error = %error, "AI bridge stage failed");
    error
}

#[cfg(test)]
mod tests {
    use super::invoke::AiInvoker;
    use super::prompt::IdeaContext;
    use super::{parse_response, AiBridge};
    use crate::db::{self, Database};
    use crate::errors::{AppResult, ErrorKind};
    use crate::harness::structured_output::ExtractionStrategy;
    use crate::models::{CreateProjectPayload, DecisionKind, DecisionOrigin, ProjectState};
    use crate::policy::Policy;
    use chrono::{Duration, Utc};
    use std::sync::{Arc, Mutex};

    struct CannedInvoker {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    impl AiInvoker for CannedInvoker {
        fn invoke(&self, prompt: &str) -> AppResult<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok(self.answer.clone())
        }
    }

    fn canned(answer: &str) -> Arc<CannedInvoker> {
        Arc::new(CannedInvoker {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn seeded_db(dir: &tempfile::TempDir) -> Arc<Database> {
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let today = Utc::now().date_naive();
        db.write("seed", |tx| {
            db::insert_cycle(tx, today - Duration::days(50), Utc::now())?;
            db::insert_project(
                tx,
                &CreateProjectPayload {
                    name: "digest".to_string(),
                    hypothesis: "Writers pay for weekly digests".to_string(),
                    start_date: today - Duration::days(50),
                    state: ProjectState::Active,
                },
                Utc::now(),
            )
        })
        .expect("seed");
        Arc::new(db)
    }

    #[test]
    fn schema_violation_fails_whole_batch() {
        let error = parse_response(r#"{"resumen_ejecutivo": "ok", "proyectos": [{"id": 1, "decision": "kill"}], "riesgos_detectados": []}"#)
            .expect_err("missing justificacion");
        assert_eq!(error.kind(), ErrorKind::AiSchema);

        let error = parse_response("no json here").expect_err("no json");
        assert_eq!(error.kind(), ErrorKind::AiSchema);
    }

    #[test]
    fn run_persists_pending_ai_proposals_and_skips_unknowns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = seeded_db(&dir);
        let answer = "Sure! Here it is:\n```json\n{\"resumen_ejecutivo\": \"One project.\", \"proyectos\": [\
            {\"id\": 1, \"decision\": \"Winner\", \"justificacion\": \"ROI 62/h\"},\
            {\"id\": 99, \"decision\": \"kill\", \"justificacion\": \"ghost\"},\
            {\"id\": 1, \"decision\": \"pivot\", \"justificacion\": \"?\"}\
            ], \"riesgos_detectados\": [\"single channel\"]}\n```";
        let invoker = Arc::new(CannedInvoker {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let bridge = AiBridge::new(db.clone(), Policy::default(), invoker.clone());

        let run = bridge.run().expect("run");
        assert_eq!(run.extraction, ExtractionStrategy::FencedBlock);
        assert_eq!(run.persisted.len(), 1);
        assert_eq!(run.persisted[0].kind, DecisionKind::Scale);
        assert_eq!(run.persisted[0].origin, DecisionOrigin::Ai);
        assert!(run.persisted[0].outcome.is_none());
        assert_eq!(run.skipped.len(), 2);
        assert_eq!(run.risks, vec!["single channel".to_string()]);

        let prompts = invoker.prompts.lock().expect("prompts");
        assert!(prompts[0].contains("Phase: Decision"));
        assert_eq!(db.read(db::pending_proposals).expect("pending").len(), 1);
    }

    #[test]
    fn ingest_accepts_pasted_answer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = seeded_db(&dir);
        let invoker = Arc::new(CannedInvoker {
            answer: String::new(),
            prompts: Mutex::new(Vec::new()),
        });
        let bridge = AiBridge::new(db.clone(), Policy::default(), invoker);
        let run = bridge
            .ingest_response(r#"{"resumen_ejecutivo": "", "proyectos": [{"id": 1, "decision": "pause", "justificacion": "waiting"}], "riesgos_detectados": []}"#)
            .expect("ingest");
        assert_eq!(run.extraction, ExtractionStrategy::WholeText);
        assert_eq!(run.persisted[0].kind, DecisionKind::Pause);
        assert!(run.provider.is_none());
    }

    #[test]
    fn loose_fields_are_coerced_not_rejected() {
        let (response, _) = parse_response(
            r#"{"resumen_ejecutivo": "ok", "proyectos": [
                {"id": "1", "decision": "kill", "justificacion": "flat"},
                {"id": 2, "decision": "scale", "justificacion": 42}
            ], "riesgos_detectados": [{"riesgo": "one channel"}]}"#,
        )
        .expect("lenient decode");
        assert_eq!(response.proyectos.len(), 2);
        assert_eq!(response.proyectos[0].project_id(), Some(1));
        assert_eq!(response.proyectos[1].project_id(), Some(2));
        assert_eq!(response.proyectos[1].justificacion, "42");
        assert_eq!(response.riesgos_detectados, vec![r#"{"riesgo":"one channel"}"#.to_string()]);

        let error = parse_response(r#"{"resumen_ejecutivo": "ok", "proyectos": {}, "riesgos_detectados": []}"#)
            .expect_err("proyectos must be an array");
        assert_eq!(error.kind(), ErrorKind::AiSchema);
    }

    #[test]
    fn bad_id_is_skipped_while_siblings_persist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = seeded_db(&dir);
        let bridge = AiBridge::new(db.clone(), Policy::default(), canned(""));
        let run = bridge
            .ingest_response(
                r#"{"resumen_ejecutivo": "", "proyectos": [
                    {"id": "1", "decision": "iterate", "justificacion": "some signal"},
                    {"id": "abc", "decision": "kill", "justificacion": "?"},
                    {"id": 1.5, "decision": "kill", "justificacion": "?"}
                ], "riesgos_detectados": null}"#,
            )
            .expect("ingest");
        assert_eq!(run.persisted.len(), 1);
        assert_eq!(run.persisted[0].project_id, 1);
        assert_eq!(run.skipped.len(), 2);
        assert!(run.skipped.iter().all(|skip| skip.project_id.is_none()));
        assert!(run.risks.is_empty());
    }

    #[test]
    fn run_extracts_unlabeled_fence_and_prose() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = seeded_db(&dir);
        let body = r#"{"resumen_ejecutivo": "ok", "proyectos": [{"id": 1, "decision": "iterate", "justificacion": "x"}], "riesgos_detectados": []}"#;

        let fenced = format!("Analysis below.\n```\n{}\n```\nDone.", body);
        let run = AiBridge::new(db.clone(), Policy::default(), canned(&fenced))
            .run()
            .expect("fenced run");
        assert_eq!(run.extraction, ExtractionStrategy::FencedBlock);
        assert_eq!(run.persisted.len(), 1);

        let prose = format!("Here is my take: {} Let me know if {{anything}} is unclear.", body);
        let run = AiBridge::new(db.clone(), Policy::default(), canned(&prose))
            .run()
            .expect("prose run");
        assert_eq!(run.extraction, ExtractionStrategy::BalancedBraces);
        assert_eq!(run.persisted.len(), 1);
        assert_eq!(db.read(db::pending_proposals).expect("pending").len(), 2);
    }

    #[test]
    fn storage_failure_skips_only_that_verdict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = seeded_db(&dir);
        db.write("trigger", |tx| {
            tx.execute_batch(
                "CREATE TRIGGER block_ai BEFORE INSERT ON decisions
                 WHEN NEW.justification = 'blocked'
                 BEGIN SELECT RAISE(ABORT, 'blocked by trigger'); END;",
            )?;
            Ok(())
        })
        .expect("trigger");

        let answer = r#"{"resumen_ejecutivo": "", "proyectos": [
            {"id": 1, "decision": "kill", "justificacion": "blocked"},
            {"id": 1, "decision": "iterate", "justificacion": "fine"}
        ], "riesgos_detectados": []}"#;
        let run = AiBridge::new(db.clone(), Policy::default(), canned(answer))
            .run()
            .expect("run");
        assert_eq!(run.persisted.len(), 1);
        assert_eq!(run.persisted[0].kind, DecisionKind::Iterate);
        assert_eq!(run.skipped.len(), 1);
        assert!(run.skipped[0].reason.contains("blocked by trigger"));

        let pending = db.read(db::pending_proposals).expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].justification, "fine");
    }

    #[test]
    fn ideas_use_fresh_or_related_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = Arc::new(Database::new(&dir.path().join("empty.db")).expect("db"));
        let answer = "```json\n{\"ideas\": [{\"nombre\": \"Invoice chaser\", \"dificultad\": \"baja\", \
                      \"tiempo_estimado_mvp\": 14}]}\n```";
        let invoker = canned(answer);
        let batch = AiBridge::new(empty, Policy::default(), invoker.clone())
            .ideas(3)
            .expect("fresh ideas");
        assert_eq!(batch.context, IdeaContext::Fresh);
        assert_eq!(batch.extraction, ExtractionStrategy::FencedBlock);
        assert_eq!(batch.ideas.len(), 1);
        assert_eq!(batch.ideas[0].nombre, "Invoice chaser");
        assert_eq!(batch.ideas[0].tiempo_estimado_mvp, "14");
        assert!(batch.ideas[0].hipotesis.is_empty());
        assert!(invoker.prompts.lock().expect("prompts")[0].contains("Generate 3 SaaS"));

        let db = seeded_db(&dir);
        let invoker = canned(answer);
        let batch = AiBridge::new(db.clone(), Policy::default(), invoker.clone())
            .ideas(99)
            .expect("related ideas");
        assert_eq!(batch.context, IdeaContext::Related);
        let prompts = invoker.prompts.lock().expect("prompts");
        assert!(prompts[0].contains("Generate 10 NEW project ideas"));
        assert!(prompts[0].contains("- digest: Writers pay for weekly digests"));
        assert!(db.read(db::pending_proposals).expect("pending").is_empty());

        let error = AiBridge::new(db, Policy::default(), canned(r#"{"proyectos": []}"#))
            .ideas(2)
            .expect_err("missing ideas key");
        assert_eq!(error.kind(), ErrorKind::AiSchema);
    }
}
