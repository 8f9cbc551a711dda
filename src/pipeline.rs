//! The top-level orchestrator: wires every layer into the strictly
//! forward pipeline described in spec §2/§5, owns the event stream, and
//! applies the per-job cancellation/budget ceiling.
//!
//! Layers run sequentially; only the Per-Role Bullet Generator's role
//! sub-tasks run with bounded intra-job parallelism (a worker pool sized
//! from [`crate::config::RunConfig::max_concurrent_roles`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use crate::composer;
use crate::config::RunConfig;
use crate::errors::TailoringError;
use crate::events::{self, EventReceiver, EventSender};
use crate::evidence::EvidenceLibrary;
use crate::gateway::types::CallBudget;
use crate::gateway::ModelGateway;
use crate::grader;
use crate::jd::{self, JdStructurerInput};
use crate::models::{ProfileOutput, StitchedBody, TailoringArtifact, Tier, TraceRecord};
use crate::stitcher;
use crate::store;
use crate::{bullets, tier};

/// The job record fetched by identifier from the document store (spec
/// §6's "Inputs the core consumes").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub raw_description: String,
    pub url: String,
    pub ingested_at: String,
}

/// Candidate persona summary plus its pre-computed embedding, per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaInput {
    pub summary: String,
    pub embedding: Option<Vec<f32>>,
}

/// A hand-rolled cooperative cancellation handle (spec §5/§9: the
/// teacher's dependency set carries no `tokio-util`, so this is an
/// `Arc<AtomicBool>` plus a `Notify` rather than `tokio_util::sync::
/// CancellationToken`). Checked at every suspension point: before
/// spawning a role sub-task and after each gateway call.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

fn trace(layer: &str, duration_ms: u64, degradation_flags: Vec<String>) -> TraceRecord {
    TraceRecord { layer: layer.to_string(), duration_ms, tokens: 0, cost_usd_millis: 0, retries: 0, degradation_flags }
}

/// Builds the SKIP-tier artifact (spec §4.3/§8 scenario 3): a template
/// body drawn straight from the evidence library's most recent role with
/// no gateway calls beyond the JD structuring that produced the fit
/// score, `is_tailored = false`.
fn build_template_artifact(
    job: &JobRecord,
    extracted_jd: crate::models::ExtractedJd,
    evidence: &EvidenceLibrary,
    trace_so_far: Vec<TraceRecord>,
) -> TailoringArtifact {
    use crate::models::{GeneratedBullet, RoleOutput};

    let roles: Vec<RoleOutput> = evidence
        .role_ids()
        .into_iter()
        .map(|role_id| {
            let bullets: Vec<GeneratedBullet> = evidence
                .records_for_role(&role_id)
                .into_iter()
                .map(|record| GeneratedBullet {
                    text: record.result.clone(),
                    source_text: record.labeled_source_text(),
                    source_metric: record.metrics.first().cloned(),
                    situation: record.situation.clone(),
                    action: record.actions.join("; "),
                    result: record.result.clone(),
                    achievement_id: record.id(),
                    keyword_used: Vec::new(),
                    pain_point_addressed: None,
                })
                .collect();
            RoleOutput { role_id, bullets, passed: true, flagged_bullet_ids: Vec::new(), issues: Vec::new(), degraded: false }
        })
        .collect();

    let body = StitchedBody { roles, deduplication_log: Vec::new() };
    let (headline, tagline) = composer::fallback_headline(&extracted_jd, &body);
    let profile = ProfileOutput {
        headline,
        tagline,
        key_achievements: Vec::new(),
        core_competencies: Vec::new(),
        skills_sections: Vec::new(),
    };
    let grade = grader::grade(&body, &extracted_jd, &profile, evidence, &RunConfig::default().thresholds);

    TailoringArtifact {
        job_id: job.job_id.clone(),
        tier: Tier::Skip,
        is_tailored: false,
        extracted_jd,
        stitched_body: body,
        profile,
        grade,
        trace: trace_so_far,
        partial: false,
    }
}

/// Runs the complete pipeline for one job and returns the terminal
/// artifact. `gateway` and `evidence` are shared across the bounded role
/// sub-tasks, so the caller provides them already wrapped in `Arc`
/// (constructed once per process lifetime, per spec §4.1/§5).
pub async fn run(
    gateway: Arc<ModelGateway>,
    evidence: Arc<EvidenceLibrary>,
    job: JobRecord,
    persona: PersonaInput,
    config: RunConfig,
    events_tx: EventSender,
    cancellation: CancellationToken,
) -> Result<TailoringArtifact, TailoringError> {
    let call_budget = CallBudget { max_tokens: config.budget_tokens, max_wall_ms: config.budget_seconds.saturating_mul(1000) };
    let mut trace_records = Vec::new();

    // --- JD Structurer -----------------------------------------------
    let jd_start = std::time::Instant::now();
    let _ = events_tx.send(events::TraceEvent {
        job_id: job.job_id.clone(),
        layer: "jd_structurer".to_string(),
        status: events::LayerStatus::Started,
        duration_ms: 0,
        tokens: 0,
        cost_usd_millis: 0,
        degradation_flags: Vec::new(),
    });

    let structurer_input = JdStructurerInput {
        raw_description: &job.raw_description,
        company_research: None,
        persona_summary: &persona.summary,
        persona_embedding: persona.embedding.as_deref(),
    };

    let extracted_jd = match jd::structure(&gateway, &evidence, structurer_input, &call_budget).await {
        Ok(extracted) => extracted,
        Err(e) => {
            // Hard schema failure after retry budget: route to SKIP per
            // spec §4.2's failure semantics, but there is no fit score to
            // route on, so the job is aborted rather than silently
            // templated — the caller sees exactly why.
            let _ = events_tx.send(events::TraceEvent {
                job_id: job.job_id.clone(),
                layer: "jd_structurer".to_string(),
                status: events::LayerStatus::Failed,
                duration_ms: jd_start.elapsed().as_millis() as u64,
                tokens: 0,
                cost_usd_millis: 0,
                degradation_flags: vec!["jd_structuring_failed".to_string()],
            });
            crate::error_logging::record_error_metric(&e, "pipeline::jd_structurer");
            return Err(e);
        }
    };

    trace_records.push(trace("jd_structurer", jd_start.elapsed().as_millis() as u64, Vec::new()));
    let _ = events_tx.send(events::TraceEvent {
        job_id: job.job_id.clone(),
        layer: "jd_structurer".to_string(),
        status: events::LayerStatus::Completed,
        duration_ms: jd_start.elapsed().as_millis() as u64,
        tokens: 0,
        cost_usd_millis: 0,
        degradation_flags: Vec::new(),
    });

    // --- Tier Router ---------------------------------------------------
    let plan = tier::route(extracted_jd.fit_score, config.tier_override);

    if plan.tier == Tier::Skip {
        let artifact = build_template_artifact(&job, extracted_jd, &evidence, trace_records);
        persist(&job.job_id, &artifact)?;
        return Ok(artifact);
    }

    // --- Per-Role Bullet Generator (bounded intra-job parallelism) -----
    let bullets_start = std::time::Instant::now();
    let role_ids = evidence.role_ids();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_roles.max(1)));
    let mut join_set: JoinSet<(usize, Result<crate::models::RoleOutput, TailoringError>)> = JoinSet::new();

    for (role_rank, role_id) in role_ids.iter().cloned().enumerate() {
        let gateway = gateway.clone();
        let evidence = evidence.clone();
        let jd_for_task = extracted_jd.clone();
        let tier = plan.tier;
        let thresholds = config.thresholds;
        let budget = call_budget;
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result =
                bullets::generate_for_role(&gateway, &evidence, &role_id, role_rank, &jd_for_task, tier, &thresholds, &budget)
                    .await;
            (role_rank, result)
        });
    }

    let job_timeout = Duration::from_secs(config.budget_seconds.max(1));
    let mut role_outputs: Vec<Option<crate::models::RoleOutput>> = vec![None; role_ids.len()];
    let mut degraded_roles = Vec::new();
    let mut timed_out = false;

    let collect = async {
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((rank, Ok(output))) => {
                    if output.degraded {
                        degraded_roles.push(output.role_id.clone());
                    }
                    role_outputs[rank] = Some(output);
                }
                Ok((rank, Err(e))) => {
                    log::warn!("role {} failed: {}", role_ids.get(rank).map(String::as_str).unwrap_or("?"), e);
                    degraded_roles.push(role_ids.get(rank).cloned().unwrap_or_default());
                }
                Err(join_error) => {
                    log::warn!("role sub-task panicked or was aborted: {}", join_error);
                }
            }
        }
    };

    tokio::select! {
        _ = collect => {}
        _ = tokio::time::sleep(job_timeout) => {
            timed_out = true;
            cancellation.cancel();
            join_set.abort_all();
        }
        _ = cancellation.cancelled() => {
            timed_out = true;
            join_set.abort_all();
        }
    }

    let ordered_outputs: Vec<crate::models::RoleOutput> = role_outputs.into_iter().flatten().collect();

    trace_records.push(trace(
        "bullet_generator",
        bullets_start.elapsed().as_millis() as u64,
        degraded_roles.iter().map(|r| format!("role_degraded:{}", r)).collect(),
    ));

    // --- Stitcher -------------------------------------------------------
    let stitch_start = std::time::Instant::now();
    let stitched_body = stitcher::stitch(ordered_outputs, &config.thresholds);
    trace_records.push(trace("stitcher", stitch_start.elapsed().as_millis() as u64, Vec::new()));

    // --- Header/Skills Composer ------------------------------------------
    let compose_start = std::time::Instant::now();
    let profile = composer::compose(&gateway, &evidence, &stitched_body, &extracted_jd, &call_budget)
        .await
        .unwrap_or_else(|_| ProfileOutput {
            headline: String::new(),
            tagline: String::new(),
            key_achievements: Vec::new(),
            core_competencies: Vec::new(),
            skills_sections: Vec::new(),
        });
    trace_records.push(trace("composer", compose_start.elapsed().as_millis() as u64, Vec::new()));

    // --- Grader and Improver ---------------------------------------------
    let grade_start = std::time::Instant::now();
    let (stitched_body, profile, grade_result, improve_iterations) =
        grader::grade_and_improve(&gateway, &evidence, stitched_body, &extracted_jd, profile, &config.thresholds, &call_budget)
            .await;
    trace_records.push(trace(
        "grader",
        grade_start.elapsed().as_millis() as u64,
        if improve_iterations > 0 { vec![format!("improve_iterations:{}", improve_iterations)] } else { Vec::new() },
    ));

    let partial = timed_out || cancellation.is_cancelled();
    let artifact = TailoringArtifact {
        job_id: job.job_id.clone(),
        tier: plan.tier,
        is_tailored: true,
        extracted_jd,
        stitched_body,
        profile,
        grade: grade_result,
        trace: trace_records,
        partial,
    };

    persist(&job.job_id, &artifact)?;
    Ok(artifact)
}

fn persist(job_id: &str, artifact: &TailoringArtifact) -> Result<(), TailoringError> {
    let conn = store::get_connection()?;
    let json = serde_json::to_value(artifact)
        .map_err(|e| TailoringError::Application(format!("failed to serialize artifact: {}", e)))?;
    store::save_artifact(&conn, job_id, &json, artifact.partial)?;
    Ok(())
}

/// Convenience entry point for callers that want the event-stream
/// receiver rather than managing the channel themselves (spec §6: "a
/// structured event stream... UI collaborators subscribe to this
/// stream").
pub fn run_with_events(
    gateway: Arc<ModelGateway>,
    evidence: Arc<EvidenceLibrary>,
    job: JobRecord,
    persona: PersonaInput,
    config: RunConfig,
) -> (tokio::task::JoinHandle<Result<TailoringArtifact, TailoringError>>, EventReceiver) {
    let (tx, rx) = events::channel();
    let cancellation = CancellationToken::new();
    let handle = tokio::spawn(run(gateway, evidence, job, persona, config, tx, cancellation));
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock_provider::MockProvider;

    fn sample_evidence() -> Arc<EvidenceLibrary> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        store::run_migrations_for_test(&conn).unwrap();
        let source = serde_json::json!({
            "records": [
                {
                    "role_id": "acme-2023", "index": 0, "title": "Staff SRE",
                    "situation": "Frequent outages", "task": "Improve reliability",
                    "actions": ["Redesigned on-call", "Introduced SLOs"],
                    "result": "Cut incidents 70%", "metrics": ["70%"],
                    "keywords": ["kubernetes", "sre"], "timeframe": "2022-2023",
                    "variants": { "delivery": "Cut incident rate 70% via a kubernetes-based SLO reliability overhaul addressing reliability at scale." }
                }
            ],
            "skill_taxonomy": [{ "name": "Infrastructure", "skills": ["kubernetes", "sre"] }]
        })
        .to_string();
        Arc::new(EvidenceLibrary::load(&source, &conn).unwrap())
    }

    #[tokio::test]
    async fn low_fit_posting_routes_to_skip_template_with_no_bullet_llm_calls() {
        std::env::set_current_dir(std::env::temp_dir()).ok();
        store::init_database().expect("test db init");

        let jd_response = serde_json::json!({
            "roleCategory": "other",
            "seniorityLevel": "mid",
            "competencyWeights": { "delivery": 0.25, "process": 0.25, "architecture": 0.25, "leadership": 0.25 },
            "mustHaveKeywords": ["unrelated_skill"],
            "niceToHaveKeywords": [],
            "responsibilities": [],
            "qualifications": [],
            "technicalSkills": [],
            "softSkills": [],
            "impliedPainPoints": [],
            "successMetrics": [],
            "fitScore": 0.0
        })
        .to_string();

        let gateway = Arc::new(ModelGateway::new(Arc::new(MockProvider::new(&jd_response))).with_cache_ttl_days(None));
        let evidence = sample_evidence();
        let job = JobRecord {
            job_id: format!("job-skip-{}", std::process::id()),
            title: "Unrelated role".to_string(),
            company: "Acme".to_string(),
            raw_description: "A role with nothing in common with the candidate.".to_string(),
            url: String::new(),
            ingested_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let persona = PersonaInput { summary: "watercolor painting instructor".to_string(), embedding: None };
        let (tx, mut rx) = events::channel();

        let artifact = run(gateway, evidence, job, persona, RunConfig::default(), tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifact.tier, Tier::Skip);
        assert!(!artifact.is_tailored);

        let mut saw_jd_event = false;
        while let Ok(event) = rx.try_recv() {
            if event.layer == "jd_structurer" {
                saw_jd_event = true;
            }
            assert_ne!(event.layer, "bullet_generator");
        }
        assert!(saw_jd_event);
    }

    #[test]
    fn cancellation_token_reports_cancelled_state() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
