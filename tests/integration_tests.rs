//! End-to-end tests driving the public pipeline API, covering the
//! worked scenarios from the specification: a high-fit posting that
//! clears GOLD, a low-fit posting that routes to the SKIP template path
//! with no bullet-generation LLM calls, a malformed curriculum record
//! that gets skipped rather than failing the run, and a Model Gateway
//! under sustained provider failure tripping its circuit breaker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::json;

use tailoring_core::config::RunConfig;
use tailoring_core::errors::TailoringError;
use tailoring_core::evidence::EvidenceLibrary;
use tailoring_core::events;
use tailoring_core::gateway::errors::GatewayError;
use tailoring_core::gateway::mock_provider::MockProvider;
use tailoring_core::gateway::provider::AiProvider;
use tailoring_core::gateway::retry::RetryConfig;
use tailoring_core::gateway::types::CallUsage;
use tailoring_core::gateway::ModelGateway;
use tailoring_core::models::Tier;
use tailoring_core::pipeline::{self, CancellationToken, JobRecord, PersonaInput};
use tailoring_core::store;

/// A curriculum with two roles, each carrying enough pre-written variants
/// that the deterministic selection path alone clears
/// `MIN_BULLETS_PER_ROLE` — no LLM bullet-generation call is ever needed
/// for this fixture, regardless of tier.
fn two_role_curriculum() -> String {
    json!({
        "records": [
            {
                "role_id": "acme-2022-2024", "index": 0, "title": "Staff SRE",
                "situation": "Frequent outages with no shared on-call discipline.",
                "task": "Stand up a reliability practice across three teams.",
                "actions": ["Redesigned on-call rotation", "Introduced SLOs"],
                "result": "Cut incidents 70% quarter over quarter.",
                "metrics": ["70%"], "keywords": ["kubernetes", "sre", "incident response"],
                "timeframe": "2022-2024",
                "variants": {
                    "metric": "Cut incidents 70% by introducing SLO-driven on-call discipline across three teams.",
                    "leadership": "Led a cross-team reliability initiative spanning three teams, cutting incidents 70%."
                }
            },
            {
                "role_id": "northstar-2019-2022", "index": 0, "title": "Senior Backend Engineer",
                "situation": "Checkout could not handle peak traffic without manual scaling.",
                "task": "Make the checkout path scale automatically.",
                "actions": ["Decomposed the monolith into four services", "Added request-level load shedding"],
                "result": "Handled a 6x traffic spike with zero downtime.",
                "metrics": ["6x"], "keywords": ["microservices", "scalability", "kubernetes"],
                "timeframe": "2019-2022",
                "variants": {
                    "metric": "Decomposed a monolithic checkout service into four scalable services, absorbing a 6x traffic spike with zero downtime.",
                    "delivery": "Shipped a four-service decomposition of the checkout path that absorbed a 6x traffic spike with zero downtime."
                }
            }
        ],
        "skill_taxonomy": [
            { "name": "Infrastructure", "skills": ["kubernetes", "sre", "incident response"] },
            { "name": "Backend", "skills": ["microservices", "scalability"] }
        ]
    })
    .to_string()
}

fn load_evidence(conn: &Connection, curriculum: &str) -> Arc<EvidenceLibrary> {
    store::run_migrations(conn).expect("migrations");
    Arc::new(EvidenceLibrary::load(curriculum, conn).expect("curriculum should load"))
}

fn high_fit_jd_response() -> String {
    json!({
        "roleCategory": "engineering_ic",
        "seniorityLevel": "staff",
        "competencyWeights": { "delivery": 0.4, "process": 0.2, "architecture": 0.3, "leadership": 0.1 },
        "mustHaveKeywords": ["kubernetes", "sre", "microservices"],
        "niceToHaveKeywords": ["scalability"],
        "responsibilities": ["Own production reliability for a distributed platform"],
        "qualifications": ["7+ years of backend engineering"],
        "technicalSkills": ["kubernetes", "microservices"],
        "softSkills": ["leadership"],
        "impliedPainPoints": ["frequent outages", "manual scaling"],
        "successMetrics": ["incident rate", "uptime"],
        "fitScore": 0.9
    })
    .to_string()
}

fn low_fit_jd_response() -> String {
    json!({
        "roleCategory": "other",
        "seniorityLevel": "mid",
        "competencyWeights": { "delivery": 0.25, "process": 0.25, "architecture": 0.25, "leadership": 0.25 },
        "mustHaveKeywords": ["watercolor", "oil painting"],
        "niceToHaveKeywords": [],
        "responsibilities": [],
        "qualifications": [],
        "technicalSkills": [],
        "softSkills": [],
        "impliedPainPoints": [],
        "successMetrics": [],
        "fitScore": 0.0
    })
    .to_string()
}

fn test_db_path(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("tailoring-core-it-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn high_fit_posting_clears_a_tier_and_produces_a_tailored_artifact() {
    std::env::set_current_dir(test_db_path("gold")).unwrap();
    store::init_database().expect("db init");
    let conn = store::get_connection().unwrap();
    let evidence = load_evidence(&conn, &two_role_curriculum());

    let gateway = Arc::new(ModelGateway::new(Arc::new(MockProvider::new(high_fit_jd_response()))).with_cache_ttl_days(None));

    let job = JobRecord {
        job_id: "job-gold".to_string(),
        title: "Staff SRE".to_string(),
        company: "Globex".to_string(),
        raw_description: "We need a staff SRE to own reliability for a kubernetes-based microservices platform.".to_string(),
        url: String::new(),
        ingested_at: "2024-01-01T00:00:00Z".to_string(),
    };
    let persona = PersonaInput {
        summary: "Staff SRE with a decade of experience scaling kubernetes platforms.".to_string(),
        embedding: None,
    };

    let (tx, mut rx) = events::channel();
    let artifact = pipeline::run(gateway, evidence, job, persona, RunConfig::default(), tx, CancellationToken::new())
        .await
        .expect("pipeline should complete");

    assert_ne!(artifact.tier, Tier::Skip);
    assert!(artifact.is_tailored);
    assert!(!artifact.partial);
    assert!(!artifact.stitched_body.roles.is_empty());
    assert!(artifact.stitched_body.all_bullets().next().is_some());

    let mut layers_seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        layers_seen.push(event.layer);
    }
    assert!(layers_seen.iter().any(|l| l == "jd_structurer"));
    assert!(layers_seen.iter().any(|l| l == "bullet_generator"));
}

#[tokio::test]
async fn low_fit_posting_routes_to_skip_with_no_bullet_generation_calls() {
    std::env::set_current_dir(test_db_path("skip")).unwrap();
    store::init_database().expect("db init");
    let conn = store::get_connection().unwrap();
    let evidence = load_evidence(&conn, &two_role_curriculum());

    let gateway = Arc::new(ModelGateway::new(Arc::new(MockProvider::new(low_fit_jd_response()))).with_cache_ttl_days(None));

    let job = JobRecord {
        job_id: "job-skip".to_string(),
        title: "Watercolor Instructor".to_string(),
        company: "Studio".to_string(),
        raw_description: "Teach watercolor and oil painting classes to beginners.".to_string(),
        url: String::new(),
        ingested_at: "2024-01-01T00:00:00Z".to_string(),
    };
    let persona = PersonaInput { summary: "Staff SRE with a decade of kubernetes experience.".to_string(), embedding: None };

    let (tx, mut rx) = events::channel();
    let artifact = pipeline::run(gateway, evidence, job, persona, RunConfig::default(), tx, CancellationToken::new())
        .await
        .expect("pipeline should complete");

    assert_eq!(artifact.tier, Tier::Skip);
    assert!(!artifact.is_tailored);

    let mut saw_bullet_layer = false;
    while let Ok(event) = rx.try_recv() {
        if event.layer == "bullet_generator" {
            saw_bullet_layer = true;
        }
    }
    assert!(!saw_bullet_layer, "SKIP tier must not run the bullet generator");

    // The template path still used the evidence library directly, so every
    // role is represented even though no tailoring happened.
    let role_ids: Vec<&str> = artifact.stitched_body.roles.iter().map(|r| r.role_id.as_str()).collect();
    assert!(role_ids.contains(&"acme-2022-2024"));
    assert!(role_ids.contains(&"northstar-2019-2022"));
}

#[tokio::test]
async fn malformed_curriculum_record_is_skipped_and_the_run_still_completes() {
    std::env::set_current_dir(test_db_path("malformed")).unwrap();
    store::init_database().expect("db init");
    let conn = store::get_connection().unwrap();

    let curriculum = json!({
        "records": [
            {
                "role_id": "acme-2022-2024", "index": 0, "title": "Staff SRE",
                "situation": "Frequent outages.", "task": "Stand up reliability practice.",
                "actions": ["Redesigned on-call"],
                // Missing the required `result` field entirely.
                "metrics": ["70%"], "keywords": ["kubernetes", "sre"], "timeframe": "2022-2024",
                "variants": {}
            },
            {
                "role_id": "northstar-2019-2022", "index": 0, "title": "Senior Backend Engineer",
                "situation": "Checkout could not handle peak traffic.",
                "task": "Make the checkout path scale automatically.",
                "actions": ["Decomposed the monolith into four services", "Added load shedding"],
                "result": "Handled a 6x traffic spike with zero downtime.",
                "metrics": ["6x"], "keywords": ["microservices", "scalability"], "timeframe": "2019-2022",
                "variants": {
                    "metric": "Decomposed a monolithic checkout service into four scalable services, absorbing a 6x traffic spike with zero downtime.",
                    "delivery": "Shipped a four-service decomposition that absorbed a 6x traffic spike with zero downtime."
                }
            }
        ],
        "skill_taxonomy": [{ "name": "Backend", "skills": ["microservices", "scalability"] }]
    })
    .to_string();

    store::run_migrations(&conn).unwrap();
    let evidence = EvidenceLibrary::load(&curriculum, &conn).expect("load should succeed, skipping the bad record");

    assert!(evidence.get_by_id("acme-2022-2024#0").is_none());
    assert!(evidence.get_by_id("northstar-2019-2022#0").is_some());
    assert_eq!(evidence.role_ids(), vec!["northstar-2019-2022".to_string()]);

    let evidence = Arc::new(evidence);
    let gateway = Arc::new(ModelGateway::new(Arc::new(MockProvider::new(high_fit_jd_response()))).with_cache_ttl_days(None));
    let job = JobRecord {
        job_id: "job-malformed".to_string(),
        title: "Staff SRE".to_string(),
        company: "Globex".to_string(),
        raw_description: "We need a staff SRE for a kubernetes-based microservices platform.".to_string(),
        url: String::new(),
        ingested_at: "2024-01-01T00:00:00Z".to_string(),
    };
    let persona = PersonaInput { summary: "Staff SRE.".to_string(), embedding: None };
    let (tx, _rx) = events::channel();

    let artifact = pipeline::run(gateway, evidence, job, persona, RunConfig::default(), tx, CancellationToken::new())
        .await
        .expect("pipeline should complete despite the skipped record");

    for role in &artifact.stitched_body.roles {
        for bullet in &role.bullets {
            assert_ne!(bullet.achievement_id, "acme-2022-2024#0");
        }
    }
}

/// Always fails with a retryable network error, so the gateway's circuit
/// breaker trips after its configured failure threshold.
struct AlwaysFailingProvider {
    calls: AtomicU32,
}

#[async_trait]
impl AiProvider for AlwaysFailingProvider {
    async fn call_llm(&self, _system_prompt: Option<&str>, _user_prompt: &str) -> Result<(String, CallUsage), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::NetworkError("simulated provider outage".to_string()))
    }

    fn name(&self) -> &str {
        "always-failing"
    }
}

#[tokio::test]
async fn repeated_provider_failures_trip_the_circuit_breaker() {
    std::env::set_current_dir(test_db_path("outage")).unwrap();
    store::init_database().expect("db init");

    let provider = Arc::new(AlwaysFailingProvider { calls: AtomicU32::new(0) });
    let gateway = ModelGateway::new(provider.clone())
        .with_cache_ttl_days(None)
        .with_retry_config(RetryConfig { max_retries: 0, initial_delay_ms: 1, max_delay_ms: 1, backoff_multiplier: 1.0 });

    let budget = tailoring_core::gateway::types::CallBudget::default();
    let validate: &tailoring_core::gateway::SchemaValidator = &|_v| Ok(());

    let mut saw_circuit_open = false;
    for attempt in 0..10 {
        let result = gateway.call_json(&format!("probe-{}", attempt), None, "ping", &budget, validate).await;
        if let Err(TailoringError::Gateway(GatewayError::ProviderUnavailable)) = result {
            saw_circuit_open = true;
            break;
        }
        assert!(result.is_err());
    }

    assert!(saw_circuit_open, "sustained failures should eventually open the circuit breaker");
}
