//! Writes a sample master curriculum document to disk and initializes the
//! local document store, so `tailor` has something to run against without
//! a caller having to hand-author the JSON first.
//!
//! Usage:
//!   cargo run --bin seed_curriculum [-- <output_path>]

use std::env;
use std::fs;
use std::path::PathBuf;

fn sample_curriculum() -> serde_json::Value {
    serde_json::json!({
        "records": [
            {
                "role_id": "acme-2022-2024",
                "index": 0,
                "title": "Staff Site Reliability Engineer",
                "situation": "Production incidents were frequent and resolved ad hoc, with no shared on-call discipline across three backend teams.",
                "task": "Stand up a reliability practice that could scale with the org without adding headcount.",
                "actions": [
                    "Redesigned the on-call rotation and incident-response runbook across three teams",
                    "Introduced service-level objectives tied to customer-facing latency and error budgets",
                    "Built a Kubernetes-based autoscaling policy driven by the new SLOs"
                ],
                "result": "Cut production incidents by 70% quarter over quarter and reduced median time-to-resolution from 90 to 20 minutes.",
                "metrics": ["70%", "90 to 20 minutes"],
                "keywords": ["kubernetes", "sre", "incident response", "slo", "on-call"],
                "timeframe": "2022-2024",
                "variants": {
                    "metric": "Cut production incidents 70% and time-to-resolution from 90 to 20 minutes by introducing SLO-driven Kubernetes autoscaling across three teams.",
                    "narrative": "Rebuilt an ad hoc incident-response practice into a shared, SLO-driven discipline spanning three backend teams, cutting incidents 70%.",
                    "leadership": "Led a cross-team reliability initiative spanning three backend teams, establishing shared on-call and SLO practices that cut incidents 70%.",
                    "delivery": "Shipped an SLO-driven Kubernetes autoscaling policy that cut production incidents 70% without adding headcount."
                }
            },
            {
                "role_id": "acme-2022-2024",
                "index": 1,
                "title": "Staff Site Reliability Engineer",
                "situation": "Deploys required a full day of manual coordination across teams and frequently rolled back under load.",
                "task": "Replace the manual deploy process with something engineers could run unattended.",
                "actions": [
                    "Built a progressive-delivery pipeline with automated canary analysis",
                    "Instrumented deploy-time error budgets with automatic rollback"
                ],
                "result": "Reduced deploy time from 8 hours to 35 minutes with zero manual rollbacks in the following two quarters.",
                "metrics": ["8 hours to 35 minutes", "zero manual rollbacks"],
                "keywords": ["ci/cd", "progressive delivery", "canary", "automation"],
                "timeframe": "2022-2024",
                "variants": {
                    "metric": "Reduced deploy time from 8 hours to 35 minutes via an automated canary pipeline with zero manual rollbacks over two quarters.",
                    "narrative": "Replaced a day-long manual deploy ritual with an automated canary pipeline engineers could trust to run unattended."
                }
            },
            {
                "role_id": "northstar-2019-2022",
                "index": 0,
                "title": "Senior Backend Engineer",
                "situation": "The checkout service could not handle Black Friday traffic without manual scaling intervention.",
                "task": "Make the checkout path scale automatically through peak traffic.",
                "actions": [
                    "Decomposed the monolithic checkout service into four independently scalable services",
                    "Introduced request-level load shedding ahead of the payment provider's rate limit"
                ],
                "result": "Handled a 6x Black Friday traffic spike with zero customer-facing downtime.",
                "metrics": ["6x", "zero downtime"],
                "keywords": ["microservices", "scalability", "load shedding", "payments"],
                "timeframe": "2019-2022",
                "variants": {
                    "metric": "Decomposed a monolithic checkout service into four scalable services, absorbing a 6x Black Friday traffic spike with zero downtime."
                }
            }
        ],
        "skill_taxonomy": [
            { "name": "Infrastructure", "skills": ["kubernetes", "sre", "ci/cd", "progressive delivery", "canary", "automation"] },
            { "name": "Reliability", "skills": ["incident response", "slo", "on-call", "scalability", "load shedding"] },
            { "name": "Backend", "skills": ["microservices", "payments"] }
        ]
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tailoring_core::store::init_database()?;

    let output_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| tailoring_core::store::get_app_data_dir().join("curriculum.sample.json"));

    let pretty = serde_json::to_string_pretty(&sample_curriculum())?;
    fs::write(&output_path, pretty)?;

    println!("Sample master curriculum written to {}", output_path.display());
    println!("Document store initialized at {}", tailoring_core::store::get_db_path().display());
    Ok(())
}
