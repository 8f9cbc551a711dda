//! Command-line driver for the tailoring pipeline.
//!
//! Usage:
//!   cargo run --bin tailor -- <curriculum.json> <job_description.txt> [persona_summary]
//!
//! Reads the gateway mode/model from the `gateway_settings` table (seeded
//! via the app's settings UI or left at its `Mock` default), runs one job
//! through the pipeline, and prints the resulting artifact as JSON.

use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

use tailoring_core::config::RunConfig;
use tailoring_core::evidence::EvidenceLibrary;
use tailoring_core::gateway::build_gateway_from_settings;
use tailoring_core::pipeline::{self, JobRecord, PersonaInput};
use tailoring_core::store;

#[tokio::main]
async fn main() {
    tailoring_core::logging::init_logging();
    tailoring_core::logging::setup_panic_hook();
    tailoring_core::error_logging::init_error_metrics();

    if let Err(e) = run().await {
        eprintln!("tailor: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let curriculum_path = args.next().ok_or("usage: tailor <curriculum.json> <job_description.txt> [persona_summary]")?;
    let job_description_path = args.next().ok_or("usage: tailor <curriculum.json> <job_description.txt> [persona_summary]")?;
    let persona_summary = args.next().unwrap_or_else(|| "Experienced engineer with a track record of measurable impact.".to_string());

    store::init_database()?;
    let conn = store::get_connection()?;

    let curriculum_json = fs::read_to_string(&curriculum_path)?;
    let evidence = Arc::new(EvidenceLibrary::load(&curriculum_json, &conn)?);
    let raw_description = fs::read_to_string(&job_description_path)?;

    let gateway = Arc::new(build_gateway_from_settings()?);

    let job = JobRecord {
        job_id: format!("cli-{}", chrono::Utc::now().timestamp_millis()),
        title: String::new(),
        company: String::new(),
        raw_description,
        url: String::new(),
        ingested_at: chrono::Utc::now().to_rfc3339(),
    };
    let persona = PersonaInput { summary: persona_summary, embedding: None };

    let (handle, mut events) = pipeline::run_with_events(gateway, evidence, job, persona, RunConfig::default());

    while let Some(event) = events.recv().await {
        eprintln!(
            "[{:>18}] {:?} ({} ms){}",
            event.layer,
            event.status,
            event.duration_ms,
            if event.degradation_flags.is_empty() { String::new() } else { format!(" — {}", event.degradation_flags.join(", ")) }
        );
    }

    let artifact = handle.await??;
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}
