//! The Job-Description Structurer: turns a raw posting into an
//! `ExtractedJd`, then computes its fit score against the candidate.

use serde_json::Value;

use crate::errors::{TailoringError, ValidationError};
use crate::evidence::embeddings::{cosine_similarity, lexical_fallback_embedding};
use crate::evidence::EvidenceLibrary;
use crate::gateway::types::CallBudget;
use crate::gateway::ModelGateway;
use crate::models::ExtractedJd;

/// Weight split between embedding similarity and keyword coverage in the
/// fit score (spec §4.2: "weight split is fixed and documented").
const FIT_SCORE_EMBEDDING_WEIGHT: f64 = 0.6;
const FIT_SCORE_KEYWORD_WEIGHT: f64 = 0.4;

pub struct JdStructurerInput<'a> {
    pub raw_description: &'a str,
    pub company_research: Option<&'a str>,
    pub persona_summary: &'a str,
    pub persona_embedding: Option<&'a [f32]>,
}

pub async fn structure(
    gateway: &ModelGateway,
    evidence: &EvidenceLibrary,
    input: JdStructurerInput<'_>,
    budget: &CallBudget,
) -> Result<ExtractedJd, TailoringError> {
    let prompt = build_prompt(&input);
    let system_prompt = "You are a job-description structurer. Respond with a single JSON object \
        matching the ExtractedJd schema exactly: role_category, seniority_level, competency_weights \
        (delivery/process/architecture/leadership), must_have_keywords, nice_to_have_keywords, \
        responsibilities, qualifications, technical_skills, soft_skills, implied_pain_points, \
        success_metrics, fit_score. No prose outside the JSON object.";

    let validate = |value: &Value| -> Result<(), String> {
        serde_json::from_value::<ExtractedJd>(value.clone())
            .map(|_| ())
            .map_err(|e| format!("response does not match ExtractedJd schema: {}", e))
    };

    let (value, _usage) = gateway
        .call_json("jd_structurer", Some(system_prompt), &prompt, budget, &validate)
        .await?;

    let mut extracted: ExtractedJd = serde_json::from_value(value).map_err(|e| {
        TailoringError::Validation(ValidationError::InvalidFormat(format!(
            "failed to deserialize ExtractedJd after schema validation passed: {}",
            e
        )))
    })?;

    extracted.competency_weights.normalize();
    extracted.dedupe_keywords();
    extracted.fit_score = compute_fit_score(&extracted, &input, evidence);

    Ok(extracted)
}

fn build_prompt(input: &JdStructurerInput<'_>) -> String {
    let mut prompt = format!("Job posting:\n{}\n\nCandidate persona:\n{}", input.raw_description, input.persona_summary);
    if let Some(research) = input.company_research {
        prompt.push_str(&format!("\n\nCompany research:\n{}", research));
    }
    prompt
}

/// Combines embedding similarity against the persona with a keyword
/// coverage ratio against the candidate's skill whitelist, per spec §4.2.
/// The gateway-returned value for `fit_score` is overwritten here since it
/// must be reproducible given identical input and model tier (spec §8),
/// and an LLM's own self-assessment is neither.
fn compute_fit_score(extracted: &ExtractedJd, input: &JdStructurerInput<'_>, evidence: &EvidenceLibrary) -> f64 {
    let posting_text = format!(
        "{} {} {}",
        extracted.responsibilities.join(" "),
        extracted.qualifications.join(" "),
        extracted.must_have_keywords.join(" ")
    );
    let posting_embedding = lexical_fallback_embedding(&posting_text);
    let persona_embedding = input
        .persona_embedding
        .map(|v| v.to_vec())
        .unwrap_or_else(|| lexical_fallback_embedding(input.persona_summary));

    let embedding_similarity = cosine_similarity(&posting_embedding, &persona_embedding).clamp(0.0, 1.0);

    let whitelist = evidence.skill_whitelist();
    let keyword_coverage = if extracted.must_have_keywords.is_empty() {
        0.0
    } else {
        let matched = extracted
            .must_have_keywords
            .iter()
            .filter(|k| whitelist.contains(&k.to_lowercase()))
            .count();
        matched as f64 / extracted.must_have_keywords.len() as f64
    };

    (embedding_similarity * FIT_SCORE_EMBEDDING_WEIGHT + keyword_coverage * FIT_SCORE_KEYWORD_WEIGHT).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetencyWeights, RoleCategory, SeniorityLevel};
    use rusqlite::Connection;

    fn sample_evidence() -> EvidenceLibrary {
        let conn = Connection::open_in_memory().unwrap();
        crate::store::run_migrations_for_test(&conn).unwrap();
        let source = serde_json::json!({
            "records": [{
                "role_id": "r1", "index": 0, "title": "t",
                "situation": "s", "task": "t", "result": "r",
                "metrics": [], "keywords": ["kubernetes", "sre"], "timeframe": "2023"
            }]
        })
        .to_string();
        EvidenceLibrary::load(&source, &conn).unwrap()
    }

    #[test]
    fn fit_score_rewards_keyword_coverage() {
        let evidence = sample_evidence();
        let extracted = ExtractedJd {
            role_category: RoleCategory::EngineeringIc,
            seniority_level: SeniorityLevel::Senior,
            competency_weights: CompetencyWeights { delivery: 0.25, process: 0.25, architecture: 0.25, leadership: 0.25 },
            must_have_keywords: vec!["kubernetes".to_string(), "sre".to_string()],
            nice_to_have_keywords: vec![],
            responsibilities: vec![],
            qualifications: vec![],
            technical_skills: vec![],
            soft_skills: vec![],
            implied_pain_points: vec![],
            success_metrics: vec![],
            fit_score: 0.0,
        };
        let input = JdStructurerInput {
            raw_description: "",
            company_research: None,
            persona_summary: "kubernetes sre engineer",
            persona_embedding: None,
        };
        let score = compute_fit_score(&extracted, &input, &evidence);
        assert!(score > 0.0);
    }

    #[test]
    fn fit_score_is_clipped_to_unit_interval() {
        let evidence = sample_evidence();
        let extracted = ExtractedJd {
            role_category: RoleCategory::Other,
            seniority_level: SeniorityLevel::Mid,
            competency_weights: CompetencyWeights { delivery: 1.0, process: 0.0, architecture: 0.0, leadership: 0.0 },
            must_have_keywords: vec![],
            nice_to_have_keywords: vec![],
            responsibilities: vec![],
            qualifications: vec![],
            technical_skills: vec![],
            soft_skills: vec![],
            implied_pain_points: vec![],
            success_metrics: vec![],
            fit_score: 0.0,
        };
        let input = JdStructurerInput {
            raw_description: "",
            company_research: None,
            persona_summary: "",
            persona_embedding: None,
        };
        let score = compute_fit_score(&extracted, &input, &evidence);
        assert!((0.0..=1.0).contains(&score));
    }
}
