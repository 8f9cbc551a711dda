//! The Per-Role Bullet Generator: for each career role, select and tailor
//! achievement variants addressing the posting, then run the per-role
//! quality gate (spec §4.4 — "the hardest component").

pub mod ensemble;
pub mod quality_gate;
pub mod variants;

use std::collections::HashMap;

use serde_json::Value;

use crate::config::Thresholds;
use crate::errors::TailoringError;
use crate::evidence::EvidenceLibrary;
use crate::gateway::types::CallBudget;
use crate::gateway::ModelGateway;
use crate::models::{AchievementRecord, CompetencyWeights, ExtractedJd, GeneratedBullet, RoleOutput, Tier};

use ensemble::PassStyle;
use quality_gate::RoleGateVerdict;
use variants::{score_all_variants, select_top_k_diverse, variant_to_bullet};

const MIN_BULLETS_PER_ROLE: usize = 2;
const MAX_BULLETS_PER_ROLE: usize = 6;

/// Competency weights as seen by a single ensemble pass: each pass biases
/// toward its named emphasis rather than using the posting's weights
/// unmodified, which is what gives the three GOLD passes distinct angles
/// on the same evidence (spec §4.4's "three independent passes under
/// distinct emphases").
fn pass_weights(style: PassStyle, jd_weights: &CompetencyWeights) -> CompetencyWeights {
    match style {
        PassStyle::MetricEmphasis => CompetencyWeights { delivery: 0.55, process: 0.15, architecture: 0.2, leadership: 0.1 },
        PassStyle::NarrativeEmphasis => CompetencyWeights { delivery: 0.15, process: 0.15, architecture: 0.2, leadership: 0.5 },
        PassStyle::KeywordEmphasis => *jd_weights,
    }
}

fn select_variant_bullets(
    evidence: &EvidenceLibrary,
    role_id: &str,
    role_rank: usize,
    jd: &ExtractedJd,
    weights: &CompetencyWeights,
    thresholds: &Thresholds,
) -> Vec<GeneratedBullet> {
    let records = evidence.records_for_role(role_id);
    let candidates = score_all_variants(&records, &jd.must_have_keywords, &jd.implied_pain_points, weights, role_rank);
    let selected = select_top_k_diverse(candidates, MAX_BULLETS_PER_ROLE, thresholds.variant_diversity_keyword_overlap);

    selected
        .iter()
        .map(|candidate| {
            let pain_point = jd
                .implied_pain_points
                .iter()
                .find(|p| crate::evidence::embeddings::keyword_overlap(&candidate.text, p) > 0.0)
                .cloned();
            variant_to_bullet(candidate, pain_point, &jd.must_have_keywords)
        })
        .collect()
}

/// LLM tailoring path, used when the variant library doesn't yield enough
/// admissible bullets for a role (spec §4.4.2). The prompt carries the
/// guardrails verbatim: metrics must come from the record, actions must be
/// lexically supported, output is a JSON array of bullets.
async fn tailor_with_llm(
    gateway: &ModelGateway,
    records: &[&AchievementRecord],
    jd: &ExtractedJd,
    pass_hint: &str,
    budget: &CallBudget,
) -> Result<Vec<GeneratedBullet>, TailoringError> {
    let records_json = serde_json::to_string(
        &records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "achievement_id": r.id(),
                    "situation": r.situation,
                    "task": r.task,
                    "actions": r.actions,
                    "result": r.result,
                    "metrics": r.metrics,
                    "keywords": r.keywords,
                })
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or_default();

    let system_prompt = "You are a resume bullet writer. You must only use metrics that appear \
        verbatim in the provided achievement records, and every action verb must have lexical or \
        close-semantic support in the record's actions. Respond with a JSON array of objects with \
        fields: text, situation, action, result, achievement_id, keyword_used, pain_point_addressed.";

    let user_prompt = format!(
        "{}\n\nAchievement records:\n{}\n\nMust-have keywords: {}\nPain points: {}",
        pass_hint,
        records_json,
        jd.must_have_keywords.join(", "),
        jd.implied_pain_points.join(", ")
    );

    let record_ids: std::collections::HashSet<String> = records.iter().map(|r| r.id()).collect();
    let records_by_id: HashMap<String, &AchievementRecord> = records.iter().map(|r| (r.id(), *r)).collect();

    let validate = |value: &Value| -> Result<(), String> {
        let array = value.as_array().ok_or_else(|| "expected a JSON array of bullets".to_string())?;
        for item in array {
            let bullet: GeneratedBullet =
                serde_json::from_value(item.clone()).map_err(|e| format!("bullet does not match schema: {}", e))?;
            if !record_ids.contains(&bullet.achievement_id) {
                return Err(format!("bullet references unknown achievement_id {}", bullet.achievement_id));
            }
            if let Some(record) = records_by_id.get(&bullet.achievement_id) {
                if !record.variant_metrics_subset(&bullet.text) {
                    return Err(format!("bullet for {} introduces a metric absent from the source record", bullet.achievement_id));
                }
            }
        }
        Ok(())
    };

    let (value, _usage) =
        gateway.call_json("bullet_tailor", Some(system_prompt), &user_prompt, budget, &validate).await?;

    let bullets: Vec<GeneratedBullet> = serde_json::from_value(value).map_err(|e| {
        TailoringError::Validation(crate::errors::ValidationError::InvalidFormat(format!(
            "failed to deserialize tailored bullets: {}",
            e
        )))
    })?;

    Ok(bullets)
}

pub async fn generate_for_role(
    gateway: &ModelGateway,
    evidence: &EvidenceLibrary,
    role_id: &str,
    role_rank: usize,
    jd: &ExtractedJd,
    tier: Tier,
    thresholds: &Thresholds,
    budget: &CallBudget,
) -> Result<RoleOutput, TailoringError> {
    let records = evidence.records_for_role(role_id);

    let bullets = if matches!(tier, Tier::Gold) {
        let mut passes = Vec::new();
        for style in PassStyle::gold_passes() {
            let weights = pass_weights(style, &jd.competency_weights);
            let mut pass_bullets = select_variant_bullets(evidence, role_id, role_rank, jd, &weights, thresholds);
            if pass_bullets.len() < MIN_BULLETS_PER_ROLE {
                pass_bullets = tailor_with_llm(gateway, &records, jd, style.prompt_hint(), budget).await?;
            }
            passes.push(pass_bullets);
        }
        ensemble::synthesize(passes)
    } else if matches!(tier, Tier::Silver) {
        let mut passes = Vec::new();
        for style in PassStyle::silver_passes() {
            let weights = pass_weights(style, &jd.competency_weights);
            let mut pass_bullets = select_variant_bullets(evidence, role_id, role_rank, jd, &weights, thresholds);
            if pass_bullets.len() < MIN_BULLETS_PER_ROLE {
                pass_bullets = tailor_with_llm(gateway, &records, jd, style.prompt_hint(), budget).await?;
            }
            passes.push(pass_bullets);
        }
        ensemble::synthesize(passes)
    } else {
        let mut selected = select_variant_bullets(evidence, role_id, role_rank, jd, &jd.competency_weights, thresholds);
        if selected.len() < MIN_BULLETS_PER_ROLE && !matches!(tier, Tier::Skip) {
            selected = tailor_with_llm(gateway, &records, jd, "Single pass, balanced emphasis.", budget).await?;
        }
        selected
    };

    run_gate_with_one_regeneration(gateway, &records, role_id, jd, bullets, thresholds, budget).await
}

/// Runs the quality gate; on failure, regenerates the flagged bullets once
/// under tighter constraints (reusing the same records but appending the
/// gate's issues to the prompt), then drops any bullet still failing
/// rather than keeping it (spec §4.4: "persistent failures are dropped").
async fn run_gate_with_one_regeneration(
    gateway: &ModelGateway,
    records: &[&AchievementRecord],
    role_id: &str,
    jd: &ExtractedJd,
    mut bullets: Vec<GeneratedBullet>,
    thresholds: &Thresholds,
    budget: &CallBudget,
) -> Result<RoleOutput, TailoringError> {
    let metrics_by_id: HashMap<String, Vec<String>> = records.iter().map(|r| (r.id(), r.metrics.clone())).collect();
    let text_by_id: HashMap<String, String> = records.iter().map(|r| (r.id(), r.labeled_source_text())).collect();

    let mut verdict = quality_gate::run_role_gate(&bullets, &metrics_by_id, &text_by_id, &jd.must_have_keywords, thresholds);

    if !verdict.flagged_bullet_ids.is_empty() {
        let flagged_records: Vec<&AchievementRecord> =
            records.iter().filter(|r| verdict.flagged_bullet_ids.contains(&r.id())).copied().collect();

        if !flagged_records.is_empty() {
            let hint = format!(
                "Regenerate only these achievements under tighter constraints, addressing: {}",
                verdict.issues.join("; ")
            );
            match tailor_with_llm(gateway, &flagged_records, jd, &hint, budget).await {
                Ok(regenerated) => {
                    bullets.retain(|b| !verdict.flagged_bullet_ids.contains(&b.achievement_id));
                    bullets.extend(regenerated);
                }
                Err(_) => {
                    bullets.retain(|b| !verdict.flagged_bullet_ids.contains(&b.achievement_id));
                }
            }
            verdict = quality_gate::run_role_gate(&bullets, &metrics_by_id, &text_by_id, &jd.must_have_keywords, thresholds);
            bullets.retain(|b| !verdict.flagged_bullet_ids.contains(&b.achievement_id));
        }
    }

    let RoleGateVerdict { passed, flagged_bullet_ids, issues } = verdict;
    let degraded = bullets.len() < MIN_BULLETS_PER_ROLE;

    Ok(RoleOutput { role_id: role_id.to_string(), bullets, passed, flagged_bullet_ids, issues, degraded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock_provider::MockProvider;
    use crate::models::{RoleCategory, SeniorityLevel};
    use rusqlite::Connection;
    use std::sync::Arc;

    fn sample_jd() -> ExtractedJd {
        ExtractedJd {
            role_category: RoleCategory::EngineeringIc,
            seniority_level: SeniorityLevel::Senior,
            competency_weights: CompetencyWeights { delivery: 0.4, process: 0.2, architecture: 0.3, leadership: 0.1 },
            must_have_keywords: vec!["kubernetes".to_string()],
            nice_to_have_keywords: vec![],
            responsibilities: vec![],
            qualifications: vec![],
            technical_skills: vec![],
            soft_skills: vec![],
            implied_pain_points: vec!["reliability at scale".to_string()],
            success_metrics: vec![],
            fit_score: 0.84,
        }
    }

    fn sample_evidence() -> EvidenceLibrary {
        let conn = Connection::open_in_memory().unwrap();
        crate::store::run_migrations_for_test(&conn).unwrap();
        let source = serde_json::json!({
            "records": [
                {
                    "role_id": "acme", "index": 0, "title": "Staff Engineer",
                    "situation": "Frequent outages", "task": "Improve reliability",
                    "actions": ["Redesigned on-call", "Introduced SLOs"],
                    "result": "Cut incidents 70%", "metrics": ["70%"],
                    "keywords": ["kubernetes", "reliability"], "timeframe": "2022",
                    "variants": { "delivery": "Cut incidents 70% via an SLO-driven kubernetes reliability overhaul." }
                },
                {
                    "role_id": "acme", "index": 1, "title": "Staff Engineer",
                    "situation": "No on-call coverage", "task": "Build coverage",
                    "actions": ["Built rotation"],
                    "result": "100% paged coverage", "metrics": ["100%"],
                    "keywords": ["kubernetes", "on-call"], "timeframe": "2022",
                    "variants": { "leadership": "Built 100% paged on-call coverage for the kubernetes fleet." }
                }
            ]
        })
        .to_string();
        EvidenceLibrary::load(&source, &conn).unwrap()
    }

    #[tokio::test]
    async fn bronze_tier_uses_variant_selection_without_llm_calls() {
        let evidence = sample_evidence();
        let jd = sample_jd();
        let gateway = ModelGateway::new(Arc::new(MockProvider::new("[]")));
        let thresholds = Thresholds::default();
        let budget = CallBudget::default();

        let output = generate_for_role(&gateway, &evidence, "acme", 0, &jd, Tier::Bronze, &thresholds, &budget)
            .await
            .unwrap();

        assert!(!output.bullets.is_empty());
    }
}
