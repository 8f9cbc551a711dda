//! The Grader and Improver: scores the assembled artifact on five
//! weighted dimensions and, if below threshold, runs a bounded,
//! monotonic improvement loop (spec §4.7).
//!
//! Every dimension score is deterministic and pattern-based — no LLM call
//! is required to grade — so `grade` alone is cheap to call repeatedly
//! inside the improvement loop; only `improve` spends gateway budget.

use std::collections::HashSet;

use crate::bullets::quality_gate::{phrase_grounding_score, verify_metrics};
use crate::config::Thresholds;
use crate::errors::TailoringError;
use crate::evidence::embeddings::keyword_overlap;
use crate::evidence::EvidenceLibrary;
use crate::gateway::types::CallBudget;
use crate::gateway::ModelGateway;
use crate::models::{
    ExtractedJd, GeneratedBullet, GradeDimension, GradeResult, ProfileOutput, SeniorityLevel, StitchedBody,
};

/// A bullet's metric density (§4.7's impact-clarity "target 2-4 each" for
/// ATS, "metric density per bullet" for impact) is considered ideal
/// between one and two numeric tokens; more reads as noisy, zero as flat.
const IDEAL_METRICS_PER_BULLET: (usize, usize) = (1, 2);

/// A small, deliberately non-exhaustive set of verbs the teacher's
/// `resume_generator` scoring treats as "strong" action openers; used for
/// both impact-clarity and executive-presence scoring.
const STRONG_ACTION_VERBS: &[&str] = &[
    "led", "drove", "architected", "spearheaded", "delivered", "scaled", "launched", "built", "owned",
    "directed", "transformed", "negotiated", "orchestrated", "pioneered", "established", "restructured",
];

/// Verbs read as senior/strategic framing rather than individual-contributor
/// task language; weighted into executive presence in proportion to the
/// posting's seniority level.
const STRATEGIC_VERBS: &[&str] = &[
    "architected", "spearheaded", "directed", "orchestrated", "established", "restructured", "negotiated",
    "transformed", "championed", "pioneered",
];

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 10.0)
}

/// ATS optimization (weight 0.20): keyword frequency near the 2-4
/// target, acronym-style must-have keywords surfaced in the profile, and
/// presence of the standard sections a parser expects.
fn score_ats_optimization(body: &StitchedBody, jd: &ExtractedJd, profile: &ProfileOutput) -> f64 {
    let all_text: String = body.all_bullets().map(|b| b.text.as_str()).collect::<Vec<_>>().join(" ").to_lowercase();

    let keyword_targets = if jd.must_have_keywords.is_empty() {
        10.0
    } else {
        let frequency_scores: Vec<f64> = jd
            .must_have_keywords
            .iter()
            .map(|k| {
                let count = all_text.matches(&k.to_lowercase()).count();
                match count {
                    0 => 0.0,
                    1 => 6.0,
                    2..=4 => 10.0,
                    _ => 7.0,
                }
            })
            .collect();
        frequency_scores.iter().sum::<f64>() / frequency_scores.len() as f64
    };

    let acronyms: Vec<&String> = jd
        .must_have_keywords
        .iter()
        .filter(|k| k.len() <= 5 && k.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()))
        .collect();
    let acronym_coverage = if acronyms.is_empty() {
        10.0
    } else {
        let covered = acronyms
            .iter()
            .filter(|a| {
                profile.core_competencies.iter().any(|c| c.eq_ignore_ascii_case(a))
                    || profile.skills_sections.iter().any(|s| s.skills.iter().any(|e| e.skill.eq_ignore_ascii_case(a)))
            })
            .count();
        (covered as f64 / acronyms.len() as f64) * 10.0
    };

    let standard_sections_present = [
        !profile.headline.trim().is_empty(),
        !profile.core_competencies.is_empty(),
        !profile.skills_sections.is_empty(),
        !body.roles.is_empty(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    let section_score = standard_sections_present as f64 / 4.0 * 10.0;

    clamp_score(keyword_targets * 0.5 + acronym_coverage * 0.2 + section_score * 0.3)
}

/// Impact & clarity (weight 0.25): metric density per bullet, action-verb
/// strength, and specificity (word count close to the 20-35 word target).
fn score_impact_clarity(body: &StitchedBody) -> f64 {
    let bullets: Vec<&GeneratedBullet> = body.all_bullets().collect();
    if bullets.is_empty() {
        return 0.0;
    }

    let metric_scores: Vec<f64> = bullets
        .iter()
        .map(|b| {
            let count = b.distinct_numeric_metric_count();
            if count >= IDEAL_METRICS_PER_BULLET.0 && count <= IDEAL_METRICS_PER_BULLET.1 {
                10.0
            } else if count == 0 {
                3.0
            } else {
                7.0
            }
        })
        .collect();
    let metric_density = metric_scores.iter().sum::<f64>() / metric_scores.len() as f64;

    let strong_verb_count = bullets
        .iter()
        .filter(|b| {
            let first_word = b.text.split_whitespace().next().unwrap_or("").to_lowercase();
            STRONG_ACTION_VERBS.iter().any(|v| first_word.starts_with(v))
        })
        .count();
    let verb_strength = (strong_verb_count as f64 / bullets.len() as f64) * 10.0;

    let specificity_scores: Vec<f64> = bullets
        .iter()
        .map(|b| {
            let words = b.word_count();
            if (20..=35).contains(&words) {
                10.0
            } else if words < 20 {
                (words as f64 / 20.0) * 10.0
            } else {
                (35.0 / words as f64) * 10.0
            }
        })
        .collect();
    let specificity = specificity_scores.iter().sum::<f64>() / specificity_scores.len() as f64;

    clamp_score(metric_density * 0.4 + verb_strength * 0.3 + specificity * 0.3)
}

/// JD alignment (weight 0.25): pain-point address ratio and must-have
/// keyword coverage across the stitched body.
fn score_jd_alignment(body: &StitchedBody, jd: &ExtractedJd) -> f64 {
    let bullets: Vec<&GeneratedBullet> = body.all_bullets().collect();
    if bullets.is_empty() {
        return 0.0;
    }

    let pain_point_ratio = if jd.implied_pain_points.is_empty() {
        10.0
    } else {
        let addressed: HashSet<&str> =
            bullets.iter().filter_map(|b| b.pain_point_addressed.as_deref()).collect();
        let covered = jd.implied_pain_points.iter().filter(|p| addressed.contains(p.as_str())).count();
        (covered as f64 / jd.implied_pain_points.len() as f64) * 10.0
    };

    let keyword_ratio = if jd.must_have_keywords.is_empty() {
        10.0
    } else {
        let used: HashSet<String> = bullets.iter().flat_map(|b| b.keyword_used.iter()).map(|k| k.to_lowercase()).collect();
        let covered = jd.must_have_keywords.iter().filter(|k| used.contains(&k.to_lowercase())).count();
        (covered as f64 / jd.must_have_keywords.len() as f64) * 10.0
    };

    clamp_score(pain_point_ratio * 0.5 + keyword_ratio * 0.5)
}

/// Executive presence (weight 0.15): strategic-verb framing, scaled by how
/// much the posting's seniority level expects it. A junior/mid posting is
/// graded leniently since task-language bullets are appropriate there.
fn score_executive_presence(body: &StitchedBody, jd: &ExtractedJd) -> f64 {
    let bullets: Vec<&GeneratedBullet> = body.all_bullets().collect();
    if bullets.is_empty() {
        return 0.0;
    }

    let strategic_count = bullets
        .iter()
        .filter(|b| {
            let lower = b.text.to_lowercase();
            STRATEGIC_VERBS.iter().any(|v| lower.contains(v))
        })
        .count();
    let strategic_ratio = strategic_count as f64 / bullets.len() as f64;

    let expected_ratio = match jd.seniority_level {
        SeniorityLevel::Junior | SeniorityLevel::Mid => 0.1,
        SeniorityLevel::Senior => 0.25,
        SeniorityLevel::Staff => 0.4,
        SeniorityLevel::Principal | SeniorityLevel::Executive => 0.55,
    };

    if strategic_ratio >= expected_ratio {
        10.0
    } else {
        clamp_score((strategic_ratio / expected_ratio) * 10.0)
    }
}

/// Anti-hallucination (weight 0.15): fraction of bullets passing both the
/// metric-verification and phrase-grounding checks the per-role gate
/// already runs, re-checked here against the stitched (post-dedup) body.
fn score_anti_hallucination(body: &StitchedBody, evidence: &EvidenceLibrary, thresholds: &Thresholds) -> f64 {
    let bullets: Vec<&GeneratedBullet> = body.all_bullets().collect();
    if bullets.is_empty() {
        return 0.0;
    }

    let passing = bullets
        .iter()
        .filter(|b| {
            let Some(record) = evidence.get_by_id(&b.achievement_id) else {
                return false;
            };
            verify_metrics(b, &record.metrics, thresholds.metric_numeric_tolerance)
                && phrase_grounding_score(&b.text, &record.labeled_source_text(), thresholds.phrase_grounding_similarity)
        })
        .count();

    clamp_score((passing as f64 / bullets.len() as f64) * 10.0)
}

/// Scores the complete artifact on all five dimensions (spec §4.7). Pure
/// and deterministic — callable as many times as the improvement loop
/// needs without touching the gateway or the document store.
pub fn grade(
    body: &StitchedBody,
    jd: &ExtractedJd,
    profile: &ProfileOutput,
    evidence: &EvidenceLibrary,
    thresholds: &Thresholds,
) -> GradeResult {
    let mut scores = std::collections::HashMap::new();
    scores.insert(GradeDimension::AtsOptimization, score_ats_optimization(body, jd, profile));
    scores.insert(GradeDimension::ImpactClarity, score_impact_clarity(body));
    scores.insert(GradeDimension::JdAlignment, score_jd_alignment(body, jd));
    scores.insert(GradeDimension::ExecutivePresence, score_executive_presence(body, jd));
    scores.insert(GradeDimension::AntiHallucination, score_anti_hallucination(body, evidence, thresholds));
    GradeResult::from_dimension_scores(scores)
}

const MAX_IMPROVEMENT_ITERATIONS: u32 = 3;

/// A single targeted improvement pass for the weakest dimension. Never
/// adds content without provenance: a rewrite either rephrases an
/// existing bullet's text (metrics/action/result fields untouched, so
/// the grounding invariants can't regress) or adjusts the header/tagline
/// through `composer`'s deterministic+LLM path.
async fn improve_once(
    gateway: &ModelGateway,
    evidence: &EvidenceLibrary,
    body: &StitchedBody,
    jd: &ExtractedJd,
    profile: &ProfileOutput,
    weakest: GradeDimension,
    budget: &CallBudget,
) -> Result<(StitchedBody, ProfileOutput), TailoringError> {
    match weakest {
        GradeDimension::ExecutivePresence | GradeDimension::ImpactClarity | GradeDimension::AtsOptimization => {
            let mut new_body = body.clone();
            for role in &mut new_body.roles {
                for bullet in &mut role.bullets {
                    if let Some(rewritten) = rewrite_bullet_for_dimension(gateway, evidence, bullet, jd, weakest, budget).await? {
                        *bullet = rewritten;
                    }
                }
            }
            Ok((new_body, profile.clone()))
        }
        GradeDimension::JdAlignment | GradeDimension::AntiHallucination => {
            // Re-deriving the header/skills sections from the same stitched
            // body re-scores against the posting without inventing new
            // claims; the body itself is left untouched since fabricating
            // keyword coverage or grounding would violate spec §1.
            let new_profile = crate::composer::compose(gateway, evidence, body, jd, budget).await.unwrap_or_else(|_| profile.clone());
            Ok((body.clone(), new_profile))
        }
    }
}

/// Rewrites one bullet's `text` under a tighter framing constraint,
/// keeping every other field (so provenance and grounding facts can't
/// drift); the rewrite is validated against the same metric-verbatim
/// guardrail the original generation path uses.
async fn rewrite_bullet_for_dimension(
    gateway: &ModelGateway,
    evidence: &EvidenceLibrary,
    bullet: &GeneratedBullet,
    jd: &ExtractedJd,
    dimension: GradeDimension,
    budget: &CallBudget,
) -> Result<Option<GeneratedBullet>, TailoringError> {
    let Some(record) = evidence.get_by_id(&bullet.achievement_id) else {
        return Ok(None);
    };

    let hint = match dimension {
        GradeDimension::ExecutivePresence => "Reframe with stronger strategic/leadership framing appropriate to a senior posting.",
        GradeDimension::ImpactClarity => "Lead with a strong action verb and keep the metric prominent; target 20-35 words.",
        GradeDimension::AtsOptimization => "Work in more of the posting's must-have keywords verbatim.",
        _ => "Improve clarity.",
    };

    let system_prompt = "You rewrite a single resume bullet's text field only. You must only use \
        metrics that appear verbatim in the provided achievement record, and keep the rewrite grounded \
        in its situation/task/actions/result. Respond with a JSON object: {\"text\": string}.";
    let user_prompt = format!(
        "{}\n\nAchievement record:\nsituation: {}\ntask: {}\nactions: {}\nresult: {}\nmetrics: {}\n\nCurrent bullet: {}\nMust-have keywords: {}",
        hint,
        record.situation,
        record.task,
        record.actions.join("; "),
        record.result,
        record.metrics.join("; "),
        bullet.text,
        jd.must_have_keywords.join(", "),
    );

    let record_for_validation = record.clone();
    let validate = move |value: &serde_json::Value| -> Result<(), String> {
        let text = value.get("text").and_then(serde_json::Value::as_str).ok_or("missing text")?;
        if text.trim().is_empty() {
            return Err("rewritten text must be non-empty".to_string());
        }
        if !record_for_validation.variant_metrics_subset(text) {
            return Err("rewrite introduces a metric absent from the source record".to_string());
        }
        Ok(())
    };

    let result = gateway.call_json("grader_bullet_rewrite", Some(system_prompt), &user_prompt, budget, &validate).await;
    match result {
        Ok((value, _usage)) => {
            let text = value.get("text").and_then(serde_json::Value::as_str).unwrap_or(&bullet.text).to_string();
            let mut rewritten = bullet.clone();
            rewritten.text = text;
            Ok(Some(rewritten))
        }
        // A failed rewrite (schema mismatch, provider unavailable, etc.) is not
        // fatal to the improvement loop: the bullet is simply left as-is.
        Err(_) => Ok(None),
    }
}

/// Bounded, monotonic improvement loop (spec §4.7/§9 Open Question (c)):
/// each iteration targets the current weakest dimension; if the resulting
/// composite is not strictly better, the prior `(body, profile, grade)`
/// is kept and the loop stops early.
pub async fn grade_and_improve(
    gateway: &ModelGateway,
    evidence: &EvidenceLibrary,
    mut body: StitchedBody,
    jd: &ExtractedJd,
    mut profile: ProfileOutput,
    thresholds: &Thresholds,
    budget: &CallBudget,
) -> (StitchedBody, ProfileOutput, GradeResult, u32) {
    let mut best_grade = grade(&body, jd, &profile, evidence, thresholds);
    let mut iterations = 0;

    while !best_grade.passed && iterations < MAX_IMPROVEMENT_ITERATIONS {
        let weakest = best_grade.weakest_dimensions[0];
        let Ok((candidate_body, candidate_profile)) =
            improve_once(gateway, evidence, &body, jd, &profile, weakest, budget).await
        else {
            break;
        };

        let candidate_grade = grade(&candidate_body, jd, &candidate_profile, evidence, thresholds);
        iterations += 1;

        if candidate_grade.composite > best_grade.composite {
            body = candidate_body;
            profile = candidate_profile;
            best_grade = candidate_grade;
        } else {
            // Monotonic: a worse (or equal) iteration is discarded, and the
            // loop stops rather than thrashing on the same dimension.
            break;
        }
    }

    (body, profile, best_grade, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetencyWeights, DeduplicationEntry, KeyAchievement, RoleCategory, RoleOutput, SkillsSection};
    use rusqlite::Connection;

    fn sample_jd() -> ExtractedJd {
        ExtractedJd {
            role_category: RoleCategory::EngineeringIc,
            seniority_level: SeniorityLevel::Senior,
            competency_weights: CompetencyWeights { delivery: 0.4, process: 0.2, architecture: 0.3, leadership: 0.1 },
            must_have_keywords: vec!["kubernetes".to_string(), "sre".to_string()],
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
            "records": [{
                "role_id": "acme", "index": 0, "title": "t",
                "situation": "Frequent outages", "task": "Improve reliability",
                "result": "Cut incidents 70%",
                "metrics": ["70%"], "keywords": ["kubernetes", "sre"], "timeframe": "2023"
            }]
        })
        .to_string();
        EvidenceLibrary::load(&source, &conn).unwrap()
    }

    fn sample_body() -> StitchedBody {
        let bullet = GeneratedBullet {
            text: "Led a kubernetes-based SRE reliability overhaul, cutting incident volume by 70% across the fleet"
                .to_string(),
            source_text: String::new(),
            source_metric: Some("70%".to_string()),
            situation: "Frequent outages".to_string(),
            action: "Redesigned on-call and SLOs".to_string(),
            result: "Cut incidents 70%".to_string(),
            achievement_id: "acme#0".to_string(),
            keyword_used: vec!["kubernetes".to_string(), "sre".to_string()],
            pain_point_addressed: Some("reliability at scale".to_string()),
        };
        let role = RoleOutput {
            role_id: "acme".to_string(),
            bullets: vec![bullet],
            passed: true,
            flagged_bullet_ids: vec![],
            issues: vec![],
            degraded: false,
        };
        StitchedBody { roles: vec![role], deduplication_log: Vec::<DeduplicationEntry>::new() }
    }

    fn sample_profile() -> ProfileOutput {
        ProfileOutput {
            headline: "Staff SRE".to_string(),
            tagline: "Reliability at scale".to_string(),
            key_achievements: vec![KeyAchievement {
                text: "Cut incidents 70%".to_string(),
                achievement_id: "acme#0".to_string(),
                source_bullet_index: 0,
                score: 5.0,
            }],
            core_competencies: vec!["kubernetes".to_string()],
            skills_sections: vec![SkillsSection {
                category: "Infrastructure".to_string(),
                skills: vec![crate::models::SkillEntry { skill: "kubernetes".to_string(), evidence_count: 1 }],
            }],
        }
    }

    #[test]
    fn composite_equals_weighted_sum_of_dimensions() {
        let body = sample_body();
        let jd = sample_jd();
        let profile = sample_profile();
        let evidence = sample_evidence();
        let thresholds = Thresholds::default();

        let result = grade(&body, &jd, &profile, &evidence, &thresholds);

        let expected: f64 = GradeDimension::all()
            .iter()
            .map(|d| result.dimension_scores.get(d).copied().unwrap_or(0.0) * d.weight())
            .sum();
        assert!((result.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn anti_hallucination_penalizes_fabricated_metrics() {
        let mut body = sample_body();
        body.roles[0].bullets[0].text = "Led a kubernetes reliability overhaul cutting incidents 95%".to_string();
        let jd = sample_jd();
        let evidence = sample_evidence();
        let thresholds = Thresholds::default();

        let result = grade(&body, &jd, &sample_profile(), &evidence, &thresholds);
        assert!(result.dimension_scores[&GradeDimension::AntiHallucination] < 5.0);
    }

    #[test]
    fn threshold_at_exactly_8_5_passes() {
        let mut scores = std::collections::HashMap::new();
        for d in GradeDimension::all() {
            scores.insert(d, 8.5);
        }
        let result = GradeResult::from_dimension_scores(scores);
        assert!(result.passed);
    }
}
