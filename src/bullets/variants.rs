//! Variant selection: the zero-hallucination generation path (spec §4.4.1).
//!
//! Scores each pre-written variant against the posting and selects the
//! top-k under a diversity constraint, before ever falling back to LLM
//! tailoring.

use crate::evidence::embeddings::keyword_overlap;
use crate::models::{AchievementRecord, CompetencyWeights, Emphasis, GeneratedBullet};

/// Scoring weights α/β/γ/δ from spec §4.4.1.
const KEYWORD_MATCH_WEIGHT: f64 = 0.4;
const PAIN_POINT_MATCH_WEIGHT: f64 = 0.3;
const EMPHASIS_ALIGNMENT_WEIGHT: f64 = 0.2;
const RECENCY_WEIGHT: f64 = 0.1;

pub struct VariantCandidate<'a> {
    pub achievement: &'a AchievementRecord,
    pub emphasis: Emphasis,
    pub text: String,
    pub score: f64,
}

/// `role_rank` is 0 for the candidate's current (most recent) role,
/// increasing with age; used for the recency boost.
pub fn score_variant(
    achievement: &AchievementRecord,
    emphasis: Emphasis,
    text: &str,
    must_have_keywords: &[String],
    implied_pain_points: &[String],
    competency_weights: &CompetencyWeights,
    role_rank: usize,
) -> f64 {
    let keyword_text = must_have_keywords.join(" ");
    let keyword_score = if must_have_keywords.is_empty() { 0.0 } else { keyword_overlap(text, &keyword_text) };

    let pain_point_text = implied_pain_points.join(" ");
    let pain_point_score = if implied_pain_points.is_empty() { 0.0 } else { keyword_overlap(text, &pain_point_text) };

    let emphasis_score = competency_weights.weight_for(emphasis);

    let recency_score = match role_rank {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    };

    keyword_score * KEYWORD_MATCH_WEIGHT
        + pain_point_score * PAIN_POINT_MATCH_WEIGHT
        + emphasis_score * EMPHASIS_ALIGNMENT_WEIGHT
        + recency_score * RECENCY_WEIGHT
}

/// A variant with zero metrics is admissible only if the posting's
/// delivery weight is below 0.25 (spec §8's boundary behavior) — a
/// delivery-heavy posting has no room for an unquantified achievement.
fn is_admissible(achievement: &AchievementRecord, competency_weights: &CompetencyWeights) -> bool {
    !achievement.metrics.is_empty() || competency_weights.delivery < 0.25
}

pub fn score_all_variants<'a>(
    records: &'a [&'a AchievementRecord],
    must_have_keywords: &[String],
    implied_pain_points: &[String],
    competency_weights: &CompetencyWeights,
    role_rank: usize,
) -> Vec<VariantCandidate<'a>> {
    let mut candidates = Vec::new();
    for achievement in records {
        if !is_admissible(achievement, competency_weights) {
            continue;
        }
        for (emphasis, text) in &achievement.variants {
            let score = score_variant(
                achievement,
                *emphasis,
                text,
                must_have_keywords,
                implied_pain_points,
                competency_weights,
                role_rank,
            );
            candidates.push(VariantCandidate { achievement, emphasis: *emphasis, text: text.clone(), score });
        }
    }
    candidates
}

/// Selects the top-k candidates by score, skipping any candidate that
/// shares more than `diversity_threshold` of its keywords with an
/// already-selected one (spec §4.4.1's diversity constraint).
pub fn select_top_k_diverse<'a>(
    mut candidates: Vec<VariantCandidate<'a>>,
    k: usize,
    diversity_threshold: f64,
) -> Vec<VariantCandidate<'a>> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<VariantCandidate<'a>> = Vec::new();
    for candidate in candidates {
        let too_similar = selected.iter().any(|s| {
            let overlap = keyword_overlap(&candidate.achievement.keywords.join(" "), &s.achievement.keywords.join(" "));
            overlap > diversity_threshold && candidate.achievement.id() != s.achievement.id()
        });
        if too_similar {
            continue;
        }
        selected.push(candidate);
        if selected.len() >= k {
            break;
        }
    }
    selected
}

pub fn variant_to_bullet(candidate: &VariantCandidate<'_>, pain_point_addressed: Option<String>, must_have_keywords: &[String]) -> GeneratedBullet {
    let achievement = candidate.achievement;
    let keyword_used: Vec<String> = achievement
        .keywords
        .iter()
        .filter(|k| must_have_keywords.iter().any(|m| m.eq_ignore_ascii_case(k)))
        .cloned()
        .collect();

    GeneratedBullet {
        text: candidate.text.clone(),
        source_text: achievement.labeled_source_text(),
        source_metric: achievement.metrics.first().cloned(),
        situation: achievement.situation.clone(),
        action: achievement.actions.join("; "),
        result: achievement.result.clone(),
        achievement_id: achievement.id(),
        keyword_used,
        pain_point_addressed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_record(role_id: &str, index: u32, keywords: &[&str]) -> AchievementRecord {
        sample_record_with_metrics(role_id, index, keywords, vec!["70%".to_string()])
    }

    fn sample_record_with_metrics(role_id: &str, index: u32, keywords: &[&str], metrics: Vec<String>) -> AchievementRecord {
        let mut variants = HashMap::new();
        variants.insert(Emphasis::Delivery, format!("Delivered {} improvements", keywords.join(" ")));
        AchievementRecord {
            role_id: role_id.to_string(),
            index,
            title: "t".to_string(),
            situation: "s".to_string(),
            task: "t".to_string(),
            actions: vec!["did things".to_string()],
            result: "r".to_string(),
            metrics,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            timeframe: "2023".to_string(),
            variants,
            embedding: None,
        }
    }

    #[test]
    fn scores_higher_for_matching_keywords() {
        let record = sample_record("r1", 0, &["kubernetes", "reliability"]);
        let score = score_variant(
            &record,
            Emphasis::Delivery,
            "Delivered kubernetes reliability improvements",
            &["kubernetes".to_string()],
            &[],
            &CompetencyWeights { delivery: 0.5, process: 0.2, architecture: 0.2, leadership: 0.1 },
            0,
        );
        assert!(score > 0.0);
    }

    #[test]
    fn diversity_constraint_skips_overlapping_candidates() {
        let r1 = sample_record("r1", 0, &["kubernetes", "sre", "reliability"]);
        let r2 = sample_record("r1", 1, &["kubernetes", "sre", "reliability"]);
        let candidates = vec![
            VariantCandidate { achievement: &r1, emphasis: Emphasis::Delivery, text: "a".to_string(), score: 1.0 },
            VariantCandidate { achievement: &r2, emphasis: Emphasis::Delivery, text: "b".to_string(), score: 0.9 },
        ];
        let selected = select_top_k_diverse(candidates, 2, 0.6);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn zero_metric_variant_is_inadmissible_when_delivery_weight_is_high() {
        let record = sample_record_with_metrics("r1", 0, &["kubernetes"], vec![]);
        let delivery_heavy = CompetencyWeights { delivery: 0.4, process: 0.2, architecture: 0.2, leadership: 0.2 };
        let candidates = score_all_variants(&[&record], &[], &[], &delivery_heavy, 0);
        assert!(candidates.is_empty());
    }

    #[test]
    fn zero_metric_variant_is_admissible_when_delivery_weight_is_low() {
        let record = sample_record_with_metrics("r1", 0, &["kubernetes"], vec![]);
        let low_delivery = CompetencyWeights { delivery: 0.1, process: 0.3, architecture: 0.3, leadership: 0.3 };
        let candidates = score_all_variants(&[&record], &[], &[], &low_delivery, 0);
        assert_eq!(candidates.len(), 1);
    }
}
