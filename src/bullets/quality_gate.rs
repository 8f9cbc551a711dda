//! Per-role quality gate: STAR completeness, metric verification, phrase
//! grounding, and keyword coverage (spec §4.4). Every check here is
//! deterministic and pattern-based — no LLM call — so it runs the same
//! way regardless of which generation path produced the bullet.

use std::collections::HashSet;

use crate::config::Thresholds;
use crate::models::GeneratedBullet;

/// Numeric tokens in `text`: integers/decimals optionally followed by `%`
/// or `x` (e.g. "70%", "3.5x", "99.95%").
pub fn extract_numeric_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let mut token: String = chars[start..i].iter().collect();
            if i < chars.len() && (chars[i] == '%' || chars[i] == 'x' || chars[i] == 'X') {
                token.push(chars[i]);
                i += 1;
            }
            tokens.push(token);
        } else {
            i += 1;
        }
    }
    tokens
}

fn numeric_value(token: &str) -> Option<f64> {
    token.trim_end_matches(['%', 'x', 'X']).parse::<f64>().ok()
}

/// A bullet's numeric token matches a source metric if it's within
/// `tolerance` fractional distance of a same-unit source metric, or if the
/// non-numeric parts are exactly equal after normalization.
fn metric_matches(bullet_token: &str, source_metrics: &[String], tolerance: f64) -> bool {
    let bullet_suffix = bullet_token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
    let Some(bullet_value) = numeric_value(bullet_token) else {
        return source_metrics.iter().any(|m| normalize(m) == normalize(bullet_token));
    };

    source_metrics.iter().any(|metric| {
        for source_token in extract_numeric_tokens(metric) {
            let source_suffix = source_token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
            if source_suffix != bullet_suffix {
                continue;
            }
            if let Some(source_value) = numeric_value(&source_token) {
                if source_value == 0.0 {
                    if bullet_value == 0.0 {
                        return true;
                    }
                    continue;
                }
                let relative_diff = ((bullet_value - source_value).abs()) / source_value.abs();
                if relative_diff <= tolerance {
                    return true;
                }
            }
        }
        false
    })
}

fn normalize(s: &str) -> String {
    s.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}

/// Every numeric metric in `bullet.text` must match a metric in
/// `source_metrics` (spec §4.4 / §8 universally quantified invariant).
pub fn verify_metrics(bullet: &GeneratedBullet, source_metrics: &[String], tolerance: f64) -> bool {
    extract_numeric_tokens(&bullet.text)
        .iter()
        .all(|token| metric_matches(token, source_metrics, tolerance))
}

/// Fraction of `bullets` exhibiting all three of situation/action/result.
pub fn star_completeness_ratio(bullets: &[GeneratedBullet]) -> f64 {
    if bullets.is_empty() {
        return 0.0;
    }
    let complete = bullets.iter().filter(|b| b.is_star_complete()).count();
    complete as f64 / bullets.len() as f64
}

/// Samples 2-3 word windows from the bullet text and checks each has
/// enough word-level containment in the source record's labeled text to
/// count as grounded. Stands in for a real semantic similarity check
/// (spec §4.4's "phrase grounding"), degrading gracefully without an
/// embedding provider the same way `evidence::k_nearest` does.
pub fn phrase_grounding_score(bullet_text: &str, source_text: &str, threshold: f64) -> bool {
    let source_words: HashSet<String> = source_text.to_lowercase().split_whitespace().map(String::from).collect();
    let bullet_words: Vec<String> = bullet_text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    if bullet_words.len() < 2 {
        return true;
    }

    let windows: Vec<&[String]> = bullet_words.windows(3).chain(bullet_words.windows(2)).collect();
    if windows.is_empty() {
        return true;
    }

    let grounded = windows
        .iter()
        .filter(|window| {
            let hits = window.iter().filter(|w| source_words.contains(*w)).count();
            hits as f64 / window.len() as f64 >= threshold
        })
        .count();

    grounded as f64 / windows.len() as f64 >= 0.5
}

/// Fraction of `must_have_keywords` appearing across `bullets`'
/// `keyword_used` lists.
pub fn keyword_coverage_ratio(bullets: &[GeneratedBullet], must_have_keywords: &[String]) -> f64 {
    if must_have_keywords.is_empty() {
        return 1.0;
    }
    let covered: HashSet<String> =
        bullets.iter().flat_map(|b| b.keyword_used.iter()).map(|k| k.to_lowercase()).collect();
    let hits = must_have_keywords.iter().filter(|k| covered.contains(&k.to_lowercase())).count();
    hits as f64 / must_have_keywords.len() as f64
}

#[derive(Debug, Clone)]
pub struct RoleGateVerdict {
    pub passed: bool,
    pub flagged_bullet_ids: Vec<String>,
    pub issues: Vec<String>,
}

/// Runs the full per-role gate (spec §4.4). A bullet is flagged if it
/// fails metric verification or phrase grounding; the role passes if at
/// least 80% of its bullets are STAR-complete and keyword coverage for
/// this role's relevant keywords clears the configured ratio.
pub fn run_role_gate(
    bullets: &[GeneratedBullet],
    source_metrics_by_achievement: &std::collections::HashMap<String, Vec<String>>,
    source_text_by_achievement: &std::collections::HashMap<String, String>,
    must_have_keywords: &[String],
    thresholds: &Thresholds,
) -> RoleGateVerdict {
    let mut flagged = Vec::new();
    let mut issues = Vec::new();

    for bullet in bullets {
        let empty_metrics = Vec::new();
        let source_metrics = source_metrics_by_achievement.get(&bullet.achievement_id).unwrap_or(&empty_metrics);
        if !verify_metrics(bullet, source_metrics, thresholds.metric_numeric_tolerance) {
            flagged.push(bullet.achievement_id.clone());
            issues.push(format!("bullet for {} has an unverified metric", bullet.achievement_id));
            continue;
        }

        if let Some(source_text) = source_text_by_achievement.get(&bullet.achievement_id) {
            if !phrase_grounding_score(&bullet.text, source_text, thresholds.phrase_grounding_similarity) {
                flagged.push(bullet.achievement_id.clone());
                issues.push(format!("bullet for {} failed phrase grounding", bullet.achievement_id));
            }
        }
    }

    let star_ratio = star_completeness_ratio(bullets);
    if star_ratio < thresholds.star_completeness_ratio {
        issues.push(format!(
            "STAR completeness ratio {:.2} below threshold {:.2}",
            star_ratio, thresholds.star_completeness_ratio
        ));
    }

    let keyword_ratio = keyword_coverage_ratio(bullets, must_have_keywords);
    if keyword_ratio < thresholds.keyword_coverage_ratio {
        issues.push(format!(
            "keyword coverage ratio {:.2} below threshold {:.2}",
            keyword_ratio, thresholds.keyword_coverage_ratio
        ));
    }

    let passed = flagged.is_empty() && star_ratio >= thresholds.star_completeness_ratio && keyword_ratio >= thresholds.keyword_coverage_ratio;

    RoleGateVerdict { passed, flagged_bullet_ids: flagged, issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratedBullet;

    fn bullet(text: &str, achievement_id: &str) -> GeneratedBullet {
        GeneratedBullet {
            text: text.to_string(),
            source_text: String::new(),
            source_metric: None,
            situation: "s".to_string(),
            action: "a".to_string(),
            result: "r".to_string(),
            achievement_id: achievement_id.to_string(),
            keyword_used: vec!["kubernetes".to_string()],
            pain_point_addressed: None,
        }
    }

    #[test]
    fn extracts_numeric_tokens_with_units() {
        let tokens = extract_numeric_tokens("Cut incidents by 70% and improved uptime to 99.95%");
        assert_eq!(tokens, vec!["70%".to_string(), "99.95%".to_string()]);
    }

    #[test]
    fn verify_metrics_accepts_within_tolerance() {
        let b = bullet("Reduced latency by 72%", "a1");
        assert!(verify_metrics(&b, &["70%".to_string()], 0.15));
    }

    #[test]
    fn verify_metrics_rejects_fabricated_metric() {
        let b = bullet("Reduced latency by 95%", "a1");
        assert!(!verify_metrics(&b, &["70%".to_string()], 0.15));
    }

    #[test]
    fn star_completeness_ratio_counts_complete_bullets() {
        let bullets = vec![bullet("a", "a1"), bullet("b", "a2")];
        assert_eq!(star_completeness_ratio(&bullets), 1.0);
    }

    #[test]
    fn keyword_coverage_ratio_matches_used_keywords() {
        let bullets = vec![bullet("a", "a1")];
        let ratio = keyword_coverage_ratio(&bullets, &["kubernetes".to_string(), "terraform".to_string()]);
        assert!((ratio - 0.5).abs() < 1e-9);
    }
}
