//! GOLD-tier ensemble: three independent passes under distinct emphases,
//! then a synthesis pass that picks the best bullet per source achievement
//! (spec §4.4's "Ensemble under GOLD").

use std::collections::HashMap;

use crate::models::GeneratedBullet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStyle {
    MetricEmphasis,
    NarrativeEmphasis,
    KeywordEmphasis,
}

impl PassStyle {
    pub fn gold_passes() -> [PassStyle; 3] {
        [PassStyle::MetricEmphasis, PassStyle::NarrativeEmphasis, PassStyle::KeywordEmphasis]
    }

    pub fn silver_passes() -> [PassStyle; 2] {
        [PassStyle::MetricEmphasis, PassStyle::KeywordEmphasis]
    }

    /// Framing injected into the LLM-tailoring prompt for this pass.
    pub fn prompt_hint(self) -> &'static str {
        match self {
            PassStyle::MetricEmphasis => "Emphasize quantified results and metrics above all else.",
            PassStyle::NarrativeEmphasis => "Emphasize the situation and narrative arc of the achievement.",
            PassStyle::KeywordEmphasis => "Emphasize alignment with the posting's required keywords.",
        }
    }
}

fn synthesis_score(bullet: &GeneratedBullet) -> (usize, bool, usize) {
    (bullet.distinct_numeric_metric_count(), bullet.is_star_complete(), bullet.word_count())
}

/// Selects the highest-scoring bullet per source achievement across all
/// passes, never duplicating an achievement id, favoring metric richness
/// over narrative polish on a tie (spec §4.4).
pub fn synthesize(passes: Vec<Vec<GeneratedBullet>>) -> Vec<GeneratedBullet> {
    let mut best: HashMap<String, GeneratedBullet> = HashMap::new();

    for pass in passes {
        for bullet in pass {
            let key = bullet.achievement_id.clone();
            match best.get(&key) {
                Some(existing) if synthesis_score(existing) >= synthesis_score(&bullet) => {}
                _ => {
                    best.insert(key, bullet);
                }
            }
        }
    }

    let mut result: Vec<GeneratedBullet> = best.into_values().collect();
    result.sort_by(|a, b| a.achievement_id.cmp(&b.achievement_id));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullet(id: &str, text: &str) -> GeneratedBullet {
        GeneratedBullet {
            text: text.to_string(),
            source_text: String::new(),
            source_metric: None,
            situation: "s".to_string(),
            action: "a".to_string(),
            result: "r".to_string(),
            achievement_id: id.to_string(),
            keyword_used: vec![],
            pain_point_addressed: None,
        }
    }

    #[test]
    fn synthesis_prefers_metric_richness_on_tie() {
        let pass1 = vec![bullet("a1", "Did work with no numbers at all here")];
        let pass2 = vec![bullet("a1", "Cut costs by 30% and grew revenue 20%")];
        let merged = synthesize(vec![pass1, pass2]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].text.contains('%'));
    }

    #[test]
    fn synthesis_never_duplicates_an_achievement() {
        let pass1 = vec![bullet("a1", "x"), bullet("a2", "y")];
        let pass2 = vec![bullet("a1", "z")];
        let merged = synthesize(vec![pass1, pass2]);
        let ids: std::collections::HashSet<_> = merged.iter().map(|b| b.achievement_id.clone()).collect();
        assert_eq!(ids.len(), 2);
    }
}
