//! The Tier Router: maps a posting's fit score to an effort tier and a
//! per-task-class model plan, consumed by every subsequent LLM-invoking
//! layer.

use serde::{Deserialize, Serialize};

use crate::models::{TaskClass, Tier};

/// Boundary rule: every named boundary picks the higher tier, per spec
/// §8 ("fit score exactly at 0.4, 0.6, 0.8 selects the higher tier at each
/// boundary"). `>= 0.8` is GOLD, `>= 0.6` is SILVER, `>= 0.4` is BRONZE,
/// anything lower is SKIP.
pub fn select_tier(fit_score: f64) -> Tier {
    if fit_score >= 0.8 {
        Tier::Gold
    } else if fit_score >= 0.6 {
        Tier::Silver
    } else if fit_score >= 0.4 {
        Tier::Bronze
    } else {
        Tier::Skip
    }
}

/// How many independent bullet-generation passes a role runs under a tier,
/// before the GOLD/SILVER synthesis step (spec §4.3/§4.4).
pub fn pass_count(tier: Tier) -> u32 {
    match tier {
        Tier::Gold => 3,
        Tier::Silver => 2,
        Tier::Bronze => 1,
        Tier::Skip => 0,
    }
}

pub fn runs_synthesis(tier: Tier) -> bool {
    matches!(tier, Tier::Gold | Tier::Silver)
}

/// Model identifier per tier and task class. Mirrors `ai/resolver.rs`'s
/// settings-driven default, but keyed by tier rather than a single global
/// setting, since a GOLD job and a BRONZE job in the same process use
/// different capability levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPlan {
    pub tier: Tier,
    pub complex_model: String,
    pub analytical_model: String,
    pub simple_model: String,
}

impl ModelPlan {
    pub fn model_for(&self, task_class: TaskClass) -> &str {
        match task_class {
            TaskClass::Complex => &self.complex_model,
            TaskClass::Analytical => &self.analytical_model,
            TaskClass::Simple => &self.simple_model,
        }
    }

    pub fn for_tier(tier: Tier) -> Self {
        let (complex, analytical, simple) = match tier {
            Tier::Gold => ("gpt-4o", "gpt-4o", "gpt-4o-mini"),
            Tier::Silver => ("gpt-4o", "gpt-4o-mini", "gpt-4o-mini"),
            Tier::Bronze => ("gpt-4o-mini", "gpt-4o-mini", "gpt-4o-mini"),
            Tier::Skip => ("gpt-4o-mini", "gpt-4o-mini", "gpt-4o-mini"),
        };
        Self {
            tier,
            complex_model: complex.to_string(),
            analytical_model: analytical.to_string(),
            simple_model: simple.to_string(),
        }
    }
}

/// The structured plan returned to the caller: tier plus model selection,
/// with the `tier_override` from `RunConfig` taking precedence over the
/// fit-score-derived tier.
pub fn route(fit_score: f64, tier_override: Option<Tier>) -> ModelPlan {
    let tier = tier_override.unwrap_or_else(|| select_tier(fit_score));
    ModelPlan::for_tier(tier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_at_exactly_0_8_is_gold() {
        assert_eq!(select_tier(0.8), Tier::Gold);
        assert_eq!(select_tier(0.7999), Tier::Silver);
    }

    #[test]
    fn boundary_at_exactly_0_6_is_silver() {
        assert_eq!(select_tier(0.6), Tier::Silver);
        assert_eq!(select_tier(0.5999), Tier::Bronze);
    }

    #[test]
    fn boundary_at_exactly_0_4_is_bronze() {
        assert_eq!(select_tier(0.4), Tier::Bronze);
        assert_eq!(select_tier(0.3999), Tier::Skip);
    }

    #[test]
    fn high_fit_engineering_leadership_posting_routes_gold() {
        assert_eq!(select_tier(0.84), Tier::Gold);
        assert_eq!(pass_count(Tier::Gold), 3);
        assert!(runs_synthesis(Tier::Gold));
    }

    #[test]
    fn mid_fit_posting_routes_silver_two_pass() {
        assert_eq!(select_tier(0.65), Tier::Silver);
        assert_eq!(pass_count(Tier::Silver), 2);
    }

    #[test]
    fn low_fit_posting_routes_skip_with_no_passes() {
        assert_eq!(select_tier(0.32), Tier::Skip);
        assert_eq!(pass_count(Tier::Skip), 0);
        assert!(!runs_synthesis(Tier::Skip));
    }

    #[test]
    fn tier_override_takes_precedence_over_fit_score() {
        let plan = route(0.1, Some(Tier::Gold));
        assert_eq!(plan.tier, Tier::Gold);
    }
}
