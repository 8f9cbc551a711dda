//! Per-run configuration.
//!
//! `RunConfig` is the caller-supplied half of spec §6's "per-run
//! configuration" input; `Thresholds` pulls every similarity threshold
//! named in the spec into one named, overridable place rather than
//! scattering literals through the quality-gate and stitcher code (Open
//! Question (a)).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Tier;

/// Named similarity/quality thresholds used across the pipeline. Defaults
/// are the exact values named in the spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// Composite duplicate-bullet similarity above which the Stitcher
    /// collapses a cross-role pair.
    pub duplicate_similarity: f64,
    /// Phrase-grounding similarity a sampled noun phrase must clear.
    pub phrase_grounding_similarity: f64,
    /// Numeric metric fuzzy-match tolerance (fractional, e.g. 0.15 = ±15%).
    pub metric_numeric_tolerance: f64,
    /// Fraction of a role's bullets that must be STAR-complete.
    pub star_completeness_ratio: f64,
    /// Fraction of a role-relevant must-have keyword set that must appear
    /// across that role's bullets.
    pub keyword_coverage_ratio: f64,
    /// Fraction of shared keywords above which two selected bullets are
    /// considered too similar to both keep (diversity constraint, §4.4).
    pub variant_diversity_keyword_overlap: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            duplicate_similarity: 0.75,
            phrase_grounding_similarity: 0.7,
            metric_numeric_tolerance: 0.15,
            star_completeness_ratio: 0.8,
            keyword_coverage_ratio: 0.8,
            variant_diversity_keyword_overlap: 0.6,
        }
    }
}

/// Per-provider request/token ceilings, threaded into the gateway's rate
/// limiter construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLimits {
    pub max_requests_per_window: u32,
    pub window_seconds: u64,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self { max_requests_per_window: 50, window_seconds: 60 }
    }
}

/// The per-run configuration named in spec §6: `{tier_override?,
/// budget_tokens, budget_seconds, provider_limits}`, plus the thresholds
/// and concurrency knobs this expansion adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub tier_override: Option<Tier>,
    pub budget_tokens: u32,
    pub budget_seconds: u64,
    pub provider_limits: HashMap<String, ProviderLimits>,
    pub thresholds: Thresholds,
    /// Role sub-tasks run with this much bounded parallelism; defaults
    /// from `num_cpus::get()`, mirroring how `llama_wrapper.rs` sizes its
    /// thread pool.
    pub max_concurrent_roles: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tier_override: None,
            budget_tokens: 60_000,
            budget_seconds: 300,
            provider_limits: HashMap::new(),
            thresholds: Thresholds::default(),
            max_concurrent_roles: num_cpus::get().max(1),
        }
    }
}

impl RunConfig {
    pub fn with_tier_override(mut self, tier: Tier) -> Self {
        self.tier_override = Some(tier);
        self
    }
}
