//! The data model shared by every layer of the pipeline.
//!
//! Every type here derives `Serialize`/`Deserialize` (teacher convention,
//! see `ai/types.rs`/`commands.rs`) since each one crosses the gateway
//! boundary as JSON, the document store boundary as a JSON blob, or both.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Emphasis label a curriculum variant is written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
    Delivery,
    Architecture,
    Leadership,
    Process,
}

/// An atomic, verifiable career fact in the master curriculum.
///
/// Invariant: every entry in `variants` carries only metrics present in
/// `metrics` — enforced by [`AchievementRecord::variant_metrics_subset`],
/// checked at load time in `evidence::load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementRecord {
    pub role_id: String,
    pub index: u32,
    pub title: String,

    pub situation: String,
    pub task: String,
    pub actions: Vec<String>,
    pub result: String,
    pub metrics: Vec<String>,
    pub keywords: Vec<String>,
    pub timeframe: String,

    pub variants: HashMap<Emphasis, String>,

    /// Dense vector from a labeled concatenation of the source fields.
    /// `None` until `evidence::load` computes or loads it from cache.
    pub embedding: Option<Vec<f32>>,
}

impl AchievementRecord {
    pub fn id(&self) -> String {
        format!("{}#{}", self.role_id, self.index)
    }

    /// Text used both to compute the embedding and as the lexical-overlap
    /// fallback: every source field, labeled, in a fixed order.
    pub fn labeled_source_text(&self) -> String {
        format!(
            "title: {}\nsituation: {}\ntask: {}\nactions: {}\nresult: {}\nmetrics: {}\nkeywords: {}\ntimeframe: {}",
            self.title,
            self.situation,
            self.task,
            self.actions.join("; "),
            self.result,
            self.metrics.join("; "),
            self.keywords.join(", "),
            self.timeframe,
        )
    }

    pub fn variant_metrics_subset(&self, variant_text: &str) -> bool {
        self.metrics.iter().all(|m| variant_text.contains(m.as_str())) || self.metrics.is_empty()
    }
}

/// Closed enumeration of role categories a posting can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleCategory {
    EngineeringIc,
    EngineeringManagement,
    ProductManagement,
    DataScience,
    Design,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeniorityLevel {
    Junior,
    Mid,
    Senior,
    Staff,
    Principal,
    Executive,
}

/// Four non-negative weights across `{delivery, process, architecture,
/// leadership}` summing to 1 (enforced by `normalize`, see invariant in
/// spec §3 / §8: "competency_weights always sum to 1 ± 1e-6").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompetencyWeights {
    pub delivery: f64,
    pub process: f64,
    pub architecture: f64,
    pub leadership: f64,
}

impl CompetencyWeights {
    pub fn sum(&self) -> f64 {
        self.delivery + self.process + self.architecture + self.leadership
    }

    /// Re-normalizes in place so the four weights sum to 1. A posting with
    /// all-zero weights is treated as uniform rather than divided by zero.
    pub fn normalize(&mut self) {
        let total = self.sum();
        if total <= f64::EPSILON {
            *self = CompetencyWeights { delivery: 0.25, process: 0.25, architecture: 0.25, leadership: 0.25 };
            return;
        }
        self.delivery /= total;
        self.process /= total;
        self.architecture /= total;
        self.leadership /= total;
    }

    pub fn weight_for(&self, emphasis: Emphasis) -> f64 {
        match emphasis {
            Emphasis::Delivery => self.delivery,
            Emphasis::Process => self.process,
            Emphasis::Architecture => self.architecture,
            Emphasis::Leadership => self.leadership,
        }
    }
}

/// The structured output of the JD Structurer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedJd {
    pub role_category: RoleCategory,
    pub seniority_level: SeniorityLevel,
    pub competency_weights: CompetencyWeights,
    pub must_have_keywords: Vec<String>,
    pub nice_to_have_keywords: Vec<String>,
    pub responsibilities: Vec<String>,
    pub qualifications: Vec<String>,
    pub technical_skills: Vec<String>,
    pub soft_skills: Vec<String>,
    pub implied_pain_points: Vec<String>,
    pub success_metrics: Vec<String>,
    pub fit_score: f64,
}

impl ExtractedJd {
    /// Case-insensitive de-duplication of the two keyword lists, preserving
    /// first-seen order (importance order, per spec §3).
    pub fn dedupe_keywords(&mut self) {
        self.must_have_keywords = dedupe_case_insensitive(&self.must_have_keywords);
        self.nice_to_have_keywords = dedupe_case_insensitive(&self.nice_to_have_keywords);
    }
}

pub fn dedupe_case_insensitive(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = item.to_lowercase();
        if seen.insert(key) {
            out.push(item.clone());
        }
    }
    out
}

/// One tailored line of the résumé body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedBullet {
    pub text: String,
    pub source_text: String,
    pub source_metric: Option<String>,

    pub situation: String,
    pub action: String,
    pub result: String,

    pub achievement_id: String,
    pub keyword_used: Vec<String>,
    pub pain_point_addressed: Option<String>,
}

impl GeneratedBullet {
    pub fn is_star_complete(&self) -> bool {
        !self.situation.trim().is_empty() && !self.action.trim().is_empty() && !self.result.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn distinct_numeric_metric_count(&self) -> usize {
        crate::bullets::quality_gate::extract_numeric_tokens(&self.text).len()
    }
}

/// Bullets for one career role, plus the per-role QA verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleOutput {
    pub role_id: String,
    pub bullets: Vec<GeneratedBullet>,
    pub passed: bool,
    pub flagged_bullet_ids: Vec<String>,
    pub issues: Vec<String>,
    pub degraded: bool,
}

/// One recorded cross-role deduplication decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicationEntry {
    pub removed_achievement_id: String,
    pub removed_role_id: String,
    pub kept_achievement_id: String,
    pub kept_role_id: String,
    pub similarity: f64,
    pub reason: String,
}

/// Ordered sequence of roles (most-recent first) with final bullets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StitchedBody {
    pub roles: Vec<RoleOutput>,
    pub deduplication_log: Vec<DeduplicationEntry>,
}

impl StitchedBody {
    pub fn all_bullets(&self) -> impl Iterator<Item = &GeneratedBullet> {
        self.roles.iter().flat_map(|r| r.bullets.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAchievement {
    pub text: String,
    pub achievement_id: String,
    pub source_bullet_index: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsSection {
    pub category: String,
    pub skills: Vec<SkillEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEntry {
    pub skill: String,
    pub evidence_count: usize,
}

/// Headline, tagline, key-achievement list, core-competency list and up to
/// four labeled skills sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOutput {
    pub headline: String,
    pub tagline: String,
    pub key_achievements: Vec<KeyAchievement>,
    pub core_competencies: Vec<String>,
    pub skills_sections: Vec<SkillsSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeDimension {
    AtsOptimization,
    ImpactClarity,
    JdAlignment,
    ExecutivePresence,
    AntiHallucination,
}

impl GradeDimension {
    pub fn weight(self) -> f64 {
        match self {
            GradeDimension::AtsOptimization => 0.20,
            GradeDimension::ImpactClarity => 0.25,
            GradeDimension::JdAlignment => 0.25,
            GradeDimension::ExecutivePresence => 0.15,
            GradeDimension::AntiHallucination => 0.15,
        }
    }

    pub fn all() -> [GradeDimension; 5] {
        [
            GradeDimension::AtsOptimization,
            GradeDimension::ImpactClarity,
            GradeDimension::JdAlignment,
            GradeDimension::ExecutivePresence,
            GradeDimension::AntiHallucination,
        ]
    }
}

pub const GRADE_PASS_THRESHOLD: f64 = 8.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub dimension_scores: HashMap<GradeDimension, f64>,
    pub composite: f64,
    pub passed: bool,
    pub weakest_dimensions: Vec<GradeDimension>,
}

impl GradeResult {
    pub fn from_dimension_scores(dimension_scores: HashMap<GradeDimension, f64>) -> Self {
        let composite: f64 = GradeDimension::all()
            .iter()
            .map(|d| dimension_scores.get(d).copied().unwrap_or(0.0) * d.weight())
            .sum();

        let mut ranked: Vec<GradeDimension> = GradeDimension::all().to_vec();
        ranked.sort_by(|a, b| {
            let sa = dimension_scores.get(a).copied().unwrap_or(0.0);
            let sb = dimension_scores.get(b).copied().unwrap_or(0.0);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        });

        Self {
            passed: composite >= GRADE_PASS_THRESHOLD,
            composite,
            weakest_dimensions: ranked,
            dimension_scores,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Gold,
    Silver,
    Bronze,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Complex,
    Analytical,
    Simple,
}

/// Per-layer latency/cost/retry/degradation record, one entry per layer
/// start/end, also emitted live on the event stream (`events::TraceEvent`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub layer: String,
    pub duration_ms: u64,
    pub tokens: u32,
    pub cost_usd_millis: u64,
    pub retries: u32,
    pub degradation_flags: Vec<String>,
}

/// The terminal aggregate persisted under the job identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailoringArtifact {
    pub job_id: String,
    pub tier: Tier,
    pub is_tailored: bool,
    pub extracted_jd: ExtractedJd,
    pub stitched_body: StitchedBody,
    pub profile: ProfileOutput,
    pub grade: GradeResult,
    pub trace: Vec<TraceRecord>,
    pub partial: bool,
}
