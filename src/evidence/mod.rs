//! The Evidence Library: load, index, and answer similarity queries over
//! the candidate's master curriculum.
//!
//! Loaded once per process lifetime (spec §4.1) and read-only after that —
//! no locking needed, matching the "shared resources" note in spec §5.

pub mod embeddings;

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::errors::{StorageError, TailoringError, ValidationError};
use crate::models::{AchievementRecord, Emphasis};
use crate::store;

/// On-disk shape of one curriculum record before validation. Every field
/// is optional here so a malformed record can be detected and skipped
/// rather than failing `serde_json::from_str` for the whole file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAchievementRecord {
    pub role_id: Option<String>,
    pub index: Option<u32>,
    pub title: Option<String>,
    pub situation: Option<String>,
    pub task: Option<String>,
    pub actions: Option<Vec<String>>,
    pub result: Option<String>,
    pub metrics: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub timeframe: Option<String>,
    #[serde(default)]
    pub variants: HashMap<Emphasis, String>,
}

/// The canonical curriculum source: records plus a companion skill
/// taxonomy document (spec §4.1/§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurriculumSource {
    pub records: Vec<RawAchievementRecord>,
    #[serde(default)]
    pub skill_taxonomy: Vec<SkillCategory>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkillCategory {
    pub name: String,
    pub skills: Vec<String>,
}

pub struct EvidenceLibrary {
    records: Vec<AchievementRecord>,
    skill_whitelist: HashSet<String>,
    skill_taxonomy: Vec<SkillCategory>,
}

const REQUIRED_FIELD_NAMES: &[&str] =
    &["role_id", "index", "title", "situation", "task", "result"];

impl EvidenceLibrary {
    /// Parses `source_json`, skipping (with a warning) any record missing a
    /// required field, then computes or loads each surviving record's
    /// embedding. A totally unreadable source is fatal, per spec §4.1.
    pub fn load(source_json: &str, conn: &Connection) -> Result<Self, TailoringError> {
        let source: CurriculumSource = serde_json::from_str(source_json)
            .map_err(|e| TailoringError::Validation(ValidationError::InvalidFormat(format!(
                "master curriculum source is unreadable: {}",
                e
            ))))?;

        let mut records = Vec::new();
        for raw in source.records {
            match validate_raw_record(&raw) {
                Ok(record) => records.push(record),
                Err(missing) => {
                    log::warn!(
                        "skipping malformed curriculum record (missing '{}'): role_id={:?} index={:?}",
                        missing,
                        raw.role_id,
                        raw.index
                    );
                }
            }
        }

        for record in &mut records {
            record.embedding = Some(Self::embedding_for(record, conn)?);
        }

        let skill_whitelist = records
            .iter()
            .flat_map(|r| r.keywords.iter())
            .map(|k| k.to_lowercase())
            .collect();

        Ok(Self { records, skill_whitelist, skill_taxonomy: source.skill_taxonomy })
    }

    /// Computes the embedding for `record`, reusing a cached vector keyed
    /// by a hash of the record's labeled source text when the text is
    /// unchanged (spec §4.1: "unchanged records reuse their cached
    /// embeddings").
    fn embedding_for(record: &AchievementRecord, conn: &Connection) -> Result<Vec<f32>, StorageError> {
        let source_text = record.labeled_source_text();
        let hash = store::compute_input_hash(&serde_json::json!({ "text": source_text }))?;

        if let Some(cached) = store::embedding_cache_get(conn, &hash)? {
            return Ok(cached);
        }

        let vector = embeddings::lexical_fallback_embedding(&source_text);
        store::embedding_cache_put(conn, &hash, &vector)?;
        Ok(vector)
    }

    pub fn get_by_id(&self, achievement_id: &str) -> Option<&AchievementRecord> {
        self.records.iter().find(|r| r.id() == achievement_id)
    }

    pub fn records_for_role(&self, role_id: &str) -> Vec<&AchievementRecord> {
        self.records.iter().filter(|r| r.role_id == role_id).collect()
    }

    /// Distinct role ids in the order they were first encountered in the
    /// source, which the Stitcher treats as most-recent-first (spec §4.5
    /// assumes a deterministic role ordering from the evidence library).
    pub fn role_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for record in &self.records {
            if seen.insert(record.role_id.clone()) {
                ids.push(record.role_id.clone());
            }
        }
        ids
    }

    /// k-nearest variants by cosine similarity to `query_embedding`. Falls
    /// back to lexical keyword overlap against `query_text` when every
    /// record's embedding is the zero vector (embedding provider down).
    pub fn k_nearest(&self, query_embedding: &[f32], query_text: &str, k: usize) -> Vec<(&AchievementRecord, f64)> {
        let mut scored: Vec<(&AchievementRecord, f64)> = self
            .records
            .iter()
            .map(|record| {
                let score = match &record.embedding {
                    Some(v) if v.iter().any(|x| *x != 0.0) => embeddings::cosine_similarity(v, query_embedding),
                    _ => embeddings::keyword_overlap(&record.labeled_source_text(), query_text),
                };
                (record, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub fn keyword_filtered(&self, keywords: &[String]) -> Vec<&AchievementRecord> {
        let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        self.records
            .iter()
            .filter(|r| r.keywords.iter().any(|k| lowered.contains(&k.to_lowercase())))
            .collect()
    }

    /// The union of all keywords across all loaded records, normalized to
    /// lowercase — the only admissible skill set for emission (spec §4.1).
    pub fn skill_whitelist(&self) -> &HashSet<String> {
        &self.skill_whitelist
    }

    pub fn is_skill_whitelisted(&self, skill: &str) -> bool {
        self.skill_whitelist.contains(&skill.to_lowercase())
    }

    pub fn skill_taxonomy(&self) -> &[SkillCategory] {
        &self.skill_taxonomy
    }

    pub fn all_records(&self) -> &[AchievementRecord] {
        &self.records
    }
}

fn validate_raw_record(raw: &RawAchievementRecord) -> Result<AchievementRecord, &'static str> {
    let role_id = raw.role_id.clone().ok_or(REQUIRED_FIELD_NAMES[0])?;
    let index = raw.index.ok_or(REQUIRED_FIELD_NAMES[1])?;
    let title = raw.title.clone().ok_or(REQUIRED_FIELD_NAMES[2])?;
    let situation = raw.situation.clone().ok_or(REQUIRED_FIELD_NAMES[3])?;
    let task = raw.task.clone().ok_or(REQUIRED_FIELD_NAMES[4])?;
    let result = raw.result.clone().ok_or(REQUIRED_FIELD_NAMES[5])?;

    Ok(AchievementRecord {
        role_id,
        index,
        title,
        situation,
        task,
        actions: raw.actions.clone().unwrap_or_default(),
        result,
        metrics: raw.metrics.clone().unwrap_or_default(),
        keywords: raw.keywords.clone().unwrap_or_default(),
        timeframe: raw.timeframe.clone().unwrap_or_default(),
        variants: raw.variants.clone(),
        embedding: None,
    })
}
