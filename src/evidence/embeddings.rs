//! Embedding production and comparison.
//!
//! A real embedding provider is just another Model Gateway call; when none
//! is configured, or it has failed persistently, a deterministic lexical
//! fallback keeps similarity search defined (spec §4.1's "degrade to
//! lexical keyword overlap", made concrete as a fixed-width hash-bucket
//! token-frequency vector rather than a real embedding).

const LEXICAL_DIMENSIONS: usize = 256;

/// Token-frequency vector over a fixed hash space. Same text always
/// produces the same vector (no RNG, no external call), so this also
/// backs the "embedding a record twice yields identical vectors" property.
pub fn lexical_fallback_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; LEXICAL_DIMENSIONS];
    for token in text.to_lowercase().split_whitespace() {
        let bucket = hash_token(token) % LEXICAL_DIMENSIONS;
        vector[bucket] += 1.0;
    }
    normalize(&mut vector);
    vector
}

fn hash_token(token: &str) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish() as usize
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

/// Lexical keyword-overlap fallback used when embeddings are unavailable
/// at all (even the hash-bucket vectors), matching
/// `resume_generator::calculate_keyword_overlap`'s Jaccard formulation.
pub fn keyword_overlap(text1: &str, text2: &str) -> f64 {
    let words1: std::collections::HashSet<String> =
        text1.to_lowercase().split_whitespace().map(String::from).collect();
    let words2: std::collections::HashSet<String> =
        text2.to_lowercase().split_whitespace().map(String::from).collect();

    let intersection = words1.intersection(&words2).count();
    let union = words1.union(&words2).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_produces_identical_vectors() {
        let a = lexical_fallback_embedding("kubernetes reliability team leadership");
        let b = lexical_fallback_embedding("kubernetes reliability team leadership");
        assert_eq!(a, b);
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = lexical_fallback_embedding("kubernetes SRE reliability");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_text_has_low_similarity() {
        let a = lexical_fallback_embedding("kubernetes reliability SRE infrastructure");
        let b = lexical_fallback_embedding("watercolor painting landscape brushes");
        assert!(cosine_similarity(&a, &b) < 0.3);
    }

    #[test]
    fn keyword_overlap_is_jaccard() {
        let overlap = keyword_overlap("led the team to deliver", "led the initiative to ship");
        assert!(overlap > 0.0 && overlap < 1.0);
    }
}
