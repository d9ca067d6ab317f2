//! Feed ranking.
//!
//! Shared candidate representation plus the MMR diversity filter, the
//! per-user re-ranker, and the query facade that composes them.

pub mod diversity;
pub mod facade;
pub mod personalize;

use chrono::{DateTime, Utc};

/// One article flowing through the ranking pipeline.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub news_id: i64,
    pub title: String,
    /// Current ordering key in [0, 1]; the personalizer rewrites this
    pub rank_score: f64,
    pub importance: f64,
    pub published_at: DateTime<Utc>,
    pub topic_id: Option<i64>,
    pub embedding: Option<Vec<f32>>,
    /// Stemmed title tokens, the similarity fallback when embeddings are absent
    pub tokens: Vec<String>,
    pub tickers: Vec<String>,
}

/// Cosine similarity of two vectors; zero for mismatched or empty input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x * y) as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (x * x) as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (x * x) as f64).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Trailing single-character particles stripped during stemming.
const TRAILING_PARTICLES: &[char] = &['이', '가', '은', '는', '을', '를', '의', '에', '로'];

/// Lowercased, particle-stripped tokens of a text.
pub fn stem_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|token| {
            let chars: Vec<char> = token.chars().collect();
            if chars.len() >= 3
                && let Some(last) = chars.last()
                && TRAILING_PARTICLES.contains(last)
            {
                chars[..chars.len() - 1].iter().collect()
            } else {
                token.to_string()
            }
        })
        .collect()
}

/// Jaccard overlap of two token sets.
pub fn jaccard_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: std::collections::HashSet<&String> = a.iter().collect();
    let set_b: std::collections::HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    intersection as f64 / union as f64
}

/// Pairwise similarity between two candidates: embedding cosine when both
/// sides have vectors, token Jaccard otherwise.
pub fn candidate_similarity(a: &Candidate, b: &Candidate) -> f64 {
    match (&a.embedding, &b.embedding) {
        (Some(va), Some(vb)) if !va.is_empty() && !vb.is_empty() => cosine_similarity(va, vb),
        _ => jaccard_similarity(&a.tokens, &b.tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5f32, 0.3, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn stemming_strips_trailing_particles() {
        let tokens = stem_tokens("삼성전자가 실적을 발표");
        assert!(tokens.contains(&"삼성전자".to_string()));
        assert!(tokens.contains(&"실적".to_string()));
        assert!(tokens.contains(&"발표".to_string()));
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = stem_tokens("삼성전자 실적");
        let b = stem_tokens("카카오 주가");
        assert_eq!(jaccard_similarity(&a, &b), 0.0);
    }

    #[test]
    fn jaccard_of_overlapping_titles_is_positive() {
        let a = stem_tokens("삼성전자 실적 발표");
        let b = stem_tokens("삼성전자 급등");
        assert!(jaccard_similarity(&a, &b) > 0.0);
    }
}
