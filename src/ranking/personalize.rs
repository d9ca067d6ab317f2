//! Per-user feed re-ranking.
//!
//! Blends normalized importance, recency, user relevance, and novelty into a
//! replacement rank score. User relevance weighs ticker overlap, keyword
//! overlap, and affinity with the user's click history over the last week.

use chrono::{DateTime, Utc};

use crate::ranking::{Candidate, cosine_similarity, jaccard_similarity};

const IMPORTANCE_WEIGHT: f64 = 0.45;
const RECENCY_WEIGHT: f64 = 0.20;
const RELEVANCE_WEIGHT: f64 = 0.25;
const NOVELTY_WEIGHT: f64 = 0.10;

const TICKER_OVERLAP_WEIGHT: f64 = 0.5;
const KEYWORD_OVERLAP_WEIGHT: f64 = 0.3;
const CLICK_AFFINITY_WEIGHT: f64 = 0.2;

/// What the re-ranker knows about a user.
#[derive(Debug, Clone, Default)]
pub struct UserSignals {
    pub interest_tickers: Vec<String>,
    pub interest_keywords: Vec<String>,
    /// Embeddings of articles the user clicked in the last 7 days
    pub clicked_embeddings: Vec<Vec<f32>>,
    /// Stemmed title tokens of those clicked articles
    pub clicked_tokens: Vec<Vec<String>>,
    /// Issuer codes of those clicked articles
    pub clicked_tickers: Vec<String>,
}

impl UserSignals {
    /// True when there is nothing to personalize on; the re-ranker then
    /// falls back to importance order.
    pub fn is_empty(&self) -> bool {
        self.interest_tickers.is_empty()
            && self.interest_keywords.is_empty()
            && self.clicked_embeddings.is_empty()
            && self.clicked_tokens.is_empty()
    }
}

/// Re-rank candidates for one user, rewriting each candidate's rank score.
///
/// With empty signals this reduces to ordering by importance alone.
pub fn rerank(mut candidates: Vec<Candidate>, signals: &UserSignals, now: DateTime<Utc>) -> Vec<Candidate> {
    if signals.is_empty() {
        candidates.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        return candidates;
    }

    for candidate in &mut candidates {
        let importance_norm = (candidate.importance / 10.0).clamp(0.0, 1.0);
        let recency = recency_score(candidate.published_at, now);
        let relevance = user_relevance(candidate, signals);
        let novelty = 1.0 - max_similarity_to_clicked(candidate, signals);

        candidate.rank_score = (IMPORTANCE_WEIGHT * importance_norm
            + RECENCY_WEIGHT * recency
            + RELEVANCE_WEIGHT * relevance
            + NOVELTY_WEIGHT * novelty)
            .clamp(0.0, 1.0);
    }

    candidates.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Exponential decay with a 24 hour half-life constant.
fn recency_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = now
        .signed_duration_since(published_at)
        .num_minutes()
        .max(0) as f64
        / 60.0;
    (-age_hours / 24.0).exp()
}

fn user_relevance(candidate: &Candidate, signals: &UserSignals) -> f64 {
    let ticker_overlap = overlap_fraction(&candidate.tickers, &signals.interest_tickers);
    let keyword_overlap = keyword_fraction(candidate, &signals.interest_keywords);
    let click_affinity = max_similarity_to_clicked(candidate, signals);

    (TICKER_OVERLAP_WEIGHT * ticker_overlap
        + KEYWORD_OVERLAP_WEIGHT * keyword_overlap
        + CLICK_AFFINITY_WEIGHT * click_affinity)
        .clamp(0.0, 1.0)
}

/// Fraction of the user's interest set present on the item.
fn overlap_fraction(item_values: &[String], interests: &[String]) -> f64 {
    if interests.is_empty() {
        return 0.0;
    }
    let matched = interests.iter().filter(|v| item_values.contains(v)).count();
    (matched as f64 / interests.len() as f64).clamp(0.0, 1.0)
}

fn keyword_fraction(candidate: &Candidate, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let title_lower = candidate.title.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|kw| {
            let lowered = kw.to_lowercase();
            title_lower.contains(&lowered) || candidate.tokens.contains(&lowered)
        })
        .count();
    (matched as f64 / keywords.len() as f64).clamp(0.0, 1.0)
}

/// Highest similarity between the candidate and any recently clicked article.
fn max_similarity_to_clicked(candidate: &Candidate, signals: &UserSignals) -> f64 {
    let mut max_sim = 0.0f64;

    if let Some(vector) = &candidate.embedding {
        for clicked in &signals.clicked_embeddings {
            max_sim = max_sim.max(cosine_similarity(vector, clicked));
        }
    }

    for clicked in &signals.clicked_tokens {
        max_sim = max_sim.max(jaccard_similarity(&candidate.tokens, clicked));
    }

    max_sim.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::stem_tokens;
    use chrono::Duration;

    fn candidate(id: i64, importance: f64, title: &str, tickers: Vec<&str>) -> Candidate {
        Candidate {
            news_id: id,
            title: title.to_string(),
            rank_score: importance / 10.0,
            importance,
            published_at: Utc::now() - Duration::hours(1),
            topic_id: None,
            embedding: None,
            tokens: stem_tokens(title),
            tickers: tickers.into_iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn empty_signals_reduce_to_importance_order() {
        let candidates = vec![
            candidate(1, 4.0, "기사 하나", vec![]),
            candidate(2, 8.0, "기사 둘", vec![]),
            candidate(3, 6.0, "기사 셋", vec![]),
        ];

        let ranked = rerank(candidates, &UserSignals::default(), Utc::now());
        let ids: Vec<i64> = ranked.iter().map(|c| c.news_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn interest_ticker_outranks_equal_importance() {
        let signals = UserSignals {
            interest_tickers: vec!["005930".to_string()],
            ..Default::default()
        };

        let candidates = vec![
            candidate(1, 7.0, "카카오 소식", vec!["035720"]),
            candidate(2, 7.0, "삼성전자 소식", vec!["005930"]),
        ];

        let ranked = rerank(candidates, &signals, Utc::now());
        assert_eq!(ranked[0].news_id, 2);
    }

    #[test]
    fn keyword_interest_raises_rank() {
        let signals = UserSignals {
            interest_keywords: vec!["배당".to_string()],
            ..Default::default()
        };

        let candidates = vec![
            candidate(1, 7.0, "시장 동향", vec![]),
            candidate(2, 7.0, "배당 확대 발표", vec![]),
        ];

        let ranked = rerank(candidates, &signals, Utc::now());
        assert_eq!(ranked[0].news_id, 2);
    }

    #[test]
    fn recently_clicked_similar_article_loses_novelty() {
        let clicked_tokens = stem_tokens("삼성전자 실적 발표");
        let signals = UserSignals {
            interest_tickers: vec!["005930".to_string()],
            clicked_tokens: vec![clicked_tokens],
            ..Default::default()
        };

        // Same importance, same ticker; the near-duplicate of a clicked story
        // should rank below the fresh angle.
        let duplicate = candidate(1, 7.0, "삼성전자 실적 발표", vec!["005930"]);
        let fresh = candidate(2, 7.0, "삼성전자 신규 수주", vec!["005930"]);

        let ranked = rerank(vec![duplicate, fresh], &signals, Utc::now());
        assert_eq!(ranked[0].news_id, 2);
    }

    #[test]
    fn rank_scores_stay_in_unit_interval() {
        let signals = UserSignals {
            interest_tickers: vec!["005930".to_string()],
            interest_keywords: vec!["실적".to_string()],
            ..Default::default()
        };

        let candidates = vec![candidate(1, 10.0, "삼성전자 실적", vec!["005930"])];
        let ranked = rerank(candidates, &signals, Utc::now());
        assert!(ranked[0].rank_score <= 1.0);
        assert!(ranked[0].rank_score >= 0.0);
    }

    #[test]
    fn older_articles_decay() {
        let signals = UserSignals {
            interest_keywords: vec!["증시".to_string()],
            ..Default::default()
        };

        let mut old = candidate(1, 7.0, "증시 분석", vec![]);
        old.published_at = Utc::now() - Duration::hours(48);
        let new = candidate(2, 7.0, "증시 분석", vec![]);

        let ranked = rerank(vec![old, new], &signals, Utc::now());
        assert_eq!(ranked[0].news_id, 2);
    }
}
