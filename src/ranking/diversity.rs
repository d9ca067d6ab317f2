//! Maximal Marginal Relevance selection.
//!
//! Greedy trade-off between rank score and redundancy: each step picks the
//! candidate maximizing λ·rank − (1−λ)·max-similarity-to-selected, with a
//! hard cap on how many articles a single topic may contribute.

use std::collections::HashMap;

use crate::ranking::{Candidate, candidate_similarity};

/// Default rank/novelty trade-off.
pub const DEFAULT_LAMBDA: f64 = 0.7;

/// Default maximum number of selected items per topic.
pub const DEFAULT_TOPIC_CAP: usize = 2;

/// Select up to `n` candidates by MMR.
///
/// Candidates are expected in rank order but the selection does not depend on
/// it. Ties on the MMR score break toward the more recently published item.
pub fn select(candidates: Vec<Candidate>, n: usize, lambda: f64, topic_cap: usize) -> Vec<Candidate> {
    let lambda = lambda.clamp(0.0, 1.0);
    let mut remaining = candidates;
    let mut selected: Vec<Candidate> = Vec::with_capacity(n.min(remaining.len()));
    let mut per_topic: HashMap<i64, usize> = HashMap::new();

    while selected.len() < n && !remaining.is_empty() {
        let mut best_index: Option<usize> = None;
        let mut best_score = f64::NEG_INFINITY;

        for (index, candidate) in remaining.iter().enumerate() {
            if let Some(topic_id) = candidate.topic_id
                && per_topic.get(&topic_id).copied().unwrap_or(0) >= topic_cap
            {
                continue;
            }

            let redundancy = selected
                .iter()
                .map(|chosen| candidate_similarity(candidate, chosen))
                .fold(0.0f64, f64::max);

            let score = lambda * candidate.rank_score - (1.0 - lambda) * redundancy;

            let wins = match best_index {
                None => true,
                Some(current) => {
                    score > best_score
                        || (score == best_score
                            && candidate.published_at > remaining[current].published_at)
                }
            };

            if wins {
                best_index = Some(index);
                best_score = score;
            }
        }

        let Some(index) = best_index else {
            // Every remaining candidate is topic-capped
            break;
        };

        let chosen = remaining.swap_remove(index);
        if let Some(topic_id) = chosen.topic_id {
            *per_topic.entry(topic_id).or_insert(0) += 1;
        }
        selected.push(chosen);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::stem_tokens;
    use chrono::{Duration, Utc};

    fn candidate(id: i64, rank: f64, topic: Option<i64>, title: &str) -> Candidate {
        Candidate {
            news_id: id,
            title: title.to_string(),
            rank_score: rank,
            importance: rank * 10.0,
            published_at: Utc::now() - Duration::minutes(id),
            topic_id: topic,
            embedding: None,
            tokens: stem_tokens(title),
            tickers: Vec::new(),
        }
    }

    fn with_embedding(mut c: Candidate, v: Vec<f32>) -> Candidate {
        c.embedding = Some(v);
        c
    }

    #[test]
    fn output_never_exceeds_n() {
        let candidates: Vec<Candidate> = (0..10)
            .map(|i| candidate(i, 1.0 - i as f64 / 10.0, None, "기사"))
            .collect();
        assert_eq!(select(candidates, 3, DEFAULT_LAMBDA, DEFAULT_TOPIC_CAP).len(), 3);
    }

    #[test]
    fn first_pick_is_highest_rank() {
        let candidates = vec![
            candidate(1, 0.4, None, "a"),
            candidate(2, 0.9, None, "b"),
            candidate(3, 0.6, None, "c"),
        ];
        let selected = select(candidates, 1, DEFAULT_LAMBDA, DEFAULT_TOPIC_CAP);
        assert_eq!(selected[0].news_id, 2);
    }

    #[test]
    fn similar_items_from_one_topic_are_spread_out() {
        // Two near-identical Samsung items plus one unrelated item; with n=2
        // MMR must pick the top Samsung item and the different-topic one.
        let samsung_vector = vec![1.0f32, 0.0, 0.0];
        let candidates = vec![
            with_embedding(
                candidate(1, 0.9, Some(10), "삼성전자 실적 발표"),
                samsung_vector.clone(),
            ),
            with_embedding(
                candidate(2, 0.85, Some(10), "삼성전자 급등"),
                vec![0.98f32, 0.05, 0.0],
            ),
            with_embedding(candidate(3, 0.5, Some(20), "카카오 신사업"), vec![0.0f32, 1.0, 0.0]),
        ];

        let selected = select(candidates, 2, 0.7, DEFAULT_TOPIC_CAP);
        let ids: Vec<i64> = selected.iter().map(|c| c.news_id).collect();
        assert_eq!(ids[0], 1);
        assert_eq!(ids[1], 3, "second pick must leave the Samsung topic");
    }

    #[test]
    fn topic_cap_limits_contributions() {
        let candidates: Vec<Candidate> = (0..6)
            .map(|i| candidate(i, 0.9 - i as f64 * 0.01, Some(1), "주제 기사"))
            .chain((6..8).map(|i| candidate(i, 0.1, Some(2), "다른 주제")))
            .collect();

        let selected = select(candidates, 5, DEFAULT_LAMBDA, 2);
        let topic_one = selected.iter().filter(|c| c.topic_id == Some(1)).count();
        assert!(topic_one <= 2, "topic 1 contributed {} items", topic_one);
    }

    #[test]
    fn lambda_one_reduces_to_rank_order() {
        let candidates = vec![
            candidate(1, 0.3, None, "a"),
            candidate(2, 0.9, None, "b"),
            candidate(3, 0.6, None, "c"),
        ];
        let selected = select(candidates, 3, 1.0, DEFAULT_TOPIC_CAP);
        let ids: Vec<i64> = selected.iter().map(|c| c.news_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
