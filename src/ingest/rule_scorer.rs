//! Rule-based importance scoring.
//!
//! The fallback scorer used at ingest time and whenever the remote model is
//! unavailable. Combines source weight, issuer mentions, impact keywords, and
//! freshness into an importance in [0, 10] with a structured reason.

use chrono::{DateTime, Utc};

use crate::ingest::ticker::TickerMatcher;
use crate::models::ScoreReason;

/// Source weight assumed when the feed configuration does not carry one.
pub const DEFAULT_SOURCE_WEIGHT: f64 = 0.5;

/// Keywords that almost always mark market-moving coverage.
const HIGH_IMPACT_KEYWORDS: &[&str] = &["실적", "배당", "IPO"];

/// Keywords that correlate with investor interest but less strongly.
const MEDIUM_IMPACT_KEYWORDS: &[&str] = &["투자", "수익"];

/// A computed rule score with its persisted breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleScore {
    /// Importance in [0, 10]
    pub importance: f64,
    /// importance / 10, the feed ordering key
    pub rank_score: f64,
    pub reason: ScoreReason,
}

/// Rule-based importance scorer.
pub struct RuleScorer {
    matcher: TickerMatcher,
}

impl Default for RuleScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleScorer {
    pub fn new() -> Self {
        Self {
            matcher: TickerMatcher::new(),
        }
    }

    /// Score an article against its source weight and age.
    ///
    /// The contributions multiply so that a half-weight source produces half
    /// the importance of a full-weight source for identical content, and
    /// stale articles decay regardless of how strong the content signal is.
    pub fn score(
        &self,
        title: &str,
        body: &str,
        source_weight: Option<f64>,
        published_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RuleScore {
        let source_weight = source_weight
            .unwrap_or(DEFAULT_SOURCE_WEIGHT)
            .clamp(0.0, 1.0);

        let full_text = format!("{} {}", title, body);
        let tickers_found = self.matcher.find_tickers(&full_text);
        let tickers_hit = self.matcher.match_strength(title, body).min(1.0);
        let keywords_hit = keyword_contribution(&full_text);
        let freshness = freshness_bucket(published_at, now);

        let content_signal = 0.4 + 0.3 * tickers_hit + 0.3 * keywords_hit;
        let combined = (source_weight * freshness * content_signal).clamp(0.0, 1.0);
        let mut importance = 10.0 * combined;

        let quality_penalty = quality_penalty(body);
        if let Some(penalty) = quality_penalty {
            importance = (importance - penalty).max(0.0);
        }

        let importance = importance.clamp(0.0, 10.0);

        RuleScore {
            importance,
            rank_score: importance / 10.0,
            reason: ScoreReason {
                source_weight,
                tickers_hit,
                keywords_hit,
                freshness,
                quality_penalty,
                tickers_found,
            },
        }
    }
}

/// Capped keyword contribution: 0.3 per high-impact keyword present, 0.2 per
/// medium-impact keyword, at most 1.0.
fn keyword_contribution(text: &str) -> f64 {
    let mut contribution: f64 = 0.0;

    for keyword in HIGH_IMPACT_KEYWORDS {
        if text.contains(keyword) {
            contribution += 0.3;
        }
    }
    for keyword in MEDIUM_IMPACT_KEYWORDS {
        if text.contains(keyword) {
            contribution += 0.2;
        }
    }

    contribution.min(1.0)
}

/// Step-wise freshness: full credit inside 3 hours, decaying to zero past
/// three days.
fn freshness_bucket(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(published_at);

    if age.num_hours() <= 3 {
        1.0
    } else if age.num_hours() <= 24 {
        0.5
    } else if age.num_hours() <= 72 {
        0.2
    } else {
        0.0
    }
}

/// Up to 1.0 importance points deducted for unreliable content.
fn quality_penalty(body: &str) -> Option<f64> {
    let mut penalty = 0.0;

    if super::normalizer::is_content_too_short(body) {
        penalty += 0.5;
    }
    if super::normalizer::is_content_suspicious(body) {
        penalty += 0.5;
    }

    if penalty > 0.0 { Some(penalty) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // Varied filler so the content quality heuristics stay quiet
    fn long_body(lead: &str) -> String {
        format!(
            "{} 국내 증시는 금리 인하 기대 속에 완만한 상승 흐름을 보였다. \
             반도체 업종이 강세를 이어갔고 외국인 순매수가 유입되며 지수를 끌어올렸다. \
             전문가들은 당분간 변동성이 커질 수 있다고 내다봤다.",
            lead
        )
    }

    #[test]
    fn source_weight_doubles_importance() {
        let scorer = RuleScorer::new();
        let now = Utc::now();
        let body = long_body("코스피 시장 동향 분석");

        let a = scorer.score("시장 동향", &body, Some(1.0), now, now);
        let b = scorer.score("시장 동향", &body, Some(0.5), now, now);

        assert!(a.importance > b.importance);
        let ratio = a.importance / b.importance;
        assert!((ratio - 2.0).abs() < 0.01, "ratio was {}", ratio);
    }

    #[test]
    fn missing_weight_defaults_to_half() {
        let scorer = RuleScorer::new();
        let now = Utc::now();
        let body = long_body("시장 분석");

        let defaulted = scorer.score("뉴스", &body, None, now, now);
        let explicit = scorer.score("뉴스", &body, Some(0.5), now, now);
        assert_eq!(defaulted.importance, explicit.importance);
    }

    #[test]
    fn freshness_buckets_decay() {
        let scorer = RuleScorer::new();
        let now = Utc::now();
        let body = long_body("시장 분석");

        let fresh = scorer.score("뉴스", &body, Some(1.0), now - Duration::hours(1), now);
        let day_old = scorer.score("뉴스", &body, Some(1.0), now - Duration::hours(12), now);
        let old = scorer.score("뉴스", &body, Some(1.0), now - Duration::hours(48), now);
        let stale = scorer.score("뉴스", &body, Some(1.0), now - Duration::hours(100), now);

        assert!(fresh.importance > day_old.importance);
        assert!(day_old.importance > old.importance);
        assert_eq!(stale.importance, 0.0);
        assert_eq!(stale.reason.freshness, 0.0);
    }

    #[test]
    fn keywords_raise_importance_and_cap() {
        let scorer = RuleScorer::new();
        let now = Utc::now();

        let plain = scorer.score("시장 뉴스", &long_body("코스피 동향"), Some(1.0), now, now);
        let keyworded = scorer.score(
            "실적 배당 IPO 투자 수익",
            &long_body("실적 배당 IPO 투자 수익 관련 기사"),
            Some(1.0),
            now,
            now,
        );

        assert!(keyworded.importance > plain.importance);
        assert_eq!(keyworded.reason.keywords_hit, 1.0);
    }

    #[test]
    fn ticker_mention_raises_importance() {
        let scorer = RuleScorer::new();
        let now = Utc::now();

        let without = scorer.score("시장 뉴스", &long_body("코스피 동향"), Some(1.0), now, now);
        let with = scorer.score(
            "삼성전자 발표",
            &long_body("삼성전자가 발표했다"),
            Some(1.0),
            now,
            now,
        );

        assert!(with.importance > without.importance);
        assert_eq!(with.reason.tickers_found, vec!["005930".to_string()]);
    }

    #[test]
    fn short_content_is_penalized() {
        let scorer = RuleScorer::new();
        let now = Utc::now();

        let scored = scorer.score("뉴스", "짧다", Some(1.0), now, now);
        assert_eq!(scored.reason.quality_penalty, Some(0.5));
    }

    #[test]
    fn importance_stays_in_range() {
        let scorer = RuleScorer::new();
        let now = Utc::now();
        let loaded = format!(
            "삼성전자 SK하이닉스 실적 배당 IPO 투자 수익 {}",
            "본문 ".repeat(100)
        );

        let scored = scorer.score(&loaded, &loaded, Some(1.0), now, now);
        assert!(scored.importance <= 10.0);
        assert!(scored.importance >= 0.0);
        assert!(scored.rank_score <= 1.0);
        assert!((scored.rank_score - scored.importance / 10.0).abs() < f64::EPSILON);
    }
}
