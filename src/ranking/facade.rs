//! News query facade.
//!
//! Composes the ranked feed: candidate fetch, ticker filter, per-user
//! re-rank, MMR diversity, experiment tagging, truncation, and buffered
//! impressions. Every degradation downgrades to the rule-based rank and tags
//! the response instead of failing it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::config::RankingConfig;
use crate::error::RepositoryError;
use crate::experiments::{ExperimentAssignment, ExperimentService};
use crate::ml::{CircuitBreaker, CircuitState};
use crate::models::ScoreReason;
use crate::models::{news, news_score};
use crate::analytics::TelemetrySink;
use crate::ranking::personalize::UserSignals;
use crate::ranking::{Candidate, diversity, personalize, stem_tokens};
use crate::repositories::engagement::{ClickRecord, ImpressionRecord};
use crate::repositories::{
    AnonymousUserRepository, EmbeddingRepository, EngagementRepository, NewsRepository,
    ScoreRepository, TopicRepository, UserPreferenceRepository,
};

/// Click history window feeding personalization.
const CLICK_HISTORY_DAYS: i64 = 7;
const CLICK_HISTORY_LIMIT: u64 = 50;

/// Requested feed shape.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub n: usize,
    pub tickers: Vec<String>,
    pub lang: Option<String>,
    pub personalized: bool,
    pub user_id: Option<String>,
    pub diversity: bool,
    pub sort: FeedSort,
}

/// Feed ordering choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedSort {
    #[default]
    Rank,
    Latest,
}

impl FeedSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rank" => Some(FeedSort::Rank),
            "latest" => Some(FeedSort::Latest),
            _ => None,
        }
    }
}

/// One article in a served feed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedItem {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub importance: f64,
    pub rank_score: f64,
    pub importance_p: Option<f64>,
    pub tickers: Vec<String>,
    pub topic_id: Option<i64>,
    /// True when the rule scorer produced this ranking (no model output)
    pub ml_fallback: bool,
    pub position: usize,
}

/// A served feed with its experiment tag.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<ExperimentAssignment>,
    /// True when fallbacks served any part of this response
    pub degraded: bool,
}

/// Full detail for one article.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewsDetail {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    pub lang: String,
    pub published_at: DateTime<Utc>,
    pub body: String,
    pub summary: Option<String>,
    pub importance: f64,
    pub rank_score: f64,
    pub importance_p: Option<f64>,
    pub model_version: Option<String>,
    pub reason: Option<ScoreReason>,
}

/// Composes ranked feeds for the request handlers.
pub struct NewsQueryService {
    news: NewsRepository,
    scores: ScoreRepository,
    embeddings: EmbeddingRepository,
    topics: TopicRepository,
    preferences: UserPreferenceRepository,
    engagement: EngagementRepository,
    anonymous: AnonymousUserRepository,
    experiments: ExperimentService,
    sink: TelemetrySink,
    breaker: Arc<CircuitBreaker>,
    config: RankingConfig,
}

impl NewsQueryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        experiments: ExperimentService,
        sink: TelemetrySink,
        breaker: Arc<CircuitBreaker>,
        config: RankingConfig,
    ) -> Self {
        Self {
            news: NewsRepository::new(Arc::clone(&db)),
            scores: ScoreRepository::new(Arc::clone(&db)),
            embeddings: EmbeddingRepository::new(Arc::clone(&db)),
            topics: TopicRepository::new(Arc::clone(&db)),
            preferences: UserPreferenceRepository::new(Arc::clone(&db)),
            engagement: EngagementRepository::new(Arc::clone(&db)),
            anonymous: AnonymousUserRepository::new(db),
            experiments,
            sink,
            breaker,
            config,
        }
    }

    /// Serve the ranked feed.
    pub async fn top_news(
        &self,
        request: &FeedRequest,
        anon_id: &str,
        user_agent: Option<&str>,
    ) -> Result<FeedResponse, RepositoryError> {
        let now = Utc::now();

        if let Err(err) = self.anonymous.touch(anon_id, user_agent).await {
            warn!(error = %err, "anonymous user touch failed");
        }

        let pool_size = self
            .config
            .candidate_floor
            .max(self.config.candidate_multiplier * request.n as u64);
        let (mut candidates, rows) = self.load_candidates(pool_size, now).await?;

        if !request.tickers.is_empty() {
            candidates.retain(|candidate| {
                request
                    .tickers
                    .iter()
                    .any(|ticker| candidate.tickers.contains(ticker))
            });
        }

        if let Some(lang) = &request.lang {
            candidates.retain(|candidate| {
                rows.get(&candidate.news_id)
                    .map(|(item, _)| item.lang == *lang)
                    .unwrap_or(false)
            });
        }

        let mut personalized_applied = false;
        if request.personalized
            && let Some(user_id) = &request.user_id
        {
            match self.user_signals(user_id).await {
                Ok(Some(signals)) => {
                    candidates = personalize::rerank(candidates, &signals, now);
                    personalized_applied = true;
                }
                Ok(None) => {}
                Err(err) => {
                    // Personalization failures degrade to the baseline rank
                    warn!(user_id = %user_id, error = %err, "personalization degraded");
                }
            }
        }

        let selected = if request.diversity {
            diversity::select(
                candidates,
                request.n,
                self.config.mmr_lambda,
                self.config.topic_cap,
            )
        } else {
            candidates.truncate(request.n);
            candidates
        };

        let mut selected = selected;
        if request.sort == FeedSort::Latest {
            selected.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        }

        let assignment = match self.experiments.assign(anon_id, "ranking_personalization").await {
            Ok(assignment) => assignment,
            Err(err) => {
                warn!(error = %err, "experiment assignment degraded");
                None
            }
        };

        let degraded = self.breaker.state() != CircuitState::Closed;

        let items: Vec<FeedItem> = selected
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                rows.get(&candidate.news_id).map(|(item, score)| FeedItem {
                    id: item.id,
                    title: item.title.clone(),
                    url: item.url.clone(),
                    source: item.source.clone(),
                    published_at: item.published_at.with_timezone(&Utc),
                    summary: score.summary.clone(),
                    importance: score.importance,
                    rank_score: candidate.rank_score,
                    importance_p: score.importance_p,
                    tickers: candidate.tickers.clone(),
                    topic_id: candidate.topic_id,
                    ml_fallback: score.importance_p.is_none(),
                    position: index + 1,
                })
            })
            .collect();

        for item in &items {
            self.sink.record_impression(ImpressionRecord {
                anon_id: anon_id.to_string(),
                user_id: request.user_id.clone(),
                news_id: item.id,
                shown_at: now,
                position: item.position as i32,
                importance: item.importance,
                rank_score: item.rank_score,
                personalized: personalized_applied,
                diversity_applied: request.diversity,
                degraded,
                experiment_key: assignment.as_ref().map(|a| a.key.clone()),
                variant: assignment.as_ref().map(|a| a.variant.clone()),
            });
        }

        Ok(FeedResponse {
            items,
            experiment: assignment,
            degraded,
        })
    }

    /// Candidate pool for ranking: top-K scored articles inside the recency
    /// window, decorated with topics, embeddings, and ticker hits.
    pub async fn load_candidates(
        &self,
        k: u64,
        now: DateTime<Utc>,
    ) -> Result<
        (
            Vec<Candidate>,
            HashMap<i64, (news::Model, news_score::Model)>,
        ),
        RepositoryError,
    > {
        let since = now - Duration::hours(self.config.candidate_window_hours);
        let scored = self.news.candidates(k, since).await?;

        let ids: Vec<i64> = scored.iter().map(|(item, _)| item.id).collect();
        let topic_rows = self.topics.get_for_news_ids(&ids).await?;
        let embedding_rows = self.embeddings.get_many(&ids).await?;

        let topic_by_id: HashMap<i64, i64> = topic_rows
            .into_iter()
            .map(|row| (row.news_id, row.topic_id))
            .collect();
        let embedding_by_id: HashMap<i64, Vec<f32>> = embedding_rows
            .into_iter()
            .map(|row| (row.news_id, row.decode_vector()))
            .collect();

        let mut candidates = Vec::with_capacity(scored.len());
        let mut rows = HashMap::with_capacity(scored.len());

        for (item, score) in scored {
            let tickers = ScoreReason::from_json(&score.reason)
                .map(|reason| reason.tickers_found)
                .unwrap_or_default();

            candidates.push(Candidate {
                news_id: item.id,
                title: item.title.clone(),
                rank_score: score.rank_score,
                importance: score.importance,
                published_at: item.published_at.with_timezone(&Utc),
                topic_id: topic_by_id.get(&item.id).copied(),
                embedding: embedding_by_id.get(&item.id).cloned(),
                tokens: stem_tokens(&item.title),
                tickers,
            });
            rows.insert(item.id, (item, score));
        }

        Ok((candidates, rows))
    }

    /// Personalization inputs for one user, or `None` when the user opted
    /// out or has no preference row.
    pub async fn user_signals(&self, user_id: &str) -> Result<Option<UserSignals>, RepositoryError> {
        let Some(preferences) = self.preferences.get(user_id).await? else {
            return Ok(None);
        };
        if !preferences.is_active || !preferences.personalization_enabled {
            return Ok(None);
        }

        let since = Utc::now() - Duration::days(CLICK_HISTORY_DAYS);
        let clicks = self
            .engagement
            .user_clicks_since(user_id, since, CLICK_HISTORY_LIMIT)
            .await?;

        let clicked_ids: Vec<i64> = clicks.iter().map(|click| click.news_id).collect();
        let clicked_embeddings: Vec<Vec<f32>> = self
            .embeddings
            .get_many(&clicked_ids)
            .await?
            .into_iter()
            .map(|row| row.decode_vector())
            .collect();

        let mut clicked_tokens = Vec::new();
        let mut clicked_tickers = Vec::new();
        for id in &clicked_ids {
            if let Some(item) = self.news.find_by_id(*id).await? {
                clicked_tokens.push(stem_tokens(&item.title));
            }
            if let Some(score) = self.scores.get(*id).await?
                && let Some(reason) = ScoreReason::from_json(&score.reason)
            {
                clicked_tickers.extend(reason.tickers_found);
            }
        }

        Ok(Some(UserSignals {
            interest_tickers: preferences.tickers(),
            interest_keywords: preferences.keywords(),
            clicked_embeddings,
            clicked_tokens,
            clicked_tickers,
        }))
    }

    /// One article with its score detail, for `GET /news/{id}`.
    pub async fn news_detail(&self, id: i64) -> Result<Option<NewsDetail>, RepositoryError> {
        let Some((item, score)) = self.news.find_with_score(id).await? else {
            return Ok(None);
        };

        let detail = match score {
            Some(score) => NewsDetail {
                id: item.id,
                title: item.title,
                url: item.url,
                source: item.source,
                lang: item.lang,
                published_at: item.published_at.with_timezone(&Utc),
                body: item.body,
                summary: score.summary,
                importance: score.importance,
                rank_score: score.rank_score,
                importance_p: score.importance_p,
                model_version: score.model_version,
                reason: ScoreReason::from_json(&score.reason),
            },
            None => NewsDetail {
                id: item.id,
                title: item.title,
                url: item.url,
                source: item.source,
                lang: item.lang,
                published_at: item.published_at.with_timezone(&Utc),
                body: item.body,
                summary: None,
                importance: 0.0,
                rank_score: 0.0,
                importance_p: None,
                model_version: None,
                reason: None,
            },
        };

        Ok(Some(detail))
    }

    /// Record a click on an article. Unknown article ids surface as not
    /// found; the write itself is buffered.
    pub async fn record_click(
        &self,
        news_id: i64,
        anon_id: &str,
        user_id: Option<String>,
        dwell_time_ms: Option<i64>,
    ) -> Result<(), RepositoryError> {
        if self.news.find_by_id(news_id).await?.is_none() {
            return Err(RepositoryError::not_found("news", news_id));
        }

        if let Err(err) = self.anonymous.touch(anon_id, None).await {
            warn!(error = %err, "anonymous user touch failed");
        }

        let assignment = self
            .experiments
            .assign(anon_id, "ranking_personalization")
            .await
            .unwrap_or(None);

        self.sink.record_click(ClickRecord {
            anon_id: anon_id.to_string(),
            user_id,
            news_id,
            clicked_at: Utc::now(),
            dwell_time_ms,
            experiment_key: assignment.as_ref().map(|a| a.key.clone()),
            variant: assignment.as_ref().map(|a| a.variant.clone()),
        });

        Ok(())
    }

    pub fn ranking_config(&self) -> &RankingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::experiments::flags::FlagStore;
    use crate::ingest::rule_scorer::RuleScorer;
    use crate::ml::BreakerConfig;
    use crate::repositories::{ExperimentRepository, FeatureFlagRepository, NewNews};

    async fn service(db: Arc<DatabaseConnection>) -> (NewsQueryService, tokio::sync::mpsc::Receiver<crate::analytics::TelemetryEvent>) {
        let flags = FlagStore::new(FeatureFlagRepository::new(Arc::clone(&db)));
        let experiments = ExperimentService::new(ExperimentRepository::new(Arc::clone(&db)), flags);
        let (sink, rx) = TelemetrySink::channel(256);
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));

        (
            NewsQueryService::new(db, experiments, sink, breaker, RankingConfig::default()),
            rx,
        )
    }

    async fn save_scored(
        db: &Arc<DatabaseConnection>,
        title: &str,
        weight: f64,
        minutes_ago: i64,
    ) -> i64 {
        let news = NewsRepository::new(Arc::clone(db));
        let scores = ScoreRepository::new(Arc::clone(db));

        let published_at = Utc::now() - Duration::minutes(minutes_ago);
        let body = format!("{} {}", title, "상세한 기사 본문이 이어진다. ".repeat(10));
        let item = news
            .insert_if_new(NewNews {
                source: "yonhap".to_string(),
                url: "https://news.example/f".to_string(),
                published_at,
                title: title.to_string(),
                body: body.clone(),
                lang: "ko".to_string(),
                dedup_key: crate::ingest::normalizer::dedup_key(title, "yonhap", published_at),
            })
            .await
            .unwrap()
            .unwrap();

        let score = RuleScorer::new().score(title, &body, Some(weight), published_at, Utc::now());
        scores.upsert_rule(item.id, &score).await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn feed_orders_by_rank_score_and_caps_n() {
        let db = Arc::new(test_pool().await);
        save_scored(&db, "삼성전자 실적 발표", 1.0, 5).await;
        save_scored(&db, "시장 일반 소식", 0.4, 5).await;
        save_scored(&db, "카카오 배당 확대", 0.8, 5).await;

        let (service, _rx) = service(Arc::clone(&db)).await;
        let request = FeedRequest {
            n: 2,
            tickers: vec![],
            lang: None,
            personalized: false,
            user_id: None,
            diversity: false,
            sort: FeedSort::Rank,
        };

        let feed = service.top_news(&request, "anon-1", None).await.unwrap();
        assert_eq!(feed.items.len(), 2);
        assert!(feed.items[0].rank_score >= feed.items[1].rank_score);
        assert_eq!(feed.items[0].position, 1);
        assert!(feed.items.iter().all(|item| item.ml_fallback));
    }

    #[tokio::test]
    async fn ticker_filter_narrows_the_feed() {
        let db = Arc::new(test_pool().await);
        save_scored(&db, "삼성전자 실적 발표", 1.0, 5).await;
        save_scored(&db, "카카오 신사업 발표", 1.0, 5).await;

        let (service, _rx) = service(Arc::clone(&db)).await;
        let request = FeedRequest {
            n: 10,
            tickers: vec!["005930".to_string()],
            lang: None,
            personalized: false,
            user_id: None,
            diversity: false,
            sort: FeedSort::Rank,
        };

        let feed = service.top_news(&request, "anon-1", None).await.unwrap();
        assert_eq!(feed.items.len(), 1);
        assert!(feed.items[0].title.contains("삼성전자"));
    }

    #[tokio::test]
    async fn personalized_user_sees_their_ticker_first() {
        let db = Arc::new(test_pool().await);
        save_scored(&db, "카카오 실적 발표", 0.9, 5).await;
        save_scored(&db, "삼성전자 실적 발표", 0.9, 5).await;

        UserPreferenceRepository::new(Arc::clone(&db))
            .upsert("user-1", vec!["005930".to_string()], vec![], true, 0.3)
            .await
            .unwrap();

        let (service, _rx) = service(Arc::clone(&db)).await;
        let request = FeedRequest {
            n: 2,
            tickers: vec![],
            lang: None,
            personalized: true,
            user_id: Some("user-1".to_string()),
            diversity: false,
            sort: FeedSort::Rank,
        };

        let feed = service.top_news(&request, "anon-1", None).await.unwrap();
        assert!(feed.items[0].title.contains("삼성전자"));
    }

    #[tokio::test]
    async fn impressions_are_emitted_per_item() {
        let db = Arc::new(test_pool().await);
        save_scored(&db, "기사 하나", 0.8, 5).await;
        save_scored(&db, "기사 둘", 0.8, 6).await;

        let (service, mut rx) = service(Arc::clone(&db)).await;
        let request = FeedRequest {
            n: 2,
            tickers: vec![],
            lang: None,
            personalized: false,
            user_id: None,
            diversity: true,
            sort: FeedSort::Rank,
        };

        let feed = service.top_news(&request, "anon-1", None).await.unwrap();
        assert_eq!(feed.items.len(), 2);

        let mut impressions = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, crate::analytics::TelemetryEvent::Impression(_)) {
                impressions += 1;
            }
        }
        assert_eq!(impressions, 2);
    }

    #[tokio::test]
    async fn click_on_unknown_article_is_not_found() {
        let db = Arc::new(test_pool().await);
        let (service, _rx) = service(db).await;

        let err = service
            .record_click(404, "anon-1", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn detail_includes_structured_reason() {
        let db = Arc::new(test_pool().await);
        let id = save_scored(&db, "삼성전자 실적 발표", 1.0, 5).await;

        let (service, _rx) = service(db).await;
        let detail = service.news_detail(id).await.unwrap().unwrap();
        assert_eq!(detail.id, id);
        let reason = detail.reason.unwrap();
        assert!(reason.tickers_found.contains(&"005930".to_string()));
        assert!(service.news_detail(9999).await.unwrap().is_none());
    }
}
