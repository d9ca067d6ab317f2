//! Ranking arms.
//!
//! Each arm is one feed strategy the bandit chooses among. All four return
//! ordered article ids and tolerate missing enrichment (an article without
//! an embedding simply ranks on what is known).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;

use crate::error::RepositoryError;
use crate::models::bandit_arm::ArmKind;
use crate::ranking::facade::NewsQueryService;
use crate::ranking::{diversity, personalize};
use crate::repositories::{EngagementRepository, NewsRepository};

/// What an arm knows about the request it ranks for.
#[derive(Debug, Clone)]
pub struct ArmContext {
    pub user_id: Option<String>,
    pub limit: usize,
    pub now: DateTime<Utc>,
}

/// One ranking strategy.
#[async_trait]
pub trait RankingArm: Send + Sync {
    fn kind(&self) -> ArmKind;

    /// Ordered article ids for this context.
    async fn rank(&self, context: &ArmContext) -> Result<Vec<i64>, RepositoryError>;
}

/// Newest articles first.
pub struct RecentArm {
    news: NewsRepository,
}

#[async_trait]
impl RankingArm for RecentArm {
    fn kind(&self) -> ArmKind {
        ArmKind::Recent
    }

    async fn rank(&self, context: &ArmContext) -> Result<Vec<i64>, RepositoryError> {
        Ok(self
            .news
            .recent(context.limit as u64)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect())
    }
}

/// Most-clicked articles over the last three days, padded with fresh ones.
pub struct PopularArm {
    engagement: EngagementRepository,
    news: NewsRepository,
}

#[async_trait]
impl RankingArm for PopularArm {
    fn kind(&self) -> ArmKind {
        ArmKind::Popular
    }

    async fn rank(&self, context: &ArmContext) -> Result<Vec<i64>, RepositoryError> {
        let since = context.now - Duration::hours(72);
        let mut ids: Vec<i64> = self
            .engagement
            .popular_news_ids(since, context.limit as u64)
            .await?
            .into_iter()
            .map(|(news_id, _)| news_id)
            .collect();

        if ids.len() < context.limit {
            for item in self.news.recent(context.limit as u64).await? {
                if !ids.contains(&item.id) {
                    ids.push(item.id);
                }
                if ids.len() >= context.limit {
                    break;
                }
            }
        }

        ids.truncate(context.limit);
        Ok(ids)
    }
}

/// MMR over the candidate pool.
pub struct DiverseArm {
    facade: Arc<NewsQueryService>,
}

#[async_trait]
impl RankingArm for DiverseArm {
    fn kind(&self) -> ArmKind {
        ArmKind::Diverse
    }

    async fn rank(&self, context: &ArmContext) -> Result<Vec<i64>, RepositoryError> {
        let config = self.facade.ranking_config();
        let pool = config
            .candidate_floor
            .max(config.candidate_multiplier * context.limit as u64);
        let (candidates, _) = self.facade.load_candidates(pool, context.now).await?;

        Ok(diversity::select(
            candidates,
            context.limit,
            config.mmr_lambda,
            config.topic_cap,
        )
        .into_iter()
        .map(|candidate| candidate.news_id)
        .collect())
    }
}

/// Per-user re-rank; anonymous contexts fall back to rank order.
pub struct PersonalizedArm {
    facade: Arc<NewsQueryService>,
}

#[async_trait]
impl RankingArm for PersonalizedArm {
    fn kind(&self) -> ArmKind {
        ArmKind::Personalized
    }

    async fn rank(&self, context: &ArmContext) -> Result<Vec<i64>, RepositoryError> {
        let config = self.facade.ranking_config();
        let pool = config
            .candidate_floor
            .max(config.candidate_multiplier * context.limit as u64);
        let (mut candidates, _) = self.facade.load_candidates(pool, context.now).await?;

        if let Some(user_id) = &context.user_id
            && let Some(signals) = self.facade.user_signals(user_id).await?
        {
            candidates = personalize::rerank(candidates, &signals, context.now);
        }

        candidates.truncate(context.limit);
        Ok(candidates.into_iter().map(|c| c.news_id).collect())
    }
}

/// The full arm set, keyed by kind.
pub fn build_arms(
    db: Arc<DatabaseConnection>,
    facade: Arc<NewsQueryService>,
) -> HashMap<ArmKind, Arc<dyn RankingArm>> {
    let mut arms: HashMap<ArmKind, Arc<dyn RankingArm>> = HashMap::new();

    arms.insert(
        ArmKind::Recent,
        Arc::new(RecentArm {
            news: NewsRepository::new(Arc::clone(&db)),
        }),
    );
    arms.insert(
        ArmKind::Popular,
        Arc::new(PopularArm {
            engagement: EngagementRepository::new(Arc::clone(&db)),
            news: NewsRepository::new(db),
        }),
    );
    arms.insert(
        ArmKind::Diverse,
        Arc::new(DiverseArm {
            facade: Arc::clone(&facade),
        }),
    );
    arms.insert(ArmKind::Personalized, Arc::new(PersonalizedArm { facade }));

    arms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::repositories::NewNews;
    use crate::repositories::engagement::ClickRecord;

    async fn save(db: &Arc<DatabaseConnection>, title: &str, minutes_ago: i64) -> i64 {
        let published_at = Utc::now() - Duration::minutes(minutes_ago);
        NewsRepository::new(Arc::clone(db))
            .insert_if_new(NewNews {
                source: "yonhap".to_string(),
                url: "https://news.example/a".to_string(),
                published_at,
                title: title.to_string(),
                body: "본문 ".repeat(30),
                lang: "ko".to_string(),
                dedup_key: crate::ingest::normalizer::dedup_key(title, "yonhap", published_at),
            })
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn recent_arm_orders_by_publish_time() {
        let db = Arc::new(test_pool().await);
        let older = save(&db, "어제 기사", 60).await;
        let newer = save(&db, "방금 기사", 1).await;

        let arm = RecentArm {
            news: NewsRepository::new(Arc::clone(&db)),
        };
        let ids = arm
            .rank(&ArmContext {
                user_id: None,
                limit: 10,
                now: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(ids, vec![newer, older]);
    }

    #[tokio::test]
    async fn popular_arm_leads_with_clicked_articles() {
        let db = Arc::new(test_pool().await);
        let quiet = save(&db, "조용한 기사", 1).await;
        let clicked = save(&db, "많이 본 기사", 60).await;

        let engagement = EngagementRepository::new(Arc::clone(&db));
        engagement
            .insert_clicks(vec![
                ClickRecord {
                    anon_id: "a".to_string(),
                    user_id: None,
                    news_id: clicked,
                    clicked_at: Utc::now(),
                    dwell_time_ms: None,
                    experiment_key: None,
                    variant: None,
                },
                ClickRecord {
                    anon_id: "b".to_string(),
                    user_id: None,
                    news_id: clicked,
                    clicked_at: Utc::now(),
                    dwell_time_ms: None,
                    experiment_key: None,
                    variant: None,
                },
            ])
            .await
            .unwrap();

        let arm = PopularArm {
            engagement,
            news: NewsRepository::new(Arc::clone(&db)),
        };
        let ids = arm
            .rank(&ArmContext {
                user_id: None,
                limit: 2,
                now: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(ids[0], clicked);
        assert!(ids.contains(&quiet), "padded with recent articles");
    }
}
