//! Topic clustering batch.
//!
//! Groups recent articles by embedding similarity. The default single-pass
//! cosine algorithm runs in-process; HDBSCAN and k-means delegate to the
//! model service's clustering endpoint and persist the returned labels.
//! Near-duplicate pairs within a topic additionally share a group id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::{ClusteringAlgorithm, ClusteringConfig};
use crate::ml::types::ClusterRequest;
use crate::ml::{MlClient, MlError};
use crate::ranking::{cosine_similarity, stem_tokens};
use crate::repositories::{EmbeddingRepository, TopicAssignment, TopicRepository};

/// Outcome of one clustering run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClusterRunSummary {
    pub articles: usize,
    pub topics: usize,
    pub method: String,
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("repository failure: {0}")]
    Repository(#[from] crate::error::RepositoryError),

    #[error("remote clustering failed: {0}")]
    Remote(#[from] MlError),
}

/// One article taking part in a batch.
struct Member {
    news_id: i64,
    vector: Vec<f32>,
    title: String,
}

/// Periodic topic clusterer.
pub struct TopicClusterer {
    config: ClusteringConfig,
    ml: Arc<MlClient>,
    embeddings: EmbeddingRepository,
    topics: TopicRepository,
}

impl TopicClusterer {
    pub fn new(config: ClusteringConfig, db: Arc<DatabaseConnection>, ml: Arc<MlClient>) -> Self {
        Self {
            config,
            ml,
            embeddings: EmbeddingRepository::new(Arc::clone(&db)),
            topics: TopicRepository::new(db),
        }
    }

    /// Run with the configured algorithm.
    pub async fn run(&self) -> Result<ClusterRunSummary, ClusterError> {
        self.run_with(self.config.algorithm).await
    }

    /// Run with an explicit algorithm, as the admin endpoints do.
    pub async fn run_with(
        &self,
        algorithm: ClusteringAlgorithm,
    ) -> Result<ClusterRunSummary, ClusterError> {
        let since = Utc::now() - Duration::hours(self.config.window_hours);
        let rows = self
            .embeddings
            .recent_with_news(since, self.config.batch_limit)
            .await?;

        let members: Vec<Member> = rows
            .into_iter()
            .map(|(embedding, item)| Member {
                news_id: embedding.news_id,
                vector: embedding.decode_vector(),
                title: item.title,
            })
            .filter(|member| !member.vector.is_empty())
            .collect();

        if members.is_empty() {
            return Ok(ClusterRunSummary {
                articles: 0,
                topics: 0,
                method: algorithm.as_str().to_string(),
            });
        }

        let base_topic_id = self.topics.max_topic_id().await? + 1;

        let clusters = match algorithm {
            ClusteringAlgorithm::Cosine => {
                cosine_single_pass(&members, self.config.similarity_threshold)
            }
            ClusteringAlgorithm::Hdbscan | ClusteringAlgorithm::Kmeans => {
                self.remote_clusters(&members, algorithm).await?
            }
        };

        let topic_count = clusters.len();
        let mut assignments = Vec::with_capacity(members.len());

        for (topic_offset, cluster) in clusters.iter().enumerate() {
            let topic_id = base_topic_id + topic_offset as i64;
            let keywords = topic_keywords(&members, cluster);
            let groups = near_duplicate_groups(&members, cluster, self.config.duplicate_threshold);

            for (&member_index, &similarity) in cluster {
                assignments.push(TopicAssignment {
                    news_id: members[member_index].news_id,
                    topic_id,
                    group_id: groups.get(&member_index).copied(),
                    topic_keywords: keywords.clone(),
                    similarity_score: similarity,
                    clustering_method: algorithm.as_str().to_string(),
                });
            }
        }

        let articles = assignments.len();
        self.topics.upsert_assignments(assignments).await?;

        counter!("clustering_runs_total", "method" => algorithm.as_str()).increment(1);
        info!(articles, topics = topic_count, method = %algorithm, "clustering run completed");

        Ok(ClusterRunSummary {
            articles,
            topics: topic_count,
            method: algorithm.as_str().to_string(),
        })
    }

    /// Remote label assignment. Noise labels (-1) drop out of the result.
    async fn remote_clusters(
        &self,
        members: &[Member],
        algorithm: ClusteringAlgorithm,
    ) -> Result<Vec<HashMap<usize, f64>>, ClusterError> {
        let response = self
            .ml
            .cluster(ClusterRequest {
                vectors: members.iter().map(|m| m.vector.clone()).collect(),
                algorithm: algorithm.as_str().to_string(),
                k: match algorithm {
                    ClusteringAlgorithm::Kmeans => Some((members.len() / 8).max(2)),
                    _ => None,
                },
            })
            .await?;

        if response.labels.len() != members.len() {
            warn!(
                expected = members.len(),
                received = response.labels.len(),
                "remote clustering returned mismatched label count"
            );
            return Err(ClusterError::Remote(MlError::Decode(
                "label count mismatch".to_string(),
            )));
        }

        let mut by_label: HashMap<i64, Vec<usize>> = HashMap::new();
        for (index, &label) in response.labels.iter().enumerate() {
            if label >= 0 {
                by_label.entry(label).or_default().push(index);
            }
        }

        let mut labels: Vec<i64> = by_label.keys().copied().collect();
        labels.sort_unstable();

        Ok(labels
            .into_iter()
            .map(|label| {
                let indices = &by_label[&label];
                let centroid = centroid_of(members, indices);
                indices
                    .iter()
                    .map(|&index| {
                        (
                            index,
                            cosine_similarity(&members[index].vector, &centroid),
                        )
                    })
                    .collect()
            })
            .collect())
    }
}

/// Single-pass assignment: each article joins the first topic whose running
/// centroid is similar enough, else founds a new one.
fn cosine_single_pass(members: &[Member], threshold: f64) -> Vec<HashMap<usize, f64>> {
    struct Topic {
        member_indices: Vec<usize>,
        centroid: Vec<f32>,
    }

    let mut topics: Vec<Topic> = Vec::new();

    for (index, member) in members.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (topic_index, topic) in topics.iter().enumerate() {
            let similarity = cosine_similarity(&member.vector, &topic.centroid);
            if similarity >= threshold
                && best.map(|(_, prev)| similarity > prev).unwrap_or(true)
            {
                best = Some((topic_index, similarity));
            }
        }

        match best {
            Some((topic_index, _)) => {
                let topic = &mut topics[topic_index];
                topic.member_indices.push(index);
                update_centroid(&mut topic.centroid, &member.vector, topic.member_indices.len());
            }
            None => topics.push(Topic {
                member_indices: vec![index],
                centroid: member.vector.clone(),
            }),
        }
    }

    topics
        .into_iter()
        .map(|topic| {
            topic
                .member_indices
                .iter()
                .map(|&index| {
                    (
                        index,
                        cosine_similarity(&members[index].vector, &topic.centroid),
                    )
                })
                .collect()
        })
        .collect()
}

/// Running mean update without re-summing the whole topic.
fn update_centroid(centroid: &mut [f32], vector: &[f32], count: usize) {
    let count = count as f32;
    for (c, v) in centroid.iter_mut().zip(vector.iter()) {
        *c += (*v - *c) / count;
    }
}

fn centroid_of(members: &[Member], indices: &[usize]) -> Vec<f32> {
    let Some(first) = indices.first() else {
        return Vec::new();
    };
    let dimension = members[*first].vector.len();
    let mut centroid = vec![0.0f32; dimension];

    for &index in indices {
        for (c, v) in centroid.iter_mut().zip(members[index].vector.iter()) {
            *c += v;
        }
    }
    for c in centroid.iter_mut() {
        *c /= indices.len() as f32;
    }
    centroid
}

/// Top title tokens across a topic's members.
fn topic_keywords(members: &[Member], cluster: &HashMap<usize, f64>) -> Vec<String> {
    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for &index in cluster.keys() {
        for token in stem_tokens(&members[index].title) {
            if token.chars().count() < 2 {
                continue;
            }
            *frequencies.entry(token).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = frequencies.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(5).map(|(token, _)| token).collect()
}

/// Pairs above the duplicate threshold share a group id; groups are the
/// connected components of that relation, keyed by their smallest news id.
fn near_duplicate_groups(
    members: &[Member],
    cluster: &HashMap<usize, f64>,
    threshold: f64,
) -> HashMap<usize, i64> {
    let indices: Vec<usize> = cluster.keys().copied().collect();
    let mut parent: HashMap<usize, usize> = indices.iter().map(|&i| (i, i)).collect();

    fn find(parent: &mut HashMap<usize, usize>, index: usize) -> usize {
        let mut root = index;
        while parent[&root] != root {
            root = parent[&root];
        }
        let mut current = index;
        while parent[&current] != root {
            let next = parent[&current];
            parent.insert(current, root);
            current = next;
        }
        root
    }

    for i in 0..indices.len() {
        for j in (i + 1)..indices.len() {
            let (a, b) = (indices[i], indices[j]);
            if cosine_similarity(&members[a].vector, &members[b].vector) >= threshold {
                let root_a = find(&mut parent, a);
                let root_b = find(&mut parent, b);
                if root_a != root_b {
                    parent.insert(root_a, root_b);
                }
            }
        }
    }

    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for &index in &indices {
        let root = find(&mut parent, index);
        components.entry(root).or_default().push(index);
    }

    let mut groups = HashMap::new();
    for component in components.into_values() {
        if component.len() < 2 {
            continue;
        }
        let group_id = component
            .iter()
            .map(|&index| members[index].news_id)
            .min()
            .unwrap_or_default();
        for index in component {
            groups.insert(index, group_id);
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MlConfig;
    use crate::db::test_pool;
    use crate::ml::types::Embedding;
    use crate::repositories::{NewNews, NewsRepository};

    fn member(news_id: i64, vector: Vec<f32>, title: &str) -> Member {
        Member {
            news_id,
            vector,
            title: title.to_string(),
        }
    }

    #[test]
    fn similar_vectors_share_a_topic() {
        let members = vec![
            member(1, vec![1.0, 0.0, 0.0], "삼성전자 실적 발표"),
            member(2, vec![0.97, 0.05, 0.0], "삼성전자 급등"),
            member(3, vec![0.0, 1.0, 0.0], "카카오 신사업"),
        ];

        let clusters = cosine_single_pass(&members, 0.75);
        assert_eq!(clusters.len(), 2);
        assert!(clusters[0].contains_key(&0) && clusters[0].contains_key(&1));
        assert!(clusters[1].contains_key(&2));
    }

    #[test]
    fn dissimilar_vectors_found_their_own_topics() {
        let members = vec![
            member(1, vec![1.0, 0.0, 0.0], "a"),
            member(2, vec![0.0, 1.0, 0.0], "b"),
            member(3, vec![0.0, 0.0, 1.0], "c"),
        ];
        assert_eq!(cosine_single_pass(&members, 0.75).len(), 3);
    }

    #[test]
    fn near_duplicates_share_a_group_keyed_by_min_news_id() {
        let members = vec![
            member(10, vec![1.0, 0.0], "같은 기사"),
            member(11, vec![0.999, 0.01], "같은 기사 재송고"),
            member(12, vec![0.8, 0.6], "관련 기사"),
        ];
        let cluster: HashMap<usize, f64> = [(0, 1.0), (1, 1.0), (2, 0.9)].into_iter().collect();

        let groups = near_duplicate_groups(&members, &cluster, 0.95);
        assert_eq!(groups.get(&0), Some(&10));
        assert_eq!(groups.get(&1), Some(&10));
        assert_eq!(groups.get(&2), None, "loose member stays ungrouped");
    }

    #[test]
    fn keywords_come_from_member_titles() {
        let members = vec![
            member(1, vec![1.0], "삼성전자 실적 발표"),
            member(2, vec![1.0], "삼성전자 실적 호조"),
        ];
        let cluster: HashMap<usize, f64> = [(0, 1.0), (1, 1.0)].into_iter().collect();

        let keywords = topic_keywords(&members, &cluster);
        assert_eq!(keywords[0], "삼성전자");
        assert_eq!(keywords[1], "실적");
    }

    #[tokio::test]
    async fn full_run_persists_assignments() {
        let db = Arc::new(test_pool().await);
        let news = NewsRepository::new(Arc::clone(&db));
        let embeddings = EmbeddingRepository::new(Arc::clone(&db));

        let vectors = [
            vec![1.0f32, 0.0, 0.0],
            vec![0.98f32, 0.02, 0.0],
            vec![0.0f32, 1.0, 0.0],
        ];
        let titles = ["삼성전자 실적 발표", "삼성전자 급등", "카카오 신사업"];

        for (vector, title) in vectors.iter().zip(titles.iter()) {
            let published_at = Utc::now();
            let item = news
                .insert_if_new(NewNews {
                    source: "yonhap".to_string(),
                    url: "https://news.example/c".to_string(),
                    published_at,
                    title: title.to_string(),
                    body: "본문 ".repeat(30),
                    lang: "ko".to_string(),
                    dedup_key: crate::ingest::normalizer::dedup_key(title, "yonhap", published_at),
                })
                .await
                .unwrap()
                .unwrap();

            embeddings
                .upsert(
                    item.id,
                    &Embedding {
                        vector: vector.clone(),
                        norm: 1.0,
                        model_version: "test".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let ml = Arc::new(MlClient::new(&MlConfig {
            service_url: "http://localhost:1".to_string(),
            ..Default::default()
        }));
        let clusterer = TopicClusterer::new(ClusteringConfig::default(), Arc::clone(&db), ml);

        let summary = clusterer.run().await.unwrap();
        assert_eq!(summary.articles, 3);
        assert_eq!(summary.topics, 2);
        assert_eq!(summary.method, "cosine");

        let topics = TopicRepository::new(db)
            .get_for_news_ids(&[1, 2, 3])
            .await
            .unwrap();
        assert_eq!(topics.len(), 3);

        let samsung: Vec<_> = topics.iter().filter(|t| t.news_id <= 2).collect();
        assert_eq!(
            samsung[0].topic_id, samsung[1].topic_id,
            "the two Samsung stories share a topic"
        );
        let kakao = topics.iter().find(|t| t.news_id == 3).unwrap();
        assert_ne!(kakao.topic_id, samsung[0].topic_id);
    }
}
