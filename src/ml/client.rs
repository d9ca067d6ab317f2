//! HTTP client for the remote model service.
//!
//! Every operation goes through the shared circuit breaker and a bounded
//! retry loop. Retries apply only to network errors and 5xx responses; 4xx
//! responses are permanent and logged at warn. Results are cached per
//! operation so repeated scoring of the same text never leaves the process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::MlConfig;
use crate::ml::breaker::{BreakerConfig, CircuitBreaker};
use crate::ml::cache::{TtlCache, text_key};
use crate::ml::types::{
    ClusterRequest, ClusterResponse, EmbedItem, EmbedRequest, EmbedResponse, Embedding,
    ImportanceItem, ImportanceRequest, ImportanceResponse, SummarizeRequest, SummarizeResponse,
    expected_dimension,
};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Errors surfaced by the ML client. Callers treat every variant as a cue to
/// fall back; none of them propagates to the HTTP boundary.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("ML circuit open; call short-circuited")]
    CircuitOpen,

    #[error("transient ML failure: {message}")]
    Transient { message: String },

    #[error("permanent ML failure: status {status}: {message}")]
    Permanent { status: u16, message: String },

    #[error("malformed ML response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
struct CachedImportance {
    importance_p: f64,
    model_version: String,
}

/// Client for the model-serving collaborator.
pub struct MlClient {
    http: reqwest::Client,
    base_url: String,
    retry_max_attempts: u32,
    breaker: Arc<CircuitBreaker>,
    importance_cache: TtlCache<CachedImportance>,
    summary_cache: TtlCache<SummarizeResponse>,
    embedding_cache: TtlCache<Embedding>,
    /// Last embedding model version seen from the service, used as the cache
    /// namespace for lookups before the next response arrives.
    embed_version: Mutex<String>,
}

impl MlClient {
    pub fn new(config: &MlConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_default();

        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            window_size: config.breaker_window_size,
            failure_rate_threshold: config.breaker_failure_rate,
            open_duration: Duration::from_secs(config.breaker_open_seconds),
            half_open_max_probes: config.breaker_half_open_probes,
        }));

        Self {
            http,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            breaker,
            importance_cache: TtlCache::new(
                config.cache_capacity,
                Some(Duration::from_secs(config.importance_cache_ttl_seconds)),
            ),
            summary_cache: TtlCache::new(
                config.cache_capacity,
                Some(Duration::from_secs(config.summary_cache_ttl_seconds)),
            ),
            embedding_cache: TtlCache::new(config.cache_capacity, None),
            embed_version: Mutex::new("default-e5-small".to_string()),
        }
    }

    /// Shared breaker handle, exposed so the backlog drain can gate on state.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Score one article. Returns the model probability and model version.
    pub async fn score_importance(&self, item: ImportanceItem) -> Result<(f64, String), MlError> {
        let key = text_key("importance", &format!("{}|{}", item.title, item.body));
        if let Some(hit) = self.importance_cache.get(&key) {
            debug!(news_id = item.id, "importance served from cache");
            return Ok((hit.importance_p, hit.model_version));
        }

        let id = item.id;
        let request = ImportanceRequest { items: vec![item] };
        let response: ImportanceResponse = self.post_json("/v1/importance:score", &request).await?;

        let result = response
            .results
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| MlError::Decode(format!("no importance result for id {}", id)))?;

        self.importance_cache.insert(
            key,
            CachedImportance {
                importance_p: result.importance_p,
                model_version: response.model_version.clone(),
            },
        );

        Ok((result.importance_p, response.model_version))
    }

    /// Summarize one article.
    pub async fn summarize(&self, request: SummarizeRequest) -> Result<SummarizeResponse, MlError> {
        let key = text_key("summary", &format!("{}|{}", request.title, request.body));
        if let Some(hit) = self.summary_cache.get(&key) {
            debug!(news_id = request.id, "summary served from cache");
            return Ok(hit);
        }

        let response: SummarizeResponse = self.post_json("/v1/summarize", &request).await?;
        self.summary_cache.insert(key, response.clone());
        Ok(response)
    }

    /// Fetch the embedding for one text. Vectors are validated against the
    /// dimension registered for the returned model version.
    pub async fn embed(&self, id: i64, text: &str) -> Result<Embedding, MlError> {
        let version = self.embed_version.lock().expect("version lock").clone();
        let key = text_key(&version, text);
        if let Some(hit) = self.embedding_cache.get(&key) {
            debug!(news_id = id, "embedding served from cache");
            return Ok(hit);
        }

        let request = EmbedRequest {
            items: vec![EmbedItem {
                id,
                text: text.to_string(),
            }],
        };
        let response: EmbedResponse = self.post_json("/v1/embed", &request).await?;

        let result = response
            .results
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| MlError::Decode(format!("no embedding result for id {}", id)))?;

        if let Some(expected) = expected_dimension(&response.model_version)
            && result.vector.len() != expected
        {
            return Err(MlError::Decode(format!(
                "model {} returned dimension {} (expected {})",
                response.model_version,
                result.vector.len(),
                expected
            )));
        }

        let embedding = Embedding {
            vector: result.vector,
            norm: result.norm,
            model_version: response.model_version.clone(),
        };

        *self.embed_version.lock().expect("version lock") = response.model_version.clone();
        self.embedding_cache
            .insert(text_key(&response.model_version, text), embedding.clone());

        Ok(embedding)
    }

    /// Run a remote clustering batch over stored vectors.
    pub async fn cluster(&self, request: ClusterRequest) -> Result<ClusterResponse, MlError> {
        self.post_json("/v1/cluster", &request).await
    }

    /// Per-model loaded/version status from the model service.
    ///
    /// Diagnostics only: bypasses the breaker so operators can still see the
    /// remote state while the circuit is open.
    pub async fn health(&self) -> Result<JsonValue, MlError> {
        let url = format!("{}/admin/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| MlError::Transient {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(MlError::Transient {
                message: format!("health returned {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|err| MlError::Decode(err.to_string()))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, MlError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        if !self.breaker.try_acquire() {
            counter!("ml_calls_total", "outcome" => "short_circuit").increment(1);
            return Err(MlError::CircuitOpen);
        }

        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        let mut delay = RETRY_BASE_DELAY;

        loop {
            attempt += 1;

            let outcome = self.http.post(&url).json(body).send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        self.breaker.record_success();
                        counter!("ml_calls_total", "outcome" => "success").increment(1);
                        return response
                            .json::<T>()
                            .await
                            .map_err(|err| MlError::Decode(err.to_string()));
                    }

                    if status.is_server_error() {
                        if attempt >= self.retry_max_attempts {
                            self.breaker.record_failure();
                            counter!("ml_calls_total", "outcome" => "server_error").increment(1);
                            return Err(MlError::Transient {
                                message: format!("{} returned {}", path, status),
                            });
                        }
                    } else {
                        // 4xx: the service is reachable but rejected the request
                        self.breaker.record_success();
                        counter!("ml_calls_total", "outcome" => "client_error").increment(1);
                        let message = response.text().await.unwrap_or_default();
                        warn!(path, status = status.as_u16(), "ML request rejected");
                        return Err(MlError::Permanent {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(err) => {
                    if attempt >= self.retry_max_attempts {
                        self.breaker.record_failure();
                        counter!("ml_calls_total", "outcome" => "network_error").increment(1);
                        return Err(MlError::Transient {
                            message: err.to_string(),
                        });
                    }
                }
            }

            sleep(delay).await;
            delay *= 2;
        }
    }
}
