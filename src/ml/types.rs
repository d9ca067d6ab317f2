//! Wire types for the remote model-serving API.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One article submitted for importance scoring.
#[derive(Debug, Clone, Serialize)]
pub struct ImportanceItem {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub source: String,
    pub published_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportanceRequest {
    pub items: Vec<ImportanceItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportanceResult {
    pub id: i64,
    /// Model probability that the article is important, in [0, 1]
    pub importance_p: f64,
    #[serde(default)]
    pub features: Option<JsonValue>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportanceResponse {
    pub results: Vec<ImportanceResult>,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarizeRequest {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub tickers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeResponse {
    pub id: i64,
    pub summary: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default, rename = "policyFlags")]
    pub policy_flags: Vec<String>,
    #[serde(default, rename = "methodUsed")]
    pub method_used: Option<String>,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedItem {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub items: Vec<EmbedItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResult {
    pub id: i64,
    pub vector: Vec<f32>,
    pub norm: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    pub results: Vec<EmbedResult>,
    pub dimension: usize,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

/// Remote clustering over a batch of stored vectors.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterRequest {
    pub vectors: Vec<Vec<f32>>,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterResponse {
    /// Cluster label per input vector; -1 marks noise under HDBSCAN
    pub labels: Vec<i64>,
    #[serde(rename = "modelVersion")]
    pub model_version: String,
}

/// A cached or freshly fetched embedding with its provenance.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub norm: f64,
    pub model_version: String,
}

/// Expected vector dimension for a model version, when registered.
///
/// Persisted embeddings are validated against this registry so a model
/// upgrade cannot silently mix dimensions under one version tag.
pub fn expected_dimension(model_version: &str) -> Option<usize> {
    match model_version {
        "default-e5-small" => Some(384),
        "default-e5-base" => Some(768),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_registry_covers_known_models() {
        assert_eq!(expected_dimension("default-e5-small"), Some(384));
        assert_eq!(expected_dimension("default-e5-base"), Some(768));
        assert_eq!(expected_dimension("experimental"), None);
    }

    #[test]
    fn importance_response_parses_wire_format() {
        let raw = serde_json::json!({
            "results": [{"id": 1, "importance_p": 0.87, "confidence": 0.9}],
            "modelVersion": "imp-v3"
        });
        let parsed: ImportanceResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.results[0].id, 1);
        assert_eq!(parsed.model_version, "imp-v3");
    }
}
