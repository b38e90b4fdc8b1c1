use chrono::{DateTime, Utc};
use faiss::MetricType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Ranking function for a collection. Fixed at creation, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

impl DistanceMetric {
    pub fn faiss_metric(self) -> MetricType {
        match self {
            DistanceMetric::Cosine | DistanceMetric::Dot => MetricType::InnerProduct,
            DistanceMetric::Euclidean => MetricType::L2,
        }
    }

    /// Cosine stores and queries unit vectors; the other metrics use raw vectors.
    pub fn normalizes(self) -> bool {
        matches!(self, DistanceMetric::Cosine)
    }

    /// Convert a raw faiss score into the contract's higher-is-better similarity.
    ///
    /// Inner-product metrics already rank descending. Faiss L2 search returns
    /// squared distance ascending, mapped through `1 / (1 + d2)` so an exact
    /// match scores 1.0 for every metric.
    pub fn similarity(self, raw: f32) -> f32 {
        match self {
            DistanceMetric::Cosine | DistanceMetric::Dot => raw,
            DistanceMetric::Euclidean => 1.0 / (1.0 + raw),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "angular" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "dot" | "inner_product" => Ok(DistanceMetric::Dot),
            other => Err(EngineError::Unsupported(format!(
                "distance metric: {other}"
            ))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Dot => "dot",
        };
        f.write_str(name)
    }
}

/// One stored vector with its payload. A record exists with all fields or not
/// at all; partially written records are never observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Caller-supplied id, unique within the collection. `None` lets the
    /// backend assign the next sequential id.
    #[serde(default)]
    pub id: Option<i64>,
    pub vector: Vec<f32>,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl VectorRecord {
    pub fn new(id: Option<i64>, vector: Vec<f32>, text: impl Into<String>) -> Self {
        Self {
            id,
            vector,
            text: text.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub vector_count: usize,
}

/// A single search hit. Produced only by search; never persisted.
/// `score` is strictly positive and higher is always better, whatever the
/// collection metric.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocument {
    pub score: f32,
    pub text: String,
}

/// A bounded fragment of source content, the unit fed to the indexing
/// pipeline. Produced by upstream ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of conversation history. History is append-only and never
/// reordered or edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
