//! Query-time retrieval: embed the question, search the project's collection.

use std::sync::Arc;

use crate::defaults;
use crate::error::{EngineError, Result};
use crate::model::RetrievedDocument;
use crate::naming::collection_name;
use crate::providers::{EmbedKind, EmbeddingProvider};
use crate::store::VectorStore;

pub struct RetrievalPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    default_limit: usize,
}

impl RetrievalPipeline {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            default_limit: defaults::DEFAULT_TOP_K,
        }
    }

    pub fn from_config(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &crate::config::AppConfig,
    ) -> Self {
        Self::new(store, embedder).with_default_limit(config.retrieval_limit)
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    /// Top documents for `query` from the project's collection, ranked by
    /// descending similarity. A missing collection and an embedding failure
    /// both surface as errors with distinguishable kinds, never as a panic.
    pub async fn search_project(
        &self,
        project_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RetrievedDocument>> {
        let collection = collection_name(project_id);
        if !self.store.collection_exists(&collection).await? {
            tracing::warn!("search against missing collection '{}'", collection);
            return Err(EngineError::CollectionNotFound(collection));
        }

        let query_texts = [query.to_string()];
        let vectors = self
            .embedder
            .embed(&query_texts, EmbedKind::Query)
            .await
            .map_err(|err| EngineError::Upstream(format!("query embedding failed: {err}")))?;
        // Providers return a list even for a single input; an empty list means
        // the provider had nothing for us.
        let Some(vector) = vectors.into_iter().next() else {
            return Err(EngineError::Upstream(
                "embedding provider returned no vectors for the query".to_string(),
            ));
        };

        self.store
            .search_by_vector(&collection, &vector, limit.unwrap_or(self.default_limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DistanceMetric, VectorRecord};
    use crate::store::{EmbeddedEngine, ManagedIndexStore};
    use async_trait::async_trait;

    /// Maps known query strings to fixed vectors; anything else embeds empty.
    struct RoutedEmbedder {
        routes: Vec<(&'static str, Vec<f32>)>,
    }

    #[async_trait]
    impl EmbeddingProvider for RoutedEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .filter_map(|text| {
                    self.routes
                        .iter()
                        .find(|(key, _)| *key == text.as_str())
                        .map(|(_, v)| v.clone())
                })
                .collect())
        }
    }

    async fn seeded_store() -> Arc<dyn VectorStore> {
        let store: Arc<dyn VectorStore> =
            Arc::new(ManagedIndexStore::new(Arc::new(EmbeddedEngine::new())));
        store.connect().await.unwrap();
        store
            .create_collection("collection_42", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .insert_many(
                "collection_42",
                vec![
                    VectorRecord::new(Some(0), vec![1.0, 0.0, 0.0], "about x"),
                    VectorRecord::new(Some(1), vec![0.0, 1.0, 0.0], "about y"),
                ],
                10,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn retrieves_ranked_documents() {
        let store = seeded_store().await;
        let embedder = Arc::new(RoutedEmbedder {
            routes: vec![("tell me about x", vec![0.9, 0.1, 0.0])],
        });
        let pipeline = RetrievalPipeline::new(store, embedder);

        let docs = pipeline
            .search_project("42", "tell me about x", Some(2))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "about x");
        assert!(docs[0].score > docs[1].score);
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let store: Arc<dyn VectorStore> =
            Arc::new(ManagedIndexStore::new(Arc::new(EmbeddedEngine::new())));
        store.connect().await.unwrap();
        let pipeline = RetrievalPipeline::new(store, Arc::new(RoutedEmbedder { routes: vec![] }));

        let err = pipeline.search_project("42", "anything", None).await.unwrap_err();
        assert!(matches!(err, EngineError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn empty_embedding_is_an_upstream_failure() {
        let store = seeded_store().await;
        let pipeline = RetrievalPipeline::new(store, Arc::new(RoutedEmbedder { routes: vec![] }));

        let err = pipeline.search_project("42", "unknown", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));
    }
}
