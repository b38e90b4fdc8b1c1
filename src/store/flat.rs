//! Self-managed flat-index backend.
//!
//! Each collection is a directory holding a brute-force faiss blob
//! (`<name>.index`, an `IDMap,Flat` index) and a side payload map
//! (`<name>_id_map`, JSON). No in-memory state survives between calls: every
//! operation reloads both files, and mutations rewrite them through a temp
//! file + rename so a crash never leaves a half-written pair on disk.
//!
//! One mutex per store instance serializes every operation that touches
//! collection files, reads included. A reader that skipped the lock could
//! observe an index file without its matching id-map.

use async_trait::async_trait;
use faiss::{index_factory, Idx, Index};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::model::{
    normalize_l2, CollectionInfo, DistanceMetric, RetrievedDocument, VectorRecord,
};
use crate::store::VectorStore;

/// Value side of the id-map: everything stored alongside a vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPayload {
    text: String,
    metadata: serde_json::Value,
}

/// On-disk shape of `<name>_id_map`. Carries the collection metric because an
/// inner-product faiss blob cannot distinguish cosine from dot, and the two
/// differ in normalization.
#[derive(Debug, Serialize, Deserialize)]
struct IdMapFile {
    metric: DistanceMetric,
    entries: BTreeMap<i64, StoredPayload>,
}

struct StoreState {
    connected: bool,
}

pub struct FlatIndexStore {
    root: PathBuf,
    state: Mutex<StoreState>,
}

impl FlatIndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(StoreState { connected: false }),
        }
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn index_path(&self, name: &str) -> PathBuf {
        self.collection_dir(name).join(format!("{name}.index"))
    }

    fn id_map_path(&self, name: &str) -> PathBuf {
        self.collection_dir(name).join(format!("{name}_id_map"))
    }

    fn exists_on_disk(&self, name: &str) -> bool {
        self.collection_dir(name).is_dir()
    }

    fn load_index(&self, name: &str) -> Result<faiss::index::IndexImpl> {
        let path = self.index_path(name);
        let index = faiss::read_index(path.to_string_lossy().as_ref())?;
        Ok(index)
    }

    fn load_id_map(&self, name: &str) -> Result<IdMapFile> {
        let raw = fs::read(self.id_map_path(name))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn persist_index(&self, name: &str, index: &faiss::index::IndexImpl) -> Result<()> {
        let path = self.index_path(name);
        let tmp = tmp_sibling(&path);
        faiss::write_index(index, tmp.to_string_lossy().as_ref())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn persist_id_map(&self, name: &str, id_map: &IdMapFile) -> Result<()> {
        let path = self.id_map_path(name);
        let tmp = tmp_sibling(&path);
        fs::write(&tmp, serde_json::to_vec(id_map)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Add one batch to the loaded index/id-map and rewrite both files. The
    /// batch is only considered committed once both renames land.
    fn commit_batch(
        &self,
        name: &str,
        index: &mut faiss::index::IndexImpl,
        id_map: &mut IdMapFile,
        batch: &[VectorRecord],
        next_id: &mut i64,
    ) -> Result<()> {
        let dim = index.d() as usize;
        let mut flat: Vec<f32> = Vec::with_capacity(batch.len() * dim);
        let mut ids: Vec<Idx> = Vec::with_capacity(batch.len());

        for record in batch {
            let record_id = match record.id {
                Some(id) if id < 0 => {
                    return Err(EngineError::Unsupported(format!(
                        "record id {id} (flat index ids must be non-negative)"
                    )));
                }
                Some(id) => id,
                None => *next_id,
            };
            *next_id = (*next_id).max(record_id + 1);

            let mut vector = record.vector.clone();
            if id_map.metric.normalizes() {
                normalize_l2(&mut vector);
            }
            flat.extend_from_slice(&vector);
            ids.push(Idx::new(record_id as u64));
            id_map.entries.insert(
                record_id,
                StoredPayload {
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                },
            );
        }

        index.add_with_ids(&flat, &ids)?;
        self.persist_index(name, index)?;
        self.persist_id_map(name, id_map)?;
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl VectorStore for FlatIndexStore {
    async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        fs::create_dir_all(&self.root)?;
        state.connected = true;
        tracing::info!("flat index store connected at {}", self.root.display());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        tracing::info!("flat index store disconnected");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;
        Ok(self.exists_on_disk(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
        reset_if_exists: bool,
    ) -> Result<bool> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;

        let dir = self.collection_dir(name);
        if dir.is_dir() {
            if !reset_if_exists {
                tracing::info!("collection '{}' already exists", name);
                return Ok(false);
            }
            fs::remove_dir_all(&dir)?;
            tracing::info!("collection '{}' reset", name);
        }

        fs::create_dir_all(&dir)?;
        let index = index_factory(dimension as u32, "IDMap,Flat", metric.faiss_metric())?;
        self.persist_index(name, &index)?;
        self.persist_id_map(
            name,
            &IdMapFile {
                metric,
                entries: BTreeMap::new(),
            },
        )?;
        tracing::info!(
            "created collection '{}' (dim={}, metric={})",
            name,
            dimension,
            metric
        );
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;

        let dir = self.collection_dir(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
            tracing::info!("collection '{}' deleted", name);
        } else {
            tracing::warn!("delete of missing collection '{}' ignored", name);
        }
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;

        if !self.exists_on_disk(name) {
            return Err(EngineError::CollectionNotFound(name.to_string()));
        }
        let index = self.load_index(name)?;
        let id_map = self.load_id_map(name)?;
        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: index.d() as usize,
            metric: id_map.metric,
            vector_count: index.ntotal() as usize,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;

        let mut names = Vec::new();
        if !self.root.is_dir() {
            return Ok(names);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.index_path(&name).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn insert_many(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<usize> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;

        if !self.exists_on_disk(name) {
            return Err(EngineError::CollectionNotFound(name.to_string()));
        }
        let batch_size = batch_size.max(1);
        let mut index = self.load_index(name)?;
        let mut id_map = self.load_id_map(name)?;

        let dim = index.d() as usize;
        for record in &records {
            if record.vector.len() != dim {
                return Err(EngineError::DimensionMismatch {
                    expected: dim,
                    actual: record.vector.len(),
                });
            }
        }

        let mut next_id = id_map.entries.len() as i64;
        let mut committed = 0usize;
        for (batch_idx, batch) in records.chunks(batch_size).enumerate() {
            if let Err(err) =
                self.commit_batch(name, &mut index, &mut id_map, batch, &mut next_id)
            {
                tracing::error!(
                    "batch {} of insert into '{}' failed after {} committed records: {}",
                    batch_idx,
                    name,
                    committed,
                    err
                );
                return Err(EngineError::PartialBatch {
                    committed,
                    failed_batch: batch_idx,
                    reason: err.to_string(),
                });
            }
            committed += batch.len();
            tracing::debug!(
                "committed batch {} ({} records) into '{}'",
                batch_idx,
                batch.len(),
                name
            );
        }
        Ok(committed)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let state = self.state.lock().unwrap();
        ensure_connected(&state)?;

        if !self.exists_on_disk(name) {
            return Err(EngineError::CollectionNotFound(name.to_string()));
        }
        let mut index = self.load_index(name)?;
        let id_map = self.load_id_map(name)?;

        let dim = index.d() as usize;
        if vector.len() != dim {
            return Err(EngineError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }

        let total = index.ntotal() as usize;
        if total == 0 || limit == 0 {
            return Ok(Vec::new());
        }

        let mut query = vector.to_vec();
        if id_map.metric.normalizes() {
            normalize_l2(&mut query);
        }

        let k = limit.min(total);
        let result = index.search(&query, k)?;

        let mut documents = Vec::with_capacity(k);
        for (raw_score, label) in result.distances.iter().zip(result.labels.iter()) {
            let Some(record_id) = label.get() else {
                continue;
            };
            // An id without a payload entry means the file pair desynced;
            // drop the hit rather than fabricate an empty document.
            let Some(payload) = id_map.entries.get(&(record_id as i64)) else {
                tracing::warn!(
                    "search in '{}' dropped id {} with no id-map entry",
                    name,
                    record_id
                );
                continue;
            };
            documents.push(RetrievedDocument {
                score: id_map.metric.similarity(*raw_score),
                text: payload.text.clone(),
            });
        }
        Ok(documents)
    }
}

fn ensure_connected(state: &StoreState) -> Result<()> {
    if !state.connected {
        return Err(EngineError::Io(
            "flat index store is not connected".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, FlatIndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatIndexStore::new(dir.path());
        (dir, store)
    }

    fn record(id: i64, vector: Vec<f32>, text: &str) -> VectorRecord {
        VectorRecord::new(Some(id), vector, text)
    }

    #[tokio::test]
    async fn operations_fail_until_connected() {
        let (_dir, store) = store();
        assert!(store.collection_exists("c").await.is_err());
        store.connect().await.unwrap();
        assert!(!store.collection_exists("c").await.unwrap());
        store.disconnect().await.unwrap();
        assert!(store.collection_exists("c").await.is_err());
    }

    #[tokio::test]
    async fn create_is_idempotent_without_reset() {
        let (_dir, store) = store();
        store.connect().await.unwrap();

        assert!(store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap());
        store
            .insert_many("c", vec![record(0, vec![1.0, 0.0, 0.0], "a")], 10)
            .await
            .unwrap();

        assert!(!store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap());
        let info = store.collection_info("c").await.unwrap();
        assert_eq!(info.dimension, 3);
        assert_eq!(info.vector_count, 1);
    }

    #[tokio::test]
    async fn create_with_reset_empties_the_collection() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .insert_many("c", vec![record(0, vec![1.0, 0.0, 0.0], "a")], 10)
            .await
            .unwrap();

        assert!(store
            .create_collection("c", 3, DistanceMetric::Cosine, true)
            .await
            .unwrap());
        assert_eq!(store.collection_info("c").await.unwrap().vector_count, 0);
    }

    #[tokio::test]
    async fn exact_match_is_top_hit_with_unit_score() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .insert_many(
                "c",
                vec![
                    record(0, vec![1.0, 0.0, 0.0], "x axis"),
                    record(1, vec![0.0, 1.0, 0.0], "y axis"),
                    record(2, vec![0.0, 0.0, 1.0], "z axis"),
                ],
                10,
            )
            .await
            .unwrap();

        let hits = store
            .search_by_vector("c", &[1.0, 0.0, 0.0], 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "x axis");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn euclidean_exact_match_converts_to_unit_score() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Euclidean, false)
            .await
            .unwrap();
        store
            .insert_many(
                "c",
                vec![
                    record(0, vec![1.0, 2.0], "near"),
                    record(1, vec![5.0, 5.0], "far"),
                ],
                10,
            )
            .await
            .unwrap();

        let hits = store.search_by_vector("c", &[1.0, 2.0], 2).await.unwrap();
        assert_eq!(hits[0].text, "near");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn every_batch_is_committed() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Euclidean, false)
            .await
            .unwrap();

        let records: Vec<VectorRecord> = (0..120)
            .map(|i| record(i, vec![i as f32, 1.0], &format!("chunk {i}")))
            .collect();
        let inserted = store.insert_many("c", records, 50).await.unwrap();
        assert_eq!(inserted, 120);
        assert_eq!(store.collection_info("c").await.unwrap().vector_count, 120);

        // Records from the first and middle batches are retrievable, not just
        // the final partial batch.
        for probe in [0i64, 49, 50, 99, 100, 119] {
            let hits = store
                .search_by_vector("c", &[probe as f32, 1.0], 1)
                .await
                .unwrap();
            assert_eq!(hits[0].text, format!("chunk {probe}"));
        }
    }

    #[tokio::test]
    async fn sequential_ids_are_assigned_when_missing() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();

        let records = vec![
            VectorRecord::new(None, vec![1.0, 0.0], "first"),
            VectorRecord::new(None, vec![0.0, 1.0], "second"),
        ];
        assert_eq!(store.insert_many("c", records, 10).await.unwrap(), 2);

        let hits = store.search_by_vector("c", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "second");
    }

    #[tokio::test]
    async fn dimension_mismatch_commits_nothing() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap();

        let err = store
            .insert_many(
                "c",
                vec![
                    record(0, vec![1.0, 0.0, 0.0], "good"),
                    record(1, vec![1.0, 0.0], "short"),
                ],
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.collection_info("c").await.unwrap().vector_count, 0);
    }

    #[tokio::test]
    async fn search_of_missing_collection_is_not_found() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        let err = store
            .search_by_vector("ghost", &[1.0, 0.0], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn search_of_empty_collection_returns_no_hits() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        let hits = store.search_by_vector("c", &[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_collection_is_a_noop() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store.delete_collection("ghost").await.unwrap();
        assert!(!store.collection_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn list_collections_reports_created_names() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("b", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .create_collection("a", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn metadata_round_trips_through_the_id_map() {
        let (_dir, store) = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        let rec = record(7, vec![1.0, 0.0], "tagged")
            .with_metadata(json!({"source": "doc.pdf", "page": 3}));
        store.insert_many("c", vec![rec], 10).await.unwrap();

        let id_map = store.load_id_map("c").unwrap();
        assert_eq!(id_map.entries[&7].metadata["page"], 3);
    }
}
