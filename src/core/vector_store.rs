//! Multi-Context Vector Store
//!
//! Keyed store of (id, vector, text, metadata) records grouped into
//! per-context collections named `context_<name>`, each persisted as one
//! JSON file under the vector db directory and searched by cosine distance
//! over L2-normalized vectors.
//!
//! Cross-context searches query every collection and merge the union of
//! hits by ascending distance. Duplicate chunks are NOT collapsed: a chunk
//! stored in several contexts yields one hit per containing context.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

/// Collection names on disk are the context name with this prefix.
pub const COLLECTION_PREFIX: &str = "context_";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to serialize collection: {0}")]
    SerializeError(String),

    #[error("Corrupt collection file {0}: {1}")]
    CorruptCollection(String, String),

    #[error("Batch length mismatch: {0}")]
    BatchMismatch(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Records
// ============================================================================

/// One embedded chunk as persisted in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// One search hit. `distance` is cosine distance (`1 - dot` for normalized
/// vectors); lower is closer.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub distance: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    records: Vec<EmbeddingRecord>,
}

impl Collection {
    fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.vector.len())
    }
}

// ============================================================================
// Vector Store
// ============================================================================

pub struct VectorStore {
    root: PathBuf,
    /// Keyed by full collection name (`context_<name>`).
    collections: RwLock<HashMap<String, Collection>>,
}

impl VectorStore {
    /// Open the store rooted at `root`, loading every persisted collection.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.starts_with(COLLECTION_PREFIX) {
                continue;
            }

            let raw = std::fs::read_to_string(&path)?;
            let collection: Collection = serde_json::from_str(&raw).map_err(|e| {
                StoreError::CorruptCollection(stem.to_string(), e.to_string())
            })?;
            log::info!(
                "Loaded collection '{}' with {} embeddings",
                stem,
                collection.records.len()
            );
            collections.insert(stem.to_string(), collection);
        }

        log::info!(
            "Vector store initialized at {:?} ({} collections)",
            root,
            collections.len()
        );

        Ok(Self {
            root,
            collections: RwLock::new(collections),
        })
    }

    fn collection_name(context: &str) -> String {
        format!("{COLLECTION_PREFIX}{context}")
    }

    fn collection_path(&self, collection_name: &str) -> PathBuf {
        self.root.join(format!("{collection_name}.json"))
    }

    fn persist(&self, collection_name: &str, collection: &Collection) -> Result<()> {
        let raw = serde_json::to_string(collection)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;
        std::fs::write(self.collection_path(collection_name), raw)?;
        Ok(())
    }

    /// Idempotently create the collection for a context.
    pub async fn get_or_create_collection(&self, context: &str) -> Result<()> {
        let name = Self::collection_name(context);
        let mut collections = self.collections.write().await;
        if !collections.contains_key(&name) {
            let collection = Collection::default();
            self.persist(&name, &collection)?;
            collections.insert(name, collection);
        }
        Ok(())
    }

    /// Drop a context's collection and all its vectors. Unknown collections
    /// are a no-op.
    pub async fn delete_collection(&self, context: &str) -> Result<()> {
        let name = Self::collection_name(context);
        let mut collections = self.collections.write().await;
        if collections.remove(&name).is_some() {
            let path = self.collection_path(&name);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            log::info!("Deleted collection '{name}'");
        }
        Ok(())
    }

    /// User-visible context names, derived from the collection names.
    pub async fn list_contexts(&self) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections
            .keys()
            .filter_map(|k| k.strip_prefix(COLLECTION_PREFIX))
            .map(|s| s.to_string())
            .collect();
        names.sort();
        names
    }

    /// Batch upsert into a context's collection. All slices must be the same
    /// length and all vectors the same dimension as the collection.
    pub async fn add(
        &self,
        context: &str,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadatas: Vec<Map<String, Value>>,
    ) -> Result<()> {
        if ids.len() != vectors.len() || ids.len() != texts.len() || ids.len() != metadatas.len()
        {
            return Err(StoreError::BatchMismatch(format!(
                "ids={}, vectors={}, texts={}, metadatas={}",
                ids.len(),
                vectors.len(),
                texts.len(),
                metadatas.len()
            )));
        }

        let name = Self::collection_name(context);
        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.clone()).or_default();

        if let Some(expected) = collection
            .dimension()
            .or_else(|| vectors.first().map(|v| v.len()))
        {
            for vector in &vectors {
                if vector.len() != expected {
                    return Err(StoreError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
        }

        let count = ids.len();
        for (((id, vector), text), metadata) in ids
            .into_iter()
            .zip(vectors)
            .zip(texts)
            .zip(metadatas)
        {
            match collection.records.iter_mut().find(|r| r.id == id) {
                Some(existing) => {
                    existing.vector = vector;
                    existing.text = text;
                    existing.metadata = metadata;
                }
                None => collection.records.push(EmbeddingRecord {
                    id,
                    vector,
                    text,
                    metadata,
                }),
            }
        }

        self.persist(&name, collection)?;
        log::info!("Added {count} embeddings to collection '{name}'");
        Ok(())
    }

    /// Cosine-ranked k-NN over one context, or over every context when
    /// `context` is `None` (cross-context merge).
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        where_filter: Option<&Map<String, Value>>,
        context: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;

        let mut hits = match context {
            Some(context) => {
                let name = Self::collection_name(context);
                match collections.get(&name) {
                    Some(collection) => search_collection(collection, query_vector, where_filter),
                    // Missing collection behaves like an empty one.
                    None => Vec::new(),
                }
            }
            None => {
                let mut all = Vec::new();
                for (name, collection) in collections.iter() {
                    // A failing context is skipped, not fatal to the query.
                    match try_search_collection(collection, query_vector, where_filter) {
                        Ok(mut hits) => all.append(&mut hits),
                        Err(e) => log::error!("Search failed in collection '{name}': {e}"),
                    }
                }
                all
            }
        };

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Full dump of one collection, or of every collection.
    pub async fn get_all(&self, context: Option<&str>) -> Vec<EmbeddingRecord> {
        let collections = self.collections.read().await;
        match context {
            Some(context) => collections
                .get(&Self::collection_name(context))
                .map(|c| c.records.clone())
                .unwrap_or_default(),
            None => collections
                .values()
                .flat_map(|c| c.records.iter().cloned())
                .collect(),
        }
    }

    /// Ids of all embeddings in a context whose metadata field equals the
    /// given value.
    pub async fn ids_where(&self, context: &str, field: &str, value: &str) -> Vec<String> {
        let collections = self.collections.read().await;
        collections
            .get(&Self::collection_name(context))
            .map(|c| {
                c.records
                    .iter()
                    .filter(|r| r.metadata.get(field).and_then(Value::as_str) == Some(value))
                    .map(|r| r.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delete embeddings by id from a context's collection. Returns how many
    /// records were removed.
    pub async fn delete(&self, context: &str, ids: &[String]) -> Result<usize> {
        let name = Self::collection_name(context);
        let mut collections = self.collections.write().await;
        let Some(collection) = collections.get_mut(&name) else {
            return Ok(0);
        };

        let before = collection.records.len();
        collection.records.retain(|r| !ids.contains(&r.id));
        let removed = before - collection.records.len();
        if removed > 0 {
            self.persist(&name, collection)?;
        }
        Ok(removed)
    }

    /// Drop every collection and its persisted file.
    pub async fn reset(&self) -> Result<()> {
        let mut collections = self.collections.write().await;
        for name in collections.keys() {
            let path = self.collection_path(name);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        collections.clear();
        log::warn!("Vector store reset - all data deleted");
        Ok(())
    }
}

fn try_search_collection(
    collection: &Collection,
    query_vector: &[f32],
    where_filter: Option<&Map<String, Value>>,
) -> Result<Vec<SearchHit>> {
    Ok(search_collection(collection, query_vector, where_filter))
}

fn search_collection(
    collection: &Collection,
    query_vector: &[f32],
    where_filter: Option<&Map<String, Value>>,
) -> Vec<SearchHit> {
    collection
        .records
        .iter()
        .filter(|record| matches_filter(&record.metadata, where_filter))
        .filter(|record| record.vector.len() == query_vector.len())
        .map(|record| SearchHit {
            id: record.id.clone(),
            distance: 1.0 - dot(&record.vector, query_vector),
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        })
        .collect()
}

fn matches_filter(metadata: &Map<String, Value>, filter: Option<&Map<String, Value>>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value)),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn unit(x: f32, y: f32) -> Vec<f32> {
        let mut v = vec![x, y];
        crate::core::embedding::l2_normalize(&mut v);
        v
    }

    async fn store_with_records() -> (tempfile::TempDir, VectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();

        store
            .add(
                "alpha",
                vec!["alpha_1".to_string(), "alpha_2".to_string()],
                vec![unit(1.0, 0.0), unit(0.0, 1.0)],
                vec!["close text".to_string(), "far text".to_string()],
                vec![
                    meta(&[("document_id", Value::from("doc-1"))]),
                    meta(&[("document_id", Value::from("doc-2"))]),
                ],
            )
            .await
            .unwrap();

        (dir, store)
    }

    #[tokio::test]
    async fn test_add_and_search_orders_by_distance() {
        let (_dir, store) = store_with_records().await;

        let hits = store
            .search(&unit(1.0, 0.1), 10, None, Some("alpha"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "alpha_1");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_search_missing_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        let hits = store
            .search(&unit(1.0, 0.0), 5, None, Some("ghost"))
            .await
            .unwrap();
        assert!(hits.is_empty());

        // Cross-context with no collections at all -> empty.
        let hits = store.search(&unit(1.0, 0.0), 5, None, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_where_filter_restricts_results() {
        let (_dir, store) = store_with_records().await;

        let filter = meta(&[("document_id", Value::from("doc-2"))]);
        let hits = store
            .search(&unit(1.0, 0.0), 10, Some(&filter), Some("alpha"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "alpha_2");
    }

    #[tokio::test]
    async fn test_cross_context_merge_is_ordered_union() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();

        store
            .add(
                "a",
                vec!["a_1".to_string()],
                vec![unit(1.0, 0.0)],
                vec!["exact".to_string()],
                vec![meta(&[])],
            )
            .await
            .unwrap();
        store
            .add(
                "b",
                vec!["b_1".to_string(), "b_2".to_string()],
                vec![unit(0.9, 0.1), unit(0.0, 1.0)],
                vec!["near".to_string(), "far".to_string()],
                vec![meta(&[]), meta(&[])],
            )
            .await
            .unwrap();

        let query = unit(1.0, 0.0);
        let merged = store.search(&query, 10, None, None).await.unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].id, "a_1");
        assert_eq!(merged[1].id, "b_1");
        assert_eq!(merged[2].id, "b_2");

        // The merge equals the per-context searches re-sorted by distance.
        let from_a = store.search(&query, 10, None, Some("a")).await.unwrap();
        let from_b = store.search(&query, 10, None, Some("b")).await.unwrap();
        let mut manual: Vec<_> = from_a.into_iter().chain(from_b).collect();
        manual.sort_by(|x, y| x.distance.partial_cmp(&y.distance).unwrap());
        let merged_ids: Vec<_> = merged.iter().map(|h| h.id.clone()).collect();
        let manual_ids: Vec<_> = manual.iter().map(|h| h.id.clone()).collect();
        assert_eq!(merged_ids, manual_ids);

        // top_k truncates after the merge.
        let top = store.search(&query, 2, None, None).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, "a_1");
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let (_dir, store) = store_with_records().await;

        store
            .add(
                "alpha",
                vec!["alpha_1".to_string()],
                vec![unit(0.0, 1.0)],
                vec!["replaced".to_string()],
                vec![meta(&[])],
            )
            .await
            .unwrap();

        let records = store.get_all(Some("alpha")).await;
        assert_eq!(records.len(), 2);
        let replaced = records.iter().find(|r| r.id == "alpha_1").unwrap();
        assert_eq!(replaced.text, "replaced");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let (_dir, store) = store_with_records().await;

        let result = store
            .add(
                "alpha",
                vec!["bad".to_string()],
                vec![vec![1.0, 0.0, 0.0]],
                vec!["three dims".to_string()],
                vec![meta(&[])],
            )
            .await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_batch_length_mismatch_rejected() {
        let (_dir, store) = store_with_records().await;
        let result = store
            .add("alpha", vec!["x".to_string()], vec![], vec![], vec![])
            .await;
        assert!(matches!(result, Err(StoreError::BatchMismatch(_))));
    }

    #[tokio::test]
    async fn test_persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VectorStore::open(dir.path()).unwrap();
            store
                .add(
                    "persisted",
                    vec!["p_1".to_string()],
                    vec![unit(1.0, 0.0)],
                    vec!["kept".to_string()],
                    vec![meta(&[("document_id", Value::from("doc-9"))])],
                )
                .await
                .unwrap();
        }

        let reopened = VectorStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list_contexts().await, vec!["persisted"]);
        let records = reopened.get_all(Some("persisted")).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "kept");
    }

    #[tokio::test]
    async fn test_delete_by_ids_and_ids_where() {
        let (_dir, store) = store_with_records().await;

        let ids = store.ids_where("alpha", "document_id", "doc-1").await;
        assert_eq!(ids, vec!["alpha_1".to_string()]);

        let removed = store.delete("alpha", &ids).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get_all(Some("alpha")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_drops_everything() {
        let (dir, store) = store_with_records().await;
        store.get_or_create_collection("beta").await.unwrap();

        store.reset().await.unwrap();
        assert!(store.list_contexts().await.is_empty());

        // Files are gone too: a reopen sees nothing.
        let reopened = VectorStore::open(dir.path()).unwrap();
        assert!(reopened.list_contexts().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_contexts_strips_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        store.get_or_create_collection("aws").await.unwrap();
        store.get_or_create_collection("healthcare").await.unwrap();

        assert_eq!(store.list_contexts().await, vec!["aws", "healthcare"]);
    }
}
