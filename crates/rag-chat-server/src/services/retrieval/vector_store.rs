//! File-backed vector store.
//!
//! A store directory holds `index.json` (`{"dimension": d, "vectors": [[..]]}`)
//! and `metadata.json` (an array of objects; `text` is the chunk text, every
//! other field is passed through as result metadata).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{RetrievalBackendFactory, RetrievalHandle, RetrievalResult};
use crate::services::embedding_service::EmbeddingProvider;
use crate::utils::error::ChatError;
use crate::utils::similarity::cosine_similarity;

pub const INDEX_FILE: &str = "index.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Deserialize)]
struct IndexFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Index vectors and per-vector metadata, fully loaded in memory.
#[derive(Debug)]
pub struct VectorStore {
    store_dir: PathBuf,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Map<String, Value>>,
}

impl VectorStore {
    /// Blocking load of both files. Call from a blocking context.
    pub fn load(store_dir: impl AsRef<Path>) -> Result<Self, ChatError> {
        let start_time = Instant::now();
        let store_dir = store_dir.as_ref().to_path_buf();
        let index_path = store_dir.join(INDEX_FILE);
        let metadata_path = store_dir.join(METADATA_FILE);

        if !index_path.exists() {
            return Err(ChatError::unavailable(format!(
                "Vector index not found at {}",
                index_path.display()
            )));
        }
        if !metadata_path.exists() {
            return Err(ChatError::unavailable(format!(
                "Metadata file not found at {}",
                metadata_path.display()
            )));
        }

        info!("Loading vector index from {}", index_path.display());
        let index: IndexFile = read_json(&index_path)?;

        if index.dimension == 0 {
            return Err(ChatError::unavailable("Vector index declares dimension 0"));
        }
        if let Some(pos) = index.vectors.iter().position(|v| v.len() != index.dimension) {
            return Err(ChatError::unavailable(format!(
                "Vector {} has dimension {}, index declares {}",
                pos,
                index.vectors[pos].len(),
                index.dimension
            )));
        }

        info!("Loading metadata from {}", metadata_path.display());
        let metadata: Vec<Map<String, Value>> = read_json(&metadata_path)?;

        if index.vectors.len() != metadata.len() {
            warn!(
                "Vector store mismatch: index has {} vectors, metadata contains {} entries",
                index.vectors.len(),
                metadata.len()
            );
        }

        info!(
            "Vector store {} loaded in {:.2?} ({} vectors, dim {})",
            store_dir.display(),
            start_time.elapsed(),
            index.vectors.len(),
            index.dimension
        );

        Ok(Self {
            store_dir,
            dimension: index.dimension,
            vectors: index.vectors,
            metadata,
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Brute-force cosine ranking of `query` against every stored vector.
    pub fn nearest(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievalResult>, ChatError> {
        if query.len() != self.dimension {
            return Err(ChatError::Validation(format!(
                "Embedding dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| cosine_similarity(query, vector).map(|score| (idx, score)))
            .collect::<Result<Vec<_>, _>>()?;

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k.min(self.vectors.len()));

        let results = scored
            .into_iter()
            .map(|(idx, score)| {
                let mut metadata = self.metadata.get(idx).cloned().unwrap_or_default();
                let text = match metadata.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                RetrievalResult {
                    id: idx,
                    score,
                    text,
                    metadata,
                }
            })
            .collect::<Vec<_>>();

        debug!("Search returned {} result(s)", results.len());
        Ok(results)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ChatError> {
    let file = File::open(path)
        .map_err(|e| ChatError::unavailable(format!("Failed to open {}: {}", path.display(), e)))?;

    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ChatError::unavailable(format!("Failed to parse {}: {}", path.display(), e)))
}

/// A loaded store paired with the query encoder.
pub struct VectorStoreHandle {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorStoreHandle {
    pub fn new(store: VectorStore, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl RetrievalHandle for VectorStoreHandle {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>, ChatError> {
        if query.trim().is_empty() {
            return Err(ChatError::invalid("Query text must not be empty"));
        }
        if top_k == 0 {
            return Err(ChatError::invalid("top_k must be a positive integer"));
        }

        info!("Embedding query for retrieval (top_k={})", top_k);
        let embed_start = Instant::now();
        let embedding = self.embedder.embed(query).await?;
        debug!("Embedding completed in {:.2?}", embed_start.elapsed());

        self.store.nearest(&embedding, top_k)
    }
}

/// Opens `VectorStoreHandle`s from store directories.
pub struct VectorStoreFactory {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorStoreFactory {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl RetrievalBackendFactory for VectorStoreFactory {
    async fn open(&self, location: &str) -> Result<Arc<dyn RetrievalHandle>, ChatError> {
        let store_dir = PathBuf::from(location);
        let store = tokio::task::spawn_blocking(move || VectorStore::load(store_dir))
            .await
            .map_err(|e| ChatError::Internal(format!("Vector store load task failed: {}", e)))??;

        Ok(Arc::new(VectorStoreHandle::new(store, self.embedder.clone())))
    }
}
