//! Memory Store
//!
//! Facade over one backend. Retrieval and storage degrade to no-ops when the
//! backend is unavailable; the `try_` variants surface the error instead.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{cosine_similarity, open_backend, rank_order, Embedder, MemoryBackend, MemoryRecord, ScoredRecord};
use crate::agent::{AgentError, AgentResult};
use crate::config::MemoryConfig;

#[derive(Clone)]
pub struct MemoryStore {
    backend: Option<Arc<dyn MemoryBackend>>,
}

impl MemoryStore {
    /// Open the configured backend. A disabled memory yields a no-op store.
    pub fn open(config: &MemoryConfig, embedder: Arc<dyn Embedder>) -> AgentResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let backend = open_backend(config, embedder)?;
        info!("Memory store opened ({} backend, namespace '{}')", backend.kind(), config.namespace);
        Ok(Self { backend: Some(backend) })
    }

    pub fn with_backend(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend: Some(backend) }
    }

    /// Store that remembers nothing and never warns
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Up to `k` records most similar to `objective`, best first
    pub async fn retrieve(&self, objective: &str, k: usize) -> Vec<ScoredRecord> {
        match self.try_retrieve(objective, k).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Memory retrieval skipped: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_retrieve(&self, objective: &str, k: usize) -> AgentResult<Vec<ScoredRecord>> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = backend.embed(objective).await.map_err(unavailable)?;
        let candidates = backend.query(&vector, k).await.map_err(unavailable)?;

        // Re-score locally so every backend ranks the same way
        let mut scored: Vec<ScoredRecord> = candidates
            .into_iter()
            .map(|r| {
                let score = cosine_similarity(&vector, &r.embedding);
                (r, score)
            })
            .collect();
        scored.sort_by(|a, b| rank_order((&a.0, a.1), (&b.0, b.1)));
        scored.truncate(k);

        debug!("Retrieved {} memories for objective", scored.len());
        Ok(scored)
    }

    /// Append a record, logging instead of failing when the backend is down
    pub async fn store(&self, record: MemoryRecord) {
        if let Err(e) = self.try_store(record).await {
            warn!("Memory store skipped: {}", e);
        }
    }

    pub async fn try_store(&self, record: MemoryRecord) -> AgentResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        backend.append(record).await.map_err(unavailable)
    }

    /// Embed the objective and append the run's summary record.
    /// Returns whether a record was written.
    pub async fn record_run(
        &self,
        objective: &str,
        outcome_summary: &str,
        success: bool,
        tags: Vec<String>,
    ) -> AgentResult<bool> {
        let Some(backend) = &self.backend else {
            return Ok(false);
        };
        let embedding = backend.embed(objective).await.map_err(unavailable)?;
        let record = MemoryRecord::new(objective, embedding, outcome_summary, success).with_tags(tags);
        self.try_store(record).await?;
        Ok(true)
    }

    /// Flush buffered writes. Call once at the end of a run.
    pub async fn close(&self) -> AgentResult<()> {
        if let Some(backend) = &self.backend {
            backend.flush().await.map_err(unavailable)?;
            debug!("Memory store flushed ({})", backend.kind());
        }
        Ok(())
    }
}

fn unavailable(e: anyhow::Error) -> AgentError {
    AgentError::MemoryUnavailable(format!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HashingEmbedder, LocalVectorIndex};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    struct DownBackend;

    #[async_trait]
    impl MemoryBackend for DownBackend {
        fn kind(&self) -> &'static str { "down" }
        fn dimension(&self) -> usize { 4 }
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
        async fn query(&self, _vector: &[f32], _k: usize) -> anyhow::Result<Vec<MemoryRecord>> {
            anyhow::bail!("connection refused")
        }
        async fn append(&self, _record: MemoryRecord) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    fn local_store(dir: &std::path::Path) -> MemoryStore {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
        let index = LocalVectorIndex::open(dir, "test", embedder).unwrap();
        MemoryStore::with_backend(Arc::new(index))
    }

    #[tokio::test]
    async fn test_round_trip_similarity() {
        let dir = tempdir().unwrap();
        let store = local_store(dir.path());
        store.record_run("compile the quarterly sales report", "done", true, vec![]).await.unwrap();

        let hits = store.retrieve("compile the quarterly sales report", 5).await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].1 > 0.99);
    }

    #[tokio::test]
    async fn test_retrieve_respects_k_and_order() {
        let dir = tempdir().unwrap();
        let store = local_store(dir.path());
        for text in ["plot rainfall data", "plot rainfall data for march", "bake bread", "sort a list"] {
            store.record_run(text, "ok", true, vec![]).await.unwrap();
        }

        let hits = store.retrieve("plot rainfall data", 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.objective, "plot rainfall data");
        assert!(hits[0].1 >= hits[1].1);
    }

    #[tokio::test]
    async fn test_equal_scores_prefer_newest() {
        let dir = tempdir().unwrap();
        let store = local_store(dir.path());
        let embedder = HashingEmbedder::default();
        let vector = embedder.embed_sync("same text");

        let old = MemoryRecord::new("same text", vector.clone(), "old", true)
            .with_created_at(Utc::now() - Duration::days(1));
        let new = MemoryRecord::new("same text", vector, "new", true);
        store.try_store(old).await.unwrap();
        store.try_store(new).await.unwrap();

        let hits = store.retrieve("same text", 2).await;
        assert_eq!(hits[0].0.outcome_summary, "new");
        assert_eq!(hits[1].0.outcome_summary, "old");
    }

    #[tokio::test]
    async fn test_unavailable_backend_degrades() {
        let store = MemoryStore::with_backend(Arc::new(DownBackend));
        assert!(store.retrieve("anything", 3).await.is_empty());
        store.store(MemoryRecord::new("x", vec![0.0; 4], "y", false)).await;

        let err = store.try_retrieve("anything", 3).await.unwrap_err();
        assert!(matches!(err, AgentError::MemoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disabled_store_is_noop() {
        let store = MemoryStore::disabled();
        assert!(!store.is_enabled());
        assert!(!store.record_run("x", "y", true, vec![]).await.unwrap());
        assert!(store.try_retrieve("x", 3).await.unwrap().is_empty());
    }
}
