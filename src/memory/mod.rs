//! Memory System Module
//!
//! Persists (objective, outcome, embedding) records and retrieves the most
//! similar ones for new objectives. The backend is chosen once at open time.

mod record;
mod embedder;
mod local;
mod cloud;
mod search;
mod store;

pub use record::{MemoryRecord, ScoredRecord};
pub use embedder::{normalize, Embedder, HashingEmbedder, DEFAULT_DIMENSION};
#[cfg(feature = "fastembed")]
pub use embedder::FastEmbedder;
pub use local::{DimensionMismatch, LocalVectorIndex};
pub use cloud::ManagedMemoryService;
pub use search::SearchClusterMemory;
pub use store::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::agent::{AgentError, AgentResult};
use crate::config::{MemoryBackendKind, MemoryConfig};

/// Storage adapter behind the Memory Store
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Short label used in logs ("local", "cloud", "search")
    fn kind(&self) -> &'static str;

    /// Fixed embedding dimensionality of this backend
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Up to `k` nearest records to `vector`
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<MemoryRecord>>;

    /// Append one record. Records are never updated or removed.
    async fn append(&self, record: MemoryRecord) -> Result<()>;

    /// Persist buffered writes
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Cosine similarity, 0.0 for mismatched or zero-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Retrieval order: higher similarity first, then newer records first
pub fn rank_order(a: (&MemoryRecord, f32), b: (&MemoryRecord, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.0.created_at.cmp(&a.0.created_at))
}

/// Build the backend selected in configuration
pub fn open_backend(config: &MemoryConfig, embedder: Arc<dyn Embedder>) -> AgentResult<Arc<dyn MemoryBackend>> {
    if embedder.dimension() != config.dimension {
        return Err(AgentError::Configuration(format!(
            "memory dimension is {} but the embedder produces {}",
            config.dimension,
            embedder.dimension()
        )));
    }

    match config.backend {
        MemoryBackendKind::Local => {
            let index = LocalVectorIndex::open(&config.path, &config.namespace, embedder)
                .map_err(|e| {
                    if e.downcast_ref::<DimensionMismatch>().is_some() {
                        AgentError::Configuration(format!("{:#}", e))
                    } else {
                        AgentError::MemoryUnavailable(format!("{:#}", e))
                    }
                })?;
            Ok(Arc::new(index))
        }
        MemoryBackendKind::Cloud => {
            let url = required(&config.url, "memory.url (AGENCY_MEMORY_URL)")?;
            let key = required(&config.api_key, "memory.api_key (AGENCY_MEMORY_API_KEY)")?;
            let service = ManagedMemoryService::new(url, key, config.namespace.clone(), embedder)
                .map_err(|e| AgentError::MemoryUnavailable(format!("{:#}", e)))?;
            Ok(Arc::new(service))
        }
        MemoryBackendKind::Search => {
            let url = required(&config.url, "memory.url (AGENCY_MEMORY_URL)")?;
            let user = required(&config.username, "memory.username (AGENCY_SEARCH_USERNAME)")?;
            let pass = required(&config.password, "memory.password (AGENCY_SEARCH_PASSWORD)")?;
            let cluster = SearchClusterMemory::new(url, &config.namespace, user, pass, embedder)
                .map_err(|e| AgentError::MemoryUnavailable(format!("{:#}", e)))?;
            Ok(Arc::new(cluster))
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> AgentResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AgentError::Configuration(format!("{} is required for this memory backend", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_order_breaks_ties_by_recency() {
        let old = MemoryRecord::new("a", vec![1.0], "x", true)
            .with_created_at(Utc::now() - Duration::hours(1));
        let new = MemoryRecord::new("b", vec![1.0], "x", true);
        assert_eq!(rank_order((&new, 0.5), (&old, 0.5)), Ordering::Less);
        assert_eq!(rank_order((&old, 0.9), (&new, 0.5)), Ordering::Less);
    }

    #[test]
    fn test_cloud_backend_requires_key() {
        let config = MemoryConfig {
            backend: MemoryBackendKind::Cloud,
            url: Some("https://memory.example.com".into()),
            ..MemoryConfig::default()
        };
        let err = open_backend(&config, Arc::new(HashingEmbedder::default())).err();
        assert!(matches!(err, Some(AgentError::Configuration(_))));
    }

    #[test]
    fn test_embedder_dimension_must_match() {
        let config = MemoryConfig { dimension: 128, ..MemoryConfig::default() };
        let err = open_backend(&config, Arc::new(HashingEmbedder::new(64))).err();
        assert!(matches!(err, Some(AgentError::Configuration(_))));
    }
}
