//! Local on-disk vector index
//!
//! All records live in RAM behind a lock and are written back as one
//! zstd-compressed bincode file per namespace on flush.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{cosine_similarity, rank_order, Embedder, MemoryBackend, MemoryRecord};

/// The file on disk was written by an embedder of another dimension
#[derive(Debug, Error)]
#[error("dimension mismatch: index {path:?} holds {found}-d embeddings but the embedder produces {expected}-d")]
pub struct DimensionMismatch {
    pub path: PathBuf,
    pub found: usize,
    pub expected: usize,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    records: Vec<MemoryRecord>,
}

pub struct LocalVectorIndex {
    path: PathBuf,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<MemoryRecord>>,
    dirty: AtomicBool,
}

impl LocalVectorIndex {
    /// Open (or create on first flush) `<dir>/<namespace>.mem`
    pub fn open(dir: impl AsRef<Path>, namespace: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = dir.as_ref().join(format!("{}.mem", namespace));
        let dimension = embedder.dimension();
        let records = Self::load(&path, dimension)?;
        info!("Opened local memory index at {:?} ({} records)", path, records.len());

        Ok(Self {
            path,
            dimension,
            embedder,
            records: RwLock::new(records),
            dirty: AtomicBool::new(false),
        })
    }

    fn load(path: &Path, dimension: usize) -> Result<Vec<MemoryRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path).with_context(|| format!("Failed to open memory index {:?}", path))?;
        let decoder = zstd::stream::read::Decoder::new(BufReader::new(file))?;
        let index: IndexFile = bincode::deserialize_from(decoder)
            .with_context(|| format!("Failed to decode memory index {:?}", path))?;

        if index.dimension != dimension {
            bail!(DimensionMismatch { path: path.to_path_buf(), found: index.dimension, expected: dimension });
        }
        Ok(index.records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MemoryBackend for LocalVectorIndex {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<MemoryRecord>> {
        let records = self.records.read().await;

        let mut scored: Vec<(f32, &MemoryRecord)> = records
            .par_iter()
            .map(|r| (cosine_similarity(vector, &r.embedding), r))
            .collect();

        scored.sort_by(|a, b| rank_order((a.1, a.0), (b.1, b.0)));
        debug!("Local index scored {} records", scored.len());

        Ok(scored.into_iter().take(k).map(|(_, r)| r.clone()).collect())
    }

    async fn append(&self, record: MemoryRecord) -> Result<()> {
        if record.embedding.len() != self.dimension {
            bail!(
                "dimension mismatch: record has {} dimensions, index expects {}",
                record.embedding.len(),
                self.dimension
            );
        }
        self.records.write().await.push(record);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = IndexFile {
            dimension: self.dimension,
            records: self.records.read().await.clone(),
        };
        let path = self.path.clone();

        let written = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("mem.tmp");
            {
                let file = File::create(&tmp)?;
                let mut encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), 3)?;
                bincode::serialize_into(&mut encoder, &snapshot)?;
                encoder.finish()?;
            }
            std::fs::rename(&tmp, &path)?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|r| r);

        if let Err(e) = written {
            // Keep the records pending so the next flush retries
            self.dirty.store(true, Ordering::SeqCst);
            warn!("Memory index flush to {:?} failed: {:#}", self.path, e);
            return Err(e);
        }
        debug!("Flushed memory index to {:?}", self.path);
        Ok(())
    }
}
