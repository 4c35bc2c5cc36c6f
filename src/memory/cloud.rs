//! Managed cloud memory service adapter
//!
//! Talks JSON over HTTP to a hosted memory service. Embeddings are computed
//! locally so the vector space matches the other backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Embedder, MemoryBackend, MemoryRecord};

pub struct ManagedMemoryService {
    client: Client,
    url: String,
    api_key: String,
    namespace: String,
    embedder: Arc<dyn Embedder>,
}

impl ManagedMemoryService {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        namespace: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for memory service")?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: namespace.into(),
            embedder,
        })
    }
}

#[async_trait]
impl MemoryBackend for ManagedMemoryService {
    fn kind(&self) -> &'static str {
        "cloud"
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<MemoryRecord>> {
        let resp = self.client.post(format!("{}/v1/memories/search", self.url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "namespace": self.namespace,
                "vector": vector,
                "top_k": k,
            }))
            .send().await?
            .error_for_status()?;
        let data: Value = resp.json().await?;
        let records: Vec<MemoryRecord> = serde_json::from_value(data["records"].clone())
            .context("Memory service returned malformed records")?;
        debug!("Memory service returned {} records", records.len());
        Ok(records)
    }

    async fn append(&self, record: MemoryRecord) -> Result<()> {
        self.client.post(format!("{}/v1/memories", self.url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "namespace": self.namespace, "record": record }))
            .send().await?
            .error_for_status()?;
        Ok(())
    }
}
