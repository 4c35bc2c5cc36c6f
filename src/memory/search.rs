//! Managed search cluster adapter (k-NN index)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{Embedder, MemoryBackend, MemoryRecord};

pub struct SearchClusterMemory {
    client: Client,
    url: String,
    index: String,
    username: String,
    password: String,
    embedder: Arc<dyn Embedder>,
}

impl SearchClusterMemory {
    pub fn new(
        url: impl Into<String>,
        namespace: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for search cluster")?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            index: Self::index_name(namespace),
            username: username.into(),
            password: password.into(),
            embedder,
        })
    }

    /// Index names must be lowercase and free of path characters
    fn index_name(namespace: &str) -> String {
        let cleaned: String = namespace
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("memory-{}", cleaned.trim_start_matches(['_', '-']))
    }

    fn parse_hits(body: &Value) -> Result<Vec<MemoryRecord>> {
        let hits = body["hits"]["hits"].as_array().context("Search response has no hits array")?;
        hits.iter()
            .map(|hit| serde_json::from_value(hit["_source"].clone()).context("Malformed memory document"))
            .collect()
    }
}

#[async_trait]
impl MemoryBackend for SearchClusterMemory {
    fn kind(&self) -> &'static str {
        "search"
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<MemoryRecord>> {
        let resp = self.client.post(format!("{}/{}/_search", self.url, self.index))
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "size": k,
                "query": { "knn": { "embedding": { "vector": vector, "k": k } } }
            }))
            .send().await?;

        // A missing index just means nothing has been stored yet
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: Value = resp.error_for_status()?.json().await?;
        Self::parse_hits(&body)
    }

    async fn append(&self, record: MemoryRecord) -> Result<()> {
        self.client.put(format!("{}/{}/_doc/{}?refresh=true", self.url, self.index, record.id))
            .basic_auth(&self.username, Some(&self.password))
            .json(&record)
            .send().await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_name_is_sanitized() {
        assert_eq!(SearchClusterMemory::index_name("Meta Agent/prod"), "memory-meta_agent_prod");
    }

    #[test]
    fn test_parse_hits() {
        let record = MemoryRecord::new("o", vec![0.5, 0.5], "ok", true);
        let body = json!({ "hits": { "hits": [ { "_id": record.id, "_source": record } ] } });
        let parsed = SearchClusterMemory::parse_hits(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].objective, "o");
    }
}
