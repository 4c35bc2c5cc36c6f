use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use reqwest::Client;
use tracing::debug;

/// Models that accept an extended thinking budget
pub const THINKING_MODELS: &[&str] = &[
    "claude-opus-4",
    "claude-sonnet-4",
    "claude-3-7-sonnet",
    "deepseek-r1",
];

pub const DEFAULT_REMOTE_MODEL: &str = "claude-3-7-sonnet";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.2:3b";

/// Whether thinking mode can be honoured for this model on a remote server
pub fn supports_thinking(model: &str) -> bool {
    THINKING_MODELS.iter().any(|m| model.contains(m))
}

/// The reasoning boundary. Everything the core asks a model goes through here.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String>;
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama) -> Self {
        Self { client }
    }

    /// Build from a host string such as `http://localhost:11434`
    pub fn from_host(host: &str) -> Result<Self> {
        let trimmed = host.trim_end_matches('/');
        let (base, port) = match trimmed.rsplit_once(':') {
            Some((base, port)) if !base.ends_with("http") && !base.ends_with("https") => {
                let port: u16 = port.parse().with_context(|| format!("Invalid Ollama port in '{}'", host))?;
                (base.to_string(), port)
            }
            _ => (trimmed.to_string(), 11434),
        };
        if !base.starts_with("http://") && !base.starts_with("https://") {
            anyhow::bail!("Ollama host must start with http:// or https://, got '{}'", host);
        }
        Ok(Self::new(ollama_rs::Ollama::new(base, port)))
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(ChatMessage::system(sys));
        }
        messages.push(ChatMessage::user(prompt));

        let res = self.client.send_chat_messages(ChatMessageRequest::new(
            model.to_string(),
            messages,
        )).await?;

        Ok(res.message.content)
    }
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    thinking: bool,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            thinking: false,
        }
    }

    /// Request an extended thinking budget on every call
    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(&self, model: &str, prompt: String, system: Option<String>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let thinking = self.thinking && supports_thinking(model);
        let body = if thinking {
            json!({
                "model": model,
                "messages": messages,
                "temperature": 1.0,
                "max_tokens": 4026,
                "thinking": { "type": "enabled", "budget_tokens": 8000 },
            })
        } else {
            json!({
                "model": model,
                "messages": messages,
                "temperature": 0.95,
                "top_p": 0.95,
                "max_tokens": 4096,
            })
        };
        debug!("Calling {} (thinking: {})", model, thinking);

        let mut request = self.client.post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to parse content from OpenAI response")?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_thinking() {
        assert!(supports_thinking("us.anthropic.claude-sonnet-4-20250514-v1:0"));
        assert!(!supports_thinking("llama3.2:3b"));
    }

    #[test]
    fn test_ollama_host_parsing() {
        assert!(OllamaProvider::from_host("http://localhost:11434").is_ok());
        assert!(OllamaProvider::from_host("http://localhost").is_ok());
        assert!(OllamaProvider::from_host("localhost:11434").is_err());
        assert!(OllamaProvider::from_host("http://localhost:notaport").is_err());
    }
}
