//! Language model clients.
//!
//! - **[`OllamaClient`]**: `POST /api/generate` on a local Ollama instance (default).
//! - **[`OpenAIChatClient`]**: `POST /v1/chat/completions` on any OpenAI-compatible server.
//!
//! Every call is bounded by `llm.timeout_secs`; a stalled call surfaces as
//! [`Error::GenerationTimeout`] so the caller can retry with a smaller prompt.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use academic_rag_core::llm::LanguageModel;
use academic_rag_core::Error;

use crate::config::LlmConfig;

/// Instantiate the client named by `config.provider`.
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Run `fut` under `timeout_secs`, mapping transport failures to core errors.
async fn bounded<F>(timeout_secs: u64, fut: F) -> academic_rag_core::Result<serde_json::Value>
where
    F: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
{
    let call = async {
        let response = fut.await.map_err(|e| transport_error(e, timeout_secs))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body_text));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| transport_error(e, timeout_secs))
    };
    match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
        Ok(result) => result,
        Err(_) => Err(Error::GenerationTimeout(timeout_secs)),
    }
}

/// Server errors and rate limits are worth one more attempt; other client
/// errors are not.
fn status_error(status: reqwest::StatusCode, body: &str) -> Error {
    let message = format!("HTTP {}: {}", status, body);
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Error::Generation(message)
    } else {
        Error::GenerationRejected(message)
    }
}

fn transport_error(e: reqwest::Error, timeout_secs: u64) -> Error {
    if e.is_timeout() {
        Error::GenerationTimeout(timeout_secs)
    } else {
        Error::Generation(e.to_string())
    }
}

// ============ Ollama ============

pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    num_ctx: usize,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            num_ctx: config.max_input_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_ctx": self.num_ctx,
            },
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> academic_rag_core::Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama generate");
        let request = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&self.request_body(prompt))
            .send();
        let json = bounded(self.timeout_secs, request).await?;
        parse_ollama_generate(&json).map_err(|e| Error::GenerationRejected(e.to_string()))
    }
}

fn parse_ollama_generate(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Ollama error: {}", err);
    }
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response"))
}

// ============ OpenAI-compatible chat ============

pub struct OpenAIChatClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAIChatClient {
    /// `OPENAI_API_KEY` is sent when set; local compatible servers may not
    /// need one.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: config.url.trim_end_matches('/').to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> academic_rag_core::Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "openai chat");
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let json = bounded(self.timeout_secs, request.send()).await?;
        parse_chat_completion(&json).map_err(|e| Error::GenerationRejected(e.to_string()))
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid chat completion: missing choices[0].message.content"))
}
