//! Language model trait.
//!
//! Concrete clients (Ollama, OpenAI-compatible) live in the app crate and
//! enforce their own timeouts, reporting a stalled call as
//! [`Error::GenerationTimeout`](crate::error::Error::GenerationTimeout).

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Complete `prompt`, returning the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
