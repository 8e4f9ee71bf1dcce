//! OpenAI-compatible embedding client.
//!
//! Talks to any `/embeddings` endpoint that speaks the OpenAI wire shape —
//! api.openai.com, Ollama, LM Studio, or a self-hosted gateway. Base URL and
//! key come from config (see `core::config::resolve_embed_base_url`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;

use super::Embedder;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Expected vector dimension; a mismatched response is an
    /// `EmbeddingFailure`, never silently stored.
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, PipelineError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .json(&EmbeddingRequest { input: text, model });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Embedding(format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Embedding(format!(
                "embedding endpoint returned {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Embedding(format!("malformed embedding response: {e}")))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| PipelineError::Embedding("embedding response had no data".into()))?;

        if vector.len() != self.dimension {
            return Err(PipelineError::Embedding(format!(
                "model {model} returned dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }

        Ok(vector)
    }
}
