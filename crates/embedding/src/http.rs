//! `HttpEmbedder` — calls an Ollama-style embeddings endpoint and
//! surfaces failures as a typed `Result`.

use std::time::Duration;

use async_trait::async_trait;

use crate::{EmbedError, Embedder};

/// Calls an Ollama-style `POST {base_url}/api/embeddings` endpoint with
/// `{"model": ..., "prompt": text}` and reads back `{"embedding": [...]}`.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(model: impl Into<String>, base_url: impl AsRef<str>) -> Self {
        let base_url = base_url.as_ref();
        let url = format!("{}/api/embeddings", base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = serde_json::json!({ "model": self.model, "prompt": text });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Request(e.into()))?;
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbedError::Request(e.into()))?;
        let embedding: Vec<f32> = json["embedding"]
            .as_array()
            .ok_or(EmbedError::EmptyResponse)?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        if embedding.is_empty() {
            return Err(EmbedError::EmptyResponse);
        }
        Ok(embedding)
    }
}
