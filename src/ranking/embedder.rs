/// Text and image embeddings for ranking
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Maps text and images into one shared vector space
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_image(&self, image: &Path) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding server reached over HTTP.
///
/// `POST {endpoint}/embed/text` takes `{"text": ...}`; `POST
/// {endpoint}/embed/image` takes a multipart `image` file. Both answer with
/// `{"embedding": [...]}`.
pub struct RemoteEmbedder {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteEmbedder {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.endpoint, route)
    }

    async fn read_embedding(response: reqwest::Response) -> Result<Vec<f32>> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Embedding server error {}: {}", status, text));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(anyhow!("Embedding server returned an empty vector"));
        }
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.url("embed/text");
        debug!("Embedding text at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&TextRequest { text })
            .send()
            .await?;
        Self::read_embedding(response).await
    }

    async fn embed_image(&self, image: &Path) -> Result<Vec<f32>> {
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("cannot read frame {}", image.display()))?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame.jpg".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(self.url("embed/image"))
            .multipart(form)
            .send()
            .await?;
        Self::read_embedding(response).await
    }
}
