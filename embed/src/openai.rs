use reqwest::Client;

use crate::config::EmbedConfig;
use crate::embed::Embedder;
use crate::error::EmbedError;

/// OpenAI embedding models.
pub const MODEL_OPENAI_3_SMALL: &str = "text-embedding-3-small";
pub const MODEL_OPENAI_3_LARGE: &str = "text-embedding-3-large";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MAX_BATCH: usize = 2048;
const OPENAI_DEFAULT_DIM: usize = 1536;

/// OpenAI embedder using the OpenAI embeddings API.
///
/// Also works with any OpenAI-compatible provider via `with_config`
/// and `EmbedConfig::with_base_url`. The model version is
/// `"{model}/{dimension}"`, so changing either one opens a new
/// embedding space.
pub struct OpenAI {
    client: Client,
    api_key: String,
    model: String,
    dim: usize,
    base_url: String,
    max_batch: usize,
    version: String,
}

impl OpenAI {
    pub fn new(api_key: &str) -> Self {
        Self::with_config(api_key, EmbedConfig::default())
    }

    pub fn with_config(api_key: &str, cfg: EmbedConfig) -> Self {
        let model = cfg.model.unwrap_or_else(|| MODEL_OPENAI_3_SMALL.to_string());
        let dim = cfg.dimension.unwrap_or(OPENAI_DEFAULT_DIM);
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            version: EmbedConfig::version(&model, dim),
            model,
            dim,
            base_url: cfg.base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            max_batch: cfg.max_batch.unwrap_or(OPENAI_MAX_BATCH),
        }
    }

    async fn call_api(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        crate::openai_compat::call_embedding_api(
            &self.client,
            &self.api_key,
            &self.base_url,
            &self.model,
            self.dim,
            texts,
        )
        .await
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAI {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let vecs = self.embed_batch(&[text]).await?;
        vecs.into_iter().next().ok_or(EmbedError::MissingIndex(0))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch) {
            let vecs = self.call_api(chunk).await?;
            result.extend(vecs);
        }
        Ok(result)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}
