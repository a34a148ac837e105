use crate::error::EmbedError;

/// Embedder converts text into dense float32 vectors.
///
/// Vectors produced by two embedders are only comparable when both report
/// the same [`Embedder::model_version`]. Callers store the version next to
/// every vector they persist and refuse to compare across versions.
///
/// Implementations must be safe for concurrent use (Send + Sync).
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Return the embedding vector for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Return embedding vectors for multiple texts, in input order.
    /// Implementations may split large batches into smaller API calls.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Return the dimensionality of the output vectors.
    fn dimension(&self) -> usize;

    /// Identify the embedding space, e.g. `text-embedding-3-small/1536`.
    fn model_version(&self) -> &str;
}
