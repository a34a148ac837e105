/// Settings shared by the HTTP embedders. Unset fields take the
/// provider's defaults when the embedder is built.
#[derive(Debug, Clone, Default)]
pub struct EmbedConfig {
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub base_url: Option<String>,
    /// Texts per request; larger inputs are split.
    pub max_batch: Option<usize>,
}

impl EmbedConfig {
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string()).filter(|m| !m.is_empty());
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = Some(dim).filter(|d| *d > 0);
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        let url = url.trim_end_matches('/');
        self.base_url = Some(url.to_string()).filter(|u| !u.is_empty());
        self
    }

    pub fn with_max_batch(mut self, n: usize) -> Self {
        self.max_batch = Some(n).filter(|n| *n > 0);
        self
    }

    /// Identifies the embedding space: `{model}/{dimension}`.
    pub(crate) fn version(model: &str, dimension: usize) -> String {
        format!("{model}/{dimension}")
    }
}
