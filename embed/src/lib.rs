pub mod config;
pub mod embed;
pub mod error;
pub mod hash;
pub mod openai;
pub(crate) mod openai_compat;

pub use config::EmbedConfig;
pub use embed::Embedder;
pub use error::EmbedError;
pub use hash::HashEmbedder;
pub use openai::OpenAI;
