pub mod cosine;
pub mod error;
pub mod filter;
pub mod memory;
pub mod vecstore;

pub use cosine::{cosine_distance, cosine_similarity};
pub use error::VecError;
pub use filter::Filter;
pub use memory::MemoryIndex;
pub use vecstore::{Match, Metadata, VecIndex};
