//! Semantic augmentation for regulation matches.
//!
//! A [`Judge`] reads a transcript excerpt next to the regulation passage it
//! matched and proposes moving the severity tier up or down by one step,
//! e.g. a hypothetical discussion versus an actual admission.

pub mod error;
pub mod judge;
pub mod openai;
pub(crate) mod parse;
mod prompt;

pub use error::JudgeError;
pub use judge::{Judge, Judgment};
pub use openai::{OpenAIJudge, OpenAIJudgeConfig};
