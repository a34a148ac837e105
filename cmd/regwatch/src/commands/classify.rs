//! Offline document classification.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use regwatch_compliance::{Category, KeywordClassifier, classify_document};

use super::{load_config, output_result};
use crate::Cli;

/// Classify a regulation document and print its category, keywords and
/// obligation phrases. Nothing is ingested or stored.
#[derive(Args)]
pub struct ClassifyCommand {
    /// Path to a plain-text document
    file: PathBuf,

    /// Manual category override
    #[arg(long)]
    category: Option<Category>,
}

impl ClassifyCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = load_config(cli)?;
        let text = std::fs::read_to_string(&self.file)
            .with_context(|| format!("read {}", self.file.display()))?;

        let classifier = KeywordClassifier::new()?;
        let classification = classify_document(
            &classifier,
            &text,
            self.category,
            cfg.compliance.ingest.max_document_chars,
        )?;
        output_result(cli, &classification)
    }
}
