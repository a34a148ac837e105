//! CLI commands module.

mod alerts;
mod classify;
mod run;

pub use alerts::{ActCommand, AlertsCommand};
pub use classify::ClassifyCommand;
pub use run::RunCommand;

use std::sync::Arc;

use anyhow::Result;
use regwatch_compliance::{AlertBook, AlertStore, RedbStore};
use serde::Serialize;

use crate::Cli;
use crate::config::CliConfig;

pub(crate) fn load_config(cli: &Cli) -> Result<CliConfig> {
    CliConfig::load(cli.config.as_deref())
}

pub(crate) fn open_store(cli: &Cli, cfg: &CliConfig) -> Result<Arc<dyn AlertStore>> {
    let path = cfg.db_path(cli.data_dir.as_deref())?;
    tracing::debug!(path = %path.display(), "opening state database");
    Ok(Arc::new(RedbStore::open(&path)?))
}

/// Loads the persisted alert book without starting a pipeline.
pub(crate) fn open_book(cli: &Cli) -> Result<AlertBook> {
    let cfg = load_config(cli)?;
    let store = open_store(cli, &cfg)?;
    let book = AlertBook::new(store, cfg.compliance.alerts.event_buffer);
    book.restore()?;
    Ok(book)
}

/// Writes a value as YAML, or pretty JSON with `--json`.
pub(crate) fn output_result<T: Serialize>(cli: &Cli, value: &T) -> Result<()> {
    let out = if cli.json {
        serde_json::to_string_pretty(value)?
    } else {
        serde_yaml::to_string(value)?
    };
    println!("{}", out.trim_end());
    Ok(())
}

/// Writes one record of a stream: a JSON line, or a YAML document.
pub(crate) fn output_record<T: Serialize>(cli: &Cli, value: &T) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("---\n{}", serde_yaml::to_string(value)?.trim_end());
    }
    Ok(())
}
