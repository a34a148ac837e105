//! Alert inspection and operator actions.

use clap::Args;
use regwatch_compliance::{AlertAction, AlertFilter, AlertStatus, Category, Severity};

use super::{open_book, output_result};
use crate::Cli;

/// List stored alerts, most severe first.
#[derive(Args)]
pub struct AlertsCommand {
    /// Only alerts in this status (open, acknowledged, dismissed, merged)
    #[arg(long)]
    status: Option<AlertStatus>,

    /// Only alerts at or above this severity
    #[arg(long)]
    min_severity: Option<Severity>,

    /// Only alerts for this speaker
    #[arg(long)]
    speaker: Option<String>,

    /// Only alerts in this category
    #[arg(long)]
    category: Option<Category>,

    /// Maximum number of alerts to print
    #[arg(long)]
    limit: Option<usize>,

    /// Print aggregate statistics instead of alerts
    #[arg(long)]
    stats: bool,
}

impl AlertsCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let book = open_book(cli)?;
        if self.stats {
            return output_result(cli, &book.stats());
        }

        let mut filter = AlertFilter::new();
        if let Some(status) = self.status {
            filter = filter.status(status);
        }
        if let Some(severity) = self.min_severity {
            filter = filter.min_severity(severity);
        }
        if let Some(speaker) = &self.speaker {
            filter = filter.speaker(speaker.clone());
        }
        filter.category = self.category;
        filter.limit = self.limit;

        output_result(cli, &book.list(&filter))
    }
}

/// Apply an operator action to one alert.
#[derive(Args)]
pub struct ActCommand {
    /// Alert ID
    alert_id: String,

    /// Who is acting, recorded on the alert
    #[arg(long)]
    by: Option<String>,
}

impl ActCommand {
    pub fn run(&self, cli: &Cli, action: AlertAction) -> anyhow::Result<()> {
        let book = open_book(cli)?;
        let alert = book.apply(&self.alert_id, action, self.by.as_deref())?;
        tracing::info!(alert_id = %alert.alert_id, status = %alert.status, "{action} applied");
        output_result(cli, &alert)
    }
}
