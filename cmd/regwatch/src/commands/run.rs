//! Document ingestion and transcript feed processing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use regwatch_compliance::{
    AlertDecision, DocumentStatus, DocumentUpload, ErrorKind, Pipeline, PipelineConfig,
    TranscriptSegment,
};
use regwatch_vecstore::MemoryIndex;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::{load_config, open_store, output_record, output_result};
use crate::Cli;

const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Ingest regulation documents, then match a transcript feed.
///
/// The feed is JSON Lines, one segment per line:
///   {"speaker_id":"spk-1","text":"...","start_time":12.0,"end_time":15.5,"stt_confidence":0.93}
///
/// Documents already ingested with identical text are not uploaded again;
/// their passages are rebuilt from the stored copy on start.
#[derive(Args)]
pub struct RunCommand {
    /// Directory of regulation documents (.txt, .md)
    #[arg(long)]
    docs: Option<PathBuf>,

    /// Transcript feed; `-` reads stdin
    #[arg(long)]
    feed: Option<PathBuf>,
}

#[derive(Serialize)]
struct DocumentSummary {
    document_id: String,
    title: String,
    status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    passage_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct SegmentRecord<'a> {
    line: usize,
    speaker_id: &'a str,
    start_time: f64,
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    citation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Default, Serialize)]
struct FeedSummary {
    segments: usize,
    new_alerts: usize,
    merged: usize,
    suppressed: usize,
    errors: usize,
}

impl RunCommand {
    pub async fn run(&self, cli: &Cli) -> Result<()> {
        let cfg = load_config(cli)?;
        let store = open_store(cli, &cfg)?;

        let pipeline = Pipeline::new(PipelineConfig {
            config: cfg.compliance.clone(),
            embedder: cfg.build_embedder()?,
            index: Arc::new(MemoryIndex::new()),
            store,
            judge: cfg.build_judge()?,
            classifier: None,
        })?;
        let report = pipeline.restore()?;
        tracing::info!(
            alerts = report.alerts,
            documents = report.documents,
            reindexing = report.reindexing,
            "state restored"
        );

        if let Some(dir) = &self.docs {
            self.ingest_dir(cli, &pipeline, dir).await?;
        }
        // Wait for restored documents too, so the feed sees a complete
        // knowledge base.
        for doc in pipeline.list_documents() {
            if !doc.status.is_terminal() {
                pipeline.wait_document(&doc.document_id).await?;
            }
        }

        let Some(feed) = &self.feed else {
            return Ok(());
        };
        let summary = if feed.as_os_str() == "-" {
            process_feed(cli, &pipeline, BufReader::new(tokio::io::stdin())).await?
        } else {
            let file = tokio::fs::File::open(feed)
                .await
                .with_context(|| format!("open feed {}", feed.display()))?;
            process_feed(cli, &pipeline, BufReader::new(file)).await?
        };

        tracing::info!(
            segments = summary.segments,
            new_alerts = summary.new_alerts,
            errors = summary.errors,
            "feed finished"
        );
        if !cli.json {
            output_result(cli, &summary)?;
        }
        Ok(())
    }

    async fn ingest_dir(&self, cli: &Cli, pipeline: &Pipeline, dir: &Path) -> Result<()> {
        let mut ids = Vec::new();
        for path in list_documents(dir)? {
            let raw_text = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            let title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string();

            let existing = pipeline
                .list_documents()
                .into_iter()
                .find(|d| d.title == title && d.raw_text == raw_text);
            let receipt = match existing {
                Some(doc) if doc.status == DocumentStatus::Failed && doc.retryable => {
                    tracing::info!(title = %title, "retrying failed document");
                    pipeline.retry_document(&doc.document_id)?
                }
                Some(doc) => {
                    tracing::debug!(title = %title, status = %doc.status, "document unchanged");
                    ids.push(doc.document_id);
                    continue;
                }
                None => match pipeline.upload_document(DocumentUpload {
                    title: title.clone(),
                    raw_text,
                    category: None,
                }) {
                    Ok(receipt) => receipt,
                    Err(e) if e.kind() == ErrorKind::Validation => {
                        tracing::warn!(title = %title, error = %e, "document rejected");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            ids.push(receipt.document_id);
        }

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let doc = pipeline.wait_document(&id).await?;
            summaries.push(DocumentSummary {
                document_id: doc.document_id,
                title: doc.title,
                status: doc.status,
                category: doc.category.map(|c| c.to_string()),
                passage_count: doc.passage_count,
                error: doc.last_error,
            });
        }
        if cli.json {
            for s in &summaries {
                output_record(cli, s)?;
            }
            Ok(())
        } else {
            output_result(cli, &summaries)
        }
    }
}

fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        if path.is_file() && DOCUMENT_EXTENSIONS.contains(&ext) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn process_feed<R>(cli: &Cli, pipeline: &Pipeline, reader: R) -> Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let segment: TranscriptSegment = match serde_json::from_str(line) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed segment");
                summary.errors += 1;
                continue;
            }
        };
        summary.segments += 1;

        let decisions = match pipeline.submit_segment(segment.clone()).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::Storage => return Err(e.into()),
            Err(e) => {
                tracing::warn!(line = line_no, kind = %e.kind(), error = %e, "segment failed");
                summary.errors += 1;
                continue;
            }
        };

        for decision in &decisions {
            let alert = decision.alert_id().and_then(|id| pipeline.alerts().get(id));
            let (label, reason) = match decision {
                AlertDecision::NewAlert(_) => {
                    summary.new_alerts += 1;
                    ("new_alert", None)
                }
                AlertDecision::MergedInto(_) => {
                    summary.merged += 1;
                    ("merged", None)
                }
                AlertDecision::Suppressed(r) => {
                    summary.suppressed += 1;
                    ("suppressed", Some(format!("{r:?}")))
                }
            };
            output_record(
                cli,
                &SegmentRecord {
                    line: line_no,
                    speaker_id: &segment.speaker_id,
                    start_time: segment.start_time,
                    decision: label,
                    alert_id: decision.alert_id(),
                    severity: alert.as_ref().map(|a| a.severity.to_string()),
                    citation: alert.map(|a| a.matched_citation),
                    reason,
                },
            )?;
        }
    }
    Ok(summary)
}
