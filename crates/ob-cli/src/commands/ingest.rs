//! Ingest command: replays JSONL presence events through the tracker.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use ob_core::{PendingSessionCache, PresenceChanged, SessionTracker, TrackerConfig};
use ob_db::Database;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::dispatch::{DispatchStats, Dispatcher};

/// What an ingest run read and produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Lines that decoded into an event.
    pub events: usize,
    /// Lines that failed to decode and were skipped.
    pub malformed: usize,
    pub stats: DispatchStats,
}

/// Decodes one line into a validated presence event.
///
/// Takes raw bytes so a line that is not UTF-8 is a decode error like any
/// other malformed line.
pub fn parse_event(line: &[u8]) -> Result<PresenceChanged, serde_json::Error> {
    serde_json::from_slice(line)
}

pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    input: Option<&Path>,
    workers: usize,
    tracker_config: TrackerConfig,
) -> Result<IngestSummary> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize tokio runtime")?;
    let tracker = Arc::new(SessionTracker::new(
        Mutex::new(db),
        Arc::new(PendingSessionCache::new()),
        tracker_config,
    ));

    let summary = runtime.block_on(async {
        let dispatcher = Dispatcher::spawn(&tracker, workers);
        match input {
            Some(path) if path != Path::new("-") => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?;
                replay(BufReader::new(file), dispatcher).await
            }
            _ => replay(BufReader::new(tokio::io::stdin()), dispatcher).await,
        }
    })?;

    if !tracker.pending().is_empty() {
        tracing::info!(
            pending = tracker.pending().len(),
            "sessions still in progress at end of input"
        );
    }
    write_summary(writer, &summary)?;
    Ok(summary)
}

/// Feeds every decodable line to the dispatcher, then drains it.
async fn replay<R>(mut reader: R, dispatcher: Dispatcher) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut line_number = 0_usize;
    let mut summary = IngestSummary::default();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .with_context(|| format!("failed to read line {}", line_number + 1))?;
        if read == 0 {
            break;
        }
        line_number += 1;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        match parse_event(trimmed) {
            Ok(event) => {
                summary.events += 1;
                dispatcher.dispatch(event).await?;
            }
            Err(err) => {
                summary.malformed += 1;
                tracing::error!(line = line_number, error = %err, "skipping malformed presence event");
            }
        }
    }

    summary.stats = dispatcher.finish().await?;
    Ok(summary)
}

fn write_summary<W: Write>(writer: &mut W, summary: &IngestSummary) -> Result<()> {
    writeln!(writer, "Events read:        {}", summary.events)?;
    writeln!(writer, "Malformed lines:    {}", summary.malformed)?;
    writeln!(writer, "Sessions started:   {}", summary.stats.started)?;
    writeln!(writer, "Sessions completed: {}", summary.stats.completed)?;
    writeln!(writer, "Unresolved stops:   {}", summary.stats.unresolved)?;
    writeln!(writer, "Failed events:      {}", summary.stats.failed)?;
    Ok(())
}
