//! Report sinks: append-only CSV logs and the JSON run summary.
//!
//! Each CSV sink owns a dedicated writer thread fed by a bounded channel,
//! so logging never blocks the trading path. Dropping the sink disconnects
//! the channel, flushes the file, and joins the writer.

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{error, info, warn};

/// Pending rows before the sink starts dropping. Dropping log rows is
/// preferable to stalling the matching pipeline.
const MAX_PENDING_ROWS: usize = 4096;

/// Append-only CSV log with an asynchronous writer thread.
pub struct CsvSink {
    sender: Option<Sender<String>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CsvSink {
    /// Open `path` (truncating any previous run's file), write the header
    /// line, and spawn the writer thread. Parent directories are created
    /// as needed.
    pub fn create(path: impl AsRef<Path>, header: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
        }

        let mut file = File::create(&path)
            .with_context(|| format!("opening report sink {}", path.display()))?;
        writeln!(file, "{header}")
            .with_context(|| format!("writing header to {}", path.display()))?;

        let (sender, receiver) = bounded(MAX_PENDING_ROWS);
        let worker = thread::spawn(move || Self::writer_loop(path, file, receiver));

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Open a sink, logging and swallowing the failure: a strategy that
    /// cannot open its log keeps trading without it.
    pub fn create_or_warn(path: impl AsRef<Path>, header: &str) -> Option<Self> {
        match Self::create(path.as_ref(), header) {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!(path = %path.as_ref().display(), %err, "report sink unavailable");
                None
            }
        }
    }

    fn writer_loop(path: PathBuf, mut file: File, receiver: Receiver<String>) {
        for row in receiver {
            if let Err(err) = writeln!(file, "{row}") {
                error!(path = %path.display(), %err, "failed to write report row");
            }
        }
        if let Err(err) = file.flush() {
            error!(path = %path.display(), %err, "failed to flush report sink");
        }
    }

    /// Queue one CSV row (without trailing newline). Never blocks; if the
    /// writer has fallen behind the row is dropped with an error log.
    pub fn write_row(&self, row: String) {
        if let Some(sender) = &self.sender {
            if sender.try_send(row).is_err() {
                error!("report sink buffer full, dropping row");
            }
        }
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        // Disconnect first so the writer loop drains and exits.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Write a pretty-printed JSON summary with the entries in the given
/// order.
pub fn write_summary_json(path: &Path, entries: Vec<(String, Value)>) -> Result<()> {
    let mut map = serde_json::Map::new();
    for (key, value) in entries {
        map.insert(key, value);
    }
    let body = serde_json::to_string_pretty(&Value::Object(map))?;
    std::fs::write(path, body)
        .with_context(|| format!("writing summary to {}", path.display()))?;
    info!(path = %path.display(), "summary exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        {
            let sink = CsvSink::create(&path, "a,b,c").unwrap();
            sink.write_row("1,2,3".to_string());
            sink.write_row("4,5,6".to_string());
        }

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines, vec!["a,b,c", "1,2,3", "4,5,6"]);
    }

    #[test]
    fn sink_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("metrics.csv");
        let _sink = CsvSink::create(&path, "x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn create_or_warn_swallows_open_failure() {
        // A directory path cannot be opened as a file.
        let dir = tempfile::tempdir().unwrap();
        assert!(CsvSink::create_or_warn(dir.path(), "x").is_none());
    }

    #[test]
    fn summary_preserves_entry_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_summary_json(
            &path,
            vec![
                ("strategy".to_string(), json!("momentum")),
                ("pnl".to_string(), json!(-12.5)),
                ("risk_breached".to_string(), json!(false)),
            ],
        )
        .unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let strategy_at = body.find("strategy").unwrap();
        let pnl_at = body.find("pnl").unwrap();
        let risk_at = body.find("risk_breached").unwrap();
        assert!(strategy_at < pnl_at && pnl_at < risk_at);

        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["strategy"], "momentum");
        assert_eq!(parsed["pnl"], -12.5);
    }
}
