//! Log Sink: accepts structured task events and orderbook snapshots and
//! appends them to per-task JSONL files.
//!
//! Ingestion is a bounded `tokio::sync::mpsc` channel (teacher idiom:
//! `crossbeam-channel` is used where an unbounded MPSC fits; here the spec
//! calls for an explicit bounded queue with priority-aware drop, so
//! `tokio::sync::mpsc` is the fit — bounded capacity plus async backpressure
//! at the send side). A single background task owns the filesystem and
//! drains the queue, so writers never touch disk directly.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::config::LogSinkConfig;
use crate::domain::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Snapshot,
    Info,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub priority: Priority,
    pub kind: String,
    pub payload: Value,
}

enum Entry {
    Event(LogRecord),
    Orderbook(LogRecord),
    Summary(TaskId, Value),
}

impl Entry {
    fn priority(&self) -> Priority {
        match self {
            Entry::Event(r) | Entry::Orderbook(r) => r.priority,
            Entry::Summary(..) => Priority::Critical,
        }
    }
}

pub struct LogSink {
    tx: mpsc::Sender<Entry>,
}

impl LogSink {
    /// Spawns the background writer task and returns a handle. Garbage
    /// collects files older than `retention_days` once at startup.
    pub fn spawn(cfg: LogSinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(cfg.queue_max_size);
        let base_dir = PathBuf::from(cfg.base_dir.clone());
        tokio::spawn(gc_loop(base_dir.clone(), cfg.retention_days));
        tokio::spawn(writer_loop(rx, base_dir, cfg.flush_interval_ms));
        Self { tx }
    }

    async fn push(&self, entry: Entry) {
        // Bounded channel: a CRITICAL entry that can't be enqueued immediately
        // still gets one retry attempt so it isn't silently dropped under
        // transient backpressure; SNAPSHOT/INFO degrade to best-effort.
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) if entry.priority() == Priority::Critical => {
                if self.tx.send(entry).await.is_err() {
                    error!("log sink channel closed, dropping critical entry");
                }
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("log sink queue full, dropping non-critical entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("log sink channel closed");
            }
        }
    }

    pub async fn log_event(&self, task_id: TaskId, kind: impl Into<String>, payload: Value, priority: Priority) {
        self.push(Entry::Event(LogRecord {
            task_id,
            timestamp: Utc::now(),
            priority,
            kind: kind.into(),
            payload,
        }))
        .await;
    }

    pub async fn log_orderbook_snapshot(&self, task_id: TaskId, payload: Value) {
        self.push(Entry::Orderbook(LogRecord {
            task_id,
            timestamp: Utc::now(),
            priority: Priority::Snapshot,
            kind: "orderbook_snapshot".to_string(),
            payload,
        }))
        .await;
    }

    pub async fn write_summary(&self, task_id: TaskId, summary: Value) {
        self.push(Entry::Summary(task_id, summary)).await;
    }
}

async fn ensure_task_dir(base: &PathBuf, task_id: &TaskId) -> std::io::Result<PathBuf> {
    let dir = base.join(&task_id.0);
    fs::create_dir_all(&dir).await?;
    Ok(dir)
}

async fn append_line(path: &PathBuf, line: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await
}

async fn writer_loop(mut rx: mpsc::Receiver<Entry>, base: PathBuf, _flush_interval_ms: u64) {
    // CRITICAL entries jump the queue ahead of buffered non-critical ones
    // (priority-aware eviction is enforced at the send side in `push`; here
    // we just keep a small local reorder buffer so a burst of CRITICALs
    // isn't starved behind a backlog of SNAPSHOTs).
    let mut backlog: VecDeque<Entry> = VecDeque::new();

    while let Some(entry) = rx.recv().await {
        backlog.push_back(entry);
        while rx.len() > 0 {
            match rx.try_recv() {
                Ok(e) => backlog.push_back(e),
                Err(_) => break,
            }
        }
        backlog.make_contiguous().sort_by_key(|e| std::cmp::Reverse(e.priority()));

        while let Some(entry) = backlog.pop_front() {
            if let Err(e) = write_entry(&base, entry).await {
                error!("log sink write failed: {}", e);
            }
        }
    }
}

async fn write_entry(base: &PathBuf, entry: Entry) -> std::io::Result<()> {
    match entry {
        Entry::Event(record) => {
            let dir = ensure_task_dir(base, &record.task_id).await?;
            let line = serde_json::to_string(&record).unwrap_or_default();
            append_line(&dir.join("events.jsonl"), &line).await
        }
        Entry::Orderbook(record) => {
            let dir = ensure_task_dir(base, &record.task_id).await?;
            let line = serde_json::to_string(&record).unwrap_or_default();
            append_line(&dir.join("orderbooks.jsonl"), &line).await
        }
        Entry::Summary(task_id, summary) => {
            let dir = ensure_task_dir(base, &task_id).await?;
            let content = serde_json::to_string_pretty(&summary).unwrap_or_default();
            fs::write(dir.join("summary.json"), content).await
        }
    }
}

async fn gc_loop(base: PathBuf, retention_days: u32) {
    loop {
        if let Err(e) = gc_once(&base, retention_days).await {
            warn!("log sink gc failed: {}", e);
        }
        tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
    }
}

async fn gc_once(base: &PathBuf, retention_days: u32) -> std::io::Result<()> {
    let mut entries = match fs::read_dir(base).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs(retention_days as u64 * 24 * 3600);

    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_dir() {
            continue;
        }
        if let Ok(modified) = meta.modified() {
            if modified < cutoff {
                let _ = fs::remove_dir_all(entry.path()).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_event_and_summary_to_task_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LogSinkConfig {
            base_dir: tmp.path().to_string_lossy().to_string(),
            retention_days: 7,
            queue_max_size: 16,
            flush_interval_ms: 10,
        };
        let sink = LogSink::spawn(cfg);
        let task_id = TaskId("task-1".to_string());

        sink.log_event(task_id.clone(), "task_created", serde_json::json!({"ok": true}), Priority::Info)
            .await;
        sink.write_summary(task_id.clone(), serde_json::json!({"status": "completed"}))
            .await;

        // Give the background writer a chance to drain.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let dir = tmp.path().join("task-1");
        assert!(dir.join("events.jsonl").exists());
        assert!(dir.join("summary.json").exists());
    }
}
