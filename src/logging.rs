//! Request log: a bounded ring buffer of per-request events, persisted as JSONL.
//!
//! Process-level diagnostics go through `tracing`; this log records what
//! happened to each proxied request (model, upstream status, outcome) keyed by
//! the stream id, so a single translation can be followed end to end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

pub struct Logger {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    /// Lines currently in the file, which may exceed `capacity` until compacted.
    file_lines: usize,
    file_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Logger {
    pub fn new(file_path: impl AsRef<Path>, capacity: usize) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let capacity = capacity.max(1);

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(capacity.min(1024));
        let mut file_lines = 0;

        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                file_lines += 1;
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    if entries.len() >= capacity {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&file_path)?;

        Ok(Self {
            entries,
            capacity,
            file_lines,
            file_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{json}");
                let _ = writer.flush();
                self.file_lines += 1;
            }
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Entries belonging to one request, oldest first.
    pub fn for_request(&self, request_id: &str) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect()
    }

    pub fn needs_compaction(&self) -> bool {
        self.file_lines > self.capacity
    }

    /// Rewrite the file so it holds only the buffered entries.
    pub fn compact(&mut self) -> std::io::Result<()> {
        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.file_path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(writer, "{json}")?;
            }
        }
        writer.flush()?;
        self.file_lines = self.entries.len();

        let file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Logger>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>, capacity: usize) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::new(file_path, capacity)?))))
    }

    pub fn log(&self, entry: LogEntry) {
        if let Ok(mut logger) = self.0.lock() {
            logger.log(entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    /// A handle that tags every entry with `request_id`.
    pub fn request(&self, request_id: impl Into<String>) -> RequestLogger {
        RequestLogger {
            inner: self.clone(),
            request_id: request_id.into(),
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }

    pub fn for_request(&self, request_id: &str) -> Vec<LogEntry> {
        self.0
            .lock()
            .map(|l| l.for_request(request_id))
            .unwrap_or_default()
    }

    /// Compact the file if it has grown past the ring capacity.
    pub fn compact_if_needed(&self) -> std::io::Result<bool> {
        let Ok(mut logger) = self.0.lock() else {
            return Ok(false);
        };
        if !logger.needs_compaction() {
            return Ok(false);
        }
        logger.compact()?;
        Ok(true)
    }
}

#[derive(Clone)]
pub struct RequestLogger {
    inner: SharedLogger,
    request_id: String,
}

impl RequestLogger {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn entry(&self, level: LogLevel, component: &str, message: String) -> LogEntry {
        LogEntry::new(level, component, message).with_request_id(self.request_id.clone())
    }

    pub fn info(&self, component: &str, message: impl Into<String>) {
        self.inner.log(self.entry(LogLevel::Info, component, message.into()));
    }

    pub fn warn(&self, component: &str, message: impl Into<String>) {
        self.inner.log(self.entry(LogLevel::Warn, component, message.into()));
    }

    pub fn error(&self, component: &str, message: impl Into<String>) {
        self.inner.log(self.entry(LogLevel::Error, component, message.into()));
    }

    pub fn info_with_context(&self, component: &str, message: impl Into<String>, context: serde_json::Value) {
        self.inner
            .log(self.entry(LogLevel::Info, component, message.into()).with_context(context));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ring_buffer_is_bounded() {
        let dir = tempdir().unwrap();
        let logger = SharedLogger::new(dir.path().join("log.jsonl"), 3).unwrap();
        for i in 0..5 {
            logger.info("test", format!("entry {i}"));
        }

        let recent = logger.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "entry 4");
        assert_eq!(recent[2].message, "entry 2");
    }

    #[test]
    fn test_request_entries_are_tagged() {
        let dir = tempdir().unwrap();
        let logger = SharedLogger::new(dir.path().join("log.jsonl"), 100).unwrap();
        let a = logger.request("chatcmpl-a");
        let b = logger.request("chatcmpl-b");

        a.info("request", "started");
        b.info("request", "started");
        a.error("stream", "upstream failed");

        let entries = logger.for_request("chatcmpl-a");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(entries[1].component, "stream");
    }

    #[test]
    fn test_reload_and_compact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        {
            let logger = SharedLogger::new(&path, 100).unwrap();
            for i in 0..6 {
                logger.info("test", format!("entry {i}"));
            }
        }

        let logger = SharedLogger::new(&path, 2).unwrap();
        assert_eq!(logger.recent(10).len(), 2);
        assert!(logger.compact_if_needed().unwrap());
        assert!(!logger.compact_if_needed().unwrap());

        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines, 2);
    }
}
