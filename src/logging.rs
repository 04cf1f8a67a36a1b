//! Per-call journal of generation requests.
//!
//! Entries are kept in a bounded in-memory ring and, when a path is given,
//! appended to a JSONL file so a session can be inspected afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub call_id: String,
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl CallLogEntry {
    pub fn new(
        level: LogLevel,
        call_id: impl Into<String>,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            call_id: call_id.into(),
            component: component.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

struct Journal {
    entries: VecDeque<CallLogEntry>,
    writer: Option<BufWriter<File>>,
}

impl Journal {
    fn record(&mut self, entry: CallLogEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

/// Shared handle to the call journal. Cloning is cheap.
#[derive(Clone)]
pub struct CallLog(Arc<Mutex<Journal>>);

impl CallLog {
    /// Journal backed by a JSONL file. Existing entries are loaded back into
    /// the ring so `recent` spans sessions.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);
        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<CallLogEntry>(&line) {
                    if entries.len() >= MAX_LOG_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self(Arc::new(Mutex::new(Journal {
            entries,
            writer: Some(BufWriter::new(file)),
        }))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Journal {
            entries: VecDeque::new(),
            writer: None,
        })))
    }

    pub fn record(&self, entry: CallLogEntry) {
        if let Ok(mut journal) = self.0.lock() {
            journal.record(entry);
        }
    }

    pub fn info(&self, call_id: &str, component: &str, message: impl Into<String>) {
        self.record(CallLogEntry::new(LogLevel::Info, call_id, component, message));
    }

    pub fn warn(&self, call_id: &str, component: &str, message: impl Into<String>) {
        self.record(CallLogEntry::new(LogLevel::Warn, call_id, component, message));
    }

    pub fn error(&self, call_id: &str, component: &str, message: impl Into<String>) {
        self.record(CallLogEntry::new(LogLevel::Error, call_id, component, message));
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CallLogEntry> {
        self.0
            .lock()
            .map(|j| j.entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// All retained entries for one call, oldest first.
    pub fn for_call(&self, call_id: &str) -> Vec<CallLogEntry> {
        self.0
            .lock()
            .map(|j| {
                j.entries
                    .iter()
                    .filter(|e| e.call_id == call_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
