// Generation trace
// Append-only JSONL record of one or more generation runs, keyed by run id

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Pipeline stage an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    /// Config validation, contexts, protection maps
    Setup,

    /// One bar through candidates, selection, filters and enforcement
    Bar,

    /// Operator failure, rejected candidate or protection conflict
    Diagnostic,

    /// Anchors and operator onsets merged, events materialized
    Materialize,

    /// Run finished
    Complete,
}

impl TraceStage {
    pub fn to_str(&self) -> &'static str {
        match self {
            TraceStage::Setup => "setup",
            TraceStage::Bar => "bar",
            TraceStage::Diagnostic => "diagnostic",
            TraceStage::Materialize => "materialize",
            TraceStage::Complete => "complete",
        }
    }
}

/// A single line of the trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,

    pub run_id: Uuid,

    pub stage: TraceStage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar: Option<u32>,

    /// Run progress [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Optional structured data (counts, diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Create an entry stamped with the current time
    pub fn new(run_id: Uuid, stage: TraceStage, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            stage,
            bar: None,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_bar(mut self, bar: u32) -> Self {
        self.bar = Some(bar);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries for one run to a JSONL file
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
    run_id: Uuid,
}

impl TraceWriter {
    /// Writer for a new run with a fresh id
    pub fn new(file_path: PathBuf) -> Self {
        Self::for_run(file_path, Uuid::new_v4())
    }

    /// Writer for an existing run id
    pub fn for_run(file_path: PathBuf, run_id: Uuid) -> Self {
        TraceWriter { file_path, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Get the trace file path
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Start an entry for this run
    pub fn entry(&self, stage: TraceStage, progress: f32, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, stage, progress, message)
    }

    /// Append one entry; creates the file if it doesn't exist
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        self.write_batch(std::slice::from_ref(entry))
    }

    /// Append several entries with one open
    pub fn write_batch(&self, entries: &[TraceEntry]) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for entry in entries {
            let json_line = entry.to_json_line()?;
            file.write_all(json_line.as_bytes())?;
        }

        file.flush()?;
        Ok(())
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}

/// Entries of a single run, in file order
pub fn entries_for_run(entries: &[TraceEntry], run_id: Uuid) -> Vec<&TraceEntry> {
    entries.iter().filter(|e| e.run_id == run_id).collect()
}
