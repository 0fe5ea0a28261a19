use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use enum_dispatch::enum_dispatch;

use crate::UInt;
use crate::error::MarketError;

/// Append-only consumer of the joint action vector played at each step.
#[enum_dispatch]
pub trait ActionSink {
    fn record(&mut self, actions: &[UInt]) -> Result<(), MarketError>;
}

/// Discards every record.
#[derive(Debug, Clone, Default)]
pub struct NullSink;

impl ActionSink for NullSink {
    fn record(&mut self, _actions: &[UInt]) -> Result<(), MarketError> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<Vec<UInt>>,
}

impl ActionSink for MemorySink {
    fn record(&mut self, actions: &[UInt]) -> Result<(), MarketError> {
        self.records.push(actions.to_vec());
        Ok(())
    }
}

/// Appends one JSON array per step to `<dir>/<stem>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new<P: Into<PathBuf>>(dir: P, stem: &str) -> Result<Self, MarketError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(JsonLinesSink {
            path: dir.join(format!("{stem}.jsonl")),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ActionSink for JsonLinesSink {
    fn record(&mut self, actions: &[UInt]) -> Result<(), MarketError> {
        // Opened in append mode on every write.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(actions)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
#[enum_dispatch(ActionSink)]
pub enum SinkType {
    Null(NullSink),
    Memory(MemorySink),
    JsonLines(JsonLinesSink),
}

impl Default for SinkType {
    fn default() -> Self {
        SinkType::Null(NullSink)
    }
}
