use super::log::{LogLevel, LogSink, Record};
use std::sync::Mutex;

/// Forwards diagnostics to `tracing` with the node and component as fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn input(&self, level: LogLevel, record: &Record) {
        let node = record.node.as_deref().unwrap_or("-");
        let component = record.component.unwrap_or("-");
        match level {
            LogLevel::Off => {}
            LogLevel::Error => {
                tracing::error!(target: "eventnet", node, component, "{}", record.msg)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "eventnet", node, component, "{}", record.msg)
            }
            LogLevel::Info => {
                tracing::info!(target: "eventnet", node, component, "{}", record.msg)
            }
            LogLevel::Debug => {
                tracing::debug!(target: "eventnet", node, component, "{}", record.msg)
            }
        }
    }
}

/// Keeps every record in memory. Used by tests to assert on diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(LogLevel, Record)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(LogLevel, Record)> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|(_, r)| r.msg).collect()
    }

    pub fn at_level(&self, level: LogLevel) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, r)| r)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl LogSink for MemorySink {
    fn input(&self, level: LogLevel, record: &Record) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((level, record.clone()));
    }
}
