use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Diagnostics verbosity. A record is emitted when its level is not `Off`
/// and does not exceed the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(LogLevel::Off),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "off" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        })
    }
}

/// One diagnostic message, optionally tagged with the node it concerns and
/// the component that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub msg: String,
    pub node: Option<String>,
    pub component: Option<&'static str>,
}

impl Record {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            node: None,
            component: None,
        }
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn component(mut self, component: &'static str) -> Self {
        self.component = Some(component);
        self
    }
}

impl From<String> for Record {
    fn from(msg: String) -> Self {
        Record::new(msg)
    }
}

impl From<&str> for Record {
    fn from(msg: &str) -> Self {
        Record::new(msg)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(component) = self.component {
            write!(f, "[{}] ", component)?;
        }
        if let Some(node) = &self.node {
            write!(f, "({}) ", node)?;
        }
        f.write_str(&self.msg)
    }
}

/// Destination for diagnostics. Sinks must tolerate being called from inside
/// deferred handler chains.
pub trait LogSink: Send + Sync {
    fn input(&self, level: LogLevel, record: &Record);
}

struct DiagnosticsInner {
    level: LogLevel,
    sinks: Vec<Arc<dyn LogSink>>,
}

/// Shared handle to the level threshold and the registered sinks.
#[derive(Clone)]
pub struct Diagnostics {
    inner: Arc<RwLock<DiagnosticsInner>>,
}

impl Diagnostics {
    /// Diagnostics with no sink attached.
    pub fn new(level: LogLevel) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DiagnosticsInner {
                level,
                sinks: Vec::new(),
            })),
        }
    }

    pub fn with_sink(level: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        let diagnostics = Self::new(level);
        diagnostics.register(sink);
        diagnostics
    }

    pub fn level(&self) -> LogLevel {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .level
    }

    pub fn set_level(&self, level: LogLevel) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .level = level;
    }

    pub fn register(&self, sink: Arc<dyn LogSink>) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sinks
            .push(sink);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level()
    }

    pub fn log(&self, level: LogLevel, record: impl Into<Record>) {
        if !self.enabled(level) {
            return;
        }
        let record = record.into();
        // Clone the sink list so a sink may log or register without deadlocking.
        let sinks = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sinks
            .clone();
        for sink in sinks {
            sink.input(level, &record);
        }
    }

    pub fn error(&self, record: impl Into<Record>) {
        self.log(LogLevel::Error, record);
    }

    pub fn warn(&self, record: impl Into<Record>) {
        self.log(LogLevel::Warn, record);
    }

    pub fn info(&self, record: impl Into<Record>) {
        self.log(LogLevel::Info, record);
    }

    pub fn debug(&self, record: impl Into<Record>) {
        self.log(LogLevel::Debug, record);
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f.debug_struct("Diagnostics")
            .field("level", &inner.level)
            .field("sinks", &inner.sinks.len())
            .finish()
    }
}
