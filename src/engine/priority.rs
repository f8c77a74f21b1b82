use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Priority of an event handler. Handlers with a higher value run first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Priority {
    /// 0-4: internal bookkeeping that must observe everything else first
    SystemLow,
    /// 5-9
    Low,
    /// 10-14
    BelowNormal,
    /// 15: handlers registered without an explicit priority
    Normal,
    /// 16-20
    AboveNormal,
    /// 21-25
    High,
    /// 26-31: internal handlers that must run before user code
    SystemHigh,
    /// Any other raw value.
    Custom(u8),
}

impl Priority {
    /// Get numeric value for comparison (higher = runs earlier)
    pub fn value(&self) -> u8 {
        match self {
            Priority::SystemLow => 0,
            Priority::Low => 5,
            Priority::BelowNormal => 10,
            Priority::Normal => 15,
            Priority::AboveNormal => 16,
            Priority::High => 21,
            Priority::SystemHigh => 26,
            Priority::Custom(value) => *value,
        }
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority::Custom(value)
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value().cmp(&other.value())
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}
