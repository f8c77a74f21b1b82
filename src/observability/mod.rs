pub mod log;
pub mod sinks;
pub mod subscriber;

pub use log::{Diagnostics, LogLevel, LogSink, Record};
pub use sinks::{MemorySink, TracingSink};
pub use subscriber::init_tracing;
