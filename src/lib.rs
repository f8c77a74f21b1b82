pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod observability;
pub mod remote;

pub use config::NetConfig;
pub use core::{ControlInfo, Endpoint, IoRole, NodeId, PortId, PortName, RunContext};
pub use engine::{Net, NodeBuilder, NodeHandler, PipeOutcome, Priority, Step};
pub use error::{NetError, NetResult};
