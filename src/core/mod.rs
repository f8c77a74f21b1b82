pub mod domain;
pub mod id;
pub mod node;
pub mod port;
pub mod state;

pub use domain::Domain;
pub use id::{Endpoint, NodeId, PortId, VirtualNodeId, VirtualPortId};
pub use node::{ControlInfo, Idle, Node, NodeBody, NodeKind, RunContext};
pub use port::{IntoPortName, IoRole, Port, PortName, PortSet};
