pub mod asap;
pub mod events;
pub mod net;
pub mod pipe;
pub mod priority;
pub mod queue;
pub mod virtual_node;

pub use asap::{Asap, Settled, Step};
pub use events::{DidRunControl, HandlerTable, NodeEvent, NodeHandler, PipeEvent, WillRunControl};
pub use net::{Net, NodeBuilder, PortState};
pub use pipe::PipeOutcome;
pub use priority::Priority;
pub use queue::SortedPriorityQueue;
pub use virtual_node::{ActionQueue, PipeAction, Replacement, Resolution, Slot, VirtualNode, VirtualPort};
