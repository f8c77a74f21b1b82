//! Placeholders for nodes that do not exist yet.
//!
//! Pipes touching a placeholder are recorded as actions. Binding the
//! placeholder to a real node substitutes its ports and replays every action
//! whose both ends are real by then.

use crate::core::id::{NodeId, PortId, VirtualNodeId, VirtualPortId};
use crate::core::port::{IntoPortName, PortName};
use crate::engine::net::Net;
use crate::engine::pipe::PipeOutcome;
use crate::error::{NetError, NetResult};
use crate::observability::Record;
use std::collections::{BTreeMap, VecDeque};

/// Brand of the placeholder standing for the next node of a chain.
pub const NEXT_NODE_BRAND: &str = "NextNode";

#[derive(Debug, Clone)]
pub struct VirtualNode {
    brand: String,
    ports: BTreeMap<PortName, VirtualPortId>,
    bound: Option<NodeId>,
}

impl VirtualNode {
    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn port(&self, name: &PortName) -> Option<VirtualPortId> {
        self.ports.get(name).copied()
    }

    /// The real node this placeholder was replaced with.
    pub fn bound(&self) -> Option<NodeId> {
        self.bound
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPort {
    pub name: PortName,
    pub node: VirtualNodeId,
}

/// One end of a recorded pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Real(PortId),
    Virtual(VirtualPortId),
}

/// How far an action's ends are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Both(PortId, PortId),
    Partial,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeAction {
    pub from: Slot,
    pub to: Slot,
}

impl PipeAction {
    pub fn resolution(&self) -> Resolution {
        match (self.from, self.to) {
            (Slot::Real(from), Slot::Real(to)) => Resolution::Both(from, to),
            (Slot::Virtual(_), Slot::Virtual(_)) => Resolution::Unresolved,
            _ => Resolution::Partial,
        }
    }
}

/// FIFO of pipe actions waiting for their placeholders to be bound.
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    queue: VecDeque<PipeAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: PipeAction) {
        self.queue.push_back(action);
    }

    pub fn shift(&mut self) -> Option<PipeAction> {
        self.queue.pop_front()
    }

    /// Empties the queue, returning what it held.
    pub fn clear(&mut self) -> Vec<PipeAction> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipeAction> {
        self.queue.iter()
    }
}

/// Result of binding a placeholder.
#[derive(Debug, Default)]
pub struct Replacement {
    /// Outcomes of the replayed pipes, in queue order.
    pub executed: Vec<PipeOutcome>,
    /// Replayed pipes, or port substitutions, that raised an error.
    pub failed: Vec<NetError>,
    /// Actions still waiting on another placeholder.
    pub still_queued: usize,
}

impl Net {
    pub fn add_virtual_node(&mut self, brand: impl Into<String>) -> VirtualNodeId {
        let id = VirtualNodeId::from_index(self.virtual_nodes.len());
        self.virtual_nodes.push(VirtualNode {
            brand: brand.into(),
            ports: BTreeMap::new(),
            bound: None,
        });
        id
    }

    /// Placeholder for the node that will follow in a chain.
    pub fn next_node(&mut self) -> VirtualNodeId {
        self.add_virtual_node(NEXT_NODE_BRAND)
    }

    pub fn virtual_node(&self, id: VirtualNodeId) -> Option<&VirtualNode> {
        self.virtual_nodes.get(id.index())
    }

    pub fn virtual_port_info(&self, id: VirtualPortId) -> Option<&VirtualPort> {
        self.virtual_ports.get(id.index())
    }

    /// Port `name` of a placeholder, created on first reference.
    pub fn virtual_port(&mut self, vnode: VirtualNodeId, name: impl IntoPortName) -> NetResult<VirtualPortId> {
        let name = name.into_port_name()?;
        let placeholder = self
            .virtual_nodes
            .get(vnode.index())
            .ok_or_else(|| NetError::InvalidArgument(format!("unknown virtual node {}", vnode)))?;
        if let Some(existing) = placeholder.port(&name) {
            return Ok(existing);
        }

        let id = VirtualPortId::from_index(self.virtual_ports.len());
        self.virtual_ports.push(VirtualPort {
            name: name.clone(),
            node: vnode,
        });
        self.virtual_nodes[vnode.index()].ports.insert(name, id);
        Ok(id)
    }

    pub fn actions(&self) -> &ActionQueue {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionQueue {
        &mut self.actions
    }

    /// A virtual port of a bound placeholder stands for the real port.
    pub(crate) fn resolve_virtual(&mut self, vport: VirtualPortId) -> NetResult<Slot> {
        let port = self
            .virtual_ports
            .get(vport.index())
            .ok_or_else(|| NetError::InvalidArgument(format!("unknown virtual port {}", vport)))?;
        match self.virtual_nodes[port.node.index()].bound {
            Some(real) => {
                let name = port.name.clone();
                Ok(Slot::Real(self.port(real, name)?))
            }
            None => Ok(Slot::Virtual(vport)),
        }
    }

    /// Binds `vnode` to `real`: every queued action referencing the
    /// placeholder now refers to the same-named port of `real`, and actions
    /// whose both ends are real get piped in queue order.
    pub fn replace_virtual_node(&mut self, vnode: VirtualNodeId, real: NodeId) -> NetResult<Replacement> {
        let placeholder = self
            .virtual_nodes
            .get(vnode.index())
            .ok_or_else(|| NetError::InvalidArgument(format!("unknown virtual node {}", vnode)))?;
        if let Some(previous) = placeholder.bound {
            return Err(NetError::InvalidArgument(format!(
                "virtual node {} is already bound to {}",
                vnode,
                self.node_label(previous)
            )));
        }
        self.node_ref(real)?;
        self.virtual_nodes[vnode.index()].bound = Some(real);

        let mut replacement = Replacement::default();
        let mut ready = Vec::new();
        for mut action in self.actions.clear() {
            let substituted = self
                .substitute(action.from, vnode, real)
                .and_then(|from| Ok((from, self.substitute(action.to, vnode, real)?)));
            match substituted {
                Ok((from, to)) => {
                    action.from = from;
                    action.to = to;
                }
                Err(e) => {
                    self.diagnostics().error(
                        Record::new(format!(
                            "Queued pipe could not be bound to {}, dropped: {}",
                            self.node_label(real),
                            e
                        ))
                        .node(self.node_label(real))
                        .component("Net::replace_virtual_node"),
                    );
                    replacement.failed.push(e);
                    continue;
                }
            }
            match action.resolution() {
                Resolution::Both(from, to) => ready.push((from, to)),
                Resolution::Partial | Resolution::Unresolved => self.actions.add(action),
            }
        }

        for (from, to) in ready {
            match self.pipe_ports(from, to) {
                Ok(outcome) => replacement.executed.push(outcome),
                Err(e) => {
                    self.diagnostics().error(
                        Record::new(format!(
                            "Replayed pipe {} → {} failed: {}",
                            self.port_label(from),
                            self.port_label(to),
                            e
                        ))
                        .component("Net::replace_virtual_node"),
                    );
                    replacement.failed.push(e);
                }
            }
        }
        replacement.still_queued = self.actions.len();
        Ok(replacement)
    }

    fn substitute(&mut self, slot: Slot, vnode: VirtualNodeId, real: NodeId) -> NetResult<Slot> {
        match slot {
            Slot::Virtual(vport) if self.virtual_ports[vport.index()].node == vnode => {
                let name = self.virtual_ports[vport.index()].name.clone();
                Ok(Slot::Real(self.port(real, name)?))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = ActionQueue::new();
        let first = PipeAction {
            from: Slot::Real(PortId(0)),
            to: Slot::Virtual(VirtualPortId(0)),
        };
        let second = PipeAction {
            from: Slot::Virtual(VirtualPortId(1)),
            to: Slot::Virtual(VirtualPortId(2)),
        };
        queue.add(first);
        queue.add(second);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.shift(), Some(first));
        assert_eq!(queue.clear(), vec![second]);
        assert!(queue.is_empty());
        assert_eq!(queue.shift(), None);
    }

    #[test]
    fn test_resolution() {
        let both = PipeAction {
            from: Slot::Real(PortId(1)),
            to: Slot::Real(PortId(2)),
        };
        assert_eq!(both.resolution(), Resolution::Both(PortId(1), PortId(2)));
        let partial = PipeAction {
            from: Slot::Real(PortId(1)),
            to: Slot::Virtual(VirtualPortId(0)),
        };
        assert_eq!(partial.resolution(), Resolution::Partial);
        let none = PipeAction {
            from: Slot::Virtual(VirtualPortId(1)),
            to: Slot::Virtual(VirtualPortId(0)),
        };
        assert_eq!(none.resolution(), Resolution::Unresolved);
    }
}
