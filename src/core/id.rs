//! Arena indices for everything a `Net` owns.
//!
//! Ids are plain `u32` newtypes that index straight into the net's storage
//! vectors. They are only meaningful for the net that issued them.

use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

arena_id!(
    /// Index into `Net::nodes`, covering local and remote nodes.
    NodeId
);
arena_id!(
    /// Index into `Net::ports`.
    PortId
);
arena_id!(
    /// Index into the virtual node arena.
    VirtualNodeId
);
arena_id!(
    /// Index into the virtual port arena.
    VirtualPortId
);

/// Anything a pipe can start from or lead to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Node(NodeId),
    Port(PortId),
    VirtualNode(VirtualNodeId),
    VirtualPort(VirtualPortId),
}

impl Endpoint {
    /// Node-shaped endpoints are normalized to a default port before piping.
    pub fn is_node_like(&self) -> bool {
        matches!(self, Endpoint::Node(_) | Endpoint::VirtualNode(_))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Endpoint::VirtualNode(_) | Endpoint::VirtualPort(_))
    }
}

impl From<NodeId> for Endpoint {
    fn from(id: NodeId) -> Self {
        Endpoint::Node(id)
    }
}

impl From<PortId> for Endpoint {
    fn from(id: PortId) -> Self {
        Endpoint::Port(id)
    }
}

impl From<VirtualNodeId> for Endpoint {
    fn from(id: VirtualNodeId) -> Self {
        Endpoint::VirtualNode(id)
    }
}

impl From<VirtualPortId> for Endpoint {
    fn from(id: VirtualPortId) -> Self {
        Endpoint::VirtualPort(id)
    }
}
