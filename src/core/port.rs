use crate::core::id::{NodeId, PortId};
use crate::error::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Role of a port. `Out` and `In` are ordered so that flipping for the inner
/// side of a subnet is a plain swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoRole {
    Out,
    In,
    Undetermined,
}

impl IoRole {
    pub fn flip(self) -> Self {
        match self {
            IoRole::Out => IoRole::In,
            IoRole::In => IoRole::Out,
            IoRole::Undetermined => IoRole::Undetermined,
        }
    }

    /// `isInner XOR self`: converts a direction into the port's effective
    /// ioType and back, since the mapping is its own inverse.
    pub fn for_side(self, is_inner: bool) -> Self {
        if is_inner {
            self.flip()
        } else {
            self
        }
    }

    pub fn is_determined(self) -> bool {
        self != IoRole::Undetermined
    }
}

impl Default for IoRole {
    fn default() -> Self {
        IoRole::Undetermined
    }
}

impl fmt::Display for IoRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoRole::Out => "output",
            IoRole::In => "input",
            IoRole::Undetermined => "undetermined",
        })
    }
}

/// Validated port name. Names start with `$` and have at least one more
/// character.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortName(Cow<'static, str>);

impl PortName {
    /// Default input port of a node.
    pub const INPUT: PortName = PortName(Cow::Borrowed("$I"));
    /// Default output port of a node.
    pub const OUTPUT: PortName = PortName(Cow::Borrowed("$O"));
    /// Error-reporting output; may only ever carry outgoing data.
    pub const ERROR: PortName = PortName(Cow::Borrowed("$E"));
    /// Inner error input of a subnet; may only ever receive data and has no
    /// outer counterpart.
    pub const INNER_ERROR: PortName = PortName(Cow::Borrowed("$IE"));

    pub fn new(name: impl Into<String>) -> NetResult<Self> {
        let name = name.into();
        if !name.starts_with('$') || name.chars().count() < 2 {
            return Err(NetError::InvalidPortName(name));
        }
        Ok(Self(Cow::Owned(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The only direction a reserved port may resolve to. Both reserved
    /// names carry errors outwards: an outer `$E` sends, while an inner `$E`
    /// or `$IE` receives from the children.
    pub fn reserved_direction(&self) -> Option<IoRole> {
        if *self == Self::ERROR || *self == Self::INNER_ERROR {
            Some(IoRole::Out)
        } else {
            None
        }
    }

    /// Whether a port with this name may exist on the given side of a node.
    pub fn allowed_on(&self, is_inner: bool) -> bool {
        is_inner || *self != Self::INNER_ERROR
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PortName {
    type Error = NetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PortName {
    type Error = NetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PortName> for String {
    fn from(name: PortName) -> Self {
        name.0.into_owned()
    }
}

/// Anything that names a port: a `PortName` or a string to validate.
pub trait IntoPortName {
    fn into_port_name(self) -> NetResult<PortName>;
}

impl IntoPortName for PortName {
    fn into_port_name(self) -> NetResult<PortName> {
        Ok(self)
    }
}

impl IntoPortName for &PortName {
    fn into_port_name(self) -> NetResult<PortName> {
        Ok(self.clone())
    }
}

impl IntoPortName for &str {
    fn into_port_name(self) -> NetResult<PortName> {
        PortName::new(self)
    }
}

impl IntoPortName for String {
    fn into_port_name(self) -> NetResult<PortName> {
        PortName::new(self)
    }
}

/// Why a port cannot take a requested ioType.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleViolation {
    /// The port name is reserved for the other role.
    Reserved,
    /// The port's direction is already resolved the other way.
    Conflict,
}

/// A named endpoint owned by exactly one node.
///
/// `direction` is shared by the inner and outer port of the same name on a
/// subnet, while `io_type` is the role seen from this side of the node.
#[derive(Debug, Clone)]
pub struct Port {
    name: PortName,
    node: NodeId,
    is_inner: bool,
    direction: IoRole,
    io_type: IoRole,
    links: Vec<PortId>,
}

impl Port {
    pub(crate) fn new(name: PortName, node: NodeId, is_inner: bool, direction: IoRole) -> Self {
        Self {
            name,
            node,
            is_inner,
            direction,
            io_type: direction.for_side(is_inner),
            links: Vec::new(),
        }
    }

    pub fn name(&self) -> &PortName {
        &self.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_inner(&self) -> bool {
        self.is_inner
    }

    pub fn direction(&self) -> IoRole {
        self.direction
    }

    pub fn io_type(&self) -> IoRole {
        self.io_type
    }

    pub fn links(&self) -> &[PortId] {
        &self.links
    }

    pub fn is_linked_to(&self, peer: PortId) -> bool {
        self.links.contains(&peer)
    }

    /// The only ioType this port may take on its side, if its name is reserved.
    pub fn reserved_io_type(&self) -> Option<IoRole> {
        self.name
            .reserved_direction()
            .map(|direction| direction.for_side(self.is_inner))
    }

    /// Checks whether this port could act with the given ioType.
    pub fn role_violation(&self, io_type: IoRole) -> Option<RoleViolation> {
        if let Some(reserved) = self.reserved_io_type() {
            if reserved != io_type {
                return Some(RoleViolation::Reserved);
            }
        }
        if self.io_type.is_determined() && self.io_type != io_type {
            return Some(RoleViolation::Conflict);
        }
        None
    }

    pub(crate) fn set_direction(&mut self, direction: IoRole) {
        self.direction = direction;
        self.io_type = direction.for_side(self.is_inner);
    }

    /// Appends a peer unless it is already linked.
    pub(crate) fn add_link(&mut self, peer: PortId) -> bool {
        if self.links.contains(&peer) {
            return false;
        }
        self.links.push(peer);
        true
    }

    pub(crate) fn remove_link(&mut self, peer: PortId) -> bool {
        match self.links.iter().position(|p| *p == peer) {
            Some(index) => {
                self.links.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Lazy registry of one side (inner or outer) of a node's ports.
#[derive(Debug, Clone, Default)]
pub struct PortSet {
    is_inner: bool,
    ports: BTreeMap<PortName, PortId>,
}

impl PortSet {
    pub fn new(is_inner: bool) -> Self {
        Self {
            is_inner,
            ports: BTreeMap::new(),
        }
    }

    pub fn is_inner(&self) -> bool {
        self.is_inner
    }

    pub fn get(&self, name: &PortName) -> Option<PortId> {
        self.ports.get(name).copied()
    }

    pub(crate) fn insert(&mut self, name: PortName, id: PortId) {
        self.ports.insert(name, id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortName, PortId)> {
        self.ports.iter().map(|(name, id)| (name, *id))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
