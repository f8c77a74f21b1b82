use crate::core::id::{NodeId, PortId};
use crate::core::port::PortSet;
use crate::engine::asap::Step;
use crate::engine::events::HandlerTable;
use crate::remote::RemoteLink;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Extra information travelling with a run, such as the port the data
/// arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlInfo {
    pub port: Option<PortId>,
}

impl ControlInfo {
    pub fn from_port(port: PortId) -> Self {
        Self { port: Some(port) }
    }
}

/// What a node body sees when it is invoked.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub node: NodeId,
    pub uid: u64,
    pub run_id: u64,
    pub data: Value,
    pub info: ControlInfo,
}

/// Computation of a local node. The net never interprets what a body does;
/// it only sequences it between the `NodeWillRun` and `NodeDidRun` events.
pub trait NodeBody: Send + Sync {
    fn run(&self, ctx: &RunContext) -> Result<Step>;
}

impl<F> NodeBody for F
where
    F: Fn(&RunContext) -> Result<Step> + Send + Sync,
{
    fn run(&self, ctx: &RunContext) -> Result<Step> {
        self(ctx)
    }
}

/// Body of nodes that only exist to be wired and observed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Idle;

impl NodeBody for Idle {
    fn run(&self, _ctx: &RunContext) -> Result<Step> {
        Ok(Step::Ready)
    }
}

pub enum NodeKind {
    Local {
        body: Arc<dyn NodeBody>,
        handlers: HandlerTable,
    },
    /// Stand-in for a node owned by another domain.
    Remote(RemoteLink),
}

/// Extra parts owned by a subnet.
#[derive(Debug, Default)]
pub struct SubnetParts {
    pub(crate) inner_ports: PortSet,
    pub(crate) children: BTreeSet<NodeId>,
}

pub struct Node {
    uid: u64,
    brand: String,
    pub(crate) state: Value,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) ports: PortSet,
    pub(crate) subnet: Option<SubnetParts>,
}

impl Node {
    pub(crate) fn new(uid: u64, brand: String, state: Value, kind: NodeKind, is_subnet: bool) -> Self {
        Self {
            uid,
            brand,
            state,
            kind,
            parent: None,
            ports: PortSet::new(false),
            subnet: is_subnet.then(|| SubnetParts {
                inner_ports: PortSet::new(true),
                children: BTreeSet::new(),
            }),
        }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn is_subnet(&self) -> bool {
        self.subnet.is_some()
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, NodeKind::Local { .. })
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub fn inner_ports(&self) -> Option<&PortSet> {
        self.subnet.as_ref().map(|s| &s.inner_ports)
    }

    pub fn children(&self) -> Option<&BTreeSet<NodeId>> {
        self.subnet.as_ref().map(|s| &s.children)
    }

    pub fn handlers(&self) -> Option<&HandlerTable> {
        match &self.kind {
            NodeKind::Local { handlers, .. } => Some(handlers),
            NodeKind::Remote(_) => None,
        }
    }

    pub(crate) fn handlers_mut(&mut self) -> Option<&mut HandlerTable> {
        match &mut self.kind {
            NodeKind::Local { handlers, .. } => Some(handlers),
            NodeKind::Remote(_) => None,
        }
    }

    pub fn remote(&self) -> Option<&RemoteLink> {
        match &self.kind {
            NodeKind::Local { .. } => None,
            NodeKind::Remote(link) => Some(link),
        }
    }

    /// `"{domain}: {brand}#{uid}"`; remote nodes render with their own domain.
    pub fn label(&self, local_domain_id: &str) -> String {
        let domain = match &self.kind {
            NodeKind::Local { .. } => local_domain_id,
            NodeKind::Remote(link) => link.domain.id.as_str(),
        };
        format!("{}: {}#{}", domain, self.brand, self.uid)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("uid", &self.uid)
            .field("brand", &self.brand)
            .field("local", &self.is_local())
            .field("subnet", &self.is_subnet())
            .field("parent", &self.parent)
            .field("ports", &self.ports.len())
            .finish()
    }
}
