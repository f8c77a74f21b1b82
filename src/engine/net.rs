//! The `Net` owns every node, port and placeholder of one domain.
//!
//! Nodes and ports live in arenas and refer to each other by index, so a link
//! is just a `PortId` in the peer list of each side.

use crate::config::NetConfig;
use crate::core::domain::Domain;
use crate::core::id::{NodeId, PortId};
use crate::core::node::{ControlInfo, Idle, Node, NodeBody, NodeKind, RunContext};
use crate::core::port::{IntoPortName, IoRole, Port, PortName};
use crate::core::state::resolve_path;
use crate::engine::asap::{Asap, Step};
use crate::engine::events::{DidRunControl, HandlerTable, NodeHandler, WillRunControl};
use crate::engine::pipe::PendingNegotiation;
use crate::engine::priority::Priority;
use crate::engine::virtual_node::{ActionQueue, VirtualNode, VirtualPort};
use crate::error::{NetError, NetResult};
use crate::observability::{Diagnostics, LogLevel, Record, TracingSink};
use crate::remote::{PortAddress, RemoteDomain, RemoteEndpoint, RemoteLink, RunRequest};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub struct Net {
    domain: Domain,
    diag: Diagnostics,
    pub(crate) nodes: Vec<Node>,
    pub(crate) ports: Vec<Port>,
    pub(crate) virtual_nodes: Vec<VirtualNode>,
    pub(crate) virtual_ports: Vec<VirtualPort>,
    pub(crate) actions: ActionQueue,
    pub(crate) negotiations: Vec<PendingNegotiation>,
    pub(crate) backlog: Vec<BoxFuture<'static, ()>>,
}

/// Per-name summary of a node's ports, as returned by `Net::ports_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortState {
    pub direction: IoRole,
    pub outer_links: usize,
    /// Only present on subnets.
    pub inner_links: Option<usize>,
}

impl Net {
    /// Net with a random domain id, reporting through `tracing` at info level.
    pub fn new() -> Self {
        Self::with_domain(
            Domain::new(),
            Diagnostics::with_sink(LogLevel::Info, Arc::new(TracingSink)),
        )
    }

    pub fn with_domain(domain: Domain, diag: Diagnostics) -> Self {
        Self {
            domain,
            diag,
            nodes: Vec::new(),
            ports: Vec::new(),
            virtual_nodes: Vec::new(),
            virtual_ports: Vec::new(),
            actions: ActionQueue::new(),
            negotiations: Vec::new(),
            backlog: Vec::new(),
        }
    }

    pub fn with_config(config: &NetConfig) -> anyhow::Result<Self> {
        let domain = config.build_domain()?;
        let diag = Diagnostics::with_sink(config.effective_level(), Arc::new(TracingSink));
        Ok(Self::with_domain(domain, diag))
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn set_domain_id(&mut self, id: impl Into<String>) -> NetResult<()> {
        self.domain.set_id(id)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    // ---- nodes ----

    pub fn add_node(&mut self, brand: impl Into<String>, state: Value, body: impl NodeBody + 'static) -> NodeId {
        self.insert_local(brand.into(), state, Arc::new(body), false)
    }

    pub fn add_subnet(&mut self, brand: impl Into<String>, state: Value, body: impl NodeBody + 'static) -> NodeId {
        self.insert_local(brand.into(), state, Arc::new(body), true)
    }

    /// Stand-in for a node owned by another domain. The uid is the one the
    /// remote domain assigned.
    pub fn add_remote_node(
        &mut self,
        domain: RemoteDomain,
        uid: u64,
        brand: impl Into<String>,
        endpoint: Arc<dyn RemoteEndpoint>,
    ) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        let kind = NodeKind::Remote(RemoteLink { domain, endpoint });
        self.nodes.push(Node::new(uid, brand.into(), Value::Null, kind, false));
        id
    }

    fn insert_local(&mut self, brand: String, state: Value, body: Arc<dyn NodeBody>, is_subnet: bool) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        let uid = self.domain.next_node_uid();
        let kind = NodeKind::Local {
            body,
            handlers: HandlerTable::new(),
        };
        self.nodes.push(Node::new(uid, brand, state, kind, is_subnet));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> NetResult<&Node> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| NetError::InvalidArgument(format!("unknown node {}", id)))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> NetResult<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| NetError::InvalidArgument(format!("unknown node {}", id)))
    }

    /// `"{domain}: {brand}#{uid}"`.
    pub fn node_label(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(node) => node.label(self.domain.id()),
            None => id.to_string(),
        }
    }

    /// Registers an event handler on a local node.
    pub fn on(&mut self, node: NodeId, handler: NodeHandler, priority: Priority) -> NetResult<()> {
        let label = self.node_label(node);
        let handlers = self
            .node_mut(node)?
            .handlers_mut()
            .ok_or_else(|| NetError::InvalidArgument(format!("{} is a remote node and takes no handlers", label)))?;
        handlers.register(handler, priority);
        Ok(())
    }

    // ---- ports ----

    /// Outer port `name` of `node`, created on first reference.
    pub fn port(&mut self, node: NodeId, name: impl IntoPortName) -> NetResult<PortId> {
        self.ensure_port(node, name.into_port_name()?, false)
    }

    /// Inner port `name` of a subnet, created on first reference.
    pub fn inner_port(&mut self, node: NodeId, name: impl IntoPortName) -> NetResult<PortId> {
        self.ensure_port(node, name.into_port_name()?, true)
    }

    pub fn get_port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.index())
    }

    pub(crate) fn port_ref(&self, id: PortId) -> NetResult<&Port> {
        self.ports
            .get(id.index())
            .ok_or_else(|| NetError::InvalidArgument(format!("unknown port {}", id)))
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Peers of `port`; empty for unknown ids.
    pub fn links(&self, port: PortId) -> &[PortId] {
        self.get_port(port).map(|p| p.links()).unwrap_or(&[])
    }

    /// Node owning `port`.
    pub fn port_owner(&self, port: PortId) -> Option<NodeId> {
        self.get_port(port).map(|p| p.node())
    }

    /// `"[{node}].{name}"` or `"[{node}].[inner].{name}"`.
    pub fn port_label(&self, id: PortId) -> String {
        match self.get_port(id) {
            Some(port) if port.is_inner() => {
                format!("[{}].[inner].{}", self.node_label(port.node()), port.name())
            }
            Some(port) => format!("[{}].{}", self.node_label(port.node()), port.name()),
            None => id.to_string(),
        }
    }

    pub(crate) fn ensure_port(&mut self, node: NodeId, name: PortName, is_inner: bool) -> NetResult<PortId> {
        let owner = self.node_ref(node)?;
        if !name.allowed_on(is_inner) {
            return Err(NetError::InvalidPortUsage {
                port: format!("[{}].{}", owner.label(self.domain.id()), name),
                requested: IoRole::In,
            });
        }

        let (own, other) = if is_inner {
            match owner.inner_ports() {
                Some(inner) => (inner, Some(owner.ports())),
                None => {
                    return Err(NetError::InvalidArgument(format!(
                        "{} is not a subnet and has no inner ports",
                        owner.label(self.domain.id())
                    )))
                }
            }
        } else {
            (owner.ports(), owner.inner_ports())
        };
        if let Some(existing) = own.get(&name) {
            return Ok(existing);
        }

        // A counterpart that already resolved its direction passes it on.
        let direction = other
            .and_then(|set| set.get(&name))
            .map(|id| self.ports[id.index()].direction())
            .unwrap_or_default();
        Ok(self.create_port(node, name, is_inner, direction))
    }

    pub(crate) fn create_port(&mut self, node: NodeId, name: PortName, is_inner: bool, direction: IoRole) -> PortId {
        let id = PortId::from_index(self.ports.len());
        self.ports.push(Port::new(name.clone(), node, is_inner, direction));
        let owner = &mut self.nodes[node.index()];
        if is_inner {
            if let Some(subnet) = owner.subnet.as_mut() {
                subnet.inner_ports.insert(name, id);
            }
        } else {
            owner.ports.insert(name, id);
        }
        id
    }

    /// Fixes the direction of `port`, propagating it to the same-named port
    /// on the other side of a subnet. Nothing changes when this fails.
    pub(crate) fn determine_direction(&mut self, port: PortId, direction: IoRole) -> NetResult<()> {
        let current = self.port_ref(port)?;
        if current.direction() == direction {
            return Ok(());
        }
        // The direction is shared by both sides, so this covers the counterpart too.
        if current.name().reserved_direction().is_some_and(|reserved| reserved != direction) {
            return Err(NetError::InvalidPortUsage {
                port: self.port_label(port),
                requested: direction.for_side(current.is_inner()),
            });
        }
        if current.direction().is_determined() {
            return Err(NetError::DirectionConflict {
                port: self.port_label(port),
                actual: current.io_type(),
                requested: current.io_type().flip(),
            });
        }

        let (node, name, is_inner) = (current.node(), current.name().clone(), current.is_inner());
        let has_counterpart = if is_inner {
            name.allowed_on(false)
        } else {
            self.node_ref(node)?.is_subnet()
        };
        let counterpart = if has_counterpart {
            Some(self.ensure_port(node, name.clone(), !is_inner)?)
        } else {
            None
        };

        self.ports[port.index()].set_direction(direction);
        if let Some(counterpart) = counterpart {
            self.ports[counterpart.index()].set_direction(direction);
        }

        self.diag.debug(
            Record::new(format!(
                "The direction of [{}].{} was determined to be {}.",
                self.node_label(node),
                name,
                direction
            ))
            .component("Net::determine_direction"),
        );
        Ok(())
    }

    /// Where a port lives, as seen by other domains.
    pub(crate) fn port_address(&self, id: PortId) -> NetResult<PortAddress> {
        let port = self.port_ref(id)?;
        let node = self.node_ref(port.node())?;
        let domain = match node.remote() {
            Some(link) => link.domain.id.clone(),
            None => self.domain.id().to_string(),
        };
        Ok(PortAddress {
            domain,
            node_uid: node.uid(),
            port: port.name().clone(),
            is_inner: port.is_inner(),
        })
    }

    pub(crate) fn is_local_port(&self, id: PortId) -> NetResult<bool> {
        let port = self.port_ref(id)?;
        Ok(self.node_ref(port.node())?.is_local())
    }

    // ---- running ----

    /// Runs `node` with `data`: `NodeWillRun` handlers, then the body, then
    /// `NodeDidRun` handlers. Failures are logged, never returned; the
    /// returned chain only tells whether it completed.
    pub fn run(&mut self, node: NodeId, data: Value, info: ControlInfo) -> NetResult<Asap> {
        let label = self.node_label(node);
        let (uid, kind) = {
            let target = self.node_ref(node)?;
            (target.uid(), &target.kind)
        };

        let (body, handlers) = match kind {
            NodeKind::Local { body, handlers } => (body.clone(), handlers.clone()),
            NodeKind::Remote(link) => {
                let request = RunRequest {
                    node_uid: uid,
                    port: info.port.map(|p| self.port_address(p)).transpose()?,
                    data,
                };
                let endpoint = link.endpoint.clone();
                let diag = self.diag.clone();
                return Ok(Asap::try_catch(
                    move || Ok(Step::deferred(async move { endpoint.run(request).await })),
                    move |e| {
                        diag.error(
                            Record::new(format!("Remote run failed: {:#}", e))
                                .node(label)
                                .component("Net::run"),
                        )
                    },
                ));
            }
        };

        let run_id = self.domain.next_run_id();
        self.diag.debug(
            Record::new(format!("[RunID={}] Node \"{}\" start running.", run_id, label)).component("Net::run"),
        );

        let control = Arc::new(WillRunControl::new(node, run_id, data, info));
        let catcher = |stage: &'static str| {
            let diag = self.diag.clone();
            let label = label.clone();
            move |e: anyhow::Error| {
                diag.error(
                    Record::new(format!("[RunID={}] {} failed: {:#}", run_id, stage, e))
                        .node(label)
                        .component("Net::run"),
                )
            }
        };

        let will_run = handlers.clone();
        let for_body = control.clone();
        let for_did_run = control.clone();
        let asap = Asap::try_catch(move || will_run.emit_will_run(control), catcher("NodeWillRun"))
            .then_try_catch(
                move || {
                    if for_body.is_prevented() {
                        return Ok(Step::Ready);
                    }
                    body.run(&RunContext {
                        node,
                        uid,
                        run_id,
                        data: for_body.data(),
                        info: *for_body.control_info(),
                    })
                },
                catcher("Node body"),
            )
            .then_try_catch(
                move || {
                    if for_did_run.is_prevented() {
                        return Ok(Step::Ready);
                    }
                    handlers.emit_did_run(Arc::new(DidRunControl {
                        node,
                        run_id,
                        data: for_did_run.data(),
                        info: *for_did_run.control_info(),
                    }))
                },
                catcher("NodeDidRun"),
            );
        Ok(asap)
    }

    /// Transfers `data` according to the port's ioType: an output feeds every
    /// linked peer, an input runs its own node.
    pub fn put(&mut self, port: PortId, data: Value) -> NetResult<()> {
        let current = self.port_ref(port)?;
        match current.io_type() {
            IoRole::Out => {
                for peer in current.links().to_vec() {
                    let target = self.port_ref(peer)?.node();
                    let asap = self.run(target, data.clone(), ControlInfo::from_port(peer))?;
                    self.defer(asap);
                }
            }
            IoRole::In => {
                let node = current.node();
                let asap = self.run(node, data, ControlInfo::from_port(port))?;
                self.defer(asap);
            }
            IoRole::Undetermined => {
                let label = self.port_label(port);
                self.diag.warn(
                    Record::new(format!(
                        "Cannot transfer data to the port {} as its direction has not yet been determined.",
                        label
                    ))
                    .node(self.node_label(current.node()))
                    .component("Net::put"),
                );
            }
        }
        Ok(())
    }

    /// Keeps an unfinished run chain so `settle` can drive it.
    pub(crate) fn defer(&mut self, asap: Asap) {
        if !asap.is_settled() {
            self.backlog.push(
                async move {
                    asap.await;
                }
                .boxed(),
            );
        }
    }

    /// True while negotiations or deferred run chains are outstanding.
    pub fn has_pending(&self) -> bool {
        !self.negotiations.is_empty() || !self.backlog.is_empty()
    }

    // ---- state ----

    pub fn state(&self, node: NodeId) -> Option<&Value> {
        self.node(node).map(|n| n.state())
    }

    pub fn state_mut(&mut self, node: NodeId) -> Option<&mut Value> {
        self.nodes.get_mut(node.index()).map(|n| &mut n.state)
    }

    pub fn set_state(&mut self, node: NodeId, state: Value) -> NetResult<()> {
        self.node_mut(node)?.state = state;
        Ok(())
    }

    /// Value at `path` (`a.b[0]["c.d"]`) inside the node's state.
    pub fn read_state(&self, node: NodeId, path: &str) -> Option<&Value> {
        self.state(node).and_then(|state| resolve_path(state, path))
    }

    pub fn ports_state(&self, node: NodeId) -> NetResult<BTreeMap<String, PortState>> {
        let owner = self.node_ref(node)?;
        let mut report = BTreeMap::new();
        for (name, id) in owner.ports().iter() {
            let port = &self.ports[id.index()];
            report.insert(
                name.to_string(),
                PortState {
                    direction: port.direction(),
                    outer_links: port.links().len(),
                    inner_links: None,
                },
            );
        }
        if let Some(inner) = owner.inner_ports() {
            for (name, id) in inner.iter() {
                let port = &self.ports[id.index()];
                let entry = report.entry(name.to_string()).or_insert(PortState {
                    direction: port.direction(),
                    outer_links: 0,
                    inner_links: None,
                });
                entry.inner_links = Some(port.links().len());
            }
            for entry in report.values_mut() {
                entry.inner_links.get_or_insert(0);
            }
        }
        Ok(report)
    }

    // ---- subnets ----

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> NetResult<()> {
        if !self.node_ref(parent)?.is_subnet() {
            return Err(NetError::InvalidArgument(format!(
                "{} is not a subnet",
                self.node_label(parent)
            )));
        }
        self.node_ref(child)?;
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(NetError::InvalidArgument(format!(
                "{} cannot contain its own ancestor {}",
                self.node_label(parent),
                self.node_label(child)
            )));
        }
        if let Some(previous) = self.nodes[child.index()].parent {
            self.remove_child(previous, child);
        }
        if let Some(subnet) = self.nodes[parent.index()].subnet.as_mut() {
            subnet.children.insert(child);
        }
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let removed = self
            .nodes
            .get_mut(parent.index())
            .and_then(|n| n.subnet.as_mut())
            .map(|subnet| subnet.children.remove(&child))
            .unwrap_or(false);
        if removed {
            self.nodes[child.index()].parent = None;
        }
        removed
    }

    pub fn children(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.node(node).and_then(|n| n.children())
    }

    pub fn is_child_of(&self, child: NodeId, parent: NodeId) -> bool {
        self.node(child).and_then(|n| n.parent()) == Some(parent)
    }

    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.node(node).and_then(|n| n.parent());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent());
        }
        false
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Net")
            .field("domain", &self.domain.id())
            .field("nodes", &self.nodes.len())
            .field("ports", &self.ports.len())
            .field("virtual_nodes", &self.virtual_nodes.len())
            .field("queued_actions", &self.actions.len())
            .field("negotiations", &self.negotiations.len())
            .field("backlog", &self.backlog.len())
            .finish()
    }
}

/// Declares a local node before adding it to a net.
pub struct NodeBuilder {
    brand: String,
    state: Value,
    body: Arc<dyn NodeBody>,
    subnet: bool,
    ports: Vec<(PortName, IoRole)>,
    handlers: Vec<(NodeHandler, Priority)>,
}

impl NodeBuilder {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            state: Value::Null,
            body: Arc::new(Idle),
            subnet: false,
            ports: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    pub fn body(mut self, body: impl NodeBody + 'static) -> Self {
        self.body = Arc::new(body);
        self
    }

    pub fn subnet(mut self) -> Self {
        self.subnet = true;
        self
    }

    /// Outer port created up front with a fixed direction.
    pub fn port(mut self, name: PortName, direction: IoRole) -> Self {
        self.ports.push((name, direction));
        self
    }

    pub fn on(mut self, handler: NodeHandler, priority: Priority) -> Self {
        self.handlers.push((handler, priority));
        self
    }

    pub fn build(self, net: &mut Net) -> NetResult<NodeId> {
        let mut declared: BTreeMap<PortName, IoRole> = BTreeMap::new();
        for (name, direction) in &self.ports {
            let misused = !name.allowed_on(false)
                || name.reserved_direction().is_some_and(|reserved| reserved != *direction);
            if misused {
                return Err(NetError::InvalidPortUsage {
                    port: format!("[{}].{}", self.brand, name),
                    requested: *direction,
                });
            }
            match declared.get(name) {
                Some(previous) if previous != direction => {
                    return Err(NetError::DirectionConflict {
                        port: format!("[{}].{}", self.brand, name),
                        actual: *previous,
                        requested: *direction,
                    });
                }
                Some(_) => {}
                None => {
                    declared.insert(name.clone(), *direction);
                }
            }
        }

        let node = net.insert_local(self.brand, self.state, self.body, self.subnet);
        for (name, direction) in declared {
            net.create_port(node, name, false, direction);
        }
        for (handler, priority) in self.handlers {
            net.on(node, handler, priority)?;
        }
        Ok(node)
    }
}
