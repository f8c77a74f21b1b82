//! Pipe negotiation between ports.
//!
//! A pipe from `A` (source) to `B` (target) asks `A`'s node, then `B`'s node
//! for permission and commits the link on `B` before `A`. When `B` belongs to
//! another domain its answer arrives later; the negotiation is parked in the
//! net and concluded by `Net::settle`.

use crate::core::id::{Endpoint, PortId};
use crate::core::port::{IoRole, PortName, RoleViolation};
use crate::engine::events::PipeEvent;
use crate::engine::net::Net;
use crate::engine::virtual_node::{PipeAction, Slot};
use crate::error::{NetError, NetResult};
use crate::observability::Record;
use crate::remote::{PipeRequest, UnpipeNotice};
use futures::future::{join, join_all, BoxFuture, FutureExt};

/// What a pipe attempt ended in. Refusals are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeOutcome {
    Linked,
    /// A `NodeWillPipe` handler or the target port said no.
    Refused,
    /// Waiting for a remote answer; concluded by `Net::settle`.
    Pending,
    /// One side is a placeholder; recorded in the action queue.
    Queued,
    AlreadyLinked,
}

/// A negotiation with a remote port whose answer has not arrived yet.
pub(crate) struct PendingNegotiation {
    pub(crate) local: PortId,
    pub(crate) remote: PortId,
    /// ioType the local port takes on this link.
    pub(crate) local_role: IoRole,
    pub(crate) answer: BoxFuture<'static, anyhow::Result<bool>>,
}

impl Net {
    /// Pipes `from` to `to`. Nodes stand for their `$O` (source) and `$I`
    /// (target) ports.
    pub fn connect(&mut self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> NetResult<PipeOutcome> {
        let source = self.resolve_slot(from.into(), PortName::OUTPUT)?;
        let target = self.resolve_slot(to.into(), PortName::INPUT)?;
        match (source, target) {
            (Slot::Real(a), Slot::Real(b)) => self.pipe_ports(a, b),
            (from, to) => {
                self.actions.add(PipeAction { from, to });
                self.diag_debug(format!("Queued pipe action, {} pending.", self.actions.len()), "Net::pipe");
                Ok(PipeOutcome::Queued)
            }
        }
    }

    /// Like `connect`, returning the target if it was node-shaped so chains
    /// can continue from it.
    pub fn pipe(&mut self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> NetResult<Option<Endpoint>> {
        let to = to.into();
        self.connect(from, to)?;
        Ok(to.is_node_like().then_some(to))
    }

    /// Like `connect`, returning the source.
    pub fn also_pipe(&mut self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> NetResult<Endpoint> {
        let from = from.into();
        self.connect(from, to)?;
        Ok(from)
    }

    /// Removes the link from `from` to `to`. A missing link is reported as a
    /// warning only. Returns the source.
    pub fn unpipe(&mut self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> NetResult<Endpoint> {
        let from = from.into();
        let a = match from {
            Endpoint::Node(node) => self.port(node, PortName::OUTPUT)?,
            Endpoint::Port(port) => self.port_ref(port).map(|_| port)?,
            _ => return Err(NetError::InvalidArgument("cannot unpipe from a placeholder".into())),
        };
        if !self.is_local_port(a)? {
            return Err(NetError::InvalidArgument(format!(
                "{} belongs to a remote node",
                self.port_label(a)
            )));
        }
        let b = match to.into() {
            Endpoint::Node(node) => self.port(node, PortName::INPUT)?,
            Endpoint::Port(port) => self.port_ref(port).map(|_| port)?,
            _ => return Err(NetError::InvalidArgument("cannot unpipe a placeholder".into())),
        };

        if !self.ports[a.index()].remove_link(b) {
            let missing = NetError::NotConnected {
                from: self.port_label(a),
                to: self.port_label(b),
            };
            self.diagnostics().warn(
                Record::new(format!("{} while executing unpipe.", missing))
                    .node(self.node_label(self.ports[a.index()].node()))
                    .component("Net::unpipe"),
            );
            return Ok(from);
        }

        let event = self.pipe_event(a, b, self.ports[a.index()].direction());
        if let Some(handlers) = self.nodes[event.node.index()].handlers() {
            handlers.emit_did_unpipe(&event);
        }
        self.diag_debug(
            format!("{} unpiped with {}.", self.port_label(a), self.port_label(b)),
            "Net::unpipe",
        );

        // The peer drops its half silently.
        let peer_removed = self.ports[b.index()].remove_link(a);
        if self.is_local_port(b)? {
            if peer_removed {
                self.diagnostics().info(
                    Record::new(format!("{} unpiped with {}.", self.port_label(b), self.port_label(a)))
                        .component("Net::unpipe"),
                );
            }
        } else {
            self.notify_remote_unpipe(b, a)?;
        }
        Ok(from)
    }

    fn resolve_slot(&mut self, endpoint: Endpoint, default: PortName) -> NetResult<Slot> {
        match endpoint {
            Endpoint::Node(node) => Ok(Slot::Real(self.port(node, default)?)),
            Endpoint::Port(port) => {
                self.port_ref(port)?;
                Ok(Slot::Real(port))
            }
            Endpoint::VirtualNode(vnode) => {
                let vport = self.virtual_port(vnode, default)?;
                self.resolve_virtual(vport)
            }
            Endpoint::VirtualPort(vport) => self.resolve_virtual(vport),
        }
    }

    /// Negotiates a link between two real ports.
    pub(crate) fn pipe_ports(&mut self, a: PortId, b: PortId) -> NetResult<PipeOutcome> {
        if a == b {
            let port = self.port_ref(a)?;
            return Err(NetError::DirectionConflict {
                port: self.port_label(a),
                actual: port.io_type(),
                requested: IoRole::In,
            });
        }
        match (self.is_local_port(a)?, self.is_local_port(b)?) {
            (false, false) => {
                return Err(NetError::InvalidArgument(format!(
                    "cannot pipe {} to {}: both ports are remote",
                    self.port_label(a),
                    self.port_label(b)
                )))
            }
            (false, true) => return self.be_piped(b, a),
            _ => {}
        }

        self.check_role(a, IoRole::Out)?;
        self.check_role(b, IoRole::In)?;
        if self.ports[a.index()].is_linked_to(b) {
            self.diag_debug(
                format!("{} is already piped to {}.", self.port_label(a), self.port_label(b)),
                "Net::pipe",
            );
            return Ok(PipeOutcome::AlreadyLinked);
        }
        if self.is_negotiating(a, b) {
            return Ok(PipeOutcome::Pending);
        }

        let direction = IoRole::Out.for_side(self.ports[a.index()].is_inner());
        let event = self.pipe_event(a, b, direction);
        if !self.will_pipe(&event) {
            self.diag_info(
                format!(
                    "Pipe {} → {} was refused by {}.",
                    self.port_label(a),
                    self.port_label(b),
                    self.port_label(a)
                ),
                "Net::pipe",
            );
            return Ok(PipeOutcome::Refused);
        }

        if !self.is_local_port(b)? {
            let answer = self.request_remote(b, a, IoRole::In)?;
            self.negotiations.push(PendingNegotiation {
                local: a,
                remote: b,
                local_role: IoRole::Out,
                answer,
            });
            return Ok(PipeOutcome::Pending);
        }

        if !self.be_requested_pipe(b, a, IoRole::In)? {
            return Ok(PipeOutcome::Refused);
        }
        if let Err(e) = self.commit_link(a, b, IoRole::Out) {
            self.ports[b.index()].remove_link(a);
            return Err(e);
        }
        self.diag_debug(
            format!("Pipe {} → {} .", self.port_label(a), self.port_label(b)),
            "Net::pipe",
        );
        Ok(PipeOutcome::Linked)
    }

    /// Receiving half of a negotiation: `port` is asked to take `role` on a
    /// link to `requester`. Commits its own side when it agrees.
    pub(crate) fn be_requested_pipe(&mut self, port: PortId, requester: PortId, role: IoRole) -> NetResult<bool> {
        let (ups, dws) = self.ends(port, requester, role);
        let current = self.port_ref(port)?;
        if current.io_type().is_determined() && current.io_type() != role {
            self.diag_info(
                format!(
                    "Pipe {} → {} was refused because {} is an {} port.",
                    ups,
                    dws,
                    self.port_label(port),
                    current.io_type()
                ),
                "Net::be_requested_pipe",
            );
            return Ok(false);
        }

        let event = self.pipe_event(port, requester, role.for_side(current.is_inner()));
        if !self.will_pipe(&event) {
            self.diag_info(
                format!("Pipe {} → {} was refused by {}.", ups, dws, self.port_label(port)),
                "Net::be_requested_pipe",
            );
            return Ok(false);
        }
        self.commit_link(port, requester, role)?;
        Ok(true)
    }

    /// A remote source asks to pipe into the local `port`. The local node is
    /// asked first, then the remote one; the local side commits once the
    /// remote answer is in.
    pub(crate) fn be_piped(&mut self, port: PortId, remote: PortId) -> NetResult<PipeOutcome> {
        self.check_role(port, IoRole::In)?;
        self.check_role(remote, IoRole::Out)?;
        if self.ports[port.index()].is_linked_to(remote) {
            return Ok(PipeOutcome::AlreadyLinked);
        }
        if self.is_negotiating(port, remote) {
            return Ok(PipeOutcome::Pending);
        }

        let direction = IoRole::In.for_side(self.ports[port.index()].is_inner());
        let event = self.pipe_event(port, remote, direction);
        if !self.will_pipe(&event) {
            self.diag_info(
                format!(
                    "Pipe {} → {} was refused by {}.",
                    self.port_label(remote),
                    self.port_label(port),
                    self.port_label(port)
                ),
                "Net::be_piped",
            );
            return Ok(PipeOutcome::Refused);
        }

        let answer = self.request_remote(remote, port, IoRole::Out)?;
        self.negotiations.push(PendingNegotiation {
            local: port,
            remote,
            local_role: IoRole::In,
            answer,
        });
        Ok(PipeOutcome::Pending)
    }

    /// Drives every parked negotiation and deferred run chain to completion,
    /// including work those spawn in turn.
    pub async fn settle(&mut self) {
        loop {
            let negotiations = std::mem::take(&mut self.negotiations);
            let backlog = std::mem::take(&mut self.backlog);
            if negotiations.is_empty() && backlog.is_empty() {
                break;
            }

            let (contexts, answers): (Vec<_>, Vec<_>) = negotiations
                .into_iter()
                .map(|n| ((n.local, n.remote, n.local_role), n.answer))
                .unzip();
            let (answers, _) = join(join_all(answers), join_all(backlog)).await;

            for ((local, remote, role), answer) in contexts.into_iter().zip(answers) {
                self.conclude(local, remote, role, answer);
            }
        }
    }

    /// True while an answer about the link between `local` and `remote` is
    /// still outstanding.
    fn is_negotiating(&self, local: PortId, remote: PortId) -> bool {
        self.negotiations
            .iter()
            .any(|n| n.local == local && n.remote == remote)
    }

    fn conclude(&mut self, local: PortId, remote: PortId, local_role: IoRole, answer: anyhow::Result<bool>) {
        let (ups, dws) = self.ends(local, remote, local_role);
        match answer {
            Ok(true) => match self.commit_link(local, remote, local_role) {
                Ok(()) => {
                    self.mirror_link(remote, local, local_role.flip());
                    self.diag_debug(format!("Pipe {} → {} .", ups, dws), "Net::settle");
                }
                Err(e) => {
                    self.diag_error(
                        format!("Pipe {} → {} accepted remotely but failed locally: {}", ups, dws, e),
                        "Net::settle",
                    );
                    self.rollback(local, remote);
                }
            },
            Ok(false) => {
                self.diag_info(
                    format!("Pipe {} → {} was refused by {}.", ups, dws, self.port_label(remote)),
                    "Net::settle",
                );
            }
            Err(e) => {
                let failure = NetError::Communication(format!("{:#}", e));
                self.diag_error(
                    format!(
                        "Pipe {} → {} failed because no valid response was received from {}. {}",
                        ups,
                        dws,
                        self.port_label(remote),
                        failure
                    ),
                    "Net::settle",
                );
                self.rollback(local, remote);
            }
        }
    }

    /// Asks the remote side to forget a half-established link.
    fn rollback(&mut self, local: PortId, remote: PortId) {
        if let Err(e) = self.notify_remote_unpipe(remote, local) {
            self.diag_error(format!("Rollback of {} failed: {}", self.port_label(remote), e), "Net::settle");
        }
    }

    fn notify_remote_unpipe(&mut self, remote: PortId, peer: PortId) -> NetResult<()> {
        let endpoint = self
            .node_ref(self.port_ref(remote)?.node())?
            .remote()
            .map(|link| link.endpoint.clone())
            .ok_or_else(|| NetError::InvalidArgument(format!("{} is not remote", self.port_label(remote))))?;
        let notice = UnpipeNotice {
            target: self.port_address(remote)?,
            peer: self.port_address(peer)?,
        };
        let diag = self.diagnostics().clone();
        let label = self.port_label(remote);
        self.backlog.push(
            async move {
                if let Err(e) = endpoint.notify_unpipe(notice).await {
                    diag.warn(
                        Record::new(format!("Could not notify {} of unpipe: {:#}", label, e))
                            .component("Net::unpipe"),
                    );
                }
            }
            .boxed(),
        );
        Ok(())
    }

    fn request_remote(
        &self,
        remote: PortId,
        requester: PortId,
        role: IoRole,
    ) -> NetResult<BoxFuture<'static, anyhow::Result<bool>>> {
        let link = self
            .node_ref(self.port_ref(remote)?.node())?
            .remote()
            .cloned()
            .ok_or_else(|| NetError::InvalidArgument(format!("{} is not remote", self.port_label(remote))))?;
        let request = PipeRequest {
            target: self.port_address(remote)?,
            requester: self.port_address(requester)?,
            role,
        };
        Ok(async move { link.endpoint.request_pipe(request).await }.boxed())
    }

    /// Resolves the direction of `port`, records the peer and announces it.
    fn commit_link(&mut self, port: PortId, peer: PortId, io_type: IoRole) -> NetResult<()> {
        let direction = io_type.for_side(self.port_ref(port)?.is_inner());
        self.determine_direction(port, direction)?;
        self.ports[port.index()].add_link(peer);

        let event = self.pipe_event(port, peer, direction);
        if let Some(handlers) = self.nodes[event.node.index()].handlers() {
            handlers.emit_did_pipe(&event);
        }
        Ok(())
    }

    /// Records a link on a remote stand-in port. The remote domain owns the
    /// real state, so nothing is announced.
    fn mirror_link(&mut self, port: PortId, peer: PortId, io_type: IoRole) {
        let stand_in = &mut self.ports[port.index()];
        if !stand_in.direction().is_determined() {
            let direction = io_type.for_side(stand_in.is_inner());
            stand_in.set_direction(direction);
        }
        stand_in.add_link(peer);
    }

    fn check_role(&self, port: PortId, io_type: IoRole) -> NetResult<()> {
        let current = self.port_ref(port)?;
        match current.role_violation(io_type) {
            None => Ok(()),
            Some(RoleViolation::Reserved) => Err(NetError::InvalidPortUsage {
                port: self.port_label(port),
                requested: io_type,
            }),
            Some(RoleViolation::Conflict) => Err(NetError::DirectionConflict {
                port: self.port_label(port),
                actual: current.io_type(),
                requested: io_type,
            }),
        }
    }

    fn will_pipe(&self, event: &PipeEvent) -> bool {
        self.nodes[event.node.index()]
            .handlers()
            .map_or(true, |handlers| handlers.emit_will_pipe(event))
    }

    fn pipe_event(&self, port: PortId, peer: PortId, direction: IoRole) -> PipeEvent {
        let own = &self.ports[port.index()];
        PipeEvent {
            node: own.node(),
            port,
            port_name: own.name().clone(),
            target_node: self.ports[peer.index()].node(),
            target_port: peer,
            direction,
            is_inner: own.is_inner(),
        }
    }

    /// Labels of the upstream and downstream end, given `port`'s role.
    fn ends(&self, port: PortId, peer: PortId, role: IoRole) -> (String, String) {
        if role == IoRole::In {
            (self.port_label(peer), self.port_label(port))
        } else {
            (self.port_label(port), self.port_label(peer))
        }
    }

    fn diag_debug(&self, msg: String, component: &'static str) {
        self.diagnostics().debug(Record::new(msg).component(component));
    }

    fn diag_info(&self, msg: String, component: &'static str) {
        self.diagnostics().info(Record::new(msg).component(component));
    }

    fn diag_error(&self, msg: String, component: &'static str) {
        self.diagnostics().error(Record::new(msg).component(component));
    }
}
