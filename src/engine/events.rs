//! Node events and the per-node handler table.
//!
//! Each event kind has its own handler signature. A node only allocates a
//! queue for a kind once a handler of that kind is registered, so emitting an
//! event nobody listens to costs a single `Option` check.

use crate::core::id::{NodeId, PortId};
use crate::core::node::ControlInfo;
use crate::core::port::{IoRole, PortName};
use crate::engine::asap::{exec_asap, Step};
use crate::engine::priority::Priority;
use crate::engine::queue::SortedPriorityQueue;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeEvent {
    WillRun,
    DidRun,
    WillPipe,
    DidPipe,
    DidUnpipe,
}

/// Shared control object of one run, handed to every `NodeWillRun` handler.
#[derive(Debug)]
pub struct WillRunControl {
    node: NodeId,
    run_id: u64,
    data: Mutex<Value>,
    info: ControlInfo,
    prevent_running: AtomicBool,
}

impl WillRunControl {
    pub fn new(node: NodeId, run_id: u64, data: Value, info: ControlInfo) -> Self {
        Self {
            node,
            run_id,
            data: Mutex::new(data),
            info,
            prevent_running: AtomicBool::new(false),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn data(&self) -> Value {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the data the node body will receive.
    pub fn set_data(&self, data: Value) {
        *self
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = data;
    }

    pub fn control_info(&self) -> &ControlInfo {
        &self.info
    }

    /// Stops the run: no later handler and no node body will be invoked.
    pub fn prevent_running(&self) {
        self.prevent_running.store(true, Ordering::SeqCst);
    }

    pub fn is_prevented(&self) -> bool {
        self.prevent_running.load(Ordering::SeqCst)
    }
}

/// Read-only view of a finished run, handed to `NodeDidRun` handlers.
#[derive(Debug, Clone)]
pub struct DidRunControl {
    pub node: NodeId,
    pub run_id: u64,
    pub data: Value,
    pub info: ControlInfo,
}

/// Payload of the pipe events, seen from the node that receives the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeEvent {
    pub node: NodeId,
    pub port: PortId,
    pub port_name: PortName,
    pub target_node: NodeId,
    pub target_port: PortId,
    /// Direction `port` takes (or has) on this link. Like `Port::direction`,
    /// this is not flipped for inner ports; `io_type` is derived from it.
    pub direction: IoRole,
    pub is_inner: bool,
}

pub type WillRunHandler = Arc<dyn Fn(&WillRunControl) -> Result<Step> + Send + Sync>;
pub type DidRunHandler = Arc<dyn Fn(&DidRunControl) -> Result<Step> + Send + Sync>;
/// Returns false to veto the pipe.
pub type WillPipeHandler = Arc<dyn Fn(&PipeEvent) -> bool + Send + Sync>;
pub type PipeHandler = Arc<dyn Fn(&PipeEvent) + Send + Sync>;

/// A handler tagged with the event kind it listens to.
#[derive(Clone)]
pub enum NodeHandler {
    WillRun(WillRunHandler),
    DidRun(DidRunHandler),
    WillPipe(WillPipeHandler),
    DidPipe(PipeHandler),
    DidUnpipe(PipeHandler),
}

impl NodeHandler {
    pub fn will_run<F>(f: F) -> Self
    where
        F: Fn(&WillRunControl) -> Result<Step> + Send + Sync + 'static,
    {
        NodeHandler::WillRun(Arc::new(f))
    }

    pub fn did_run<F>(f: F) -> Self
    where
        F: Fn(&DidRunControl) -> Result<Step> + Send + Sync + 'static,
    {
        NodeHandler::DidRun(Arc::new(f))
    }

    pub fn will_pipe<F>(f: F) -> Self
    where
        F: Fn(&PipeEvent) -> bool + Send + Sync + 'static,
    {
        NodeHandler::WillPipe(Arc::new(f))
    }

    pub fn did_pipe<F>(f: F) -> Self
    where
        F: Fn(&PipeEvent) + Send + Sync + 'static,
    {
        NodeHandler::DidPipe(Arc::new(f))
    }

    pub fn did_unpipe<F>(f: F) -> Self
    where
        F: Fn(&PipeEvent) + Send + Sync + 'static,
    {
        NodeHandler::DidUnpipe(Arc::new(f))
    }

    pub fn event(&self) -> NodeEvent {
        match self {
            NodeHandler::WillRun(_) => NodeEvent::WillRun,
            NodeHandler::DidRun(_) => NodeEvent::DidRun,
            NodeHandler::WillPipe(_) => NodeEvent::WillPipe,
            NodeHandler::DidPipe(_) => NodeEvent::DidPipe,
            NodeHandler::DidUnpipe(_) => NodeEvent::DidUnpipe,
        }
    }
}

impl fmt::Debug for NodeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandler::{:?}", self.event())
    }
}

type Queue<H> = Option<SortedPriorityQueue<Priority, H>>;

fn enqueue<H>(queue: &mut Queue<H>, priority: Priority, handler: H) {
    queue
        .get_or_insert_with(SortedPriorityQueue::new)
        .enqueue(priority, handler);
}

fn snapshot<H: Clone>(queue: &Queue<H>) -> Option<Vec<H>> {
    queue.as_ref().map(|q| q.as_slice().to_vec())
}

/// Cloning is cheap: handlers are reference counted.
#[derive(Default, Clone)]
pub struct HandlerTable {
    will_run: Queue<WillRunHandler>,
    did_run: Queue<DidRunHandler>,
    will_pipe: Queue<WillPipeHandler>,
    did_pipe: Queue<PipeHandler>,
    did_unpipe: Queue<PipeHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: NodeHandler, priority: Priority) {
        match handler {
            NodeHandler::WillRun(h) => enqueue(&mut self.will_run, priority, h),
            NodeHandler::DidRun(h) => enqueue(&mut self.did_run, priority, h),
            NodeHandler::WillPipe(h) => enqueue(&mut self.will_pipe, priority, h),
            NodeHandler::DidPipe(h) => enqueue(&mut self.did_pipe, priority, h),
            NodeHandler::DidUnpipe(h) => enqueue(&mut self.did_unpipe, priority, h),
        }
    }

    /// Number of handlers for `event`; `None` if that queue was never allocated.
    pub fn count(&self, event: NodeEvent) -> Option<usize> {
        match event {
            NodeEvent::WillRun => self.will_run.as_ref().map(|q| q.len()),
            NodeEvent::DidRun => self.did_run.as_ref().map(|q| q.len()),
            NodeEvent::WillPipe => self.will_pipe.as_ref().map(|q| q.len()),
            NodeEvent::DidPipe => self.did_pipe.as_ref().map(|q| q.len()),
            NodeEvent::DidUnpipe => self.did_unpipe.as_ref().map(|q| q.len()),
        }
    }

    /// Runs handlers in priority order, stopping once one of them prevents
    /// the run. Handlers after the first deferred one are chained onto it.
    pub fn emit_will_run(&self, control: Arc<WillRunControl>) -> Result<Step> {
        let Some(handlers) = snapshot(&self.will_run) else {
            return Ok(Step::Ready);
        };
        let watched = control.clone();
        exec_asap(
            handlers,
            move |handler: &WillRunHandler| handler(control.as_ref()),
            move || !watched.is_prevented(),
        )
    }

    /// Like `emit_will_run` without cancellation: every handler runs.
    pub fn emit_did_run(&self, control: Arc<DidRunControl>) -> Result<Step> {
        let Some(handlers) = snapshot(&self.did_run) else {
            return Ok(Step::Ready);
        };
        exec_asap(
            handlers,
            move |handler: &DidRunHandler| handler(control.as_ref()),
            || true,
        )
    }

    /// True unless some handler vetoes. Dispatch stops at the first veto.
    pub fn emit_will_pipe(&self, event: &PipeEvent) -> bool {
        match &self.will_pipe {
            Some(handlers) => handlers.iter().all(|handler| handler(event)),
            None => true,
        }
    }

    pub fn emit_did_pipe(&self, event: &PipeEvent) {
        if let Some(handlers) = &self.did_pipe {
            for handler in handlers {
                handler(event);
            }
        }
    }

    pub fn emit_did_unpipe(&self, event: &PipeEvent) {
        if let Some(handlers) = &self.did_unpipe {
            for handler in handlers {
                handler(event);
            }
        }
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("will_run", &self.count(NodeEvent::WillRun))
            .field("did_run", &self.count(NodeEvent::DidRun))
            .field("will_pipe", &self.count(NodeEvent::WillPipe))
            .field("did_pipe", &self.count(NodeEvent::DidPipe))
            .field("did_unpipe", &self.count(NodeEvent::DidUnpipe))
            .finish()
    }
}
