use crate::core::port::{IoRole, PortName};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identity of another domain as announced by its transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDomain {
    pub id: String,
    pub random_run_id: String,
}

impl RemoteDomain {
    pub fn new(id: impl Into<String>, random_run_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            random_run_id: random_run_id.into(),
        }
    }
}

/// Globally meaningful address of a port: `(domain, node uid, side, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAddress {
    pub domain: String,
    pub node_uid: u64,
    pub port: PortName,
    pub is_inner: bool,
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inner {
            write!(f, "[{}#{}].[inner].{}", self.domain, self.node_uid, self.port)
        } else {
            write!(f, "[{}#{}].{}", self.domain, self.node_uid, self.port)
        }
    }
}

/// Asks the remote side to accept a link. `role` is the ioType the remote
/// port would take on the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeRequest {
    pub target: PortAddress,
    pub requester: PortAddress,
    pub role: IoRole,
}

/// Tells the remote side to drop its half of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpipeNotice {
    pub target: PortAddress,
    pub peer: PortAddress,
}

/// Data delivered to a remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub node_uid: u64,
    pub port: Option<PortAddress>,
    pub data: Value,
}

/// Contract a transport has to satisfy for remote nodes to take part in a
/// local graph. Every call may complete later; errors are communication
/// failures.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Remote half of a pipe negotiation. Returning `Ok(true)` means the
    /// remote port already committed its side of the link.
    async fn request_pipe(&self, request: PipeRequest) -> Result<bool>;

    async fn notify_unpipe(&self, notice: UnpipeNotice) -> Result<()>;

    async fn run(&self, request: RunRequest) -> Result<()>;
}

/// What a remote node in the arena keeps about its origin.
#[derive(Clone)]
pub struct RemoteLink {
    pub domain: RemoteDomain,
    pub endpoint: Arc<dyn RemoteEndpoint>,
}

impl fmt::Debug for RemoteLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLink")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}
