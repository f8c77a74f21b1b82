//! Contract between the local net and nodes owned by other domains.
//!
//! No wire transport lives here; a transport implements `RemoteEndpoint` and
//! the net drives it during pipe negotiation, data delivery and unpipe.

pub mod mock;
pub mod traits;

pub use mock::{MockAnswer, MockEndpoint};
pub use traits::{PipeRequest, PortAddress, RemoteDomain, RemoteEndpoint, RemoteLink, RunRequest, UnpipeNotice};
