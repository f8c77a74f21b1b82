//! Structural errors raised by the net.
//!
//! Refusals and transport failures during negotiation are not errors here:
//! they are logged and the caller only observes that no link was created.

use crate::core::port::IoRole;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{port} is an {actual} port, but used as an {requested} port")]
    DirectionConflict {
        port: String,
        actual: IoRole,
        requested: IoRole,
    },

    #[error("{port} is reserved and cannot be used as an {requested} port")]
    InvalidPortUsage { port: String, requested: IoRole },

    #[error("Illegal port name {0:?}")]
    InvalidPortName(String),

    #[error("{from} is not connected to {to}")]
    NotConnected { from: String, to: String },

    #[error("Invalid length of domain id ({0}), expected 2..=127 characters")]
    InvalidDomainId(usize),

    #[error("Communication failure: {0}")]
    Communication(String),
}

pub type NetResult<T> = std::result::Result<T, NetError>;
