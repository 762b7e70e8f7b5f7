//! Error taxonomy shared across the transport-core crates.
//!
//! These are kinds, not wire codes (spec §7): every crate-specific error
//! enum has a variant that maps onto one of these, via `#[from]` the way
//! the teacher's `nakamoto-node::Error` wraps `p2p::error::Error`.
use thiserror::Error;

/// The five error kinds named in spec §7.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// The daemon sent a malformed or inconsistent frame.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
    /// No token budget, or no SEND_OK arrived before the deadline.
    #[error("congestion: request timed out")]
    Congestion,
    /// A plugin reported hard send failure, or no session could be created.
    #[error("peer unreachable: {0}")]
    Unreachable(&'static str),
    /// An address failed to parse, or `check_address` rejected it.
    #[error("invalid address: {0}")]
    InvalidAddress(&'static str),
    /// The caller requested a local shutdown.
    #[error("local shutdown")]
    LocalShutdown,
}

impl Error {
    /// Whether this error should trigger a reconnect-with-backoff, per
    /// spec §7's propagation policy.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_))
    }
}
