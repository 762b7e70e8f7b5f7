//! Domain events the core surfaces upward (spec §4.6, §4.10).
use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::wire::{PeerState, ValidationState};

/// An event delivered to whatever is driving the core (spec's "core
/// application layer" in §2).
#[derive(Debug, Clone)]
pub enum Event {
    /// The daemon signalled a new neighbour (`CONNECT`).
    Connected {
        /// The neighbour's identity.
        peer: PeerId,
        /// Initial outbound quota, bytes/s.
        quota_out: u32,
    },
    /// The daemon signalled a neighbour is gone (`DISCONNECT`).
    Disconnected {
        /// The neighbour's identity.
        peer: PeerId,
    },
    /// An inbound application message arrived (`RECV`).
    Received {
        /// The sending neighbour.
        peer: PeerId,
        /// The inner message bytes.
        message: Vec<u8>,
    },
    /// The daemon changed a neighbour's outbound quota (`SET_QUOTA`).
    QuotaUpdated {
        /// The neighbour.
        peer: PeerId,
        /// The new quota, bytes/s.
        quota_out: u32,
    },
    /// Our own `HELLO` was (re-)received from the daemon.
    HelloUpdated {
        /// The opaque HELLO blob.
        blob: Vec<u8>,
    },
    /// A peer-state monitor response arrived (spec §4.10).
    PeerMonitor {
        /// The described peer.
        peer: PeerId,
        /// Its current state.
        state: PeerState,
        /// When the daemon expects to next transition this state.
        timeout: LocalTime,
    },
    /// A one-shot peer-state subscription reached its terminator.
    PeerMonitorEnd,
    /// A validation-state monitor response arrived (spec §4.10).
    ValidationMonitor {
        /// The described peer.
        peer: PeerId,
        /// Its current validation state.
        state: ValidationState,
        /// When the daemon expects to next transition this state.
        timeout: LocalTime,
    },
    /// A one-shot validation-state subscription reached its terminator.
    ValidationMonitorEnd,
    /// A neighbour has stayed not-ready past the warn interval (spec §3).
    UnreadyWarning {
        /// The neighbour.
        peer: PeerId,
        /// How long it has been unready.
        unready_for: LocalDuration,
    },
    /// A malformed or inconsistent frame was received; the link is about
    /// to reconnect (spec §7 ProtocolViolation).
    ProtocolViolation(String),
}
