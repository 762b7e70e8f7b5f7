//! The daemon link's connection state and reconnect backoff (spec §3
//! "Daemon Link", §4.5).
//!
//! Grounded on `nakamoto-node/src/lib.rs`'s `run()` for the shape of a
//! single-connection bring-up sequence, with the reconnect/backoff gap
//! filled in from spec §4.5 and the monotonic-backoff property in §8.
use transport_core::peer::PeerId;
use transport_core::time::LocalDuration;

use crate::wire::{start_options, Frame};

/// Default initial reconnect delay.
pub const DEFAULT_INITIAL_BACKOFF: LocalDuration = LocalDuration::from_millis(500);
/// Default backoff growth factor.
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;
/// Default backoff cap.
pub const DEFAULT_BACKOFF_CAP: LocalDuration = LocalDuration::from_secs(60);

/// Exponential backoff with a cap, reset on success (spec §8 property 7:
/// "monotonically non-decreasing until a successful reconnect, then
/// resets").
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: LocalDuration,
    cap: LocalDuration,
    factor: u32,
    current: LocalDuration,
}

impl Backoff {
    /// Construct a backoff sequence starting at `initial`, growing by
    /// `factor` each failure, capped at `cap`.
    pub fn new(initial: LocalDuration, factor: u32, cap: LocalDuration) -> Self {
        Self {
            initial,
            cap,
            factor,
            current: initial,
        }
    }

    /// The delay to use for the next reconnect attempt, then advance the
    /// sequence (multiply by `factor`, capped).
    pub fn next_delay(&mut self) -> LocalDuration {
        let delay = self.current;
        let grown = LocalDuration::from_micros(
            self.current.as_micros().saturating_mul(self.factor as u64),
        );
        self.current = if grown.as_micros() > self.cap.as_micros() {
            self.cap
        } else {
            grown
        };
        delay
    }

    /// Reset to the initial delay, on a successful reconnect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_CAP)
    }
}

/// Connection lifecycle state of the daemon link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection, no reconnect scheduled (initial state or after
    /// local shutdown).
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and past the `START` handshake.
    Connected,
    /// Disconnected; a reconnect is scheduled after the current backoff.
    Reconnecting,
}

/// Owns the daemon link's connection state and reconnect backoff. Does not
/// own the socket itself — that is the reactor's job; this just tracks
/// what the core believes the link's state to be (spec §3's "reconnecting
/// latch that suppresses further writes while a reconnect is pending").
pub struct DaemonLink {
    state: LinkState,
    backoff: Backoff,
    me: PeerId,
    options: u32,
}

impl DaemonLink {
    /// Construct a new, idle daemon link for local identity `me`.
    pub fn new(me: PeerId) -> Self {
        Self {
            state: LinkState::Idle,
            backoff: Backoff::default(),
            me,
            options: start_options::SELF_IDENTITY_CHECK | start_options::DELIVER_INBOUND,
        }
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether writes should be suppressed (spec's "reconnecting latch").
    pub fn is_reconnecting(&self) -> bool {
        matches!(self.state, LinkState::Reconnecting | LinkState::Connecting)
    }

    /// Mark a connection attempt as begun.
    pub fn begin_connecting(&mut self) {
        self.state = LinkState::Connecting;
    }

    /// The connection opened; build the `START` frame and mark connected,
    /// resetting backoff (spec §8 property 7).
    pub fn on_opened(&mut self) -> Vec<u8> {
        self.state = LinkState::Connected;
        self.backoff.reset();
        Frame::Start {
            options: self.options,
            me: self.me,
        }
        .encode()
    }

    /// The connection was lost; advance to `Reconnecting` and return the
    /// delay to wait before the next attempt.
    pub fn on_closed(&mut self) -> LocalDuration {
        self.state = LinkState::Reconnecting;
        self.backoff.next_delay()
    }

    /// Local shutdown was requested; go idle with no further reconnects.
    pub fn shutdown(&mut self) {
        self.state = LinkState::Idle;
    }

    /// Whether the link is fully up (past `START`).
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport_core::peer::PEER_ID_LEN;

    #[test]
    fn backoff_grows_and_caps() {
        let mut b = Backoff::new(
            LocalDuration::from_millis(100),
            2,
            LocalDuration::from_millis(350),
        );
        assert_eq!(b.next_delay(), LocalDuration::from_millis(100));
        assert_eq!(b.next_delay(), LocalDuration::from_millis(200));
        assert_eq!(b.next_delay(), LocalDuration::from_millis(350)); // capped from 400
        assert_eq!(b.next_delay(), LocalDuration::from_millis(350));
    }

    #[test]
    fn backoff_resets() {
        let mut b = Backoff::new(LocalDuration::from_millis(100), 2, LocalDuration::from_secs(1));
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), LocalDuration::from_millis(100));
    }

    #[test]
    fn opened_resets_backoff_and_emits_start() {
        let mut link = DaemonLink::new(PeerId::new([1u8; PEER_ID_LEN]));
        link.on_closed();
        link.on_closed();
        let bytes = link.on_opened();
        assert!(link.is_connected());
        let frame = Frame::decode(&bytes).unwrap();
        assert!(matches!(frame, Frame::Start { .. }));
    }
}
