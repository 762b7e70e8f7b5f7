//! The reactor-agnostic contract between a transport state machine and
//! whatever I/O loop actually drives the daemon socket.
//!
//! Unlike a multi-peer P2P reactor, spec §3/§4.5 describes exactly one
//! persistent connection: the client's link to the local transport
//! daemon. Peer multiplexing happens *inside* frames carried over that one
//! connection (spec §6), not as separate sockets the reactor manages.
//! This crate's [`Io`]/[`StateMachine`] contract reflects that: one
//! logical connection, opened, written to, and closed as a unit, plus
//! timers and upstream events. This plays the role the teacher's
//! `nakamoto-net` crate plays for `nakamoto-p2p`, generalized down from
//! "many peer sockets" to "one daemon socket" to match this spec's shape.
#![warn(missing_docs)]

pub mod reactor;

use std::fmt;

use transport_core::time::LocalTime;

/// One action a state machine asks the reactor to perform on the
/// singleton daemon connection.
#[derive(Debug, Clone)]
pub enum Io<M, E, D> {
    /// Write a framed message to the daemon.
    Write(M),
    /// Open (or re-open) the connection to the daemon.
    Open,
    /// Close the connection to the daemon, for the given reason.
    Close(D),
    /// Arm a one-shot timer to fire `timer_expired` after the given delay.
    SetTimer(transport_core::time::LocalDuration),
    /// Surface a domain event to upstream subscribers.
    Event(E),
}

/// The contract every transport state machine satisfies so it can be
/// driven by a reactor without the reactor knowing its internals.
pub trait StateMachine: Iterator<Item = Io<Self::Message, Self::Event, Self::CloseReason>> {
    /// The wire message type written to, and read from, the daemon.
    type Message;
    /// The domain event type this state machine emits.
    type Event;
    /// The state-machine-specific reason the connection was closed.
    type CloseReason: fmt::Display + fmt::Debug;

    /// Called once, before the first tick, with the current time.
    fn initialize(&mut self, time: LocalTime) {
        self.tick(time)
    }

    /// Called when a full frame has been decoded from the daemon.
    fn message_received(&mut self, message: &[u8]);

    /// Called when the connection to the daemon has been established.
    fn opened(&mut self);

    /// Called when the connection to the daemon is lost, for whatever
    /// reason (I/O error, protocol violation, local shutdown request).
    fn closed(&mut self, reason: CloseReason<Self::CloseReason>);

    /// Called periodically by the reactor with the current time.
    fn tick(&mut self, local_time: LocalTime);

    /// Called when a previously armed timer fires.
    fn timer_expired(&mut self);
}

/// Why the daemon connection was closed, distinguishing reactor-originated
/// causes from state-machine-originated ones.
#[derive(Debug, Clone)]
pub enum CloseReason<R> {
    /// The reactor itself lost the connection (I/O error, EOF, ...).
    ConnectionError(String),
    /// The state machine asked to close the connection.
    StateMachine(R),
}

impl<R: fmt::Display> fmt::Display for CloseReason<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectionError(e) => write!(f, "connection error: {}", e),
            CloseReason::StateMachine(r) => write!(f, "{}", r),
        }
    }
}
