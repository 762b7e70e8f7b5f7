//! Monitoring subscriptions (spec §4.10).
//!
//! Grounded on the teacher's subscription-with-backoff shape implied by a
//! `DisconnectReason`-style transient/permanent split: a continuous
//! subscription re-establishes itself across reconnects the same way the
//! neighbour table is rebuilt from scratch (spec §4.5), while a one-shot
//! subscription tears itself down after its terminator.
use transport_core::peer::PeerId;
use transport_core::time::LocalTime;

use crate::event::Event;
use crate::outbox::Outbox;
use crate::wire::{Frame, MonitorAddress, PeerState, ValidationState};

/// Whether a subscription re-establishes after reconnects or tears itself
/// down after its first snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Delivers the current snapshot, then a terminator, then ends.
    OneShot,
    /// Re-subscribes through reconnects until explicitly cancelled.
    Continuous,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    peer: PeerId,
    mode: SubscriptionMode,
}

/// The two parallel subscription shapes a client can hold open (spec
/// §4.10: one peer-state stream, one validation-state stream).
#[derive(Default)]
pub struct MonitorSubscriptions {
    peer: Option<Subscription>,
    validation: Option<Subscription>,
}

/// A response whose address payload violates spec §4.10's invariants; the
/// encode/decode layer already rejects these before they reach here, this
/// exists for callers composing their own frames.
fn is_terminator(address: &MonitorAddress) -> bool {
    address.addr_bytes.is_empty() && address.plugin_name.is_empty()
}

impl MonitorSubscriptions {
    /// Construct with no subscriptions held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to peer-state changes for `peer`, returning the
    /// `MONITOR_PEER_REQUEST` frame to send.
    pub fn subscribe_peer(&mut self, peer: PeerId, mode: SubscriptionMode) -> Vec<u8> {
        self.peer = Some(Subscription { peer, mode });
        Frame::MonitorPeerRequest {
            one_shot: mode == SubscriptionMode::OneShot,
            peer,
        }
        .encode()
    }

    /// Subscribe to validation-state changes for `peer`, returning the
    /// `MONITOR_VALIDATION_REQUEST` frame to send.
    pub fn subscribe_validation(&mut self, peer: PeerId, mode: SubscriptionMode) -> Vec<u8> {
        self.validation = Some(Subscription { peer, mode });
        Frame::MonitorValidationRequest {
            one_shot: mode == SubscriptionMode::OneShot,
            peer,
        }
        .encode()
    }

    /// Cancel the peer-state subscription, if any.
    pub fn unsubscribe_peer(&mut self) {
        self.peer = None;
    }

    /// Cancel the validation-state subscription, if any.
    pub fn unsubscribe_validation(&mut self) {
        self.validation = None;
    }

    /// Frames to re-send after a reconnect, for every continuous
    /// subscription still held (spec §4.10: "continuous ... re-subscribes
    /// through reconnects").
    pub fn on_reconnect(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        if let Some(sub) = self.peer {
            if sub.mode == SubscriptionMode::Continuous {
                out.push(
                    Frame::MonitorPeerRequest {
                        one_shot: false,
                        peer: sub.peer,
                    }
                    .encode(),
                );
            }
        }
        if let Some(sub) = self.validation {
            if sub.mode == SubscriptionMode::Continuous {
                out.push(
                    Frame::MonitorValidationRequest {
                        one_shot: false,
                        peer: sub.peer,
                    }
                    .encode(),
                );
            }
        }
        out
    }

    /// Handle a decoded `MONITOR_PEER_RESPONSE`, emitting the
    /// corresponding event and tearing down a one-shot subscription that
    /// just reached its terminator.
    pub fn handle_peer_response(
        &mut self,
        address: MonitorAddress,
        state: PeerState,
        timeout: LocalTime,
        outbox: &mut Outbox,
    ) {
        if is_terminator(&address) {
            outbox.event(Event::PeerMonitorEnd);
            if matches!(self.peer, Some(s) if s.mode == SubscriptionMode::OneShot) {
                self.peer = None;
            }
            return;
        }
        outbox.event(Event::PeerMonitor {
            peer: address.peer,
            state,
            timeout,
        });
    }

    /// Handle a decoded `MONITOR_VALIDATION_RESPONSE`, symmetric to
    /// [`Self::handle_peer_response`].
    pub fn handle_validation_response(
        &mut self,
        address: MonitorAddress,
        state: ValidationState,
        timeout: LocalTime,
        outbox: &mut Outbox,
    ) {
        if is_terminator(&address) {
            outbox.event(Event::ValidationMonitorEnd);
            if matches!(self.validation, Some(s) if s.mode == SubscriptionMode::OneShot) {
                self.validation = None;
            }
            return;
        }
        outbox.event(Event::ValidationMonitor {
            peer: address.peer,
            state,
            timeout,
        });
    }
}
