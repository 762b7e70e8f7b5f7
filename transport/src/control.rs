//! Control queue and its three message factories (spec §4.4, §4.9).
//!
//! Control transmit handles are built the same way as data ones
//! ([`TransmitHandle`]) but are never attached to a neighbour and never
//! subject to quota — they just carry a pre-encoded frame behind the
//! notify closure so the scheduler's fill step treats them uniformly.
use std::collections::VecDeque;

use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::neighbour::{NotifyFn, TransmitHandle};
use crate::wire::Frame;

/// Outcome reported to an `offer_hello` continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The frame was handed to the daemon link.
    Success,
    /// The request's deadline passed before it could be sent.
    Timeout,
}

/// Enqueue an `OFFER_HELLO` frame carrying another peer's HELLO for the
/// daemon to validate.
pub fn offer_hello(
    blob: Vec<u8>,
    start: LocalTime,
    deadline: LocalTime,
    continuation: impl FnOnce(ControlOutcome) + 'static,
) -> TransmitHandle {
    let frame = Frame::OfferHello { blob };
    from_frame(frame, start, deadline, move |sent| {
        continuation(if sent {
            ControlOutcome::Success
        } else {
            ControlOutcome::Timeout
        });
    })
}

/// Enqueue a `REQUEST_CONNECT` frame asking the daemon to try a peer.
pub fn try_connect(
    peer: PeerId,
    start: LocalTime,
    deadline: LocalTime,
    callback: impl FnOnce(bool) + 'static,
) -> TransmitHandle {
    let frame = Frame::RequestConnect { peer };
    from_frame(frame, start, deadline, callback)
}

/// Enqueue a `TRAFFIC_METRIC` frame requesting artificial delay/distance
/// metadata for testing and simulation.
pub fn set_traffic_metric(
    peer: PeerId,
    properties: u32,
    delay_in: LocalDuration,
    delay_out: LocalDuration,
    start: LocalTime,
    deadline: LocalTime,
) -> TransmitHandle {
    let frame = Frame::TrafficMetric {
        peer,
        properties,
        delay_in,
        delay_out,
    };
    from_frame(frame, start, deadline, |_sent| {})
}

fn from_frame(
    frame: Frame,
    start: LocalTime,
    deadline: LocalTime,
    callback: impl FnOnce(bool) + 'static,
) -> TransmitHandle {
    let bytes = frame.encode();
    let size = bytes.len();
    let notify: NotifyFn = Box::new(move |window| {
        if window == 0 {
            callback(false);
            Vec::new()
        } else {
            callback(true);
            bytes
        }
    });
    TransmitHandle::new(None, size, start, deadline, notify)
}

/// An opaque token identifying a queued control request, for cancellation
/// (spec §5 "cancelling a control request removes it from the FIFO").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlToken(u64);

/// FIFO of pending control-queue entries (spec §4.4's "control FIFO").
#[derive(Default)]
pub struct ControlQueue {
    entries: VecDeque<(ControlToken, TransmitHandle)>,
    next_token: u64,
}

impl ControlQueue {
    /// Construct an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a control transmit handle at the tail, returning a token
    /// that can later be used to cancel it.
    pub fn push(&mut self, handle: TransmitHandle) -> ControlToken {
        let token = ControlToken(self.next_token);
        self.next_token += 1;
        self.entries.push_back((token, handle));
        token
    }

    /// Size in bytes of the head entry, if any.
    pub fn front_size(&self) -> Option<usize> {
        self.entries.front().map(|(_, h)| h.size)
    }

    /// Remove and return the head entry.
    pub fn pop_front(&mut self) -> Option<TransmitHandle> {
        self.entries.pop_front().map(|(_, h)| h)
    }

    /// Whether the queue has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove a queued entry by token without invoking its callback
    /// (spec §5 cancellation invariant).
    pub fn cancel(&mut self, token: ControlToken) -> bool {
        if let Some(pos) = self.entries.iter().position(|(t, _)| *t == token) {
            let (_, handle) = self.entries.remove(pos).expect("position just found");
            handle.cancel();
            true
        } else {
            false
        }
    }

    /// Fail (with a zero-size buffer) every entry whose deadline has
    /// passed, at or before `now`.
    pub fn expire(&mut self, now: LocalTime) {
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for (token, handle) in self.entries.drain(..) {
            if now >= handle.deadline {
                handle.fail();
            } else {
                kept.push_back((token, handle));
            }
        }
        self.entries = kept;
    }

    /// Fail and drop every queued entry, for teardown (spec §4.5,
    /// §7 LocalShutdown).
    pub fn drain_and_fail(&mut self) {
        for (_, handle) in self.entries.drain(..) {
            handle.fail();
        }
    }
}
