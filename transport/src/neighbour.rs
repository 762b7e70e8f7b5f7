//! Neighbour state and table (spec §3 "Neighbour", §4.3), and the pending
//! transmit-request handle (spec §3 "Transmit Handle").
use std::collections::HashMap;

use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::bandwidth::Tracker;

/// A caller-supplied buffer-fill callback. Called at most once, with the
/// granted window size; an empty return means "give up, I am not going to
/// fill this" (spec §9's documented size=0 convention).
pub type NotifyFn = Box<dyn FnOnce(usize) -> Vec<u8>>;

/// A pending request to send one message (spec §3 "Transmit Handle").
pub struct TransmitHandle {
    /// The owning neighbour; `None` for control-queue entries (spec:
    /// "Control transmit handles are not attached to any neighbour").
    pub peer: Option<PeerId>,
    /// Requested payload size.
    pub size: usize,
    /// Request-start timestamp, for latency telemetry.
    pub start: LocalTime,
    /// Absolute deadline; on expiry the callback fires with an empty buffer.
    pub deadline: LocalTime,
    notify: Option<NotifyFn>,
}

impl TransmitHandle {
    /// Construct a new pending transmit request.
    pub fn new(
        peer: Option<PeerId>,
        size: usize,
        start: LocalTime,
        deadline: LocalTime,
        notify: NotifyFn,
    ) -> Self {
        Self {
            peer,
            size,
            start,
            deadline,
            notify: Some(notify),
        }
    }

    /// Invoke the notify callback with the granted window, consuming the
    /// handle. Returns the bytes the caller chose to fill (possibly empty).
    pub fn fire(mut self, window: usize) -> Vec<u8> {
        match self.notify.take() {
            Some(cb) => cb(window),
            None => Vec::new(),
        }
    }

    /// Invoke the notify callback with a zero-size window, signalling
    /// timeout or failure (spec §3, §7 Congestion/Unreachable/LocalShutdown).
    pub fn fail(self) {
        let _ = self.fire(0);
    }

    /// Drop the handle without ever invoking its callback — used for
    /// explicit cancellation, where spec §5 requires no callback fires.
    pub fn cancel(self) {
        // `notify` is simply dropped.
    }
}

/// How long a neighbour may stay non-ready before we log a diagnostic
/// (spec §3: "unready-warning timer ... fires every configured warn
/// interval").
pub const DEFAULT_UNREADY_WARN_INTERVAL: LocalDuration = LocalDuration::from_secs(15);

/// State for one currently-connected remote peer (spec §3 "Neighbour").
pub struct Neighbour {
    /// The neighbour's identity.
    pub identity: PeerId,
    /// Outbound bandwidth tracker.
    pub tracker: Tracker,
    /// At most one in-flight application transmit request.
    pub pending: Option<TransmitHandle>,
    /// True iff the daemon is not currently holding a prior message from
    /// us for this peer.
    pub is_ready: bool,
    /// Timestamp of the last payload we sent this neighbour.
    pub last_payload: LocalTime,
    /// When `is_ready` became false, for the unready-warning timer.
    unready_since: Option<LocalTime>,
    /// Next time the unready-warning should fire, if still unready.
    next_warn_at: Option<LocalTime>,
    /// Configured warn interval.
    warn_interval: LocalDuration,
    /// Cumulative physical-minus-logical overhead bytes not yet charged to
    /// the tracker (spec §4.4 overhead accounting).
    pub pending_overhead: u64,
}

impl Neighbour {
    /// Construct a newly-connected neighbour, ready to send.
    pub fn new(identity: PeerId, tracker: Tracker, now: LocalTime) -> Self {
        Self {
            identity,
            tracker,
            pending: None,
            is_ready: true,
            last_payload: now,
            unready_since: None,
            next_warn_at: None,
            warn_interval: DEFAULT_UNREADY_WARN_INTERVAL,
            pending_overhead: 0,
        }
    }

    /// Mark the neighbour not-ready (a message to it is in flight at the
    /// daemon) and arm the unready-warning timer.
    pub fn mark_sent(&mut self, now: LocalTime) {
        self.is_ready = false;
        self.last_payload = now;
        self.unready_since = Some(now);
        self.next_warn_at = Some(now + self.warn_interval);
    }

    /// Mark the neighbour ready again (a `SEND_OK` arrived for it).
    pub fn mark_ready(&mut self) {
        self.is_ready = true;
        self.unready_since = None;
        self.next_warn_at = None;
    }

    /// If the unready-warning is due, consume it and reschedule, returning
    /// how long the neighbour has been unready.
    pub fn poll_unready_warning(&mut self, now: LocalTime) -> Option<LocalDuration> {
        let due = self.next_warn_at?;
        if now < due {
            return None;
        }
        let since = self.unready_since.unwrap_or(now);
        self.next_warn_at = Some(now + self.warn_interval);
        Some(now.duration_since(since))
    }

    /// Add overhead bytes observed on a `SEND_OK` (spec §4.4).
    pub fn add_overhead(&mut self, physical: u32, logical: u32) {
        if physical > logical {
            self.pending_overhead += (physical - logical) as u64;
        }
    }

    /// Take any accumulated overhead for charging on the next `consume`
    /// call, resetting the counter.
    pub fn take_pending_overhead(&mut self) -> u64 {
        std::mem::take(&mut self.pending_overhead)
    }
}

/// Mapping from peer identity to neighbour state (spec §4.3).
#[derive(Default)]
pub struct NeighbourTable {
    neighbours: HashMap<PeerId, Neighbour>,
}

/// Attempting to insert a neighbour that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("neighbour already exists: protocol violation")]
pub struct DuplicateNeighbour;

impl NeighbourTable {
    /// Construct an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new neighbour. Spec §4.3: attempting to insert a duplicate
    /// is a programming error / protocol violation with the daemon.
    pub fn insert(&mut self, neighbour: Neighbour) -> Result<(), DuplicateNeighbour> {
        if self.neighbours.contains_key(&neighbour.identity) {
            return Err(DuplicateNeighbour);
        }
        self.neighbours.insert(neighbour.identity, neighbour);
        Ok(())
    }

    /// Remove a neighbour, returning it if present.
    pub fn remove(&mut self, peer: &PeerId) -> Option<Neighbour> {
        self.neighbours.remove(peer)
    }

    /// Borrow a neighbour.
    pub fn get(&self, peer: &PeerId) -> Option<&Neighbour> {
        self.neighbours.get(peer)
    }

    /// Mutably borrow a neighbour.
    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut Neighbour> {
        self.neighbours.get_mut(peer)
    }

    /// Whether a neighbour is known.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.neighbours.contains_key(peer)
    }

    /// Number of known neighbours.
    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    /// Iterate over all neighbours.
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Neighbour)> {
        self.neighbours.iter()
    }

    /// Mutably iterate over all neighbours.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PeerId, &mut Neighbour)> {
        self.neighbours.iter_mut()
    }

    /// Remove and return every neighbour, for mass teardown on disconnect
    /// (spec §4.3, §4.5).
    pub fn drain(&mut self) -> Vec<Neighbour> {
        self.neighbours.drain().map(|(_, n)| n).collect()
    }
}
