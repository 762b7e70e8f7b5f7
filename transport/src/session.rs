//! Session lifecycle and table (spec §3 "Session", §4.8).
//!
//! Owned by each plugin implementation, not by the core (spec §3:
//! "Ownership is the plugin's; the core only holds opaque session
//! references"). Provided here as a reusable building block for plugin
//! authors, the same way the core's own `bandwidth::Tracker` is reused for
//! inbound accounting rather than a bespoke quota pair.
use std::collections::HashMap;

use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::plugin::Address;

/// Per-peer connection state held inside a plugin (spec §3 "Session").
pub struct Session {
    /// The peer this session reaches.
    pub peer: PeerId,
    /// The plugin-specific transport address.
    pub address: Address,
    continuation: Option<Box<dyn FnOnce(usize)>>,
    quota_window_start: LocalTime,
    quota_window_bytes: u64,
    /// Per-peer allowed inbound bytes/ms (spec §4.8).
    pub allowed_bytes_per_ms: u32,
}

impl Session {
    /// Construct a new session, with an empty inbound accounting window
    /// starting now.
    pub fn new(peer: PeerId, address: Address, allowed_bytes_per_ms: u32, now: LocalTime) -> Self {
        Self {
            peer,
            address,
            continuation: None,
            quota_window_start: now,
            quota_window_bytes: 0,
            allowed_bytes_per_ms,
        }
    }

    /// Register the continuation to invoke after the next physical send.
    pub fn set_continuation(&mut self, continuation: Box<dyn FnOnce(usize)>) {
        self.continuation = Some(continuation);
    }

    /// Invoke and clear the pending continuation, if any. Spec §4.7
    /// requires this happen before any disconnect notification for the
    /// peer is delivered upward.
    pub fn fire_continuation(&mut self, bytes: usize) {
        if let Some(cb) = self.continuation.take() {
            cb(bytes);
        }
    }

    /// Whether a continuation is currently pending.
    pub fn has_pending_continuation(&self) -> bool {
        self.continuation.is_some()
    }

    /// Record `n` inbound bytes at `now`, rolling the accounting window
    /// over every `window` duration. Returns whether the session has
    /// exceeded its allowed rate and should pause reading (spec §4.8).
    pub fn record_inbound(&mut self, n: u64, now: LocalTime, window: LocalDuration) -> bool {
        if now.duration_since(self.quota_window_start) >= window {
            self.quota_window_start = now;
            self.quota_window_bytes = 0;
        }
        self.quota_window_bytes += n;
        let elapsed_ms = (now.duration_since(self.quota_window_start).as_micros() / 1000).max(1);
        (self.quota_window_bytes / elapsed_ms) > self.allowed_bytes_per_ms as u64
    }
}

/// A plugin's live-session table, replacing the source's intrusive
/// doubly-linked list (spec §9 redesign flag) with an owned map.
#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<PeerId, Session>,
}

impl SessionTable {
    /// Construct an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for a peer.
    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.peer, session);
    }

    /// Remove a peer's session, firing its continuation with a failure
    /// marker if one was pending (spec §4.7 disconnect ordering).
    pub fn remove(&mut self, peer: &PeerId) -> Option<Session> {
        let mut session = self.sessions.remove(peer)?;
        session.fire_continuation(0);
        Some(session)
    }

    /// Borrow a peer's session.
    pub fn get(&self, peer: &PeerId) -> Option<&Session> {
        self.sessions.get(peer)
    }

    /// Mutably borrow a peer's session.
    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut Session> {
        self.sessions.get_mut(peer)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the table has no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate over all sessions.
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Session)> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport_core::peer::PEER_ID_LEN;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; PEER_ID_LEN])
    }

    fn addr() -> Address {
        Address {
            plugin_name: "tcp".to_string(),
            options: 0,
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn remove_fires_pending_continuation_with_zero() {
        let now = LocalTime::from_micros(0);
        let mut table = SessionTable::new();
        let mut session = Session::new(pid(1), addr(), 1000, now);
        let fired = std::rc::Rc::new(std::cell::Cell::new(None));
        let flag = fired.clone();
        session.set_continuation(Box::new(move |n| flag.set(Some(n))));
        table.insert(session);
        table.remove(&pid(1));
        assert_eq!(fired.get(), Some(0));
    }

    #[test]
    fn record_inbound_flags_rate_exceeded() {
        let now = LocalTime::from_micros(0);
        let mut s = Session::new(pid(2), addr(), 1, now);
        let window = LocalDuration::from_secs(1);
        assert!(s.record_inbound(10_000, now, window));
    }

    #[test]
    fn record_inbound_within_budget_is_fine() {
        let now = LocalTime::from_micros(0);
        let mut s = Session::new(pid(3), addr(), 1_000_000, now);
        let window = LocalDuration::from_secs(1);
        assert!(!s.record_inbound(10, now, window));
    }
}
