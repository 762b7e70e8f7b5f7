//! The transmit scheduler (spec §4.4) — the heart of the core.
//!
//! Grounded on the teacher's `Outbox`-draining `Iterator::next()`
//! composition in `fsm.rs` (`self.outbox.next().or_else(...)`), generalized
//! from "one sub-manager's iterator after another" to "control FIFO before
//! readiness-heap root". Our reference reactor (`transport_net::reactor`)
//! writes synchronously to a buffered stream rather than granting an
//! advertised window size, so unlike the source there is no bounded
//! "window" to fit messages into — every control entry ready this tick is
//! drained, and at most one data message follows. The ordering and
//! per-neighbour gating rules are unaffected by that simplification.
use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::control::ControlQueue;
use crate::heap::ReadinessHeap;
use crate::neighbour::{NeighbourTable, TransmitHandle};
use crate::wire::Frame;

/// What the scheduler produced on one activation.
#[derive(Default)]
pub struct SchedulerStep {
    /// Bytes ready to hand to the daemon link, if any.
    pub write: Option<Vec<u8>>,
    /// If set, the scheduler should be re-activated after this delay
    /// (quota wait or a congestion timeout), per spec §5's two per-request
    /// timers.
    pub rearm_after: Option<LocalDuration>,
}

/// Ties the control FIFO and readiness heap together against a neighbour
/// table to implement spec §4.4.
#[derive(Default)]
pub struct Scheduler {
    /// The control FIFO (spec §4.4, §4.9).
    pub control: ControlQueue,
    heap: ReadinessHeap,
}

impl Scheduler {
    /// Construct an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a new data transmit request for `peer`. Fails if the
    /// neighbour already has one pending (spec §3 invariant).
    pub fn submit_data(
        &mut self,
        peer: PeerId,
        handle: TransmitHandle,
        now: LocalTime,
        neighbours: &mut NeighbourTable,
    ) -> Result<(), transport_core::Error> {
        let n = neighbours
            .get_mut(&peer)
            .ok_or(transport_core::Error::Unreachable("unknown neighbour"))?;
        if n.pending.is_some() {
            return Err(transport_core::Error::ProtocolViolation(
                "neighbour already has a pending transmit request",
            ));
        }
        let size = handle.size;
        n.pending = Some(handle);
        if n.is_ready {
            let delay = n.tracker.get_delay(size as u64, now);
            self.schedule(peer, now + delay);
        }
        Ok(())
    }

    /// Cancel a neighbour's pending data request without invoking its
    /// callback (spec §5 cancellation invariant).
    pub fn cancel_data(&mut self, peer: &PeerId, neighbours: &mut NeighbourTable) -> bool {
        self.heap.remove(peer);
        if let Some(n) = neighbours.get_mut(peer) {
            if let Some(handle) = n.pending.take() {
                handle.cancel();
                return true;
            }
        }
        false
    }

    /// Called when a `SEND_OK` restores a neighbour's readiness: re-insert
    /// it into the heap at its next-allowed-send time if a request is
    /// still pending (spec §4.6).
    pub fn neighbour_ready_again(
        &mut self,
        peer: PeerId,
        now: LocalTime,
        neighbours: &mut NeighbourTable,
    ) {
        if let Some(n) = neighbours.get_mut(&peer) {
            n.mark_ready();
            if let Some(handle) = n.pending.as_ref() {
                let delay = n.tracker.get_delay(handle.size as u64, now);
                self.schedule(peer, now + delay);
            }
        }
    }

    /// Drop a neighbour from scheduling entirely (on disconnect), failing
    /// any pending request with a zero-size buffer.
    pub fn forget_neighbour(&mut self, peer: &PeerId, neighbours: &mut NeighbourTable) {
        self.heap.remove(peer);
        if let Some(n) = neighbours.get_mut(peer) {
            if let Some(handle) = n.pending.take() {
                handle.fail();
            }
        }
    }

    fn schedule(&mut self, peer: PeerId, ready_at: LocalTime) {
        if self.heap.contains(&peer) {
            self.heap.update_key(&peer, ready_at);
        } else {
            self.heap.insert(peer, ready_at);
        }
    }

    /// Whether `peer` currently has a readiness-heap position.
    pub fn is_scheduled(&self, peer: &PeerId) -> bool {
        self.heap.contains(peer)
    }

    /// Number of neighbours currently in the readiness heap.
    pub fn scheduled_len(&self) -> usize {
        self.heap.len()
    }

    /// Step 1 of spec §4.4: drop every pending request (control or data)
    /// whose deadline has passed, invoking its callback with a zero-size
    /// buffer.
    fn expire_deadlines(&mut self, now: LocalTime, neighbours: &mut NeighbourTable) {
        self.control.expire(now);

        let expired: Vec<PeerId> = neighbours
            .iter()
            .filter_map(|(peer, n)| {
                n.pending
                    .as_ref()
                    .filter(|h| now >= h.deadline)
                    .map(|_| *peer)
            })
            .collect();

        for peer in expired {
            self.heap.remove(&peer);
            if let Some(n) = neighbours.get_mut(&peer) {
                if let Some(handle) = n.pending.take() {
                    handle.fail();
                }
            }
        }
    }

    /// Run one scheduler activation (spec §4.4 steps 1–4 and the fill
    /// callback's a/b/c).
    pub fn poll(&mut self, now: LocalTime, neighbours: &mut NeighbourTable) -> SchedulerStep {
        self.expire_deadlines(now, neighbours);

        let mut out = Vec::new();

        // a. Drain control messages first; never subject to quota, never
        // blocked by data.
        while let Some(handle) = self.control.pop_front() {
            out.extend(handle.fire(usize::MAX));
        }

        // b. Drain one data message if permitted.
        let mut rearm_after = None;
        if let Some((peer, _)) = self.heap.peek_root() {
            rearm_after = self.try_send_one(peer, now, neighbours, &mut out);
        }

        SchedulerStep {
            write: if out.is_empty() { None } else { Some(out) },
            rearm_after,
        }
    }

    fn try_send_one(
        &mut self,
        peer: PeerId,
        now: LocalTime,
        neighbours: &mut NeighbourTable,
        out: &mut Vec<u8>,
    ) -> Option<LocalDuration> {
        let n = neighbours.get_mut(&peer)?;
        let size = n.pending.as_ref()?.size;

        if !n.is_ready {
            // Invariant (spec §3): not-ready means out of the heap; the
            // caller arms a congestion timeout for the remaining deadline.
            let deadline = n.pending.as_ref().map(|h| h.deadline);
            self.heap.remove(&peer);
            return deadline.map(|d| d.duration_since(now));
        }

        let delay = n.tracker.get_delay(size as u64, now);
        if !delay.is_zero() {
            // Not an error: the caller re-activates the scheduler after
            // the quota wait elapses.
            return Some(delay);
        }

        self.heap.remove(&peer);
        let handle = n.pending.take()?;
        let deadline = handle.deadline;
        let payload = handle.fire(usize::MAX);
        let consumed = payload.len() as u64 + n.take_pending_overhead();
        let frame = Frame::Send {
            deadline,
            peer,
            inner: payload,
        };
        out.extend(frame.encode());
        n.tracker.consume(consumed, now);
        n.mark_sent(now);
        None
    }

    /// Fail every queued control entry and every neighbour's pending data
    /// request, for teardown (spec §4.5, §7 LocalShutdown).
    pub fn teardown(&mut self, neighbours: &mut NeighbourTable) {
        self.control.drain_and_fail();
        self.heap = ReadinessHeap::new();
        let peers: Vec<PeerId> = neighbours.iter().map(|(p, _)| *p).collect();
        for peer in peers {
            if let Some(n) = neighbours.get_mut(&peer) {
                if let Some(handle) = n.pending.take() {
                    handle.fail();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandwidth::Tracker;
    use crate::neighbour::Neighbour;
    use transport_core::peer::PEER_ID_LEN;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; PEER_ID_LEN])
    }

    fn neighbours_with(now: LocalTime, peer: PeerId, rate: u64) -> NeighbourTable {
        let mut t = NeighbourTable::new();
        let tracker = Tracker::new(rate, LocalDuration::from_secs(1), now);
        t.insert(Neighbour::new(peer, tracker, now)).unwrap();
        t
    }

    #[test]
    fn control_drains_before_data() {
        let now = LocalTime::from_micros(0);
        let peer = pid(1);
        let mut neighbours = neighbours_with(now, peer, 10_000);
        let mut sched = Scheduler::new();

        sched.control.push(crate::control::try_connect(
            peer,
            now,
            now + LocalDuration::from_secs(1),
            |_| {},
        ));

        let handle = TransmitHandle::new(
            Some(peer),
            10,
            now,
            now + LocalDuration::from_secs(1),
            Box::new(|_| vec![0u8; 10]),
        );
        sched.submit_data(peer, handle, now, &mut neighbours).unwrap();

        let step = sched.poll(now, &mut neighbours);
        let bytes = step.write.unwrap();
        // The REQUEST_CONNECT frame (control) must be decodable as the
        // first frame in the written buffer, ahead of the SEND frame.
        let first_size = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let first = Frame::decode(&bytes[..first_size]).unwrap();
        assert!(matches!(first, Frame::RequestConnect { .. }));
    }

    #[test]
    fn congestion_parks_neighbour_and_requests_rearm() {
        let now = LocalTime::from_micros(0);
        let peer = pid(2);
        let mut neighbours = neighbours_with(now, peer, 10_000);
        neighbours.get_mut(&peer).unwrap().is_ready = false;
        let mut sched = Scheduler::new();

        let handle = TransmitHandle::new(
            Some(peer),
            10,
            now,
            now + LocalDuration::from_secs(5),
            Box::new(|_| vec![0u8; 10]),
        );
        sched.submit_data(peer, handle, now, &mut neighbours).unwrap();
        // Not ready: submit_data won't have inserted into the heap, so
        // manually simulate the heap-resident case that occurs when a
        // neighbour goes unready *while* already scheduled.
        sched.schedule(peer, now);

        let step = sched.poll(now, &mut neighbours);
        assert!(step.write.is_none());
        assert_eq!(step.rearm_after, Some(LocalDuration::from_secs(5)));
        assert!(!sched.is_scheduled(&peer));
    }

    #[test]
    fn quota_delay_defers_without_dropping() {
        let now = LocalTime::from_micros(0);
        let peer = pid(3);
        let mut neighbours = neighbours_with(now, peer, 1);
        neighbours.get_mut(&peer).unwrap().tracker.consume(100, now);
        let mut sched = Scheduler::new();

        let handle = TransmitHandle::new(
            Some(peer),
            10,
            now,
            now + LocalDuration::from_secs(60),
            Box::new(|_| vec![0u8; 10]),
        );
        sched.submit_data(peer, handle, now, &mut neighbours).unwrap();

        let step = sched.poll(now, &mut neighbours);
        assert!(step.write.is_none());
        assert!(step.rearm_after.is_some());
        assert!(sched.is_scheduled(&peer));
    }

    #[test]
    fn duplicate_submit_is_rejected() {
        let now = LocalTime::from_micros(0);
        let peer = pid(4);
        let mut neighbours = neighbours_with(now, peer, 10_000);
        let mut sched = Scheduler::new();
        let mk = || {
            TransmitHandle::new(
                Some(peer),
                10,
                now,
                now + LocalDuration::from_secs(1),
                Box::new(|_| vec![0u8; 10]),
            )
        };
        sched.submit_data(peer, mk(), now, &mut neighbours).unwrap();
        assert!(sched.submit_data(peer, mk(), now, &mut neighbours).is_err());
    }
}
