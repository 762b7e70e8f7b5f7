//! Demultiplexer: dispatches decoded daemon frames to their handlers
//! (spec §4.6).
//!
//! Grounded on the teacher's `message_received`/`event()` dispatch-by-type
//! in `fsm.rs` (`StateMachine::message_received` fanning out to
//! sub-managers) and on `fsm/bfmgr.rs`'s `received_event` match-per-variant
//! style.
use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::bandwidth::Tracker;
use crate::event::Event;
use crate::monitor::MonitorSubscriptions;
use crate::neighbour::{Neighbour, NeighbourTable};
use crate::outbox::Outbox;
use crate::scheduler::Scheduler;
use crate::wire::{hello_get_id, Frame};

/// A decoded frame that makes no sense in context — wrong direction, or
/// references an unknown peer. Always a protocol violation (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxViolation(pub &'static str);

/// Dispatch one decoded inbound frame, mutating neighbour/scheduler/
/// monitor state and queuing events and writes as needed.
pub fn dispatch(
    frame: Frame,
    now: LocalTime,
    carry_forward: LocalDuration,
    neighbours: &mut NeighbourTable,
    scheduler: &mut Scheduler,
    monitor: &mut MonitorSubscriptions,
    my_hello: &mut Option<Vec<u8>>,
    outbox: &mut Outbox,
) -> Result<(), DemuxViolation> {
    match frame {
        Frame::Hello { blob } => {
            if hello_get_id(&blob).is_none() {
                return Err(DemuxViolation("HELLO blob too short for a peer id"));
            }
            *my_hello = Some(blob.clone());
            outbox.event(Event::HelloUpdated { blob });
        }

        Frame::Connect { peer, quota_out } => {
            if neighbours.contains(&peer) {
                return Err(DemuxViolation("CONNECT for an already-known neighbour"));
            }
            let tracker = Tracker::new(quota_out as u64, carry_forward, now);
            neighbours
                .insert(Neighbour::new(peer, tracker, now))
                .map_err(|_| DemuxViolation("duplicate neighbour"))?;
            outbox.event(Event::Connected { peer, quota_out });
        }

        Frame::Disconnect { peer } => {
            if !neighbours.contains(&peer) {
                return Err(DemuxViolation("DISCONNECT for an unknown peer"));
            }
            scheduler.forget_neighbour(&peer, neighbours);
            neighbours.remove(&peer);
            outbox.event(Event::Disconnected { peer });
        }

        Frame::SendOk {
            success,
            bytes_msg,
            bytes_physical,
            peer,
        } => {
            let n = neighbours
                .get_mut(&peer)
                .ok_or(DemuxViolation("SEND_OK for an unknown peer"))?;
            if success {
                n.add_overhead(bytes_physical, bytes_msg);
            }
            scheduler.neighbour_ready_again(peer, now, neighbours);
        }

        Frame::Recv { peer, inner } => {
            if !neighbours.contains(&peer) {
                return Err(DemuxViolation("RECV for an unknown peer"));
            }
            outbox.event(Event::Received {
                peer,
                message: inner,
            });
        }

        Frame::SetQuota { peer, quota_out } => {
            let n = neighbours
                .get_mut(&peer)
                .ok_or(DemuxViolation("SET_QUOTA for an unknown peer"))?;
            n.tracker.update_quota(quota_out as u64, now);
            outbox.event(Event::QuotaUpdated { peer, quota_out });
        }

        Frame::MonitorPeerResponse {
            address,
            state,
            timeout,
        } => {
            monitor.handle_peer_response(address, state, timeout, outbox);
        }

        Frame::MonitorValidationResponse {
            address,
            state,
            timeout,
        } => {
            monitor.handle_validation_response(address, state, timeout, outbox);
        }

        // Client-to-daemon-only frames arriving from the daemon make no
        // sense and are themselves a protocol violation.
        Frame::Start { .. } => return Err(DemuxViolation("daemon sent a START frame")),
        Frame::Send { .. } => return Err(DemuxViolation("daemon sent a SEND frame")),
        Frame::RequestConnect { .. } => {
            return Err(DemuxViolation("daemon sent a REQUEST_CONNECT frame"))
        }
        Frame::OfferHello { .. } => {
            return Err(DemuxViolation("daemon sent an OFFER_HELLO frame"))
        }
        Frame::TrafficMetric { .. } => {
            return Err(DemuxViolation("daemon sent a TRAFFIC_METRIC frame"))
        }
        Frame::MonitorPeerRequest { .. } => {
            return Err(DemuxViolation("daemon sent a MONITOR_PEER_REQUEST frame"))
        }
        Frame::MonitorValidationRequest { .. } => {
            return Err(DemuxViolation(
                "daemon sent a MONITOR_VALIDATION_REQUEST frame",
            ))
        }
    }
    Ok(())
}
