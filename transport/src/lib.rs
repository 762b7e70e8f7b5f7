//! The client-side transport core (spec §1, §2, §4).
//!
//! Ties every sub-manager together into one [`StateMachine`] impl, the
//! same way the teacher's top-level `fsm::StateMachine` composes
//! `PeerManager`, `SyncManager`, and the rest (`p2p/src/fsm.rs`). Unlike
//! the teacher, every sub-manager here pushes straight into one shared
//! [`Outbox`] rather than each keeping its own queue chained together by
//! `Iterator::next()`, so [`Core::next`] just pops the front.
#![warn(missing_docs)]

pub mod bandwidth;
pub mod control;
pub mod daemon;
pub mod demux;
pub mod event;
pub mod heap;
pub mod monitor;
pub mod neighbour;
pub mod outbox;
pub mod plugin;
pub mod scheduler;
pub mod session;
pub mod wire;

use log::*;

use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};
use transport_net::{CloseReason, StateMachine};

pub use control::ControlOutcome;
pub use event::Event;
pub use monitor::SubscriptionMode;
pub use outbox::DisconnectReason;

use daemon::DaemonLink;
use monitor::MonitorSubscriptions;
use neighbour::{NeighbourTable, TransmitHandle};
use outbox::{CoreIo, Outbox};
use scheduler::Scheduler;
use wire::Frame;

/// Configuration accepted by [`Core::new`] (spec §9's closed config record
/// pattern, carried down to the core's own small set of knobs — concrete
/// plugin configuration is [`transport_core::config::PluginConfig`]).
#[derive(Debug, Clone)]
pub struct Config {
    /// This node's own peer identity, sent in `START`.
    pub me: PeerId,
    /// Outbound bandwidth carry-forward horizon (Open Question #1 in
    /// `SPEC_FULL.md`: the source leaves this as "a few seconds").
    pub carry_forward: LocalDuration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            me: PeerId::zero(),
            carry_forward: bandwidth::DEFAULT_CARRY_FORWARD,
        }
    }
}

/// The client-side transport handle's state machine (spec §1(a), §2's
/// component table).
///
/// Owns the neighbour table, the transmit scheduler, the daemon link's
/// connection state, and monitoring subscriptions, driving them from
/// decoded daemon frames and from the reactor's `tick`/`timer_expired`
/// calls. Holds no socket itself (spec §3's daemon link is split between
/// this struct, which tracks believed connection state, and the reactor,
/// which owns the actual stream).
pub struct Core {
    config: Config,
    neighbours: NeighbourTable,
    scheduler: Scheduler,
    daemon: DaemonLink,
    monitor: MonitorSubscriptions,
    my_hello: Option<Vec<u8>>,
    outbox: Outbox,
    now: LocalTime,
}

impl Core {
    /// Construct a new core, not yet connected to the daemon.
    pub fn new(config: Config) -> Self {
        let daemon = DaemonLink::new(config.me);
        Self {
            config,
            neighbours: NeighbourTable::new(),
            scheduler: Scheduler::new(),
            daemon,
            monitor: MonitorSubscriptions::new(),
            my_hello: None,
            outbox: Outbox::new(),
            now: LocalTime::default(),
        }
    }

    /// Queue a data transmission to `peer`, invoking `fill` with the
    /// granted window once the scheduler is ready to send (spec §4.9
    /// `notify_transmit_ready`).
    pub fn notify_transmit_ready(
        &mut self,
        peer: PeerId,
        size: usize,
        deadline: LocalTime,
        fill: impl FnOnce(usize) -> Vec<u8> + 'static,
    ) -> Result<(), transport_core::Error> {
        let handle = TransmitHandle::new(Some(peer), size, self.now, deadline, Box::new(fill));
        self.scheduler
            .submit_data(peer, handle, self.now, &mut self.neighbours)
    }

    /// Cancel a previously submitted data transmission without invoking
    /// its callback (spec §5 cancellation invariant).
    pub fn cancel_transmit(&mut self, peer: &PeerId) -> bool {
        self.scheduler.cancel_data(peer, &mut self.neighbours)
    }

    /// Offer another peer's HELLO blob to the daemon for validation
    /// (spec §4.9 `offer_hello`).
    pub fn offer_hello(
        &mut self,
        blob: Vec<u8>,
        deadline: LocalTime,
        continuation: impl FnOnce(ControlOutcome) + 'static,
    ) {
        let handle = control::offer_hello(blob, self.now, deadline, continuation);
        self.scheduler.control.push(handle);
    }

    /// Ask the daemon to attempt a connection to `peer` (spec §4.9
    /// `try_connect`).
    pub fn try_connect(
        &mut self,
        peer: PeerId,
        deadline: LocalTime,
        callback: impl FnOnce(bool) + 'static,
    ) {
        let handle = control::try_connect(peer, self.now, deadline, callback);
        self.scheduler.control.push(handle);
    }

    /// Report artificial delay/distance metadata for a peer, for testing
    /// and simulation (spec §4.9 `set_traffic_metric`).
    pub fn set_traffic_metric(
        &mut self,
        peer: PeerId,
        properties: u32,
        delay_in: LocalDuration,
        delay_out: LocalDuration,
        deadline: LocalTime,
    ) {
        let handle = control::set_traffic_metric(
            peer,
            properties,
            delay_in,
            delay_out,
            self.now,
            deadline,
        );
        self.scheduler.control.push(handle);
    }

    /// Subscribe to peer-state changes (spec §4.10).
    pub fn monitor_peers(&mut self, peer: PeerId, mode: SubscriptionMode) {
        let bytes = self.monitor.subscribe_peer(peer, mode);
        self.outbox.write(bytes);
    }

    /// Subscribe to validation-state changes (spec §4.10).
    pub fn monitor_validation(&mut self, peer: PeerId, mode: SubscriptionMode) {
        let bytes = self.monitor.subscribe_validation(peer, mode);
        self.outbox.write(bytes);
    }

    /// Cancel the peer-state subscription, if any.
    pub fn unsubscribe_peers(&mut self) {
        self.monitor.unsubscribe_peer();
    }

    /// Cancel the validation-state subscription, if any.
    pub fn unsubscribe_validation(&mut self) {
        self.monitor.unsubscribe_validation();
    }

    /// The most recently received HELLO blob for this node, if any.
    pub fn my_hello(&self) -> Option<&[u8]> {
        self.my_hello.as_deref()
    }

    /// Number of currently known neighbours.
    pub fn neighbour_count(&self) -> usize {
        self.neighbours.len()
    }

    /// Whether the daemon link is fully torn down with no reconnect
    /// pending — the steady state after [`Core::shutdown`]'s close
    /// request has been processed by [`Core::closed`].
    pub fn is_idle(&self) -> bool {
        self.daemon.state() == daemon::LinkState::Idle
    }

    /// Request an orderly local shutdown (spec §7 `LocalShutdown`): fails
    /// every pending request and closes the daemon link for good, with no
    /// reconnect.
    pub fn shutdown(&mut self) {
        self.scheduler.teardown(&mut self.neighbours);
        self.neighbours.drain();
        self.outbox.close(DisconnectReason::LocalShutdown);
    }

    fn activate_scheduler(&mut self) {
        let step = self.scheduler.poll(self.now, &mut self.neighbours);
        if let Some(bytes) = step.write {
            self.outbox.write(bytes);
        }
        if let Some(delay) = step.rearm_after {
            self.outbox.set_timer(delay);
        }
    }

    fn poll_unready_warnings(&mut self) {
        let mut warnings = Vec::new();
        for (peer, n) in self.neighbours.iter_mut() {
            if let Some(unready_for) = n.poll_unready_warning(self.now) {
                warnings.push((*peer, unready_for));
            }
        }
        for (peer, unready_for) in warnings {
            warn!(target: "transport", "neighbour {} unready for {:.1}s", peer, unready_for.as_secs_f64());
            self.outbox.event(Event::UnreadyWarning { peer, unready_for });
        }
    }
}

impl StateMachine for Core {
    type Message = Vec<u8>;
    type Event = Event;
    type CloseReason = DisconnectReason;

    fn initialize(&mut self, time: LocalTime) {
        self.now = time;
        self.daemon.begin_connecting();
        self.outbox.open();
    }

    fn message_received(&mut self, message: &[u8]) {
        let frame = match Frame::decode(message) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(target: "transport", "malformed frame from daemon: {}", err);
                self.outbox
                    .event(Event::ProtocolViolation(err.to_string()));
                self.outbox
                    .close(DisconnectReason::ProtocolViolation("malformed frame"));
                return;
            }
        };

        if let Err(violation) = demux::dispatch(
            frame,
            self.now,
            self.config.carry_forward,
            &mut self.neighbours,
            &mut self.scheduler,
            &mut self.monitor,
            &mut self.my_hello,
            &mut self.outbox,
        ) {
            debug!(target: "transport", "protocol violation: {}", violation.0);
            self.outbox
                .event(Event::ProtocolViolation(violation.0.to_string()));
            self.outbox
                .close(DisconnectReason::ProtocolViolation(violation.0));
            return;
        }

        self.activate_scheduler();
    }

    fn opened(&mut self) {
        let start = self.daemon.on_opened();
        self.outbox.write(start);
        for frame in self.monitor.on_reconnect() {
            self.outbox.write(frame);
        }
        self.activate_scheduler();
    }

    fn closed(&mut self, reason: CloseReason<DisconnectReason>) {
        self.scheduler.teardown(&mut self.neighbours);
        for n in self.neighbours.drain() {
            self.outbox.event(Event::Disconnected { peer: n.identity });
        }

        if matches!(reason, CloseReason::StateMachine(DisconnectReason::LocalShutdown)) {
            self.daemon.shutdown();
            return;
        }

        let delay = self.daemon.on_closed();
        self.outbox.set_timer(delay);
    }

    fn tick(&mut self, local_time: LocalTime) {
        self.now = local_time;
        self.poll_unready_warnings();
    }

    fn timer_expired(&mut self) {
        // The reactor multiplexes one timer channel between reconnect
        // backoff and the scheduler's congestion/quota rearm; the link
        // state disambiguates which this firing is for.
        if self.daemon.is_reconnecting() {
            self.daemon.begin_connecting();
            self.outbox.open();
        } else {
            self.activate_scheduler();
        }
    }
}

impl Iterator for Core {
    type Item = CoreIo;

    fn next(&mut self) -> Option<Self::Item> {
        self.outbox.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport_core::peer::PEER_ID_LEN;
    use transport_net::Io;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; PEER_ID_LEN])
    }

    fn core() -> Core {
        Core::new(Config {
            me: pid(0xAA),
            ..Config::default()
        })
    }

    #[test]
    fn initialize_requests_open() {
        let mut c = core();
        c.initialize(LocalTime::from_micros(0));
        assert!(matches!(c.next(), Some(Io::Open)));
    }

    #[test]
    fn opened_emits_start_frame() {
        let mut c = core();
        c.initialize(LocalTime::from_micros(0));
        let _ = c.next();
        c.opened();
        let io = c.next().expect("a write should be queued");
        match io {
            Io::Write(bytes) => {
                let frame = Frame::decode(&bytes).unwrap();
                assert!(matches!(frame, Frame::Start { .. }));
            }
            other => panic!("expected a write, got {:?}", other),
        }
    }

    #[test]
    fn connect_then_recv_surfaces_events_in_order() {
        let mut c = core();
        c.initialize(LocalTime::from_micros(0));
        let _ = c.next();
        c.opened();
        while c.next().is_some() {}

        let connect = Frame::Connect {
            peer: pid(1),
            quota_out: 1000,
        }
        .encode();
        c.message_received(&connect);
        assert_eq!(c.neighbour_count(), 1);
        assert!(matches!(
            c.next(),
            Some(Io::Event(Event::Connected { .. }))
        ));

        let recv = Frame::Recv {
            peer: pid(1),
            inner: vec![9, 9, 9],
        }
        .encode();
        c.message_received(&recv);
        assert!(matches!(
            c.next(),
            Some(Io::Event(Event::Received { .. }))
        ));
    }

    #[test]
    fn malformed_frame_closes_with_protocol_violation() {
        let mut c = core();
        c.initialize(LocalTime::from_micros(0));
        let _ = c.next();
        c.opened();
        while c.next().is_some() {}

        c.message_received(&[0xff, 0xff, 0x00, 0x01]);
        let mut saw_close = false;
        while let Some(io) = c.next() {
            if let Io::Close(DisconnectReason::ProtocolViolation(_)) = io {
                saw_close = true;
            }
        }
        assert!(saw_close);
    }

    #[test]
    fn closed_after_shutdown_does_not_reconnect() {
        let mut c = core();
        c.initialize(LocalTime::from_micros(0));
        let _ = c.next();
        c.opened();
        while c.next().is_some() {}

        c.shutdown();
        while c.next().is_some() {}
        c.closed(CloseReason::StateMachine(DisconnectReason::LocalShutdown));
        assert_eq!(c.daemon.state(), daemon::LinkState::Idle);
        assert!(c.next().is_none());
    }

    #[test]
    fn closed_after_connection_error_schedules_reconnect_timer() {
        let mut c = core();
        c.initialize(LocalTime::from_micros(0));
        let _ = c.next();
        c.opened();
        while c.next().is_some() {}

        c.closed(CloseReason::ConnectionError("reset".to_string()));
        assert!(matches!(c.next(), Some(Io::SetTimer(_))));
    }
}
