//! An in-memory [`transport::plugin::Plugin`] and the conformance
//! scenarios used to exercise [`transport::Core`] end to end.
//!
//! There is no real daemon here: a "daemon" in these tests is just
//! hand-encoded [`transport::wire::Frame`] bytes fed straight into
//! [`transport::Core::message_received`], the same way the core itself
//! is driven by [`transport_net::reactor::Reactor`] once frames are
//! delimited off the wire. [`MockPlugin`] is the daemon-side counterpart:
//! a published [`transport::plugin::Plugin`] implementor with no real
//! wire protocol behind it, useful for exercising the plugin contract
//! itself in isolation from any concrete transport.
#![warn(missing_docs)]

use std::collections::HashMap;

use transport_core::peer::{NetworkKind, PeerId, PEER_ID_LEN};
use transport_core::time::LocalTime;
use transport_core::Error;

use transport::plugin::{Address, Plugin, SEND_FAILED};

/// Derive a deterministic session identity from an address's bytes.
/// Not cryptographic; good enough to give two lookups of the same
/// address the same session.
fn address_to_peer(address: &Address) -> Option<PeerId> {
    if address.bytes.is_empty() {
        return None;
    }
    let mut buf = [0u8; PEER_ID_LEN];
    for (i, b) in address.bytes.iter().enumerate() {
        buf[i % buf.len()] ^= *b;
    }
    Some(PeerId::new(buf))
}

/// A [`Plugin`] with no wire protocol behind it: `send` always succeeds
/// against a known session and invokes its continuation inline, since
/// there is no asynchronous daemon round-trip to wait on.
pub struct MockPlugin {
    sessions: HashMap<PeerId, Address>,
    network: NetworkKind,
}

impl MockPlugin {
    /// Construct an empty plugin reporting `network` for every session.
    pub fn new(network: NetworkKind) -> Self {
        Self {
            sessions: HashMap::new(),
            network,
        }
    }

    /// Number of sessions currently held open.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Plugin for MockPlugin {
    type Session = PeerId;

    fn send(
        &mut self,
        session: &PeerId,
        bytes: &[u8],
        _priority: u32,
        _deadline: LocalTime,
        continuation: Box<dyn FnOnce(usize)>,
    ) -> Option<usize> {
        if !self.sessions.contains_key(session) {
            return SEND_FAILED;
        }
        let n = bytes.len();
        continuation(n);
        Some(n)
    }

    fn disconnect_peer(&mut self, peer: PeerId) {
        self.sessions.remove(&peer);
    }

    fn disconnect_session(&mut self, session: &PeerId) {
        self.sessions.remove(session);
    }

    fn get_session(&mut self, address: &Address) -> Option<PeerId> {
        let peer = address_to_peer(address)?;
        self.sessions.insert(peer, address.clone());
        Some(peer)
    }

    fn get_network(&self, _session: &PeerId) -> NetworkKind {
        self.network
    }

    fn address_pretty_printer(
        &self,
        address: &Address,
        _numeric: bool,
        _deadline: LocalTime,
        callback: &mut dyn FnMut(Option<&str>),
    ) {
        let rendered = address.to_string();
        callback(Some(&rendered));
        callback(None);
    }

    fn check_address(&self, address: &Address) -> bool {
        !address.bytes.is_empty()
    }
}

#[cfg(test)]
mod plugin_tests {
    use super::*;

    fn addr(bytes: &[u8]) -> Address {
        Address {
            plugin_name: "tcp".to_string(),
            options: 0,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn get_session_is_deterministic() {
        let mut plugin = MockPlugin::new(NetworkKind::Wan);
        let a = addr(b"10.0.0.1:4242");
        let s1 = plugin.get_session(&a).unwrap();
        let s2 = plugin.get_session(&a).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(plugin.session_count(), 1);
    }

    #[test]
    fn send_fails_without_a_session() {
        let mut plugin = MockPlugin::new(NetworkKind::Wan);
        let ghost = PeerId::zero();
        assert_eq!(
            plugin.send(&ghost, b"hi", 0, LocalTime::from_micros(0), Box::new(|_| {})),
            SEND_FAILED
        );
    }

    #[test]
    fn send_invokes_continuation_with_byte_count() {
        let mut plugin = MockPlugin::new(NetworkKind::Lan);
        let session = plugin.get_session(&addr(b"peer-a")).unwrap();
        let got = std::rc::Rc::new(std::cell::Cell::new(None));
        let got2 = got.clone();
        let n = plugin.send(
            &session,
            b"hello",
            0,
            LocalTime::from_micros(0),
            Box::new(move |n| got2.set(Some(n))),
        );
        assert_eq!(n, Some(5));
        assert_eq!(got.get(), Some(5));
    }

    #[test]
    fn disconnect_session_invalidates_further_sends() {
        let mut plugin = MockPlugin::new(NetworkKind::Lan);
        let session = plugin.get_session(&addr(b"peer-b")).unwrap();
        plugin.disconnect_session(&session);
        assert_eq!(
            plugin.send(&session, b"hi", 0, LocalTime::from_micros(0), Box::new(|_| {})),
            SEND_FAILED
        );
    }

    #[test]
    fn check_address_rejects_empty_bytes() {
        let plugin = MockPlugin::new(NetworkKind::Wan);
        assert!(!plugin.check_address(&Address {
            plugin_name: "tcp".to_string(),
            options: 0,
            bytes: Vec::new(),
        }));
    }
}

/// Conformance scenarios from spec §8, driven directly against
/// [`transport::Core`] and its public sub-manager types, bypassing a real
/// socket the way a unit test must when the real thing spins on
/// wall-clock polling.
#[cfg(test)]
mod scenarios {
    use std::cell::RefCell;
    use std::rc::Rc;

    use transport_core::peer::PeerId;
    use transport_core::time::{LocalDuration, LocalTime};
    use transport_net::{CloseReason, Io, StateMachine};

    use transport::bandwidth::Tracker;
    use transport::neighbour::{Neighbour, NeighbourTable, TransmitHandle};
    use transport::scheduler::Scheduler;
    use transport::wire::{Frame, MonitorAddress, PeerState};
    use transport::{Config, Core, DisconnectReason, Event, SubscriptionMode};

    use super::PEER_ID_LEN;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; PEER_ID_LEN])
    }

    fn started(me: PeerId) -> Core {
        let mut c = Core::new(Config {
            me,
            ..Config::default()
        });
        c.initialize(LocalTime::from_micros(0));
        drain(&mut c);
        c.opened();
        drain(&mut c);
        c
    }

    fn drain(c: &mut Core) -> Vec<Io<Vec<u8>, Event, DisconnectReason>> {
        let mut out = Vec::new();
        while let Some(io) = c.next() {
            out.push(io);
        }
        out
    }

    fn writes(ios: &[Io<Vec<u8>, Event, DisconnectReason>]) -> Vec<Frame> {
        ios.iter()
            .filter_map(|io| match io {
                Io::Write(bytes) => Some(Frame::decode(bytes).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn events(ios: &[Io<Vec<u8>, Event, DisconnectReason>]) -> Vec<Event> {
        ios.iter()
            .filter_map(|io| match io {
                Io::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Scenario A: baseline delivery. A connected neighbour's transmit
    /// request is drained into a single `SEND` frame, and an inbound
    /// `RECV` surfaces as exactly one `Received` event.
    #[test]
    fn scenario_a_baseline_delivery() {
        let me = pid(0xAA);
        let peer = pid(1);
        let mut c = started(me);

        let connect = Frame::Connect {
            peer,
            quota_out: 1_000_000,
        }
        .encode();
        c.message_received(&connect);
        let ios = drain(&mut c);
        assert!(matches!(events(&ios)[..], [Event::Connected { .. }]));

        let granted = Rc::new(RefCell::new(None));
        let granted2 = granted.clone();
        c.notify_transmit_ready(
            peer,
            2600,
            LocalTime::from_micros(0) + LocalDuration::from_secs(30),
            move |window| {
                *granted2.borrow_mut() = Some(window);
                vec![0u8; 2600]
            },
        )
        .unwrap();

        c.timer_expired();
        let ios = drain(&mut c);
        let sent = writes(&ios);
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Frame::Send { inner, .. } => assert_eq!(inner.len(), 2600),
            other => panic!("expected a SEND frame, got {:?}", other),
        }
        assert_eq!(*granted.borrow(), Some(usize::MAX));

        let send_ok = Frame::SendOk {
            success: true,
            bytes_msg: 2600,
            bytes_physical: 2600,
            peer,
        }
        .encode();
        c.message_received(&send_ok);
        let ios = drain(&mut c);
        assert!(events(&ios).is_empty());
        assert_eq!(c.neighbour_count(), 1);

        let recv = Frame::Recv {
            peer,
            inner: vec![9; 2600],
        }
        .encode();
        c.message_received(&recv);
        let ios = drain(&mut c);
        match &events(&ios)[..] {
            [Event::Received { message, .. }] => assert_eq!(message.len(), 2600),
            other => panic!("expected exactly one Received event, got {:?}", other),
        }
    }

    /// Scenario B: a transmit request that cannot clear quota before its
    /// deadline fires its callback with an empty buffer, and the
    /// neighbour is left connected and ready.
    #[test]
    fn scenario_b_congestion_timeout() {
        let me = pid(0xAA);
        let peer = pid(1);
        let mut c = started(me);

        let connect = Frame::Connect { peer, quota_out: 1 }.encode();
        c.message_received(&connect);
        drain(&mut c);

        let got = Rc::new(RefCell::new(None));
        let got2 = got.clone();
        let deadline = LocalTime::from_micros(0) + LocalDuration::from_millis(10);
        c.notify_transmit_ready(peer, 2600, deadline, move |window| {
            *got2.borrow_mut() = Some(window);
            Vec::new()
        })
        .unwrap();

        c.tick(deadline);
        c.timer_expired();
        drain(&mut c);

        assert_eq!(*got.borrow(), Some(0));
        assert_eq!(c.neighbour_count(), 1);
    }

    /// Scenario D: reconnect preserves API shape. A connection error
    /// surfaces every neighbour as disconnected before the daemon link
    /// reconnects; once `START` replays, the daemon's `CONNECT` resurfaces
    /// the same peer as connected again.
    #[test]
    fn scenario_d_reconnect_preserves_api() {
        let me = pid(0xAA);
        let peer = pid(1);
        let mut c = started(me);

        let connect = Frame::Connect {
            peer,
            quota_out: 1000,
        }
        .encode();
        c.message_received(&connect);
        drain(&mut c);
        assert_eq!(c.neighbour_count(), 1);

        c.closed(CloseReason::ConnectionError("reset".to_string()));
        let ios = drain(&mut c);
        assert!(events(&ios)
            .iter()
            .any(|e| matches!(e, Event::Disconnected { peer: p } if *p == peer)));
        assert!(ios.iter().any(|io| matches!(io, Io::SetTimer(_))));
        assert_eq!(c.neighbour_count(), 0);

        c.timer_expired();
        assert!(matches!(c.next(), Some(Io::Open)));
        c.opened();
        let ios = drain(&mut c);
        assert!(writes(&ios)
            .iter()
            .any(|f| matches!(f, Frame::Start { .. })));

        let reconnect = Frame::Connect {
            peer,
            quota_out: 1000,
        }
        .encode();
        c.message_received(&reconnect);
        let ios = drain(&mut c);
        assert!(matches!(events(&ios)[..], [Event::Connected { peer: p }] if p == peer));
        assert_eq!(c.neighbour_count(), 1);
    }

    /// Scenario E: overhead accounting. 100 messages of logical size 1000
    /// reported back at physical size 1120 each leave the tracker
    /// 112,000 bytes poorer (100,000 logical + 12,000 overhead) once the
    /// last message's overhead is folded into a following send.
    #[test]
    fn scenario_e_overhead_accounting() {
        let now = LocalTime::from_micros(0);
        let peer = pid(1);
        let mut neighbours = NeighbourTable::new();
        neighbours
            .insert(Neighbour::new(
                peer,
                Tracker::new(10_000_000, LocalDuration::from_secs(5), now),
                now,
            ))
            .unwrap();
        let mut sched = Scheduler::new();
        let tokens_before = neighbours.get(&peer).unwrap().tracker.tokens();

        for _ in 0..100 {
            let handle = TransmitHandle::new(
                Some(peer),
                1000,
                now,
                now + LocalDuration::from_secs(60),
                Box::new(|w| vec![0u8; w.min(1000)]),
            );
            sched.submit_data(peer, handle, now, &mut neighbours).unwrap();
            let step = sched.poll(now, &mut neighbours);
            assert!(step.write.is_some());
            neighbours.get_mut(&peer).unwrap().add_overhead(1120, 1000);
            sched.neighbour_ready_again(peer, now, &mut neighbours);
        }
        // The 100th message's overhead hasn't been folded into a send yet.
        assert_eq!(neighbours.get(&peer).unwrap().pending_overhead, 120);

        let flush = TransmitHandle::new(
            Some(peer),
            1,
            now,
            now + LocalDuration::from_secs(60),
            Box::new(|w| vec![0u8; w.min(1)]),
        );
        sched.submit_data(peer, flush, now, &mut neighbours).unwrap();
        sched.poll(now, &mut neighbours);

        let tokens_after = neighbours.get(&peer).unwrap().tracker.tokens();
        assert_eq!(tokens_before - tokens_after, (100 * 1000 + 100 * 120 + 1) as f64);
        assert_eq!(neighbours.get(&peer).unwrap().pending_overhead, 0);
    }

    /// Scenario F: monitor stream correctness. A continuous peer
    /// subscription yields exactly one `PeerMonitor` event per daemon
    /// response and re-subscribes across a reconnect.
    #[test]
    fn scenario_f_monitor_stream_correctness() {
        let me = pid(0xAA);
        let peer = pid(1);
        let mut c = started(me);

        c.monitor_peers(peer, SubscriptionMode::Continuous);
        let ios = drain(&mut c);
        assert!(writes(&ios)
            .iter()
            .any(|f| matches!(f, Frame::MonitorPeerRequest { .. })));

        let addr = MonitorAddress {
            peer,
            addr_bytes: b"tcp-addr".to_vec(),
            plugin_name: "tcp".to_string(),
        };

        let connected = Frame::MonitorPeerResponse {
            address: addr.clone(),
            state: PeerState::Connected,
            timeout: LocalTime::from_micros(1),
        }
        .encode();
        c.message_received(&connected);
        let ios = drain(&mut c);
        let connects = events(&ios)
            .into_iter()
            .filter(|e| matches!(e, Event::PeerMonitor { state: PeerState::Connected, .. }))
            .count();
        assert_eq!(connects, 1);

        let not_connected = Frame::MonitorPeerResponse {
            address: addr,
            state: PeerState::NotConnected,
            timeout: LocalTime::from_micros(2),
        }
        .encode();
        c.message_received(&not_connected);
        let ios = drain(&mut c);
        let disconnects = events(&ios)
            .into_iter()
            .filter(|e| matches!(e, Event::PeerMonitor { state: PeerState::NotConnected, .. }))
            .count();
        assert_eq!(disconnects, 1);

        // A continuous subscription re-arms itself across a reconnect.
        c.opened();
        let ios = drain(&mut c);
        assert!(writes(&ios)
            .iter()
            .any(|f| matches!(f, Frame::MonitorPeerRequest { .. })));
    }
}
