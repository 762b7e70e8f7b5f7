//! The client-side transport handle (spec §1(a)).
//!
//! Grounded on `wallet/src/lib.rs`'s `Client::<Reactor>::new()` /
//! `client.handle()` / `handle.events()` / `thread::spawn(move || ...run())`
//! shape: a `Client` is constructed, its `Handle` is cloned out to whatever
//! needs to issue commands or read events, and the client itself is handed
//! to a background thread to drive the reactor loop until shutdown.
//!
//! [`transport_net::reactor::Reactor`] is a fixed loop with no hook for
//! injecting arbitrary method calls between polls, so this crate supplies
//! [`Adapter`], a thin [`transport_net::StateMachine`] wrapper around
//! [`transport::Core`] that drains the handle's command channel once per
//! `tick()` and forwards every emitted [`transport::Event`] to the handle's
//! event channel. `transport` itself stays reactor-agnostic.
#![warn(missing_docs)]

pub mod error;
pub mod handle;

use crossbeam_channel as chan;

use transport_core::time::LocalTime;
use transport_net::reactor::{Reactor, Transport};
use transport_net::{CloseReason, Io, StateMachine};

use transport::{Core, DisconnectReason, Event};

pub use error::Error;
pub use handle::{Command, Handle};

/// Client-side configuration: the core's own config plus nothing else yet
/// (spec §1(a) names no client-only knobs beyond what the core needs).
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Configuration handed through to [`transport::Core::new`].
    pub core: transport::Config,
}

/// An unstarted transport client. Call [`Client::handle`] any number of
/// times before [`Client::run`] to obtain handles that outlive it.
pub struct Client<T> {
    commands: (chan::Sender<Command>, chan::Receiver<Command>),
    events: (chan::Sender<Event>, chan::Receiver<Event>),
    shutdown: (chan::Sender<()>, chan::Receiver<()>),
    _transport: std::marker::PhantomData<T>,
}

impl<T: Transport> Default for Client<T> {
    fn default() -> Self {
        Self {
            commands: chan::unbounded(),
            events: chan::unbounded(),
            shutdown: chan::unbounded(),
            _transport: std::marker::PhantomData,
        }
    }
}

impl<T: Transport> Client<T> {
    /// Construct a new, unstarted client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a handle to this client. Safe to call before or after
    /// spawning [`Client::run`] on another thread.
    pub fn handle(&self) -> Handle {
        Handle {
            commands: self.commands.0.clone(),
            events: self.events.1.clone(),
            shutdown: self.shutdown.0.clone(),
        }
    }

    /// Drive the transport core against the daemon at `addr` until a
    /// handle requests shutdown or the connection fails unrecoverably.
    /// Blocks the calling thread; callers typically run this inside
    /// `thread::spawn`.
    pub fn run<A>(self, config: Config, addr: A) -> Result<(), Error>
    where
        A: std::net::ToSocketAddrs + Clone,
    {
        let (reactor_stop_tx, reactor_stop_rx) = chan::unbounded();
        let mut adapter = Adapter {
            core: Core::new(config.core),
            commands: self.commands.1,
            events: self.events.0,
            shutdown_request: self.shutdown.1,
            shutdown_requested: false,
            reactor_stop: reactor_stop_tx,
        };
        let mut reactor = Reactor::<T>::new();
        reactor.run(&mut adapter, addr, reactor_stop_rx)?;
        Ok(())
    }
}

/// Wraps [`transport::Core`] to integrate it with a fixed-shape reactor
/// loop that has no native concept of an external command queue.
struct Adapter {
    core: Core,
    commands: chan::Receiver<Command>,
    events: chan::Sender<Event>,
    shutdown_request: chan::Receiver<()>,
    shutdown_requested: bool,
    reactor_stop: chan::Sender<()>,
}

impl Adapter {
    fn apply(&mut self, command: Command) {
        match command {
            Command::NotifyTransmitReady {
                peer,
                size,
                deadline,
                fill,
            } => {
                if let Err(err) = self.core.notify_transmit_ready(peer, size, deadline, fill) {
                    log::debug!(target: "transport-client", "notify_transmit_ready rejected: {}", err);
                }
            }
            Command::CancelTransmit(peer) => {
                self.core.cancel_transmit(&peer);
            }
            Command::OfferHello {
                blob,
                deadline,
                continuation,
            } => {
                self.core
                    .offer_hello(blob, deadline, move |outcome| continuation(outcome));
            }
            Command::TryConnect {
                peer,
                deadline,
                callback,
            } => {
                self.core
                    .try_connect(peer, deadline, move |ok| callback(ok));
            }
            Command::SetTrafficMetric {
                peer,
                properties,
                delay_in,
                delay_out,
                deadline,
            } => {
                self.core
                    .set_traffic_metric(peer, properties, delay_in, delay_out, deadline);
            }
            Command::MonitorPeers(peer, mode) => self.core.monitor_peers(peer, mode),
            Command::MonitorValidation(peer, mode) => self.core.monitor_validation(peer, mode),
            Command::UnsubscribePeers => self.core.unsubscribe_peers(),
            Command::UnsubscribeValidation => self.core.unsubscribe_validation(),
        }
    }
}

impl StateMachine for Adapter {
    type Message = Vec<u8>;
    type Event = Event;
    type CloseReason = DisconnectReason;

    fn initialize(&mut self, time: LocalTime) {
        self.core.initialize(time);
    }

    fn message_received(&mut self, message: &[u8]) {
        self.core.message_received(message);
    }

    fn opened(&mut self) {
        self.core.opened();
    }

    fn closed(&mut self, reason: CloseReason<DisconnectReason>) {
        self.core.closed(reason);
    }

    fn tick(&mut self, local_time: LocalTime) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        if !self.shutdown_requested {
            if self.shutdown_request.try_recv().is_ok() {
                self.shutdown_requested = true;
                self.core.shutdown();
            }
        } else if self.core.is_idle() {
            let _ = self.reactor_stop.send(());
        }

        self.core.tick(local_time);
    }

    fn timer_expired(&mut self) {
        self.core.timer_expired();
    }
}

impl Iterator for Adapter {
    type Item = Io<Vec<u8>, Event, DisconnectReason>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.core.next()?;
        if let Io::Event(ref event) = item {
            let _ = self.events.send(event.clone());
        }
        Some(item)
    }
}
