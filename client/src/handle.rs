//! The client-side transport handle (spec §1(a)).
//!
//! Grounded on `wallet/src/lib.rs`'s `handle.events()` / `handle.shutdown()`
//! usage of `nakamoto_client::Handle`: a cheap, cloneable front door that
//! talks to the running client over channels, never touching [`transport::Core`]
//! directly. Commands queue onto the background thread's [`Adapter`]
//! (`crate::Adapter`), which applies them to the core between reactor polls.
use crossbeam_channel as chan;

use transport::{ControlOutcome, Event, SubscriptionMode};
use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};

use crate::error::Error;

/// A queued request from a [`Handle`] to the running client.
pub enum Command {
    /// See [`transport::Core::notify_transmit_ready`].
    NotifyTransmitReady {
        /// Destination peer.
        peer: PeerId,
        /// Requested payload size.
        size: usize,
        /// Absolute deadline.
        deadline: LocalTime,
        /// Buffer-fill callback.
        fill: Box<dyn FnOnce(usize) -> Vec<u8> + Send>,
    },
    /// See [`transport::Core::cancel_transmit`].
    CancelTransmit(PeerId),
    /// See [`transport::Core::offer_hello`].
    OfferHello {
        /// The HELLO blob being offered.
        blob: Vec<u8>,
        /// Absolute deadline.
        deadline: LocalTime,
        /// Outcome continuation.
        continuation: Box<dyn FnOnce(ControlOutcome) + Send>,
    },
    /// See [`transport::Core::try_connect`].
    TryConnect {
        /// Target peer.
        peer: PeerId,
        /// Absolute deadline.
        deadline: LocalTime,
        /// Result callback.
        callback: Box<dyn FnOnce(bool) + Send>,
    },
    /// See [`transport::Core::set_traffic_metric`].
    SetTrafficMetric {
        /// Target peer.
        peer: PeerId,
        /// Opaque properties bitmask.
        properties: u32,
        /// Simulated inbound delay.
        delay_in: LocalDuration,
        /// Simulated outbound delay.
        delay_out: LocalDuration,
        /// Absolute deadline.
        deadline: LocalTime,
    },
    /// See [`transport::Core::monitor_peers`].
    MonitorPeers(PeerId, SubscriptionMode),
    /// See [`transport::Core::monitor_validation`].
    MonitorValidation(PeerId, SubscriptionMode),
    /// See [`transport::Core::unsubscribe_peers`].
    UnsubscribePeers,
    /// See [`transport::Core::unsubscribe_validation`].
    UnsubscribeValidation,
}

/// A cheap, cloneable handle to a running [`crate::Client`] (spec §1(a)).
///
/// Every method queues a [`Command`] for the client's background thread;
/// none block on the daemon round-trip itself, matching the cooperative,
/// non-blocking shape of spec §5.
#[derive(Clone)]
pub struct Handle {
    pub(crate) commands: chan::Sender<Command>,
    pub(crate) events: chan::Receiver<Event>,
    pub(crate) shutdown: chan::Sender<()>,
}

impl Handle {
    /// Queue a data transmission to `peer`.
    pub fn notify_transmit_ready(
        &self,
        peer: PeerId,
        size: usize,
        deadline: LocalTime,
        fill: impl FnOnce(usize) -> Vec<u8> + Send + 'static,
    ) -> Result<(), Error> {
        self.commands
            .send(Command::NotifyTransmitReady {
                peer,
                size,
                deadline,
                fill: Box::new(fill),
            })
            .map_err(Error::from)
    }

    /// Cancel a previously submitted data transmission.
    pub fn cancel_transmit(&self, peer: PeerId) -> Result<(), Error> {
        self.commands
            .send(Command::CancelTransmit(peer))
            .map_err(Error::from)
    }

    /// Offer another peer's HELLO blob to the daemon for validation.
    pub fn offer_hello(
        &self,
        blob: Vec<u8>,
        deadline: LocalTime,
        continuation: impl FnOnce(ControlOutcome) + Send + 'static,
    ) -> Result<(), Error> {
        self.commands
            .send(Command::OfferHello {
                blob,
                deadline,
                continuation: Box::new(continuation),
            })
            .map_err(Error::from)
    }

    /// Ask the daemon to attempt a connection to `peer`.
    pub fn try_connect(
        &self,
        peer: PeerId,
        deadline: LocalTime,
        callback: impl FnOnce(bool) + Send + 'static,
    ) -> Result<(), Error> {
        self.commands
            .send(Command::TryConnect {
                peer,
                deadline,
                callback: Box::new(callback),
            })
            .map_err(Error::from)
    }

    /// Report artificial delay/distance metadata for a peer.
    pub fn set_traffic_metric(
        &self,
        peer: PeerId,
        properties: u32,
        delay_in: LocalDuration,
        delay_out: LocalDuration,
        deadline: LocalTime,
    ) -> Result<(), Error> {
        self.commands
            .send(Command::SetTrafficMetric {
                peer,
                properties,
                delay_in,
                delay_out,
                deadline,
            })
            .map_err(Error::from)
    }

    /// Subscribe to peer-state changes.
    pub fn monitor_peers(&self, peer: PeerId, mode: SubscriptionMode) -> Result<(), Error> {
        self.commands
            .send(Command::MonitorPeers(peer, mode))
            .map_err(Error::from)
    }

    /// Subscribe to validation-state changes.
    pub fn monitor_validation(&self, peer: PeerId, mode: SubscriptionMode) -> Result<(), Error> {
        self.commands
            .send(Command::MonitorValidation(peer, mode))
            .map_err(Error::from)
    }

    /// Cancel the peer-state subscription, if any.
    pub fn unsubscribe_peers(&self) -> Result<(), Error> {
        self.commands
            .send(Command::UnsubscribePeers)
            .map_err(Error::from)
    }

    /// Cancel the validation-state subscription, if any.
    pub fn unsubscribe_validation(&self) -> Result<(), Error> {
        self.commands
            .send(Command::UnsubscribeValidation)
            .map_err(Error::from)
    }

    /// The channel of domain events surfaced by the core (spec §4.6, §4.10).
    pub fn events(&self) -> chan::Receiver<Event> {
        self.events.clone()
    }

    /// Request an orderly shutdown of the client's background thread.
    pub fn shutdown(&self) -> Result<(), Error> {
        self.shutdown.send(()).map_err(Error::from)
    }
}
