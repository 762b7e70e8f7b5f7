//! A reference, single-threaded, poll-based reactor.
//!
//! Grounded on the teacher's `nakamoto-net-poll` crate (referenced
//! throughout `wallet/src/lib.rs` as `nakamoto_net_poll::Reactor<net::TcpStream>`,
//! though its own source wasn't part of the retrieval pack): a reactor
//! generic over any `Read + Write` stream, driving a [`StateMachine`] by
//! repeatedly polling for readiness, feeding inbound bytes to
//! `message_received`, and writing back whatever the state machine's
//! iterator yields.
//!
//! Framing here only needs to know that every frame is prefixed with a
//! big-endian `u16` total length (spec §6); the frame's own type and body
//! are opaque to the reactor and decoded by `transport`'s demultiplexer.
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crossbeam_channel as chan;
use transport_core::time::LocalTime;

use crate::{CloseReason, Io, StateMachine};

/// Anything the reactor can open, read from, and write to as the daemon
/// connection. Implemented for [`TcpStream`]; test code can supply an
/// in-memory duplex instead.
pub trait Transport: Read + Write + Sized {
    /// Open a connection to the given address.
    fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self>;
    /// Put the stream in non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        TcpStream::connect(addr)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
}

/// How often the reactor wakes up even with nothing to do, to drive
/// `tick()` and check for expired timers.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A reference reactor implementation over a single persistent stream.
pub struct Reactor<T> {
    stream: Option<T>,
    inbox: Vec<u8>,
    timer_deadline: Option<LocalTime>,
}

impl<T: Transport> Default for Reactor<T> {
    fn default() -> Self {
        Self {
            stream: None,
            inbox: Vec::new(),
            timer_deadline: None,
        }
    }
}

impl<T: Transport> Reactor<T> {
    /// Construct an idle reactor with no open connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive `machine` against the daemon at `addr` until `shutdown` fires
    /// or an unrecoverable I/O error occurs.
    pub fn run<A, M, E, D, SM>(
        &mut self,
        machine: &mut SM,
        addr: A,
        shutdown: chan::Receiver<()>,
    ) -> io::Result<()>
    where
        A: ToSocketAddrs + Clone,
        M: AsRef<[u8]>,
        D: std::fmt::Display + std::fmt::Debug,
        SM: StateMachine<Message = M, Event = E, CloseReason = D>,
    {
        machine.initialize(LocalTime::now());

        loop {
            if shutdown.try_recv().is_ok() {
                return Ok(());
            }

            self.drain_outbox(machine, addr.clone());

            if let Some(stream) = self.stream.as_mut() {
                let mut buf = [0u8; 64 * 1024];
                match stream.read(&mut buf) {
                    Ok(0) => {
                        self.stream = None;
                        machine.closed(CloseReason::ConnectionError(
                            "connection closed by peer".to_string(),
                        ));
                    }
                    Ok(n) => {
                        self.inbox.extend_from_slice(&buf[..n]);
                        self.dispatch_frames(machine);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        self.stream = None;
                        machine.closed(CloseReason::ConnectionError(e.to_string()));
                    }
                }
            }

            if let Some(deadline) = self.timer_deadline {
                if LocalTime::now() >= deadline {
                    self.timer_deadline = None;
                    machine.timer_expired();
                }
            }

            machine.tick(LocalTime::now());
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn drain_outbox<A, M, E, D, SM>(&mut self, machine: &mut SM, addr: A)
    where
        A: ToSocketAddrs + Clone,
        M: AsRef<[u8]>,
        D: std::fmt::Display + std::fmt::Debug,
        SM: StateMachine<Message = M, Event = E, CloseReason = D>,
    {
        while let Some(io) = machine.next() {
            match io {
                Io::Open => match T::connect(addr.clone()) {
                    Ok(stream) => {
                        let _ = stream.set_nonblocking(true);
                        self.stream = Some(stream);
                        machine.opened();
                    }
                    Err(e) => {
                        machine.closed(CloseReason::ConnectionError(e.to_string()));
                    }
                },
                Io::Write(msg) => {
                    if let Some(stream) = self.stream.as_mut() {
                        if let Err(e) = stream.write_all(msg.as_ref()) {
                            self.stream = None;
                            machine.closed(CloseReason::ConnectionError(e.to_string()));
                        }
                    }
                }
                Io::Close(reason) => {
                    self.stream = None;
                    machine.closed(CloseReason::StateMachine(reason));
                }
                Io::SetTimer(delay) => {
                    self.timer_deadline = Some(LocalTime::now() + delay);
                }
                Io::Event(_) => {
                    // Events are for upstream subscribers; the reactor
                    // itself has nothing to do with them.
                }
            }
        }
    }

    fn dispatch_frames<M, E, D, SM>(&mut self, machine: &mut SM)
    where
        M: AsRef<[u8]>,
        D: std::fmt::Display + std::fmt::Debug,
        SM: StateMachine<Message = M, Event = E, CloseReason = D>,
    {
        loop {
            if self.inbox.len() < 2 {
                return;
            }
            let size = u16::from_be_bytes([self.inbox[0], self.inbox[1]]) as usize;
            if size < 2 || self.inbox.len() < size {
                return;
            }
            let frame: Vec<u8> = self.inbox.drain(..size).collect();
            machine.message_received(&frame);
        }
    }
}
