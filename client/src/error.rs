//! Errors surfaced by the client handle and its background reactor.
use thiserror::Error;

/// Failures a [`crate::Client`] or [`crate::handle::Handle`] can report.
#[derive(Debug, Error)]
pub enum Error {
    /// The reactor's connection to the daemon failed unrecoverably.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The client's background thread is no longer running.
    #[error("the client has shut down")]
    Disconnected,
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Error::Disconnected
    }
}
