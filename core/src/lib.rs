//! Common types shared by the transport-core crates.
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod peer;
pub mod time;
pub mod wire;

pub use error::Error;
pub use peer::PeerId;
pub use time::{LocalDuration, LocalTime};
