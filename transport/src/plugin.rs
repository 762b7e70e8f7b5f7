//! The plugin contract (spec §4.7) and address grammar (spec §3 "Address",
//! §6 "Address string grammar").
//!
//! This is a published interface, not code the client transport handle
//! calls into: per spec §1, concrete wire-protocol implementations live
//! daemon-side and are out of scope. Expressed as a trait rather than a C
//! vtable, grounded on the teacher's `ChainAdapter`/`NetAdapter` split
//! (`mwcproject` `p2p::types`) — an abstract boundary the core depends on
//! without inspecting the implementor.
use std::fmt;
use std::str::FromStr;

use transport_core::peer::NetworkKind;
use transport_core::time::LocalTime;
use transport_core::Error;

/// A length-prefixed, plugin-tagged transport address (spec §3 "Address").
///
/// Round-trips through a human-readable string of the shape
/// `plugin_name.options_hex.plugin_specific_text` (spec §6), where
/// `plugin_specific_text` is the address's bytes interpreted as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// The owning plugin's name.
    pub plugin_name: String,
    /// Options bitmask, plugin-interpreted.
    pub options: u32,
    /// Plugin-specific address bytes.
    pub bytes: Vec<u8>,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:x}.{}",
            self.plugin_name,
            self.options,
            String::from_utf8_lossy(&self.bytes)
        )
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let plugin_name = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(Error::InvalidAddress("missing plugin name"))?
            .to_string();
        let options_hex = parts
            .next()
            .ok_or(Error::InvalidAddress("missing options field"))?;
        let text = parts
            .next()
            .ok_or(Error::InvalidAddress("missing plugin-specific text"))?;
        let options = u32::from_str_radix(options_hex, 16)
            .map_err(|_| Error::InvalidAddress("options field is not hexadecimal"))?;
        Ok(Self {
            plugin_name,
            options,
            bytes: text.as_bytes().to_vec(),
        })
    }
}

/// Sentinel `send` return meaning hard failure (spec §4.7: "a sentinel for
/// hard failure").
pub const SEND_FAILED: Option<usize> = None;

/// A wire-protocol implementation's plugin vtable, abstracted as a trait.
/// The core holds `dyn Plugin` and never inspects implementor internals.
pub trait Plugin {
    /// Opaque per-peer session handle this plugin hands out.
    type Session;

    /// Enqueue `bytes` toward `session`'s peer. Returns an estimate of
    /// bytes used on the wire, or [`SEND_FAILED`] for hard failure (e.g.
    /// invalid address). `continuation` MUST be invoked before any
    /// disconnect notification for the peer is delivered upward (spec
    /// §4.7 ordering requirement).
    fn send(
        &mut self,
        session: &Self::Session,
        bytes: &[u8],
        priority: u32,
        deadline: LocalTime,
        continuation: Box<dyn FnOnce(usize)>,
    ) -> Option<usize>;

    /// Force-close all sessions to a peer, invoking their pending
    /// continuations with a failure marker (`0`).
    fn disconnect_peer(&mut self, peer: transport_core::PeerId);

    /// Force-close one session.
    fn disconnect_session(&mut self, session: &Self::Session);

    /// Return an existing session for `address`, or create one. `None`
    /// surfaces upward as [`Error::Unreachable`].
    fn get_session(&mut self, address: &Address) -> Option<Self::Session>;

    /// Classify the physical link used to reach a session's peer.
    fn get_network(&self, session: &Self::Session) -> NetworkKind;

    /// Render an address in human-readable form.
    fn address_to_string(&self, address: &Address) -> String {
        address.to_string()
    }

    /// Parse a human-readable address string. Must fail on malformed
    /// input (spec §8 property 4: round-trips for every well-formed
    /// address).
    fn string_to_address(&self, s: &str) -> Result<Address, Error> {
        s.parse()
    }

    /// Asynchronously resolve `address` to zero or more human-readable
    /// forms (e.g. reverse DNS), calling `callback` for each, then once
    /// more with `None` to terminate.
    fn address_pretty_printer(
        &self,
        address: &Address,
        numeric: bool,
        deadline: LocalTime,
        callback: &mut dyn FnMut(Option<&str>),
    );

    /// Sanity-check an address purportedly usable to reach this local
    /// node.
    fn check_address(&self, address: &Address) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips() {
        let addr = Address {
            plugin_name: "tcp".to_string(),
            options: 0x2a,
            bytes: b"10.0.0.1:4242".to_vec(),
        };
        let s = addr.to_string();
        let parsed: Address = s.parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn malformed_address_rejected() {
        assert!("tcp.notahex.blah".parse::<Address>().is_err());
        assert!("tcp.2a".parse::<Address>().is_err());
    }
}
