//! Peer identity.
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a peer identity (a cryptographic public key hash).
pub const PEER_ID_LEN: usize = 32;

/// Opaque, fixed-size peer identifier.
///
/// Comparable by byte equality and hashable; the core never inspects the
/// bytes beyond that. Authentication of the bytes is assumed to happen in
/// a higher layer (spec Non-goals).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    /// Construct a peer identity from raw bytes.
    pub const fn new(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// View the identity as a byte slice.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    /// The all-zero identity, used in tests and as a sentinel.
    pub const fn zero() -> Self {
        Self([0u8; PEER_ID_LEN])
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Error parsing a [`PeerId`] from a hex string.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The string did not decode to valid hex.
    #[error("invalid hex in peer identity")]
    InvalidHex,
    /// The decoded bytes were not [`PEER_ID_LEN`] long.
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Expected byte length.
        expected: usize,
        /// Actual decoded byte length.
        actual: usize,
    },
}

impl FromStr for PeerId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != PEER_ID_LEN * 2 {
            return Err(ParseError::WrongLength {
                expected: PEER_ID_LEN * 2,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; PEER_ID_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = s.as_bytes()[i * 2];
            let lo = s.as_bytes()[i * 2 + 1];
            *byte = (hex_nibble(hi).ok_or(ParseError::InvalidHex)? << 4)
                | hex_nibble(lo).ok_or(ParseError::InvalidHex)?;
        }
        Ok(Self(bytes))
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Classification of the physical link used to reach a peer, returned by
/// a plugin's `get_network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    /// Local-area network.
    Lan,
    /// Wide-area network.
    Wan,
    /// The local host.
    Loopback,
    /// Wireless LAN.
    Wlan,
    /// Bluetooth.
    Bt,
    /// Unknown or not yet classified.
    Unspecified,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_display_parse() {
        let id = PeerId::new([7u8; PEER_ID_LEN]);
        let s = format!("{:016x}", u64::from_be_bytes([7; 8]));
        assert!(s.starts_with("0707"));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(matches!(
            "abcd".parse::<PeerId>(),
            Err(ParseError::WrongLength { .. })
        ));
    }

    #[test]
    fn parse_rejects_bad_hex() {
        let bad = "zz".repeat(PEER_ID_LEN);
        assert!(matches!(bad.parse::<PeerId>(), Err(ParseError::InvalidHex)));
    }

    #[test]
    fn full_roundtrip() {
        let mut bytes = [0u8; PEER_ID_LEN];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let id = PeerId::new(bytes);
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        let parsed: PeerId = hex.parse().unwrap();
        assert_eq!(id, parsed);
    }
}
