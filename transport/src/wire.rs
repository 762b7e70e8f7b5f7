//! Daemon wire frames (spec §6).
//!
//! Every frame begins with `{u16 size, u16 type}` in network byte order.
//! `size` includes the four-byte header. This module owns encode/decode
//! for every frame named in spec §6's table; [`transport_net::reactor`]
//! only needs the size prefix to delimit frames and hands the raw bytes
//! here for interpretation, the way the teacher keeps wire decoding out of
//! the reactor crate entirely (`nakamoto-net` vs. `nakamoto-p2p`).
use thiserror::Error;

use transport_core::peer::PeerId;
use transport_core::time::{LocalDuration, LocalTime};
use transport_core::wire::{DecodeError, Reader, Writer};

const HEADER_LEN: usize = 4;
const PEER_ID_LEN: usize = transport_core::peer::PEER_ID_LEN;

/// Numeric wire type codes. Spec fixes a registry; we assign the codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    /// `START`
    Start = 1,
    /// `HELLO`
    Hello = 2,
    /// `CONNECT`
    Connect = 3,
    /// `DISCONNECT`
    Disconnect = 4,
    /// `SEND`
    Send = 5,
    /// `SEND_OK`
    SendOk = 6,
    /// `RECV`
    Recv = 7,
    /// `SET_QUOTA`
    SetQuota = 8,
    /// `REQUEST_CONNECT`
    RequestConnect = 9,
    /// `OFFER_HELLO`
    OfferHello = 10,
    /// `TRAFFIC_METRIC`
    TrafficMetric = 11,
    /// `MONITOR_PEER_REQUEST`
    MonitorPeerRequest = 12,
    /// `MONITOR_PEER_RESPONSE`
    MonitorPeerResponse = 13,
    /// `MONITOR_VALIDATION_REQUEST`
    MonitorValidationRequest = 14,
    /// `MONITOR_VALIDATION_RESPONSE`
    MonitorValidationResponse = 15,
}

impl FrameType {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::Start,
            2 => Self::Hello,
            3 => Self::Connect,
            4 => Self::Disconnect,
            5 => Self::Send,
            6 => Self::SendOk,
            7 => Self::Recv,
            8 => Self::SetQuota,
            9 => Self::RequestConnect,
            10 => Self::OfferHello,
            11 => Self::TrafficMetric,
            12 => Self::MonitorPeerRequest,
            13 => Self::MonitorPeerResponse,
            14 => Self::MonitorValidationRequest,
            15 => Self::MonitorValidationResponse,
            _ => return None,
        })
    }
}

/// Options bitmask for `START` (spec §4.5).
pub mod start_options {
    /// Bit 0: request the daemon validate our own self-identity.
    pub const SELF_IDENTITY_CHECK: u32 = 1 << 0;
    /// Bit 1: ask the daemon to deliver inbound traffic to our recv callback.
    pub const DELIVER_INBOUND: u32 = 1 << 1;
}

/// Peer connection state, as observed through the monitoring interface
/// (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PeerState {
    /// Not connected.
    NotConnected = 0,
    /// Initializing address translation.
    InitAts = 1,
    /// Connect sent.
    ConnectSent = 2,
    /// Connect ATS received.
    ConnectRecvAts = 3,
    /// Connect ack received.
    ConnectRecvAck = 4,
    /// Fully connected.
    Connected = 5,
    /// Reconnecting: ATS phase.
    ReconnectAts = 6,
    /// Reconnecting: connect sent.
    ReconnectSent = 7,
    /// Connected, but switching to a new connect-sent session.
    ConnectedSwitchingConnectSent = 8,
    /// Disconnecting.
    Disconnect = 9,
    /// Disconnect finished.
    DisconnectFinished = 10,
}

impl PeerState {
    /// Whether this state counts as "connected" per spec §4.10.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::ReconnectAts
                | Self::ReconnectSent
                | Self::ConnectedSwitchingConnectSent
        )
    }

    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::NotConnected,
            1 => Self::InitAts,
            2 => Self::ConnectSent,
            3 => Self::ConnectRecvAts,
            4 => Self::ConnectRecvAck,
            5 => Self::Connected,
            6 => Self::ReconnectAts,
            7 => Self::ReconnectSent,
            8 => Self::ConnectedSwitchingConnectSent,
            9 => Self::Disconnect,
            10 => Self::DisconnectFinished,
            _ => return None,
        })
    }
}

/// Validation state, as observed through the monitoring interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ValidationState {
    /// No validation state recorded.
    None = 0,
    /// A new address is being validated.
    New = 1,
    /// The address was removed.
    Remove = 2,
    /// Validation timed out.
    Timeout = 3,
    /// The validation state was updated.
    Update = 4,
}

impl ValidationState {
    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::None,
            1 => Self::New,
            2 => Self::Remove,
            3 => Self::Timeout,
            4 => Self::Update,
            _ => return None,
        })
    }
}

/// A variable-length address payload carried by monitor responses,
/// subject to the invariants in spec §4.10.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorAddress {
    /// The peer this entry describes.
    pub peer: PeerId,
    /// The plugin-specific address bytes.
    pub addr_bytes: Vec<u8>,
    /// The plugin name, without the trailing NUL.
    pub plugin_name: String,
}

impl MonitorAddress {
    fn encode(&self, w: &mut Writer) {
        w.write_bytes(self.peer.as_bytes());
        let alen = self.addr_bytes.len() as u16;
        let tlen = if alen == 0 {
            0
        } else {
            self.plugin_name.len() as u16 + 1
        };
        w.write_u16(alen);
        w.write_u16(tlen);
        w.write_bytes(&self.addr_bytes);
        if tlen > 0 {
            w.write_bytes(self.plugin_name.as_bytes());
            w.write_bytes(&[0u8]);
        }
    }

    fn decode(r: &mut Reader) -> Result<Self, FrameError> {
        let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
        let alen = r.read_u16()? as usize;
        let tlen = r.read_u16()? as usize;
        if (tlen > 0) != (alen > 0) {
            return Err(FrameError::InvalidMonitorAddress(
                "tlen>0 iff alen>0 violated",
            ));
        }
        let addr_bytes = r.read_bytes(alen)?.to_vec();
        let plugin_name = if tlen > 0 {
            let raw = r.read_bytes(tlen)?;
            if raw[tlen - 1] != 0 {
                return Err(FrameError::InvalidMonitorAddress(
                    "plugin_name not NUL-terminated",
                ));
            }
            String::from_utf8_lossy(&raw[..tlen - 1]).into_owned()
        } else {
            String::new()
        };
        Ok(Self {
            peer,
            addr_bytes,
            plugin_name,
        })
    }
}

/// A decoded daemon frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `START`: client to daemon.
    Start { options: u32, me: PeerId },
    /// `HELLO`: daemon to client, opaque blob. `hello_get_id` extracts the
    /// subject peer identity, stored as the blob's first
    /// [`transport_core::peer::PEER_ID_LEN`] bytes by convention.
    Hello { blob: Vec<u8> },
    /// `CONNECT`: daemon to client.
    Connect { peer: PeerId, quota_out: u32 },
    /// `DISCONNECT`: daemon to client.
    Disconnect { peer: PeerId },
    /// `SEND`: client to daemon.
    Send {
        deadline: LocalTime,
        peer: PeerId,
        inner: Vec<u8>,
    },
    /// `SEND_OK`: daemon to client.
    SendOk {
        success: bool,
        bytes_msg: u32,
        bytes_physical: u32,
        peer: PeerId,
    },
    /// `RECV`: daemon to client.
    Recv { peer: PeerId, inner: Vec<u8> },
    /// `SET_QUOTA`: daemon to client.
    SetQuota { peer: PeerId, quota_out: u32 },
    /// `REQUEST_CONNECT`: client to daemon.
    RequestConnect { peer: PeerId },
    /// `OFFER_HELLO`: client to daemon.
    OfferHello { blob: Vec<u8> },
    /// `TRAFFIC_METRIC`: client to daemon.
    TrafficMetric {
        peer: PeerId,
        properties: u32,
        delay_in: LocalDuration,
        delay_out: LocalDuration,
    },
    /// `MONITOR_PEER_REQUEST`: client to daemon.
    MonitorPeerRequest { one_shot: bool, peer: PeerId },
    /// `MONITOR_PEER_RESPONSE`: daemon to client.
    MonitorPeerResponse {
        address: MonitorAddress,
        state: PeerState,
        timeout: LocalTime,
    },
    /// `MONITOR_VALIDATION_REQUEST`: client to daemon.
    MonitorValidationRequest { one_shot: bool, peer: PeerId },
    /// `MONITOR_VALIDATION_RESPONSE`: daemon to client.
    MonitorValidationResponse {
        address: MonitorAddress,
        state: ValidationState,
        timeout: LocalTime,
    },
}

/// Error decoding a daemon frame; every variant is a protocol violation
/// per spec §7.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer ended before the declared fields were read.
    #[error("truncated frame")]
    Truncated,
    /// The declared `size` didn't match the bytes actually present.
    #[error("declared size does not match frame length")]
    SizeMismatch,
    /// The type code is not one this core recognizes.
    #[error("unknown frame type {0}")]
    UnknownType(u16),
    /// `RECV`'s embedded inner-length field didn't match the bytes that
    /// followed it.
    #[error("inner message size mismatch")]
    InnerSizeMismatch,
    /// A monitor response's address payload violated spec §4.10's invariants.
    #[error("invalid monitor address payload: {0}")]
    InvalidMonitorAddress(&'static str),
}

impl From<DecodeError> for FrameError {
    fn from(_: DecodeError) -> Self {
        FrameError::Truncated
    }
}

impl Frame {
    /// Encode this frame to wire bytes, including the `{size, type}` header.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Writer::new();
        let ty = match self {
            Frame::Start { options, me } => {
                body.write_u32(*options);
                body.write_bytes(me.as_bytes());
                FrameType::Start
            }
            Frame::Hello { blob } => {
                body.write_bytes(blob);
                FrameType::Hello
            }
            Frame::Connect { peer, quota_out } => {
                body.write_bytes(peer.as_bytes());
                body.write_u32(*quota_out);
                FrameType::Connect
            }
            Frame::Disconnect { peer } => {
                body.write_u32(0);
                body.write_bytes(peer.as_bytes());
                FrameType::Disconnect
            }
            Frame::Send {
                deadline,
                peer,
                inner,
            } => {
                body.write_u32(0);
                body.write_u64(deadline.as_micros());
                body.write_bytes(peer.as_bytes());
                body.write_bytes(inner);
                FrameType::Send
            }
            Frame::SendOk {
                success,
                bytes_msg,
                bytes_physical,
                peer,
            } => {
                body.write_u32(*success as u32);
                body.write_u32(*bytes_msg);
                body.write_u32(*bytes_physical);
                body.write_bytes(peer.as_bytes());
                FrameType::SendOk
            }
            Frame::Recv { peer, inner } => {
                body.write_bytes(peer.as_bytes());
                body.write_u16(inner.len() as u16);
                body.write_bytes(inner);
                FrameType::Recv
            }
            Frame::SetQuota { peer, quota_out } => {
                body.write_bytes(peer.as_bytes());
                body.write_u32(*quota_out);
                FrameType::SetQuota
            }
            Frame::RequestConnect { peer } => {
                body.write_u32(0);
                body.write_bytes(peer.as_bytes());
                FrameType::RequestConnect
            }
            Frame::OfferHello { blob } => {
                body.write_bytes(blob);
                FrameType::OfferHello
            }
            Frame::TrafficMetric {
                peer,
                properties,
                delay_in,
                delay_out,
            } => {
                body.write_u32(0);
                body.write_bytes(peer.as_bytes());
                body.write_u32(*properties);
                body.write_u64(delay_in.as_micros());
                body.write_u64(delay_out.as_micros());
                FrameType::TrafficMetric
            }
            Frame::MonitorPeerRequest { one_shot, peer } => {
                body.write_u32(*one_shot as u32);
                body.write_bytes(peer.as_bytes());
                FrameType::MonitorPeerRequest
            }
            Frame::MonitorPeerResponse {
                address,
                state,
                timeout,
            } => {
                address.encode(&mut body);
                body.write_u32(*state as u32);
                body.write_u64(timeout.as_micros());
                FrameType::MonitorPeerResponse
            }
            Frame::MonitorValidationRequest { one_shot, peer } => {
                body.write_u32(*one_shot as u32);
                body.write_bytes(peer.as_bytes());
                FrameType::MonitorValidationRequest
            }
            Frame::MonitorValidationResponse {
                address,
                state,
                timeout,
            } => {
                address.encode(&mut body);
                body.write_u32(*state as u32);
                body.write_u64(timeout.as_micros());
                FrameType::MonitorValidationResponse
            }
        };

        let body = body.into_vec();
        let size = HEADER_LEN + body.len();
        let mut out = Writer::new();
        out.write_u16(size as u16);
        out.write_u16(ty as u16);
        out.write_bytes(&body);
        out.into_vec()
    }

    /// Decode a frame from wire bytes, including the `{size, type}` header.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let mut r = Reader::new(buf);
        let size = r.read_u16()? as usize;
        if size != buf.len() {
            return Err(FrameError::SizeMismatch);
        }
        let ty = r.read_u16()?;
        let ty = FrameType::from_u16(ty).ok_or(FrameError::UnknownType(ty))?;

        Ok(match ty {
            FrameType::Start => {
                let options = r.read_u32()?;
                let me = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                Frame::Start { options, me }
            }
            FrameType::Hello => Frame::Hello {
                blob: r.read_rest().to_vec(),
            },
            FrameType::Connect => {
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                let quota_out = r.read_u32()?;
                Frame::Connect { peer, quota_out }
            }
            FrameType::Disconnect => {
                let _reserved = r.read_u32()?;
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                Frame::Disconnect { peer }
            }
            FrameType::Send => {
                let _reserved = r.read_u32()?;
                let deadline = LocalTime::from_micros(r.read_u64()?);
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                let inner = r.read_rest().to_vec();
                Frame::Send {
                    deadline,
                    peer,
                    inner,
                }
            }
            FrameType::SendOk => {
                let success = r.read_u32()? != 0;
                let bytes_msg = r.read_u32()?;
                let bytes_physical = r.read_u32()?;
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                Frame::SendOk {
                    success,
                    bytes_msg,
                    bytes_physical,
                    peer,
                }
            }
            FrameType::Recv => {
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                let inner_len = r.read_u16()? as usize;
                let inner = r.read_rest().to_vec();
                if inner.len() != inner_len {
                    return Err(FrameError::InnerSizeMismatch);
                }
                Frame::Recv { peer, inner }
            }
            FrameType::SetQuota => {
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                let quota_out = r.read_u32()?;
                Frame::SetQuota { peer, quota_out }
            }
            FrameType::RequestConnect => {
                let _reserved = r.read_u32()?;
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                Frame::RequestConnect { peer }
            }
            FrameType::OfferHello => Frame::OfferHello {
                blob: r.read_rest().to_vec(),
            },
            FrameType::TrafficMetric => {
                let _reserved = r.read_u32()?;
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                let properties = r.read_u32()?;
                let delay_in = LocalDuration::from_micros(r.read_u64()?);
                let delay_out = LocalDuration::from_micros(r.read_u64()?);
                Frame::TrafficMetric {
                    peer,
                    properties,
                    delay_in,
                    delay_out,
                }
            }
            FrameType::MonitorPeerRequest => {
                let one_shot = r.read_u32()? != 0;
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                Frame::MonitorPeerRequest { one_shot, peer }
            }
            FrameType::MonitorPeerResponse => {
                let address = MonitorAddress::decode(&mut r)?;
                let state = PeerState::from_u32(r.read_u32()?)
                    .ok_or(FrameError::InvalidMonitorAddress("unknown peer state"))?;
                let timeout = LocalTime::from_micros(r.read_u64()?);
                Frame::MonitorPeerResponse {
                    address,
                    state,
                    timeout,
                }
            }
            FrameType::MonitorValidationRequest => {
                let one_shot = r.read_u32()? != 0;
                let peer = PeerId::new(r.read_array::<PEER_ID_LEN>()?);
                Frame::MonitorValidationRequest { one_shot, peer }
            }
            FrameType::MonitorValidationResponse => {
                let address = MonitorAddress::decode(&mut r)?;
                let state = ValidationState::from_u32(r.read_u32()?).ok_or(
                    FrameError::InvalidMonitorAddress("unknown validation state"),
                )?;
                let timeout = LocalTime::from_micros(r.read_u64()?);
                Frame::MonitorValidationResponse {
                    address,
                    state,
                    timeout,
                }
            }
        })
    }
}

/// Parse a peer identity out of a `HELLO` blob, per spec §3's
/// "`HELLO`: ... parseable via hello-get-id" remark. By convention the
/// blob's first bytes are the subject peer identity.
pub fn hello_get_id(blob: &[u8]) -> Option<PeerId> {
    if blob.len() < PEER_ID_LEN {
        return None;
    }
    let mut bytes = [0u8; PEER_ID_LEN];
    bytes.copy_from_slice(&blob[..PEER_ID_LEN]);
    Some(PeerId::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(byte: u8) -> PeerId {
        PeerId::new([byte; PEER_ID_LEN])
    }

    #[test]
    fn roundtrip_start() {
        let f = Frame::Start {
            options: start_options::DELIVER_INBOUND,
            me: pid(1),
        };
        let bytes = f.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), f);
    }

    #[test]
    fn roundtrip_send_and_recv() {
        let send = Frame::Send {
            deadline: LocalTime::from_micros(12345),
            peer: pid(2),
            inner: vec![1, 2, 3, 4, 5],
        };
        let bytes = send.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), send);

        let recv = Frame::Recv {
            peer: pid(3),
            inner: vec![9, 9, 9],
        };
        let bytes = recv.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), recv);
    }

    #[test]
    fn recv_inner_size_mismatch_is_rejected() {
        let recv = Frame::Recv {
            peer: pid(4),
            inner: vec![1, 2, 3],
        };
        let mut bytes = recv.encode();
        // Corrupt the embedded inner-length field (right after the peer id)
        // without touching the outer {size, type} header, so `SizeMismatch`
        // doesn't fire first and the embedded field is genuinely checked.
        let inner_len_at = HEADER_LEN + PEER_ID_LEN;
        bytes[inner_len_at..inner_len_at + 2].copy_from_slice(&4u16.to_be_bytes());
        assert_eq!(Frame::decode(&bytes), Err(FrameError::InnerSizeMismatch));
    }

    #[test]
    fn monitor_address_invariants_enforced() {
        let good = MonitorAddress {
            peer: pid(5),
            addr_bytes: vec![1, 2, 3],
            plugin_name: "tcp".to_string(),
        };
        let frame = Frame::MonitorPeerResponse {
            address: good.clone(),
            state: PeerState::Connected,
            timeout: LocalTime::from_micros(1),
        };
        let bytes = frame.encode();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
        assert!(PeerState::Connected.is_connected());
        assert!(!PeerState::NotConnected.is_connected());
    }

    #[test]
    fn hello_get_id_reads_leading_bytes() {
        let mut blob = pid(7).as_bytes().to_vec();
        blob.extend_from_slice(b"signature-bytes");
        assert_eq!(hello_get_id(&blob), Some(pid(7)));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut w = Writer::new();
        w.write_u16(5);
        w.write_u16(9999);
        w.write_bytes(&[0u8]);
        let bytes = w.into_vec();
        assert_eq!(
            Frame::decode(&bytes),
            Err(FrameError::UnknownType(9999))
        );
    }
}
