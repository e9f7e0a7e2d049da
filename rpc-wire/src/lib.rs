// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The framed wire protocol shared by the Caller Channel and the Provider
//! Server: `[ header_len : u32 ][ header_bytes ][ arg_bytes ]`.
//!
//! `header_len` is a raw, unframed integer; `header_bytes` is a serialized
//! [`FrameHeader`] naming the service, the method, and the length of the
//! argument payload that immediately follows it.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::trace;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Safety cap on `header_len` and `arg_size`: frames declaring a larger size
/// are rejected before any bytes are emitted or read further.
pub const MAX_SEGMENT_SIZE: u32 = 1 << 24;

/// Byte order used to write/read the raw `header_len` prefix.
///
/// The source this protocol was distilled from wrote a native-order integer,
/// which is a portability hazard across architectures. This codec defaults
/// to little-endian and takes the order explicitly so a deployment can pick
/// big-endian instead, but it never infers the order from the running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

#[derive(Debug)]
pub enum WireError {
    /// `header_len` or `arg_size` exceeded [`MAX_SEGMENT_SIZE`].
    CapExceeded { what: &'static str, value: u32 },
    /// The header could not be parsed, or a size field didn't fit a `u32`.
    MalformedFrame(String),
    Io(std::io::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapExceeded { what, value } => {
                write!(f, "{what} of {value} exceeds cap of {MAX_SEGMENT_SIZE}")
            }
            Self::MalformedFrame(msg) => write!(f, "malformed frame: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// The structured header record carried inside `header_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub service_name: String,
    pub method_name: String,
    pub arg_size: u32,
}

/// Encode a complete frame for `(service_name, method_name, arg_bytes)`.
///
/// Fails without emitting any bytes if either the header or the argument
/// payload would exceed [`MAX_SEGMENT_SIZE`].
pub fn encode_frame(
    service_name: &str,
    method_name: &str,
    arg_bytes: &[u8],
    endianness: Endianness,
) -> Result<Vec<u8>, WireError> {
    let arg_size = u32::try_from(arg_bytes.len()).map_err(|_| WireError::CapExceeded {
        what: "arg_size",
        value: u32::MAX,
    })?;
    if arg_size > MAX_SEGMENT_SIZE {
        return Err(WireError::CapExceeded {
            what: "arg_size",
            value: arg_size,
        });
    }

    let header = FrameHeader {
        service_name: service_name.to_string(),
        method_name: method_name.to_string(),
        arg_size,
    };
    let header_bytes =
        bincode::serialize(&header).map_err(|e| WireError::MalformedFrame(e.to_string()))?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| WireError::CapExceeded {
        what: "header_len",
        value: u32::MAX,
    })?;
    if header_len > MAX_SEGMENT_SIZE {
        return Err(WireError::CapExceeded {
            what: "header_len",
            value: header_len,
        });
    }

    let mut buf = Vec::with_capacity(4 + header_bytes.len() + arg_bytes.len());
    buf.extend_from_slice(&[0u8; 4]);
    write_u32(&mut buf[0..4], header_len, endianness);
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(arg_bytes);

    Ok(buf)
}

fn write_u32(dst: &mut [u8], value: u32, endianness: Endianness) {
    match endianness {
        Endianness::Little => LittleEndian::write_u32(dst, value),
        Endianness::Big => BigEndian::write_u32(dst, value),
    }
}

fn read_u32(src: &[u8], endianness: Endianness) -> u32 {
    match endianness {
        Endianness::Little => LittleEndian::read_u32(src),
        Endianness::Big => BigEndian::read_u32(src),
    }
}

/// Result of attempting to decode a frame out of a buffer that may not yet
/// hold a complete frame.
pub enum DecodeOutcome<'a> {
    /// Fewer than `4 + header_len + arg_size` bytes are available.
    NeedMore,
    /// A complete frame was found. `consumed` is the number of leading
    /// bytes of `buf` that made up this frame.
    Frame {
        service_name: String,
        method_name: String,
        arg_bytes: &'a [u8],
        consumed: usize,
    },
}

/// Decode one frame out of the front of `buf`, if a complete one is present.
///
/// Decoding is stateless: the caller owns buffering of partial data across
/// calls (this matters for TCP, where reads can return arbitrarily small
/// chunks).
pub fn decode_frame(buf: &[u8], endianness: Endianness) -> Result<DecodeOutcome<'_>, WireError> {
    if buf.len() < 4 {
        return Ok(DecodeOutcome::NeedMore);
    }

    let header_len = read_u32(&buf[0..4], endianness);
    if header_len > MAX_SEGMENT_SIZE {
        return Err(WireError::CapExceeded {
            what: "header_len",
            value: header_len,
        });
    }

    let header_end = 4 + header_len as usize;
    if buf.len() < header_end {
        return Ok(DecodeOutcome::NeedMore);
    }

    let header: FrameHeader = bincode::deserialize(&buf[4..header_end])
        .map_err(|e| WireError::MalformedFrame(e.to_string()))?;

    if header.arg_size > MAX_SEGMENT_SIZE {
        return Err(WireError::CapExceeded {
            what: "arg_size",
            value: header.arg_size,
        });
    }

    let frame_end = header_end + header.arg_size as usize;
    if buf.len() < frame_end {
        return Ok(DecodeOutcome::NeedMore);
    }

    trace!(
        "decoded frame for {}/{}: {} header bytes, {} arg bytes",
        header.service_name,
        header.method_name,
        header_len,
        header.arg_size
    );

    Ok(DecodeOutcome::Frame {
        service_name: header.service_name,
        method_name: header.method_name,
        arg_bytes: &buf[header_end..frame_end],
        consumed: frame_end,
    })
}

/// The serialize/parse surface a code generator is expected to produce for
/// request and response message types (spec §6.2). Blanket-implemented for
/// any serde-derived, `Default` type so hand-written stand-ins for
/// generated stubs work without an actual schema compiler.
pub trait RpcPayload: Default {
    fn serialize_to_bytes(&self) -> Result<Vec<u8>, WireError>;
    fn parse_from_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError>;
}

impl<T> RpcPayload for T
where
    T: Serialize + DeserializeOwned + Default,
{
    fn serialize_to_bytes(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(|e| WireError::MalformedFrame(e.to_string()))
    }

    fn parse_from_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        *self = bincode::deserialize(bytes).map_err(|e| WireError::MalformedFrame(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct LoginRequest {
        name: String,
        pwd: String,
    }

    fn roundtrip(arg: &[u8], endianness: Endianness) {
        let frame = encode_frame("UserService", "Login", arg, endianness).unwrap();
        match decode_frame(&frame, endianness).unwrap() {
            DecodeOutcome::Frame {
                service_name,
                method_name,
                arg_bytes,
                consumed,
            } => {
                assert_eq!(service_name, "UserService");
                assert_eq!(method_name, "Login");
                assert_eq!(arg_bytes, arg);
                assert_eq!(consumed, frame.len());
            }
            DecodeOutcome::NeedMore => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn request_roundtrips_little_endian() {
        let req = LoginRequest {
            name: "zhangsan".into(),
            pwd: "123456".into(),
        };
        roundtrip(&req.serialize_to_bytes().unwrap(), Endianness::Little);
    }

    #[test]
    fn request_roundtrips_big_endian() {
        let req = LoginRequest {
            name: "zhangsan".into(),
            pwd: "123456".into(),
        };
        roundtrip(&req.serialize_to_bytes().unwrap(), Endianness::Big);
    }

    #[test]
    fn zero_length_payload_roundtrips() {
        roundtrip(&[], Endianness::Little);
    }

    #[test]
    fn max_cap_payload_roundtrips() {
        let arg = vec![0u8; MAX_SEGMENT_SIZE as usize];
        roundtrip(&arg, Endianness::Little);
    }

    #[test]
    fn over_cap_payload_is_rejected() {
        let arg = vec![0u8; MAX_SEGMENT_SIZE as usize + 1];
        let err = encode_frame("S", "M", &arg, Endianness::Little).unwrap_err();
        assert!(matches!(err, WireError::CapExceeded { what: "arg_size", .. }));
    }

    #[test]
    fn partial_bytes_yield_need_more() {
        let req = LoginRequest {
            name: "a".into(),
            pwd: "b".into(),
        };
        let frame = encode_frame(
            "UserService",
            "Login",
            &req.serialize_to_bytes().unwrap(),
            Endianness::Little,
        )
        .unwrap();

        for split in 0..frame.len() {
            match decode_frame(&frame[..split], Endianness::Little).unwrap() {
                DecodeOutcome::NeedMore => {}
                DecodeOutcome::Frame { .. } => panic!("should not decode from {split} bytes"),
            }
        }

        match decode_frame(&frame, Endianness::Little).unwrap() {
            DecodeOutcome::Frame { consumed, .. } => assert_eq!(consumed, frame.len()),
            DecodeOutcome::NeedMore => panic!("full frame should decode"),
        }
    }

    #[test]
    fn malformed_header_length_is_a_protocol_error() {
        let mut buf = vec![0u8; 8];
        LittleEndian::write_u32(&mut buf[0..4], 0xFFFF_FFFF);
        let err = decode_frame(&buf, Endianness::Little).unwrap_err();
        assert!(matches!(err, WireError::CapExceeded { .. }));
    }
}
