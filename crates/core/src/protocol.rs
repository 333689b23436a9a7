// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Wire format of the Ironic PPC socket.
//!
//! Every request starts with a 12-byte header of three little-endian words:
//! `[opcode][addr][pad]`. Reads carry nothing else and are answered with
//! exactly `width` payload bytes. Writes append `width` payload bytes and are
//! answered with the two bytes `"OK"`. There is no length prefix, no request
//! id and no delimiter, so both sides frame purely by opcode.

use std::fmt;

pub const HEADER_LEN: usize = 12;
pub const ACK: [u8; 2] = *b"OK";
pub const ACK_LEN: usize = ACK.len();

/// Largest request the bridge emits (32-bit write).
pub const MAX_REQUEST_LEN: usize = HEADER_LEN + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Read = 1,
    Write = 2,
    Message = 3,
    Ack = 4,
    MessageNoReturn = 5,
    PpcRead8 = 6,
    PpcRead16 = 7,
    PpcRead32 = 8,
    PpcWrite8 = 9,
    PpcWrite16 = 10,
    PpcWrite32 = 11,
    Quit = 255,
}

impl Opcode {
    /// Opcodes 6..=11, the only ones the bridge ever sends.
    pub fn is_bridge_opcode(self) -> bool {
        matches!(
            self,
            Opcode::PpcRead8
                | Opcode::PpcRead16
                | Opcode::PpcRead32
                | Opcode::PpcWrite8
                | Opcode::PpcWrite16
                | Opcode::PpcWrite32
        )
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Opcode::PpcWrite8 | Opcode::PpcWrite16 | Opcode::PpcWrite32
        )
    }

    /// Access width of a bridge opcode.
    pub fn width(self) -> Option<AccessWidth> {
        match self {
            Opcode::PpcRead8 | Opcode::PpcWrite8 => Some(AccessWidth::Byte),
            Opcode::PpcRead16 | Opcode::PpcWrite16 => Some(AccessWidth::Half),
            Opcode::PpcRead32 | Opcode::PpcWrite32 => Some(AccessWidth::Word),
            _ => None,
        }
    }
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Opcode::Read,
            2 => Opcode::Write,
            3 => Opcode::Message,
            4 => Opcode::Ack,
            5 => Opcode::MessageNoReturn,
            6 => Opcode::PpcRead8,
            7 => Opcode::PpcRead16,
            8 => Opcode::PpcRead32,
            9 => Opcode::PpcWrite8,
            10 => Opcode::PpcWrite16,
            11 => Opcode::PpcWrite32,
            255 => Opcode::Quit,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessWidth {
    Byte,
    Half,
    Word,
}

impl AccessWidth {
    pub const fn bytes(self) -> usize {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Half => 2,
            AccessWidth::Word => 4,
        }
    }

    pub const fn read_opcode(self) -> Opcode {
        match self {
            AccessWidth::Byte => Opcode::PpcRead8,
            AccessWidth::Half => Opcode::PpcRead16,
            AccessWidth::Word => Opcode::PpcRead32,
        }
    }

    pub const fn write_opcode(self) -> Opcode {
        match self {
            AccessWidth::Byte => Opcode::PpcWrite8,
            AccessWidth::Half => Opcode::PpcWrite16,
            AccessWidth::Word => Opcode::PpcWrite32,
        }
    }

    /// Total request length for a write of this width (13, 14 or 16 bytes).
    pub const fn write_request_len(self) -> usize {
        HEADER_LEN + self.bytes()
    }

    /// Mask selecting the low `bytes()` bytes of a value.
    pub const fn mask(self) -> u64 {
        match self {
            AccessWidth::Byte => 0xff,
            AccessWidth::Half => 0xffff,
            AccessWidth::Word => 0xffff_ffff,
        }
    }
}

impl TryFrom<usize> for AccessWidth {
    type Error = usize;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AccessWidth::Byte),
            2 => Ok(AccessWidth::Half),
            4 => Ok(AccessWidth::Word),
            other => Err(other),
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}

fn put_header(buf: &mut [u8], opcode: Opcode, addr: u32) {
    buf[0..4].copy_from_slice(&(opcode as u32).to_le_bytes());
    buf[4..8].copy_from_slice(&addr.to_le_bytes());
    buf[8..12].copy_from_slice(&0u32.to_le_bytes());
}

pub fn encode_read(width: AccessWidth, addr: u32) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    put_header(&mut buf, width.read_opcode(), addr);
    buf
}

/// A write request, sized exactly to its opcode.
#[derive(Clone, Copy)]
pub struct WriteRequest {
    buf: [u8; MAX_REQUEST_LEN],
    len: usize,
}

impl WriteRequest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_bytes()).finish()
    }
}

/// Build a write request. `payload` holds the value's bytes exactly as they
/// must appear on the wire and must be `width.bytes()` long.
pub fn encode_write(width: AccessWidth, addr: u32, payload: &[u8]) -> WriteRequest {
    debug_assert_eq!(payload.len(), width.bytes());
    let mut buf = [0u8; MAX_REQUEST_LEN];
    put_header(&mut buf, width.write_opcode(), addr);
    let len = width.write_request_len();
    buf[HEADER_LEN..len].copy_from_slice(payload);
    WriteRequest { buf, len }
}

/// Decoded request header, used by remote stubs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: Result<Opcode, u32>,
    pub addr: u32,
    pub pad: u32,
}

impl RequestHeader {
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Self {
            opcode: Opcode::try_from(word(0)),
            addr: word(4),
            pad: word(8),
        }
    }

    /// Number of payload bytes that follow this header.
    pub fn payload_len(&self) -> usize {
        match self.opcode {
            Ok(op) if op.is_write() => op.width().map(AccessWidth::bytes).unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_layout() {
        let req = encode_read(AccessWidth::Word, 0x0d80_6740);
        assert_eq!(
            req,
            [8, 0, 0, 0, 0x40, 0x67, 0x80, 0x0d, 0, 0, 0, 0],
            "opcode and address are little-endian words followed by zero padding"
        );
    }

    #[test]
    fn test_write_request_lengths() {
        assert_eq!(encode_write(AccessWidth::Byte, 0, &[1]).as_bytes().len(), 13);
        assert_eq!(encode_write(AccessWidth::Half, 0, &[1, 2]).as_bytes().len(), 14);
        assert_eq!(
            encode_write(AccessWidth::Word, 0, &[1, 2, 3, 4]).as_bytes().len(),
            16
        );
    }

    #[test]
    fn test_write8_layout() {
        let req = encode_write(AccessWidth::Byte, 0x0c00_0010, &[0x42]);
        assert_eq!(
            req.as_bytes(),
            &[9, 0, 0, 0, 0x10, 0x00, 0x00, 0x0c, 0, 0, 0, 0, 0x42]
        );
    }

    #[test]
    fn test_header_parse() {
        let req = encode_write(AccessWidth::Half, 0x1234_5678, &[0xaa, 0xbb]);
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&req.as_bytes()[..HEADER_LEN]);
        let parsed = RequestHeader::parse(&header);
        assert_eq!(parsed.opcode, Ok(Opcode::PpcWrite16));
        assert_eq!(parsed.addr, 0x1234_5678);
        assert_eq!(parsed.pad, 0);
        assert_eq!(parsed.payload_len(), 2);
    }

    #[test]
    fn test_opcode_classification() {
        assert!(!Opcode::Read.is_bridge_opcode());
        assert!(!Opcode::Quit.is_bridge_opcode());
        for raw in 6..=11u32 {
            assert!(Opcode::try_from(raw).unwrap().is_bridge_opcode());
        }
        assert_eq!(Opcode::try_from(12), Err(12));
        assert_eq!(Opcode::try_from(255), Ok(Opcode::Quit));
    }

    #[test]
    fn test_width_from_size() {
        assert_eq!(AccessWidth::try_from(1), Ok(AccessWidth::Byte));
        assert_eq!(AccessWidth::try_from(2), Ok(AccessWidth::Half));
        assert_eq!(AccessWidth::try_from(4), Ok(AccessWidth::Word));
        assert_eq!(AccessWidth::try_from(8), Err(8));
        assert_eq!(AccessWidth::try_from(3), Err(3));
    }
}
