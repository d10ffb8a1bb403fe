use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;

use crate::{
    error::{ChecksumError, FrameError, Result},
    radio::common::{payload::expect_constant, Checked},
};

#[cfg(test)]
use proptest_derive::Arbitrary;

pub const START_MARKER: u8 = 0x7e;
pub const HDR_LEN: usize = 12;

/// Index of the little-endian CRC word within the header.
const CRC_WORD: usize = 5;

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive)]
#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum FrameKind {
    Command = 0x00,
    Request = 0x01,
    Response = 0x04,
}

pub mod flags {
    pub const DEFAULT: u8 = 0x00;
    pub const CONNECT: u8 = 0xfe;
    pub const CONNECT_ACK: u8 = 0xfd;
}

pub mod entity {
    pub const RADIO: u8 = 0x10;
    pub const HOST: u8 = 0x20;
}

/// Outer transport frame used while the radio is in CPS mode.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(Arbitrary))]
pub struct Frame {
    pub kind: FrameKind,
    pub flags: u8,
    pub src: u8,
    pub dest: u8,
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, flags: u8, seq: u16, payload: Vec<u8>) -> Self {
        Frame {
            kind,
            flags,
            src: entity::HOST,
            dest: entity::RADIO,
            seq,
            payload,
        }
    }

    pub fn connect(seq: u16) -> Self {
        Frame::new(FrameKind::Command, flags::CONNECT, seq, Vec::new())
    }

    pub fn request(seq: u16, payload: Vec<u8>) -> Self {
        Frame::new(FrameKind::Request, flags::DEFAULT, seq, payload)
    }

    pub fn is_connect_ack(&self) -> bool {
        self.kind == FrameKind::Response && self.flags == flags::CONNECT_ACK
    }

    /// A response from the radio to the host carrying a request envelope.
    pub fn is_radio_response(&self) -> bool {
        self.kind == FrameKind::Response
            && self.flags == flags::DEFAULT
            && self.src == entity::RADIO
            && self.dest == entity::HOST
    }

    pub fn declared_length(&self) -> usize {
        HDR_LEN + self.payload.len()
    }

    fn pack_hdr(&self, crc: u16, v: &mut Vec<u8>) -> std::result::Result<(), FrameError> {
        let total = u16::try_from(self.declared_length())
            .map_err(|_| FrameError::Oversized(self.payload.len()))?;

        v.write_u8(START_MARKER)?;
        v.write_u8(self.kind as u8)?;
        v.write_u8(0x0)?;
        v.write_u8(self.flags)?;
        v.write_u8(self.src)?;
        v.write_u8(self.dest)?;
        v.write_u16::<BigEndian>(self.seq)?;
        v.write_u16::<BigEndian>(total)?;
        v.write_u16::<LittleEndian>(crc)?;
        v.write_all(&self.payload)?;

        Ok(())
    }

    pub fn pack(&self) -> std::result::Result<Vec<u8>, FrameError> {
        let mut v = Vec::with_capacity(self.declared_length());

        self.pack_hdr(0, &mut v)?;

        let crc = Self::crc(&v);

        v.clear();

        self.pack_hdr(crc, &mut v)?;

        Ok(v)
    }

    /// Decode a frame. A CRC mismatch is reported in the returned warnings,
    /// it does not fail the decode.
    pub fn unpack(data: &[u8]) -> Result<Checked<Frame>> {
        if data.len() < HDR_LEN {
            return Err(FrameError::Truncated.into());
        }

        let mut cursor = Cursor::new(data);

        let marker = cursor.read_u8().map_err(FrameError::from)?;

        if marker != START_MARKER {
            return Err(FrameError::BadMarker {
                offset: 0,
                expected: START_MARKER,
                found: marker,
            }
            .into());
        }

        let kind = cursor.read_u8().map_err(FrameError::from)?;
        let kind = FrameKind::try_from(kind).map_err(|_| FrameError::UnknownKind(kind))?;
        let reserved = cursor.read_u8().map_err(FrameError::from)?;

        expect_constant("frame reserved byte", &[0x0], &[reserved])?;

        let mut hdr = [0u8; 3];
        cursor.read_exact(&mut hdr).map_err(FrameError::from)?;
        let [flags, src, dest] = hdr;

        let seq = cursor.read_u16::<BigEndian>().map_err(FrameError::from)?;
        let total_len = cursor.read_u16::<BigEndian>().map_err(FrameError::from)? as usize;
        let declared = cursor.read_u16::<LittleEndian>().map_err(FrameError::from)?;

        if total_len != data.len() {
            return Err(FrameError::LengthMismatch {
                declared: total_len,
                actual: data.len(),
            }
            .into());
        }

        let computed = Self::crc(data);

        let frame = Frame {
            kind,
            flags,
            src,
            dest,
            seq,
            payload: data[HDR_LEN..].to_vec(),
        };

        Ok(Checked::new(frame).with_warning(
            (declared != computed).then_some(ChecksumError::Crc16Mismatch { declared, computed }),
        ))
    }

    /// Ones'-complement sum of the little-endian words of a packed frame,
    /// skipping the CRC word itself.
    pub fn crc(data: &[u8]) -> u16 {
        let mut n: u32 = data
            .chunks(2)
            .enumerate()
            .filter(|(i, _)| *i != CRC_WORD)
            .map(|(_, w)| match *w {
                [lo, hi] => u16::from_le_bytes([lo, hi]) as u32,
                [b] => b as u32,
                _ => 0,
            })
            .sum();

        while n > 0xffff {
            n = (n >> 16) + (n & 0xffff);
        }

        (n as u16) ^ 0xffff
    }

    /// Total packet length announced by a (possibly partial) frame header.
    pub fn packet_length(partial: &[u8]) -> Option<usize> {
        partial
            .get(8..10)
            .map(|x| u16::from_be_bytes([x[0], x[1]]) as usize)
    }
}
