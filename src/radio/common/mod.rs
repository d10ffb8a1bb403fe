use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ChecksumError, FrameError, ProtocolError};

use super::profile::ProtocolMode;

#[cfg(test)]
use proptest_derive::Arbitrary;

pub mod payload;

pub use payload::{dispatch, Direction, Payload, PayloadKind};

pub const OPEN_MARKER: u8 = 0x02;
pub const CLOSE_MARKER: u8 = 0x03;
pub const RESPONSE_BIT: u16 = 0x8000;

/// Open marker, type code, length, CRC and close marker.
const ENVELOPE_LEN: usize = 7;

/// A decoded value together with any checksum mismatches seen while decoding
/// it. Checksums are reported rather than enforced at the codec level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checked<T> {
    pub value: T,
    pub warnings: Vec<ChecksumError>,
}

impl<T> Checked<T> {
    pub fn new(value: T) -> Self {
        Checked {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: Option<ChecksumError>) -> Self {
        self.warnings.extend(warning);
        self
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Checked<U> {
        Checked {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Decode the inner value further, keeping the outer warnings ahead of
    /// the inner ones.
    pub fn and_then<U, E>(
        self,
        f: impl FnOnce(T) -> Result<Checked<U>, E>,
    ) -> Result<Checked<U>, E> {
        let mut inner = f(self.value)?;
        let mut warnings = self.warnings;
        warnings.append(&mut inner.warnings);

        Ok(Checked {
            value: inner.value,
            warnings,
        })
    }

    pub fn strict(self) -> Result<T, ChecksumError> {
        match self.warnings.into_iter().next() {
            Some(w) => Err(w),
            None => Ok(self.value),
        }
    }
}

/// The typed request/response envelope nested inside every frame.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(Arbitrary))]
pub struct Request {
    pub type_code: u16,
    pub body: Vec<u8>,
}

/// Checksum over the type code, length and body of a packed request.
pub fn crc8(region: &[u8]) -> u8 {
    let sum = region.iter().fold(0u8, |acc, &x| acc.wrapping_add(x));

    (!sum).wrapping_add(0x33)
}

impl Request {
    pub fn new(type_code: u16, body: Vec<u8>) -> Self {
        Request { type_code, body }
    }

    pub fn from_payload(payload: &Payload) -> Result<Self, ProtocolError> {
        Ok(Request {
            type_code: payload.type_code(),
            body: payload.pack()?,
        })
    }

    pub fn direction(&self) -> Direction {
        Direction::of(self.type_code)
    }

    pub fn payload(&self, mode: ProtocolMode) -> Result<Payload, ProtocolError> {
        Payload::unpack(self.type_code, mode, &self.body)
    }

    pub fn pack(&self) -> Result<Vec<u8>, ProtocolError> {
        let len = u16::try_from(self.body.len())
            .map_err(|_| ProtocolError::PayloadTooLarge(self.body.len()))?;
        let mut ret = Vec::with_capacity(self.body.len() + ENVELOPE_LEN);

        ret.write_u8(OPEN_MARKER)?;
        ret.write_u16::<LittleEndian>(self.type_code)?;
        ret.write_u16::<LittleEndian>(len)?;
        ret.write_all(&self.body)?;

        let crc = crc8(&ret[1..]);

        ret.push(crc);
        ret.push(CLOSE_MARKER);

        Ok(ret)
    }

    pub fn unpack(data: &[u8]) -> Result<Checked<Self>, FrameError> {
        if data.len() < ENVELOPE_LEN {
            return Err(FrameError::Truncated);
        }

        let mut cursor = Cursor::new(data);

        let open = cursor.read_u8()?;

        if open != OPEN_MARKER {
            return Err(FrameError::BadMarker {
                offset: 0,
                expected: OPEN_MARKER,
                found: open,
            });
        }

        let close = data[data.len() - 1];

        if close != CLOSE_MARKER {
            return Err(FrameError::BadMarker {
                offset: data.len() - 1,
                expected: CLOSE_MARKER,
                found: close,
            });
        }

        let type_code = cursor.read_u16::<LittleEndian>()?;
        let len = cursor.read_u16::<LittleEndian>()? as usize;

        if len != data.len() - ENVELOPE_LEN {
            return Err(FrameError::LengthMismatch {
                declared: len,
                actual: data.len() - ENVELOPE_LEN,
            });
        }

        let mut body = vec![0; len];

        cursor.read_exact(&mut body)?;

        let declared = cursor.read_u8()?;
        let computed = crc8(&data[1..data.len() - 2]);

        Ok(Checked::new(Request { type_code, body }).with_warning(
            (declared != computed).then_some(ChecksumError::Crc8Mismatch { declared, computed }),
        ))
    }
}
