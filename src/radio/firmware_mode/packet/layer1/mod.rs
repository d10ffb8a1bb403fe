use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    error::{ChecksumError, FrameError},
    radio::common::Checked,
};

#[cfg(test)]
use proptest_derive::Arbitrary;

pub const HDR_LEN: usize = 4;

/// Outer frame used while the radio is in firmware (bootloader) mode.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(Arbitrary))]
pub struct FwFrame {
    pub payload: Vec<u8>,
}

impl FwFrame {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn declared_length(&self) -> usize {
        HDR_LEN + self.payload.len()
    }

    fn pack_hdr(&self, crc: u16, v: &mut Vec<u8>) -> Result<(), FrameError> {
        let total = u16::try_from(self.declared_length())
            .map_err(|_| FrameError::Oversized(self.payload.len()))?;

        v.write_u16::<LittleEndian>(total)?;
        v.write_u16::<LittleEndian>(crc)?;
        v.write_all(&self.payload)?;

        Ok(())
    }

    pub fn pack(&self) -> Result<Vec<u8>, FrameError> {
        let mut v = Vec::with_capacity(self.declared_length());

        self.pack_hdr(0, &mut v)?;

        let crc = Self::crc(&v);

        v.clear();

        self.pack_hdr(crc, &mut v)?;

        Ok(v)
    }

    pub fn unpack(data: &[u8]) -> Result<Checked<Self>, FrameError> {
        let mut cursor = std::io::Cursor::new(data);

        let total_len = cursor.read_u16::<LittleEndian>()? as usize;
        let declared = cursor.read_u16::<LittleEndian>()?;

        if total_len != data.len() {
            return Err(FrameError::LengthMismatch {
                declared: total_len,
                actual: data.len(),
            });
        }

        let computed = Self::crc(data);

        Ok(Checked::new(FwFrame {
            payload: data[HDR_LEN..].to_vec(),
        })
        .with_warning(
            (declared != computed).then_some(ChecksumError::Crc16Mismatch { declared, computed }),
        ))
    }

    /// Checksum of a packed frame. Only the length of the header takes part;
    /// the CRC slot itself is skipped.
    pub fn crc(frame: &[u8]) -> u16 {
        let xform = |x: u32| (!x) & 0xffff;

        let payload = frame.get(HDR_LEN..).unwrap_or_default();

        let mut n: u32 = xform(frame.len() as u32);

        for w in payload.chunks(2) {
            n += match *w {
                [lo, hi] => xform(u16::from_le_bytes([lo, hi]) as u32),
                [b] => xform((b as u32) << 8),
                _ => 0,
            };
        }

        (n & 0xffff) as u16
    }

    pub fn packet_length(partial: &[u8]) -> Option<usize> {
        partial
            .get(0..2)
            .map(|x| u16::from_le_bytes([x[0], x[1]]) as usize)
    }
}
