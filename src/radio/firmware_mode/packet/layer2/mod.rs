use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;

use crate::{
    error::ProtocolError,
    radio::common::payload::{expect_end, len16, rest, Payload},
};

#[cfg(test)]
use proptest_derive::Arbitrary;

pub const FW_READ_MEMORY: u16 = 0x01c2;
pub const FW_WRITE_MEMORY: u16 = 0x01c3;
pub const FW_SET_MEM_ACCESS: u16 = 0x0218;

pub const ACCESS_ENABLE: u16 = 0x10fb;
pub const ACCESS_DISABLE: u16 = 0x0000;

/// Status byte the radio answers a successful access change with.
pub const ACCESS_OK: u8 = 0x5e;

#[derive(Debug, PartialEq, Eq, TryFromPrimitive, Clone, Copy)]
#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum FwMemory {
    Cpu = 0x00,
    Codeplug = 0x03,
}

fn read_mem(cursor: &mut Cursor<&[u8]>) -> Result<FwMemory, ProtocolError> {
    let v = cursor.read_u8()?;

    FwMemory::try_from(v).map_err(|_| ProtocolError::InvalidValue {
        field: "memory region",
        value: v as u32,
    })
}

fn read_data(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<Vec<u8>, ProtocolError> {
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let data = rest(cursor);

    if data.len() != len {
        return Err(ProtocolError::LengthMismatch {
            field,
            expected: len,
            found: data.len(),
        });
    }

    Ok(data)
}

pub fn pack_access_mem_req(enable: bool) -> Vec<u8> {
    let access = if enable { ACCESS_ENABLE } else { ACCESS_DISABLE };

    access.to_le_bytes().to_vec()
}

pub fn unpack_access_mem_req(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let access = cursor.read_u16::<LittleEndian>()?;

    expect_end(&cursor, "memory access request")?;

    let enable = match access {
        ACCESS_ENABLE => true,
        ACCESS_DISABLE => false,
        v => {
            return Err(ProtocolError::InvalidValue {
                field: "memory access",
                value: v as u32,
            })
        }
    };

    Ok(Payload::SetMemoryAccess { enable })
}

pub fn unpack_access_mem_res(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let status = cursor.read_u8()?;

    expect_end(&cursor, "memory access response")?;

    Ok(Payload::SetMemoryAccessResponse { status })
}

pub fn pack_read_mem_req(mem: FwMemory, addr: u32, len: u16) -> Vec<u8> {
    let mut ret = Vec::with_capacity(7);

    ret.push(mem as u8);
    ret.extend_from_slice(&addr.to_le_bytes());
    ret.extend_from_slice(&len.to_le_bytes());

    ret
}

pub fn unpack_read_mem_req(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let mem = read_mem(&mut cursor)?;
    let addr = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u16::<LittleEndian>()?;

    expect_end(&cursor, "firmware read request")?;

    Ok(Payload::FwReadMemory { mem, addr, len })
}

pub fn pack_read_mem_res(
    status: u8,
    mem: FwMemory,
    addr: u32,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(8 + payload.len());

    ret.write_u8(status)?;
    ret.write_u8(mem as u8)?;
    ret.write_u32::<LittleEndian>(addr)?;
    ret.write_u16::<LittleEndian>(len16(payload)?)?;
    ret.write_all(payload)?;

    Ok(ret)
}

/// A refused read may come back with a body shorter than it declares, so the
/// length is only held to account when the status reports success.
pub fn unpack_read_mem_res(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let status = cursor.read_u8()?;
    let mem = read_mem(&mut cursor)?;
    let addr = cursor.read_u32::<LittleEndian>()?;

    let data = if status == 0 {
        read_data(&mut cursor, "firmware read response data")?
    } else {
        let _ = cursor.read_u16::<LittleEndian>();
        rest(&mut cursor)
    };

    Ok(Payload::FwReadMemoryResponse {
        status,
        mem,
        addr,
        data,
    })
}

pub fn pack_write_mem_req(
    mem: FwMemory,
    addr: u32,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(7 + payload.len());

    ret.write_u8(mem as u8)?;
    ret.write_u32::<LittleEndian>(addr)?;
    ret.write_u16::<LittleEndian>(len16(payload)?)?;
    ret.write_all(payload)?;

    Ok(ret)
}

pub fn unpack_write_mem_req(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let mem = read_mem(&mut cursor)?;
    let addr = cursor.read_u32::<LittleEndian>()?;
    let data = read_data(&mut cursor, "firmware write request data")?;

    Ok(Payload::FwWriteMemory { mem, addr, data })
}

pub fn pack_write_mem_res(status: u8, mem: FwMemory, addr: u32, len: u16) -> Vec<u8> {
    let mut ret = Vec::with_capacity(8);

    ret.push(status);
    ret.push(mem as u8);
    ret.extend_from_slice(&addr.to_le_bytes());
    ret.extend_from_slice(&len.to_le_bytes());

    ret
}

pub fn unpack_write_mem_res(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let status = cursor.read_u8()?;
    let mem = read_mem(&mut cursor)?;
    let addr = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u16::<LittleEndian>()?;

    expect_end(&cursor, "firmware write response")?;

    Ok(Payload::FwWriteMemoryResponse {
        status,
        mem,
        addr,
        len,
    })
}
