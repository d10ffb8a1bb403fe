use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    error::ProtocolError,
    radio::common::payload::{expect_end, len16, read_reserved, rest, Payload},
};

static HEADER: [u8; 6] = [0, 0, 0, 1, 0, 0];

pub fn pack_read_codeplug_request(addr: u32, len: u16) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(12);

    ret.write_all(&HEADER)?;
    ret.write_u32::<LittleEndian>(addr)?;
    ret.write_u16::<LittleEndian>(len)?;

    Ok(ret)
}

pub fn unpack_read_codeplug_request(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    read_reserved(&mut cursor, "read request header", &HEADER)?;

    let addr = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u16::<LittleEndian>()?;

    expect_end(&cursor, "read request")?;

    Ok(Payload::ReadMemory { addr, len })
}

pub fn pack_read_codeplug_response(
    status: u8,
    addr: u32,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(13 + payload.len());

    ret.write_u8(status)?;
    ret.write_all(&HEADER)?;
    ret.write_u32::<LittleEndian>(addr)?;
    ret.write_u16::<LittleEndian>(len16(payload)?)?;
    ret.write_all(payload)?;

    Ok(ret)
}

pub fn unpack_read_codeplug_response(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let status = cursor.read_u8()?;

    read_reserved(&mut cursor, "read response header", &HEADER)?;

    let addr = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let data = rest(&mut cursor);

    if data.len() != len {
        return Err(ProtocolError::LengthMismatch {
            field: "read response data",
            expected: len,
            found: data.len(),
        });
    }

    Ok(Payload::ReadMemoryResponse { status, addr, data })
}

pub fn pack_write_codeplug_request(addr: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(12 + payload.len());

    ret.write_all(&HEADER)?;
    ret.write_u32::<LittleEndian>(addr)?;
    ret.write_u16::<LittleEndian>(len16(payload)?)?;
    ret.write_all(payload)?;

    Ok(ret)
}

pub fn unpack_write_codeplug_request(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    read_reserved(&mut cursor, "write request header", &HEADER)?;

    let addr = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let data = rest(&mut cursor);

    if data.len() != len {
        return Err(ProtocolError::LengthMismatch {
            field: "write request data",
            expected: len,
            found: data.len(),
        });
    }

    Ok(Payload::WriteMemory { addr, data })
}

pub fn pack_write_codeplug_response(
    status: u8,
    addr: u32,
    len: u16,
) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(13);

    ret.write_u8(status)?;
    ret.write_all(&HEADER)?;
    ret.write_u32::<LittleEndian>(addr)?;
    ret.write_u16::<LittleEndian>(len)?;

    Ok(ret)
}

pub fn unpack_write_codeplug_response(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let status = cursor.read_u8()?;

    read_reserved(&mut cursor, "write response header", &HEADER)?;

    let addr = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u16::<LittleEndian>()?;

    expect_end(&cursor, "write response")?;

    Ok(Payload::WriteMemoryResponse { status, addr, len })
}
