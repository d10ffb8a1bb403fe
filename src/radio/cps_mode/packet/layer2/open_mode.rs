use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::OpenMode;
use crate::{
    error::ProtocolError,
    radio::common::payload::{expect_constant, len16, rest, Payload},
};

static FOOTER: [u8; 16] = [0; 16];

fn open_mode(value: u8) -> Result<OpenMode, ProtocolError> {
    OpenMode::try_from(value).map_err(|_| ProtocolError::InvalidValue {
        field: "program mode",
        value: value as u32,
    })
}

pub fn pack_enter_prog_mode_request(mode: OpenMode) -> Vec<u8> {
    let mut ret = Vec::with_capacity(FOOTER.len() + 1);

    ret.push(mode as u8);
    ret.extend(FOOTER);

    ret
}

pub fn unpack_enter_prog_mode_request(data: &[u8]) -> Result<Payload, ProtocolError> {
    if data.len() != FOOTER.len() + 1 {
        return Err(ProtocolError::LengthMismatch {
            field: "enter program mode request",
            expected: FOOTER.len() + 1,
            found: data.len(),
        });
    }

    let mode = open_mode(data[0])?;

    expect_constant("enter program mode footer", &FOOTER, &data[1..])?;

    Ok(Payload::EnterProgMode { mode })
}

pub fn pack_enter_prog_mode_response(
    status: u8,
    mode: OpenMode,
    head_data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut ret = Vec::with_capacity(4 + head_data.len());

    ret.write_u8(status)?;
    ret.write_u8(mode as u8)?;
    ret.write_u16::<LittleEndian>(len16(head_data)?)?;
    ret.write_all(head_data)?;

    Ok(ret)
}

pub fn unpack_enter_prog_mode_response(data: &[u8]) -> Result<Payload, ProtocolError> {
    let mut cursor = Cursor::new(data);

    let status = cursor.read_u8()?;
    let mode = open_mode(cursor.read_u8()?)?;
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let head_data = rest(&mut cursor);

    // A refused request may carry a length that does not describe the body.
    if status == 0 && head_data.len() != len {
        return Err(ProtocolError::LengthMismatch {
            field: "program mode head data",
            expected: len,
            found: head_data.len(),
        });
    }

    Ok(Payload::EnterProgModeResponse {
        status,
        mode,
        head_data,
    })
}

pub fn pack_leave_prog_mode() -> Vec<u8> {
    vec![0]
}

pub fn unpack_leave_prog_mode_request(data: &[u8]) -> Result<Payload, ProtocolError> {
    expect_constant("leave program mode request", &[0], data)?;

    Ok(Payload::LeaveProgMode)
}

pub fn unpack_leave_prog_mode_response(data: &[u8]) -> Result<Payload, ProtocolError> {
    expect_constant("leave program mode response", &[0], data)?;

    Ok(Payload::LeaveProgModeResponse)
}
