//! Typed request/response payloads and the registry mapping type codes to
//! their codecs.

use std::io::{Cursor, Read};

use log::error;

use crate::{
    error::ProtocolError,
    radio::{
        cps_mode::packet::layer2::{self as cps, OpenMode, StringQuery},
        firmware_mode::packet::layer2::{self as fw, FwMemory},
        profile::ProtocolMode,
    },
};

use super::RESPONSE_BIT;

#[cfg(test)]
use proptest_derive::Arbitrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn of(type_code: u16) -> Self {
        if type_code & RESPONSE_BIT != 0 {
            Direction::Response
        } else {
            Direction::Request
        }
    }

    pub fn apply(self, base: u16) -> u16 {
        match self {
            Direction::Request => base & !RESPONSE_BIT,
            Direction::Response => base | RESPONSE_BIT,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum Payload {
    ReadMemory {
        addr: u32,
        len: u16,
    },
    ReadMemoryResponse {
        status: u8,
        addr: u32,
        data: Vec<u8>,
    },
    WriteMemory {
        addr: u32,
        data: Vec<u8>,
    },
    WriteMemoryResponse {
        status: u8,
        addr: u32,
        len: u16,
    },
    GetString {
        query: StringQuery,
        selector: u8,
    },
    GetStringResponse {
        query: StringQuery,
        unk1: u8,
        selector: u8,
        text: String,
    },
    EnterProgMode {
        mode: OpenMode,
    },
    EnterProgModeResponse {
        status: u8,
        mode: OpenMode,
        head_data: Vec<u8>,
    },
    LeaveProgMode,
    LeaveProgModeResponse,
    FwReadMemory {
        mem: FwMemory,
        addr: u32,
        len: u16,
    },
    FwReadMemoryResponse {
        status: u8,
        mem: FwMemory,
        addr: u32,
        data: Vec<u8>,
    },
    FwWriteMemory {
        mem: FwMemory,
        addr: u32,
        data: Vec<u8>,
    },
    FwWriteMemoryResponse {
        status: u8,
        mem: FwMemory,
        addr: u32,
        len: u16,
    },
    SetMemoryAccess {
        enable: bool,
    },
    SetMemoryAccessResponse {
        status: u8,
    },
    Unknown {
        #[cfg_attr(test, proptest(strategy = "tests::unregistered_type_code()"))]
        type_code: u16,
        raw: Vec<u8>,
    },
}

/// The codec selected for a type code. Carries no data; see [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    ReadMemory,
    ReadMemoryResponse,
    WriteMemory,
    WriteMemoryResponse,
    GetString,
    GetStringResponse,
    EnterProgMode,
    EnterProgModeResponse,
    LeaveProgMode,
    LeaveProgModeResponse,
    FwReadMemory,
    FwReadMemoryResponse,
    FwWriteMemory,
    FwWriteMemoryResponse,
    SetMemoryAccess,
    SetMemoryAccessResponse,
    Unknown,
}

/// Select the payload codec for a type code. The high bit of `type_code` is
/// ignored; `direction` decides between the request and response shape.
pub fn dispatch(type_code: u16, mode: ProtocolMode, direction: Direction) -> PayloadKind {
    use Direction::{Request as Req, Response as Res};
    use ProtocolMode::{Cps, Firmware};

    match (type_code & !RESPONSE_BIT, mode, direction) {
        (cps::READ_CODEPLUG, Cps, Req) => PayloadKind::ReadMemory,
        (cps::READ_CODEPLUG, Cps, Res) => PayloadKind::ReadMemoryResponse,
        (cps::WRITE_CODEPLUG, Cps, Req) => PayloadKind::WriteMemory,
        (cps::WRITE_CODEPLUG, Cps, Res) => PayloadKind::WriteMemoryResponse,
        (cps::GET_VERSION | cps::GET_RADIO_ID, Cps, Req) => PayloadKind::GetString,
        (cps::GET_VERSION | cps::GET_RADIO_ID, Cps, Res) => PayloadKind::GetStringResponse,
        (cps::ENTER_PROG_MODE, Cps, Req) => PayloadKind::EnterProgMode,
        (cps::ENTER_PROG_MODE, Cps, Res) => PayloadKind::EnterProgModeResponse,
        (cps::LEAVE_PROG_MODE, Cps, Req) => PayloadKind::LeaveProgMode,
        (cps::LEAVE_PROG_MODE, Cps, Res) => PayloadKind::LeaveProgModeResponse,
        (fw::FW_READ_MEMORY, Firmware, Req) => PayloadKind::FwReadMemory,
        (fw::FW_READ_MEMORY, Firmware, Res) => PayloadKind::FwReadMemoryResponse,
        (fw::FW_WRITE_MEMORY, Firmware, Req) => PayloadKind::FwWriteMemory,
        (fw::FW_WRITE_MEMORY, Firmware, Res) => PayloadKind::FwWriteMemoryResponse,
        (fw::FW_SET_MEM_ACCESS, Firmware, Req) => PayloadKind::SetMemoryAccess,
        (fw::FW_SET_MEM_ACCESS, Firmware, Res) => PayloadKind::SetMemoryAccessResponse,
        _ => PayloadKind::Unknown,
    }
}

impl PayloadKind {
    pub fn unpack(self, type_code: u16, data: &[u8]) -> Result<Payload, ProtocolError> {
        match self {
            PayloadKind::ReadMemory => cps::unpack_read_codeplug_request(data),
            PayloadKind::ReadMemoryResponse => cps::unpack_read_codeplug_response(data),
            PayloadKind::WriteMemory => cps::unpack_write_codeplug_request(data),
            PayloadKind::WriteMemoryResponse => cps::unpack_write_codeplug_response(data),
            PayloadKind::GetString => {
                cps::unpack_get_string_request(string_query(type_code)?, data)
            }
            PayloadKind::GetStringResponse => {
                cps::unpack_get_string_response(string_query(type_code)?, data)
            }
            PayloadKind::EnterProgMode => cps::unpack_enter_prog_mode_request(data),
            PayloadKind::EnterProgModeResponse => cps::unpack_enter_prog_mode_response(data),
            PayloadKind::LeaveProgMode => cps::unpack_leave_prog_mode_request(data),
            PayloadKind::LeaveProgModeResponse => cps::unpack_leave_prog_mode_response(data),
            PayloadKind::FwReadMemory => fw::unpack_read_mem_req(data),
            PayloadKind::FwReadMemoryResponse => fw::unpack_read_mem_res(data),
            PayloadKind::FwWriteMemory => fw::unpack_write_mem_req(data),
            PayloadKind::FwWriteMemoryResponse => fw::unpack_write_mem_res(data),
            PayloadKind::SetMemoryAccess => fw::unpack_access_mem_req(data),
            PayloadKind::SetMemoryAccessResponse => fw::unpack_access_mem_res(data),
            PayloadKind::Unknown => Ok(Payload::Unknown {
                type_code,
                raw: data.to_vec(),
            }),
        }
    }
}

fn string_query(type_code: u16) -> Result<StringQuery, ProtocolError> {
    let base = type_code & !RESPONSE_BIT;

    StringQuery::try_from(base).map_err(|_| ProtocolError::InvalidValue {
        field: "string query",
        value: base as u32,
    })
}

impl Payload {
    pub fn unpack(type_code: u16, mode: ProtocolMode, data: &[u8]) -> Result<Self, ProtocolError> {
        dispatch(type_code, mode, Direction::of(type_code)).unpack(type_code, data)
    }

    pub fn type_code(&self) -> u16 {
        use Direction::{Request as Req, Response as Res};

        match self {
            Payload::ReadMemory { .. } => Req.apply(cps::READ_CODEPLUG),
            Payload::ReadMemoryResponse { .. } => Res.apply(cps::READ_CODEPLUG),
            Payload::WriteMemory { .. } => Req.apply(cps::WRITE_CODEPLUG),
            Payload::WriteMemoryResponse { .. } => Res.apply(cps::WRITE_CODEPLUG),
            Payload::GetString { query, .. } => Req.apply(*query as u16),
            Payload::GetStringResponse { query, .. } => Res.apply(*query as u16),
            Payload::EnterProgMode { .. } => Req.apply(cps::ENTER_PROG_MODE),
            Payload::EnterProgModeResponse { .. } => Res.apply(cps::ENTER_PROG_MODE),
            Payload::LeaveProgMode => Req.apply(cps::LEAVE_PROG_MODE),
            Payload::LeaveProgModeResponse => Res.apply(cps::LEAVE_PROG_MODE),
            Payload::FwReadMemory { .. } => Req.apply(fw::FW_READ_MEMORY),
            Payload::FwReadMemoryResponse { .. } => Res.apply(fw::FW_READ_MEMORY),
            Payload::FwWriteMemory { .. } => Req.apply(fw::FW_WRITE_MEMORY),
            Payload::FwWriteMemoryResponse { .. } => Res.apply(fw::FW_WRITE_MEMORY),
            Payload::SetMemoryAccess { .. } => Req.apply(fw::FW_SET_MEM_ACCESS),
            Payload::SetMemoryAccessResponse { .. } => Res.apply(fw::FW_SET_MEM_ACCESS),
            Payload::Unknown { type_code, .. } => *type_code,
        }
    }

    pub fn pack(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Payload::ReadMemory { addr, len } => cps::pack_read_codeplug_request(*addr, *len),
            Payload::ReadMemoryResponse { status, addr, data } => {
                cps::pack_read_codeplug_response(*status, *addr, data)
            }
            Payload::WriteMemory { addr, data } => cps::pack_write_codeplug_request(*addr, data),
            Payload::WriteMemoryResponse { status, addr, len } => {
                cps::pack_write_codeplug_response(*status, *addr, *len)
            }
            Payload::GetString { selector, .. } => Ok(cps::pack_get_string_request(*selector)),
            Payload::GetStringResponse {
                unk1,
                selector,
                text,
                ..
            } => Ok(cps::pack_get_string_response(*unk1, *selector, text)),
            Payload::EnterProgMode { mode } => Ok(cps::pack_enter_prog_mode_request(*mode)),
            Payload::EnterProgModeResponse {
                status,
                mode,
                head_data,
            } => cps::pack_enter_prog_mode_response(*status, *mode, head_data),
            Payload::LeaveProgMode | Payload::LeaveProgModeResponse => {
                Ok(cps::pack_leave_prog_mode())
            }
            Payload::FwReadMemory { mem, addr, len } => Ok(fw::pack_read_mem_req(*mem, *addr, *len)),
            Payload::FwReadMemoryResponse {
                status,
                mem,
                addr,
                data,
            } => fw::pack_read_mem_res(*status, *mem, *addr, data),
            Payload::FwWriteMemory { mem, addr, data } => fw::pack_write_mem_req(*mem, *addr, data),
            Payload::FwWriteMemoryResponse {
                status,
                mem,
                addr,
                len,
            } => Ok(fw::pack_write_mem_res(*status, *mem, *addr, *len)),
            Payload::SetMemoryAccess { enable } => Ok(fw::pack_access_mem_req(*enable)),
            Payload::SetMemoryAccessResponse { status } => Ok(vec![*status]),
            Payload::Unknown { raw, .. } => Ok(raw.clone()),
        }
    }

    /// The session mode whose registry knows this payload, or `None` for
    /// unregistered type codes.
    pub fn mode(&self) -> Option<ProtocolMode> {
        match self {
            Payload::FwReadMemory { .. }
            | Payload::FwReadMemoryResponse { .. }
            | Payload::FwWriteMemory { .. }
            | Payload::FwWriteMemoryResponse { .. }
            | Payload::SetMemoryAccess { .. }
            | Payload::SetMemoryAccessResponse { .. } => Some(ProtocolMode::Firmware),
            Payload::Unknown { .. } => None,
            _ => Some(ProtocolMode::Cps),
        }
    }
}

/// Check a reserved field against the value every capture so far has shown.
pub(crate) fn expect_constant(
    field: &'static str,
    expected: &[u8],
    found: &[u8],
) -> Result<(), ProtocolError> {
    if expected == found {
        return Ok(());
    }

    error!("Reserved field {field} holds {found:02x?}, expected {expected:02x?}");

    Err(ProtocolError::UnexpectedConstant {
        field,
        expected: expected.to_vec(),
        found: found.to_vec(),
    })
}

pub(crate) fn read_reserved<const N: usize>(
    cursor: &mut Cursor<&[u8]>,
    field: &'static str,
    expected: &[u8; N],
) -> Result<(), ProtocolError> {
    let mut buf = [0u8; N];

    cursor.read_exact(&mut buf)?;

    expect_constant(field, expected, &buf)
}

pub(crate) fn rest(cursor: &mut Cursor<&[u8]>) -> Vec<u8> {
    let mut ret = Vec::new();

    // Reading a slice cursor to the end cannot fail.
    let _ = cursor.read_to_end(&mut ret);

    ret
}

pub(crate) fn expect_end(cursor: &Cursor<&[u8]>, field: &'static str) -> Result<(), ProtocolError> {
    let total = cursor.get_ref().len();
    let pos = cursor.position() as usize;

    if pos != total {
        return Err(ProtocolError::LengthMismatch {
            field,
            expected: pos,
            found: total,
        });
    }

    Ok(())
}

pub(crate) fn len16(data: &[u8]) -> Result<u16, ProtocolError> {
    u16::try_from(data.len()).map_err(|_| ProtocolError::PayloadTooLarge(data.len()))
}
