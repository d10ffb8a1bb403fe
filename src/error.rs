use std::time::Duration;

use thiserror::Error;

use crate::radio::SessionState;

/// Structurally corrupt framing. Never retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Bad marker at offset {offset}: expected {expected:#04x}, found {found:#04x}")]
    BadMarker {
        offset: usize,
        expected: u8,
        found: u8,
    },

    #[error("Length mismatch: header declares {declared} bytes, found {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Frame too short")]
    Truncated,

    #[error("Frame body of {0} bytes does not fit the length field")]
    Oversized(usize),

    #[error("Unknown frame kind {0:#04x}")]
    UnknownKind(u8),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("Frame CRC16 mismatch: declared {declared:#06x}, computed {computed:#06x}")]
    Crc16Mismatch { declared: u16, computed: u16 },

    #[error("Request CRC8 mismatch: declared {declared:#04x}, computed {computed:#04x}")]
    Crc8Mismatch { declared: u8, computed: u8 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A reserved field did not hold the value every observed capture holds.
    #[error("Unexpected constant in {field}: expected {expected:02x?}, found {found:02x?}")]
    UnexpectedConstant {
        field: &'static str,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    #[error("Invalid value {value:#x} for {field}")]
    InvalidValue { field: &'static str, value: u32 },

    #[error("Payload too short")]
    Truncated,

    #[error("Payload of {0} bytes does not fit a 16-bit length")]
    PayloadTooLarge(usize),

    #[error("{field} length mismatch: expected {expected}, found {found}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("String response is not valid UTF-16")]
    InvalidString,

    #[error("Expected response type {expected:#06x}, got {found:#06x}")]
    UnexpectedResponse { expected: u16, found: u16 },

    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("Unexpected frame: kind={kind:#04x} flags={flags:#04x} src={src:#04x} dest={dest:#04x}")]
    UnexpectedFrame {
        kind: u8,
        flags: u8,
        src: u8,
        dest: u8,
    },

    #[error("Response address {found:#010x} does not match requested {expected:#010x}")]
    AddressMismatch { expected: u32, found: u32 },

    #[error("Device returned status {status:#04x} for request {type_code:#06x}")]
    StatusError { type_code: u16, status: u8 },

    #[error("Range {addr:#010x}+{length:#x} exceeds the 32-bit address space")]
    AddressOverflow { addr: u32, length: u64 },

    #[error("Invalid chunk size {0:#x}")]
    InvalidChunkSize(u32),

    #[error("{0} is not supported in this session mode")]
    Unsupported(&'static str),
}

impl From<std::io::Error> for ProtocolError {
    // Codecs only read from in-memory cursors, so the only failure is running out of bytes.
    fn from(_: std::io::Error) -> Self {
        ProtocolError::Truncated
    }
}

impl From<std::io::Error> for FrameError {
    fn from(_: std::io::Error) -> Self {
        FrameError::Truncated
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Device returned an empty read")]
    Closed,

    #[error("Response exceeded {0} bytes")]
    Overrun(usize),

    #[error("Radio not found")]
    DeviceNotFound,

    #[error("Could not find interface for endpoint {0:#04x}")]
    EndpointNotFound(u8),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("{operation} is not valid while {state}")]
    InvalidOperationForState {
        operation: &'static str,
        state: SessionState,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
