use std::{
    fmt,
    io::{Read, Seek, SeekFrom, Write},
};

use log::{error, info, warn};

use crate::{
    error::{ChecksumError, Error, ProtocolError, Result, StateError, TransportError},
    transport::{Transport, UsbTransport},
};

use self::{
    common::Payload,
    config::SessionConfig,
    cps_mode::{OpenMode, StringQuery},
    link::Link,
    profile::{ProtocolMode, SessionProfile},
    transfer::Exchange,
};

pub mod common;
pub mod config;
pub mod cps_mode;
pub mod firmware_mode;
pub mod link;
pub mod profile;
pub mod transfer;

/// Size of the codeplug address space.
pub const CODEPLUG_SIZE: usize = 0x1A5B00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    ProgramMode(OpenMode),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::ProgramMode(OpenMode::Read) => write!(f, "in read program mode"),
            SessionState::ProgramMode(OpenMode::Write) => write!(f, "in write program mode"),
        }
    }
}

/// A session with one radio. Owns the transport for its whole lifetime and
/// leaves program mode when dropped.
pub struct Radio<P: SessionProfile, T: Transport> {
    link: Link<P, T>,
    state: SessionState,
    head_data: Option<Vec<u8>>,
    pos: usize,
}

impl<P: SessionProfile> Radio<P, UsbTransport> {
    /// Find the radio on USB, connect and enter program mode.
    pub fn open_usb(config: SessionConfig, mode: OpenMode) -> Result<Self> {
        let transport = UsbTransport::open(&P::device_ids())?;

        Self::open(transport, config, mode)
    }
}

impl<P: SessionProfile, T: Transport> Radio<P, T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Radio {
            link: Link::new(transport, config),
            state: SessionState::Disconnected,
            head_data: None,
            pos: 0,
        }
    }

    /// Connect and enter program mode in one go.
    pub fn open(transport: T, config: SessionConfig, mode: OpenMode) -> Result<Self> {
        let mut ret = Self::new(transport, config);

        ret.connect()?;
        ret.enter_program_mode(mode)?;

        Ok(ret)
    }

    fn require(&self, operation: &'static str, ok: bool) -> Result<()> {
        if ok {
            return Ok(());
        }

        Err(StateError::InvalidOperationForState {
            operation,
            state: self.state,
        }
        .into())
    }

    pub fn connect(&mut self) -> Result<()> {
        self.require("connect", self.state == SessionState::Disconnected)?;

        P::connect(&mut self.link)?;

        self.state = SessionState::Connected;

        info!("Connected to radio ({:?} mode)", P::MODE);

        Ok(())
    }

    pub fn enter_program_mode(&mut self, mode: OpenMode) -> Result<()> {
        self.require("enter program mode", self.state == SessionState::Connected)?;

        // The radio may already be in program mode when the reply fails, so
        // any error is followed by a leave before it is returned.
        let head_data = match P::enter_program_mode(&mut self.link, mode) {
            Ok(head_data) => head_data,
            Err(e) => {
                self.state = SessionState::Disconnected;

                if let Err(leave) = P::leave_program_mode(&mut self.link, mode) {
                    warn!("Failed to leave program mode after a failed entry: {leave}");
                }

                return Err(e);
            }
        };

        self.head_data = head_data;
        self.state = SessionState::ProgramMode(mode);
        self.pos = 0;

        info!("Entered {:?} program mode", mode);

        Ok(())
    }

    /// Leave program mode. The session is disconnected afterwards even if
    /// the radio did not acknowledge.
    pub fn leave_program_mode(&mut self) -> Result<()> {
        let mode = match self.state {
            SessionState::ProgramMode(mode) => mode,
            _ => return self.require("leave program mode", false),
        };

        self.state = SessionState::Disconnected;

        P::leave_program_mode(&mut self.link, mode)?;

        info!("Left {:?} program mode", mode);

        Ok(())
    }

    /// End the session, leaving program mode if it is active.
    pub fn close(mut self) -> Result<()> {
        match self.state {
            SessionState::ProgramMode(_) => self.leave_program_mode(),
            _ => {
                self.state = SessionState::Disconnected;
                Ok(())
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Header data reported by the radio when program mode was entered.
    pub fn head_data(&self) -> Option<&[u8]> {
        self.head_data.as_deref()
    }

    /// Checksum mismatches tolerated so far.
    pub fn checksum_warnings(&self) -> &[ChecksumError] {
        self.link.warnings()
    }

    pub fn config(&self) -> &SessionConfig {
        self.link.config()
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub fn read_memory(&mut self, addr: u32, len: u64) -> Result<Vec<u8>> {
        self.require(
            "read",
            self.state == SessionState::ProgramMode(OpenMode::Read),
        )?;

        transfer::read_range(&mut self.link, addr, len, P::CHUNK_SIZE)
    }

    pub fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.require(
            "write",
            self.state == SessionState::ProgramMode(OpenMode::Write),
        )?;

        transfer::write_range(&mut self.link, addr, data, P::CHUNK_SIZE)
    }

    /// Ask the radio for one of its identity strings.
    pub fn get_string(&mut self, query: StringQuery, selector: u8) -> Result<String> {
        if P::MODE != ProtocolMode::Cps {
            return Err(ProtocolError::Unsupported("string query").into());
        }

        self.require("get string", self.state != SessionState::Disconnected)?;

        match self.link.exchange(Payload::GetString { query, selector })? {
            Payload::GetStringResponse { query: q, text, .. } if q == query => {
                Ok(text.trim_end_matches('\0').to_string())
            }
            other => Err(ProtocolError::UnexpectedPayload(format!("{other:?}")).into()),
        }
    }

    fn calc_bytes_to_copy(&self, len: usize) -> usize {
        let left = CODEPLUG_SIZE.saturating_sub(self.pos);

        std::cmp::min(P::CHUNK_SIZE as usize, std::cmp::min(left, len))
    }
}

fn io_error(e: Error) -> std::io::Error {
    use std::io::ErrorKind;

    let kind = match &e {
        Error::Io(e) => e.kind(),
        Error::Transport(TransportError::Timeout(_)) => ErrorKind::TimedOut,
        Error::Transport(TransportError::Closed) => ErrorKind::UnexpectedEof,
        Error::Transport(_) => ErrorKind::ConnectionAborted,
        Error::State(_) => ErrorKind::Unsupported,
        _ => ErrorKind::InvalidData,
    };

    std::io::Error::new(kind, e)
}

impl<P: SessionProfile, T: Transport> Read for Radio<P, T> {
    fn read(&mut self, x: &mut [u8]) -> std::io::Result<usize> {
        let n = self.calc_bytes_to_copy(x.len());

        if n == 0 {
            return Ok(0);
        }

        let data = self
            .read_memory(self.pos as u32, n as u64)
            .map_err(io_error)?;

        // A truncated reply yields a short read.
        x[..data.len()].copy_from_slice(&data);

        self.pos += data.len();

        Ok(data.len())
    }
}

impl<P: SessionProfile, T: Transport> Write for Radio<P, T> {
    fn write(&mut self, x: &[u8]) -> std::io::Result<usize> {
        let n = self.calc_bytes_to_copy(x.len());

        if n == 0 && !x.is_empty() {
            return Err(std::io::ErrorKind::WriteZero.into());
        }

        self.write_memory(self.pos as u32, &x[..n])
            .map_err(io_error)?;

        self.pos += n;

        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<P: SessionProfile, T: Transport> Seek for Radio<P, T> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(n) => (self.pos as u64).checked_add_signed(n),
            SeekFrom::End(n) => (CODEPLUG_SIZE as u64).checked_add_signed(n),
        };

        self.pos = target
            .filter(|&t| t <= CODEPLUG_SIZE as u64)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "seek outside the codeplug address space",
                )
            })? as usize;

        Ok(self.pos as u64)
    }
}

impl<P: SessionProfile, T: Transport> Drop for Radio<P, T> {
    fn drop(&mut self) {
        if let SessionState::ProgramMode(_) = self.state {
            if let Err(e) = self.leave_program_mode() {
                error!("Failed to leave program mode: {e}");
            }
        }
    }
}
