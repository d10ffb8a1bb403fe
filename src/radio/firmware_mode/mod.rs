pub use self::packet::layer2::FwMemory;
use std::time::Duration;

use self::packet::{
    layer1::FwFrame,
    layer2::{ACCESS_OK, FW_SET_MEM_ACCESS},
};
use super::{
    common::{Checked, Payload, Request},
    cps_mode::OpenMode,
    link::Link,
    profile::{ProtocolMode, SessionProfile, UsbId},
    transfer::Exchange,
};
use crate::{
    error::{ProtocolError, Result},
    transport::Transport,
};

pub mod packet;

/// Firmware update (bootloader) mode. Codeplug memory is reached directly
/// once access to it has been switched on.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareProfile;

fn set_memory_access<T: Transport>(
    link: &mut Link<FirmwareProfile, T>,
    enable: bool,
) -> Result<()> {
    match link.exchange(Payload::SetMemoryAccess { enable })? {
        Payload::SetMemoryAccessResponse { status: ACCESS_OK } => Ok(()),
        Payload::SetMemoryAccessResponse { status } => Err(ProtocolError::StatusError {
            type_code: FW_SET_MEM_ACCESS,
            status,
        }
        .into()),
        other => Err(ProtocolError::UnexpectedPayload(format!("{other:?}")).into()),
    }
}

impl SessionProfile for FirmwareProfile {
    const MODE: ProtocolMode = ProtocolMode::Firmware;
    const CHUNK_SIZE: u32 = 0x400;
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn device_ids() -> Vec<UsbId> {
        vec![UsbId::new(0x8765, 0x1234, 0x01)]
    }

    fn frame_request(request: &Request, _seq: u16) -> Result<Vec<u8>> {
        Ok(FwFrame::new(request.pack()?).pack()?)
    }

    fn unframe_response(data: &[u8]) -> Result<Checked<Request>> {
        FwFrame::unpack(data)?
            .and_then(|frame| -> Result<Checked<Request>> { Ok(Request::unpack(&frame.payload)?) })
    }

    fn packet_length(partial: &[u8]) -> Option<usize> {
        FwFrame::packet_length(partial)
    }

    /// The bootloader needs no handshake.
    fn connect<T: Transport>(_link: &mut Link<Self, T>) -> Result<()> {
        Ok(())
    }

    fn enter_program_mode<T: Transport>(
        link: &mut Link<Self, T>,
        _mode: OpenMode,
    ) -> Result<Option<Vec<u8>>> {
        set_memory_access(link, true)?;

        Ok(None)
    }

    fn leave_program_mode<T: Transport>(link: &mut Link<Self, T>, _mode: OpenMode) -> Result<()> {
        set_memory_access(link, false)
    }
}
