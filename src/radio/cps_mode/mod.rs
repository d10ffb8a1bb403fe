pub use self::packet::layer2::{OpenMode, StringQuery};
use std::time::Duration;

use log::{debug, info};

use self::packet::layer1::Frame;
use super::{
    common::{Checked, Payload, Request},
    link::Link,
    profile::{ProtocolMode, SessionProfile, UsbId},
    transfer::Exchange,
};
use crate::{
    error::{Error, ProtocolError, Result},
    transport::Transport,
};

pub mod packet;

/// Normal programming mode, as used by the vendor's CPS software.
#[derive(Debug, Clone, Copy)]
pub struct CpsProfile;

fn unexpected_frame(frame: &Frame) -> Error {
    ProtocolError::UnexpectedFrame {
        kind: frame.kind as u8,
        flags: frame.flags,
        src: frame.src,
        dest: frame.dest,
    }
    .into()
}

impl SessionProfile for CpsProfile {
    const MODE: ProtocolMode = ProtocolMode::Cps;
    const CHUNK_SIZE: u32 = 0x100;
    const TIMEOUT: Duration = Duration::from_secs(4);

    fn device_ids() -> Vec<UsbId> {
        [(0x0a11, 0x04), (0x0a12, 0x02), (0x0a21, 0x04)]
            .iter()
            .map(|x| UsbId::new(0x238b, x.0, x.1))
            .collect()
    }

    fn frame_request(request: &Request, seq: u16) -> Result<Vec<u8>> {
        Ok(Frame::request(seq, request.pack()?).pack()?)
    }

    fn unframe_response(data: &[u8]) -> Result<Checked<Request>> {
        Frame::unpack(data)?.and_then(|frame| -> Result<Checked<Request>> {
            if !frame.is_radio_response() {
                return Err(unexpected_frame(&frame));
            }

            Ok(Request::unpack(&frame.payload)?)
        })
    }

    fn packet_length(partial: &[u8]) -> Option<usize> {
        Frame::packet_length(partial)
    }

    fn connect<T: Transport>(link: &mut Link<Self, T>) -> Result<()> {
        let seq = link.next_seq();
        let pkt = Frame::connect(seq);

        debug!("[{seq}] REQ: {pkt:?}");

        let data = link.transact(&pkt.pack()?)?;
        let response = Frame::unpack(&data)?;
        let response = link.check(response)?;

        debug!("[{seq}] RES: {response:?}");

        if !response.is_connect_ack() {
            return Err(unexpected_frame(&response));
        }

        Ok(())
    }

    fn enter_program_mode<T: Transport>(
        link: &mut Link<Self, T>,
        mode: OpenMode,
    ) -> Result<Option<Vec<u8>>> {
        match link.exchange(Payload::EnterProgMode { mode })? {
            Payload::EnterProgModeResponse {
                status: 0,
                mode: m,
                head_data,
            } if m == mode => Ok(Some(head_data)),
            Payload::EnterProgModeResponse { status, .. } if status != 0 => {
                Err(ProtocolError::StatusError {
                    type_code: packet::layer2::ENTER_PROG_MODE,
                    status,
                }
                .into())
            }
            other => Err(ProtocolError::UnexpectedPayload(format!("{other:?}")).into()),
        }
    }

    fn leave_program_mode<T: Transport>(link: &mut Link<Self, T>, mode: OpenMode) -> Result<()> {
        match link.exchange(Payload::LeaveProgMode)? {
            Payload::LeaveProgModeResponse => (),
            other => return Err(ProtocolError::UnexpectedPayload(format!("{other:?}")).into()),
        }

        if mode == OpenMode::Write {
            info!("Radio is committing the new codeplug and will reboot");
        }

        Ok(())
    }
}
