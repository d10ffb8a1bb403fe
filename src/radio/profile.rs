use std::time::Duration;

use crate::{
    error::Result,
    transport::Transport,
};

use super::{
    common::{Checked, Request},
    cps_mode::OpenMode,
    link::Link,
};

/// Which dialect of the protocol a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    Cps,
    Firmware,
}

/// USB vendor/product pair and the bulk endpoint the radio talks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
    pub endpoint: u8,
}

impl UsbId {
    pub const fn new(vendor_id: u16, product_id: u16, endpoint: u8) -> Self {
        UsbId {
            vendor_id,
            product_id,
            endpoint,
        }
    }
}

/// Everything that differs between CPS and firmware mode: identifiers,
/// limits, the outer frame codec and the lifecycle handshakes.
pub trait SessionProfile: Sized {
    const MODE: ProtocolMode;
    const CHUNK_SIZE: u32;
    const TIMEOUT: Duration;

    fn device_ids() -> Vec<UsbId>;

    fn frame_request(request: &Request, seq: u16) -> Result<Vec<u8>>;

    fn unframe_response(data: &[u8]) -> Result<Checked<Request>>;

    /// Total length announced by the header of a partially received packet,
    /// or `None` until enough of the header has arrived.
    fn packet_length(partial: &[u8]) -> Option<usize>;

    fn connect<T: Transport>(link: &mut Link<Self, T>) -> Result<()>;

    /// Returns the header data the radio reports on entry, if any.
    fn enter_program_mode<T: Transport>(
        link: &mut Link<Self, T>,
        mode: OpenMode,
    ) -> Result<Option<Vec<u8>>>;

    fn leave_program_mode<T: Transport>(link: &mut Link<Self, T>, mode: OpenMode) -> Result<()>;
}
