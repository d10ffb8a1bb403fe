use std::time::Duration;

use crate::error::TransportError;

mod usb;

pub use usb::UsbTransport;

/// A half-duplex byte pipe to the radio.
pub trait Transport {
    /// Send a whole packet.
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Receive whatever the device has ready, up to `buf.len()` bytes.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).send(data, timeout)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout)
    }
}
