use std::time::Duration;

use log::{debug, info};
use rusb::{Context, DeviceHandle, UsbContext};

use crate::{error::TransportError, radio::profile::UsbId};

use super::Transport;

/// Bulk transport to a radio attached over USB.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    ep_out: u8,
    ep_in: u8,
}

fn map_err(e: rusb::Error, timeout: Duration) -> TransportError {
    match e {
        rusb::Error::Timeout => TransportError::Timeout(timeout),
        e => TransportError::Usb(e),
    }
}

impl UsbTransport {
    /// Open the first attached device matching one of `ids`.
    pub fn open(ids: &[UsbId]) -> Result<Self, TransportError> {
        let ctx = Context::new()?;

        let mut maybe_dev = None;

        'devices: for d in ctx.devices()?.iter() {
            let dc = d.device_descriptor()?;

            for id in ids {
                if dc.vendor_id() == id.vendor_id && dc.product_id() == id.product_id {
                    maybe_dev = Some((d, *id));
                    break 'devices;
                }
            }
        }

        let (dev, id) = maybe_dev.ok_or(TransportError::DeviceNotFound)?;

        info!(
            "Found radio {:04x}:{:04x} on bus {} address {}",
            id.vendor_id,
            id.product_id,
            dev.bus_number(),
            dev.address()
        );

        let cfg = dev.config_descriptor(0)?;

        let iface = cfg
            .interfaces()
            .find(|i| {
                i.descriptors().any(|id_desc| {
                    id_desc
                        .endpoint_descriptors()
                        .any(|ep| ep.number() == id.endpoint)
                })
            })
            .ok_or(TransportError::EndpointNotFound(id.endpoint))?;

        let mut handle = dev.open()?;

        handle.reset()?;
        handle.set_active_configuration(cfg.number())?;
        handle.claim_interface(iface.number())?;

        debug!(
            "Claimed interface {} for endpoint {:#04x}",
            iface.number(),
            id.endpoint
        );

        Ok(UsbTransport {
            handle,
            ep_out: id.endpoint,
            ep_in: id.endpoint | 0x80,
        })
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let mut sent = 0;

        while sent < data.len() {
            let n = self
                .handle
                .write_bulk(self.ep_out, &data[sent..], timeout)
                .map_err(|e| map_err(e, timeout))?;

            if n == 0 {
                return Err(TransportError::Closed);
            }

            sent += n;
        }

        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.handle
            .read_bulk(self.ep_in, buf, timeout)
            .map_err(|e| map_err(e, timeout))
    }
}
