use std::{marker::PhantomData, time::Duration};

use log::{debug, warn};

use crate::{
    error::{ChecksumError, ProtocolError, Result, TransportError},
    transport::Transport,
};

use super::{
    common::{Checked, Direction, Payload, Request},
    config::{ChecksumPolicy, SessionConfig},
    profile::{ProtocolMode, SessionProfile},
    transfer::Exchange,
};

/// Owns the transport and carries one request/response exchange at a time.
pub struct Link<P: SessionProfile, T: Transport> {
    transport: T,
    config: SessionConfig,
    seq: u16,
    warnings: Vec<ChecksumError>,
    profile: PhantomData<P>,
}

impl<P: SessionProfile, T: Transport> Link<P, T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Link {
            transport,
            config,
            seq: 0,
            warnings: Vec::new(),
            profile: PhantomData,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout.unwrap_or(P::TIMEOUT)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn warnings(&self) -> &[ChecksumError] {
        &self.warnings
    }

    pub fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Send one packet and collect the reply, reading until the length
    /// announced in its header has arrived.
    pub fn transact(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let timeout = self.timeout();

        self.transport.send(packet, timeout)?;

        let mut buf = vec![0u8; self.config.read_size()];
        let mut ret = Vec::new();

        loop {
            let n = self.transport.receive(&mut buf, timeout)?;

            if n == 0 {
                return Err(TransportError::Closed.into());
            }

            ret.extend_from_slice(&buf[..n]);

            if let Some(total) = P::packet_length(&ret) {
                if ret.len() == total {
                    return Ok(ret);
                }

                if ret.len() > total {
                    warn!(
                        "Received {} bytes for a packet announcing {total}",
                        ret.len()
                    );
                    return Err(TransportError::Overrun(total).into());
                }
            }
        }
    }

    /// Apply the checksum policy to a decoded value.
    pub fn check<V>(&mut self, checked: Checked<V>) -> Result<V> {
        if checked.is_clean() {
            return Ok(checked.value);
        }

        match self.config.checksum_policy {
            ChecksumPolicy::Strict => Ok(checked.strict()?),
            ChecksumPolicy::Warn => {
                for w in checked.warnings.iter() {
                    warn!("{w}");
                }

                self.warnings.extend(checked.warnings);

                Ok(checked.value)
            }
        }
    }
}

impl<P: SessionProfile, T: Transport> Exchange for Link<P, T> {
    fn mode(&self) -> ProtocolMode {
        P::MODE
    }

    fn exchange(&mut self, payload: Payload) -> Result<Payload> {
        let request = Request::from_payload(&payload)?;
        let seq = self.next_seq();
        let packet = P::frame_request(&request, seq)?;

        debug!("[{seq}] REQ: {payload:?}");

        let data = self.transact(&packet)?;
        let response = P::unframe_response(&data)?;
        let response = self.check(response)?;

        let expected = Direction::Response.apply(request.type_code);

        if response.type_code != expected {
            return Err(ProtocolError::UnexpectedResponse {
                expected,
                found: response.type_code,
            }
            .into());
        }

        let ret = response.payload(P::MODE)?;

        debug!("[{seq}] RES: {ret:?}");

        Ok(ret)
    }
}
