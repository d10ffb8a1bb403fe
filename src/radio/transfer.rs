//! Splitting address ranges into chunked read/write requests.

use log::{debug, warn};

use crate::error::{ProtocolError, Result};

use super::{
    common::Payload,
    firmware_mode::FwMemory,
    profile::ProtocolMode,
};

/// Anything that can carry one payload to the radio and bring back the reply.
pub trait Exchange {
    fn mode(&self) -> ProtocolMode;

    fn exchange(&mut self, request: Payload) -> Result<Payload>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub addr: u32,
    pub len: u16,
}

/// Tile `[addr, addr + length)` with chunks of at most `chunk_size` bytes.
pub fn plan_chunks(addr: u32, length: u64, chunk_size: u32) -> Result<Vec<Chunk>> {
    if chunk_size == 0 || chunk_size > u16::MAX as u32 {
        return Err(ProtocolError::InvalidChunkSize(chunk_size).into());
    }

    if addr as u64 + length > 1 << 32 {
        return Err(ProtocolError::AddressOverflow { addr, length }.into());
    }

    let end = addr as u64 + length;
    let step = chunk_size as u64;

    Ok((addr as u64..end)
        .step_by(step as usize)
        .map(|a| Chunk {
            addr: a as u32,
            len: step.min(end - a) as u16,
        })
        .collect())
}

fn read_request(mode: ProtocolMode, chunk: Chunk) -> Payload {
    match mode {
        ProtocolMode::Cps => Payload::ReadMemory {
            addr: chunk.addr,
            len: chunk.len,
        },
        ProtocolMode::Firmware => Payload::FwReadMemory {
            mem: FwMemory::Codeplug,
            addr: chunk.addr,
            len: chunk.len,
        },
    }
}

fn write_request(mode: ProtocolMode, chunk: Chunk, data: &[u8]) -> Payload {
    match mode {
        ProtocolMode::Cps => Payload::WriteMemory {
            addr: chunk.addr,
            data: data.to_vec(),
        },
        ProtocolMode::Firmware => Payload::FwWriteMemory {
            mem: FwMemory::Codeplug,
            addr: chunk.addr,
            data: data.to_vec(),
        },
    }
}

fn check_reply(type_code: u16, chunk: Chunk, status: u8, addr: u32) -> Result<()> {
    if status != 0 {
        return Err(ProtocolError::StatusError { type_code, status }.into());
    }

    if addr != chunk.addr {
        return Err(ProtocolError::AddressMismatch {
            expected: chunk.addr,
            found: addr,
        }
        .into());
    }

    Ok(())
}

fn check_region(mem: FwMemory) -> Result<()> {
    if mem != FwMemory::Codeplug {
        return Err(ProtocolError::InvalidValue {
            field: "memory region",
            value: mem as u32,
        }
        .into());
    }

    Ok(())
}

/// Read `length` bytes starting at `addr`, one request per chunk. The first
/// failing chunk aborts the whole range.
pub fn read_range<E: Exchange + ?Sized>(
    link: &mut E,
    addr: u32,
    length: u64,
    chunk_size: u32,
) -> Result<Vec<u8>> {
    let chunks = plan_chunks(addr, length, chunk_size)?;
    let mut ret = Vec::new();

    debug!(
        "Reading {length:#x} bytes at {addr:#010x} in {} chunks",
        chunks.len()
    );

    for chunk in chunks {
        let request = read_request(link.mode(), chunk);
        let type_code = request.type_code();

        let data = match link.exchange(request)? {
            Payload::ReadMemoryResponse { status, addr, data } => {
                check_reply(type_code, chunk, status, addr)?;
                data
            }
            Payload::FwReadMemoryResponse {
                status,
                mem,
                addr,
                data,
            } => {
                check_reply(type_code, chunk, status, addr)?;
                check_region(mem)?;
                data
            }
            other => {
                return Err(ProtocolError::UnexpectedPayload(format!("{other:?}")).into());
            }
        };

        if data.len() > chunk.len as usize {
            return Err(ProtocolError::LengthMismatch {
                field: "read chunk",
                expected: chunk.len as usize,
                found: data.len(),
            }
            .into());
        }

        if data.len() < chunk.len as usize {
            warn!(
                "Radio returned {:#x} of {:#x} bytes at {:#010x}",
                data.len(),
                chunk.len,
                chunk.addr
            );
        }

        ret.extend_from_slice(&data);
    }

    Ok(ret)
}

/// Write `data` starting at `addr`, one request per chunk. The first failing
/// chunk aborts the whole range.
pub fn write_range<E: Exchange + ?Sized>(
    link: &mut E,
    addr: u32,
    data: &[u8],
    chunk_size: u32,
) -> Result<()> {
    let chunks = plan_chunks(addr, data.len() as u64, chunk_size)?;

    debug!(
        "Writing {:#x} bytes at {addr:#010x} in {} chunks",
        data.len(),
        chunks.len()
    );

    let mut offset = 0;

    for chunk in chunks {
        let part = &data[offset..offset + chunk.len as usize];
        let request = write_request(link.mode(), chunk, part);
        let type_code = request.type_code();

        let len = match link.exchange(request)? {
            Payload::WriteMemoryResponse { status, addr, len } => {
                check_reply(type_code, chunk, status, addr)?;
                len
            }
            Payload::FwWriteMemoryResponse {
                status,
                mem,
                addr,
                len,
            } => {
                check_reply(type_code, chunk, status, addr)?;
                check_region(mem)?;
                len
            }
            other => {
                return Err(ProtocolError::UnexpectedPayload(format!("{other:?}")).into());
            }
        };

        if len != chunk.len {
            return Err(ProtocolError::LengthMismatch {
                field: "write chunk",
                expected: chunk.len as usize,
                found: len as usize,
            }
            .into());
        }

        offset += chunk.len as usize;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportError};
    use proptest::prelude::*;
    use std::time::Duration;

    /// Answers reads from a pattern and records every request.
    struct Scripted {
        mode: ProtocolMode,
        requests: Vec<Payload>,
        fail_at: Option<(usize, Payload)>,
    }

    impl Scripted {
        fn new(mode: ProtocolMode) -> Self {
            Scripted {
                mode,
                requests: Vec::new(),
                fail_at: None,
            }
        }

        fn pattern(addr: u32, len: u16) -> Vec<u8> {
            (0..len as u32).map(|i| (addr + i) as u8).collect()
        }
    }

    impl Exchange for Scripted {
        fn mode(&self) -> ProtocolMode {
            self.mode
        }

        fn exchange(&mut self, request: Payload) -> Result<Payload> {
            self.requests.push(request.clone());

            if let Some((n, reply)) = &self.fail_at {
                if *n == self.requests.len() - 1 {
                    if let Payload::Unknown { .. } = reply {
                        return Err(TransportError::Timeout(Duration::from_secs(4)).into());
                    }
                    return Ok(reply.clone());
                }
            }

            Ok(match request {
                Payload::ReadMemory { addr, len } => Payload::ReadMemoryResponse {
                    status: 0,
                    addr,
                    data: Self::pattern(addr, len),
                },
                Payload::FwReadMemory { mem, addr, len } => Payload::FwReadMemoryResponse {
                    status: 0,
                    mem,
                    addr,
                    data: Self::pattern(addr, len),
                },
                Payload::WriteMemory { addr, data } => Payload::WriteMemoryResponse {
                    status: 0,
                    addr,
                    len: data.len() as u16,
                },
                Payload::FwWriteMemory { mem, addr, data } => Payload::FwWriteMemoryResponse {
                    status: 0,
                    mem,
                    addr,
                    len: data.len() as u16,
                },
                other => panic!("unexpected request {other:?}"),
            })
        }
    }

    proptest! {
        #[test]
        fn chunks_tile_the_range(
            addr in 0u32..0x0100_0000,
            length in 0u64..0x2000,
            chunk_size in 1u32..0x500,
        ) {
            let chunks = plan_chunks(addr, length, chunk_size).unwrap();

            prop_assert_eq!(chunks.len() as u64, (length + chunk_size as u64 - 1) / chunk_size as u64);

            let mut next = addr as u64;
            for c in chunks.iter() {
                prop_assert_eq!(c.addr as u64, next);
                prop_assert!(c.len as u32 <= chunk_size);
                prop_assert!(c.len > 0);
                next += c.len as u64;
            }
            prop_assert_eq!(next, addr as u64 + length);
        }
    }

    #[test]
    fn read_range_tiles_requests() {
        let mut link = Scripted::new(ProtocolMode::Cps);

        let data = read_range(&mut link, 0x0, 0x350, 0x100).unwrap();

        let requested: Vec<_> = link
            .requests
            .iter()
            .map(|r| match r {
                Payload::ReadMemory { addr, len } => (*addr, *len),
                other => panic!("{other:?}"),
            })
            .collect();

        assert_eq!(
            requested,
            vec![(0x0, 0x100), (0x100, 0x100), (0x200, 0x100), (0x300, 0x50)]
        );
        assert_eq!(data.len(), 0x350);
        assert_eq!(data, Scripted::pattern(0, 0x350));
    }

    #[test]
    fn firmware_reads_use_codeplug_region() {
        let mut link = Scripted::new(ProtocolMode::Firmware);

        let data = read_range(&mut link, 0x400, 0x800, 0x400).unwrap();

        assert_eq!(data.len(), 0x800);
        assert_eq!(
            link.requests[1],
            Payload::FwReadMemory {
                mem: FwMemory::Codeplug,
                addr: 0x800,
                len: 0x400
            }
        );
    }

    #[test]
    fn empty_range_issues_nothing() {
        let mut link = Scripted::new(ProtocolMode::Cps);

        assert!(read_range(&mut link, 0x100, 0, 0x100).unwrap().is_empty());
        write_range(&mut link, 0x100, &[], 0x100).unwrap();
        assert!(link.requests.is_empty());
    }

    #[test]
    fn address_mismatch_aborts() {
        let mut link = Scripted::new(ProtocolMode::Cps);
        link.fail_at = Some((
            1,
            Payload::ReadMemoryResponse {
                status: 0,
                addr: 0x1234,
                data: vec![0; 0x100],
            },
        ));

        let err = read_range(&mut link, 0x0, 0x300, 0x100).unwrap_err();

        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AddressMismatch {
                expected: 0x100,
                found: 0x1234
            })
        ));
        assert_eq!(link.requests.len(), 2);
    }

    #[test]
    fn write_status_error_aborts() {
        let mut link = Scripted::new(ProtocolMode::Cps);
        link.fail_at = Some((
            0,
            Payload::WriteMemoryResponse {
                status: 0x05,
                addr: 0,
                len: 0x100,
            },
        ));

        let err = write_range(&mut link, 0x0, &[0xaa; 0x180], 0x100).unwrap_err();

        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::StatusError {
                type_code: 0x01c8,
                status: 0x05
            })
        ));
        assert_eq!(link.requests.len(), 1);
    }

    #[test]
    fn write_range_splits_data() {
        let mut link = Scripted::new(ProtocolMode::Cps);
        let data: Vec<u8> = (0..0x180u32).map(|x| x as u8).collect();

        write_range(&mut link, 0x1000, &data, 0x100).unwrap();

        assert_eq!(
            link.requests,
            vec![
                Payload::WriteMemory {
                    addr: 0x1000,
                    data: data[..0x100].to_vec()
                },
                Payload::WriteMemory {
                    addr: 0x1100,
                    data: data[0x100..].to_vec()
                },
            ]
        );
    }

    #[test]
    fn timeout_aborts_range() {
        let mut link = Scripted::new(ProtocolMode::Firmware);
        link.fail_at = Some((
            2,
            Payload::Unknown {
                type_code: 0,
                raw: vec![],
            },
        ));

        let err = read_range(&mut link, 0x0, 0x1000, 0x400).unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
        assert_eq!(link.requests.len(), 3);
    }

    #[test]
    fn short_chunks_are_concatenated() {
        let mut link = Scripted::new(ProtocolMode::Cps);
        link.fail_at = Some((
            0,
            Payload::ReadMemoryResponse {
                status: 0,
                addr: 0,
                data: vec![0xee; 0x40],
            },
        ));

        let data = read_range(&mut link, 0x0, 0x180, 0x100).unwrap();

        let mut expected = vec![0xee; 0x40];
        expected.extend(Scripted::pattern(0x100, 0x80));

        assert_eq!(data, expected);
        assert_eq!(link.requests.len(), 2);
    }

    #[test]
    fn empty_chunk_adds_nothing() {
        let mut link = Scripted::new(ProtocolMode::Firmware);
        link.fail_at = Some((
            1,
            Payload::FwReadMemoryResponse {
                status: 0,
                mem: FwMemory::Codeplug,
                addr: 0x400,
                data: vec![],
            },
        ));

        let data = read_range(&mut link, 0x0, 0x800, 0x400).unwrap();

        assert_eq!(data, Scripted::pattern(0, 0x400));
    }

    #[test]
    fn oversized_chunk_rejected() {
        let mut link = Scripted::new(ProtocolMode::Cps);
        link.fail_at = Some((
            0,
            Payload::ReadMemoryResponse {
                status: 0,
                addr: 0,
                data: vec![0; 0x110],
            },
        ));

        assert!(matches!(
            read_range(&mut link, 0x0, 0x100, 0x100),
            Err(Error::Protocol(ProtocolError::LengthMismatch {
                expected: 0x100,
                found: 0x110,
                ..
            }))
        ));
    }

    #[test]
    fn bad_ranges_rejected() {
        assert!(matches!(
            plan_chunks(0, 0x10, 0),
            Err(Error::Protocol(ProtocolError::InvalidChunkSize(0)))
        ));
        assert!(matches!(
            plan_chunks(0, 0x10, 0x10000),
            Err(Error::Protocol(ProtocolError::InvalidChunkSize(0x10000)))
        ));
        assert!(matches!(
            plan_chunks(0xffff_ff00, 0x200, 0x100),
            Err(Error::Protocol(ProtocolError::AddressOverflow { .. }))
        ));
        assert_eq!(plan_chunks(0xffff_ff00, 0x100, 0x100).unwrap().len(), 1);
    }
}
