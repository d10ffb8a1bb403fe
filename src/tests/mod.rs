use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

use crate::{
    error::{ChecksumError, Error, ProtocolError, StateError, TransportError},
    radio::{
        common::{Payload, Request},
        cps_mode::packet::layer1::{entity, flags, Frame, FrameKind},
        firmware_mode::{packet::layer1::FwFrame, FwMemory},
        profile::ProtocolMode,
    },
    transport::Transport,
    ChecksumPolicy, CpsProfile, FirmwareProfile, OpenMode, Radio, SessionConfig, SessionState,
    StringQuery, CODEPLUG_SIZE,
};

pub struct SimState {
    pub mode: ProtocolMode,
    pub memory: Vec<u8>,
    pub requests: Vec<Payload>,
    pub connects: usize,
    pending: VecDeque<u8>,
    /// Most bytes handed out per receive call.
    pub max_receive: usize,
    /// Requests after this many time out.
    pub fail_after: Option<usize>,
    pub bad_address: bool,
    pub write_status: u8,
    pub corrupt_crc: bool,
    /// Read replies carry at most this many bytes.
    pub truncate_reads: Option<usize>,
    pub head_data: Vec<u8>,
    pub radio_id: String,
}

/// An in-memory radio speaking either protocol dialect.
#[derive(Clone)]
pub struct SimulatedRadio(pub Rc<RefCell<SimState>>);

impl SimulatedRadio {
    pub fn new(mode: ProtocolMode) -> Self {
        SimulatedRadio(Rc::new(RefCell::new(SimState {
            mode,
            memory: (0..CODEPLUG_SIZE).map(|i| (i * 7) as u8).collect(),
            requests: Vec::new(),
            connects: 0,
            pending: VecDeque::new(),
            max_receive: 0x400,
            fail_after: None,
            bad_address: false,
            write_status: 0,
            corrupt_crc: false,
            truncate_reads: None,
            head_data: vec![0x48, 0x59, 0x54, 0x01],
            radio_id: "1234567".to_string(),
        })))
    }

    pub fn state(&self) -> std::cell::RefMut<'_, SimState> {
        self.0.borrow_mut()
    }

    pub fn requests(&self) -> Vec<Payload> {
        self.0.borrow().requests.clone()
    }
}

impl SimState {
    fn read(&self, addr: u32, len: u16) -> Vec<u8> {
        let len = self
            .truncate_reads
            .map_or(len as usize, |max| max.min(len as usize));

        self.memory[addr as usize..addr as usize + len].to_vec()
    }

    fn respond(&mut self, request: Payload) -> Payload {
        match request {
            Payload::ReadMemory { addr, len } => Payload::ReadMemoryResponse {
                status: 0,
                addr: if self.bad_address { addr + 1 } else { addr },
                data: self.read(addr, len),
            },
            Payload::FwReadMemory { mem, addr, len } => Payload::FwReadMemoryResponse {
                status: 0,
                mem,
                addr: if self.bad_address { addr + 1 } else { addr },
                data: self.read(addr, len),
            },
            Payload::WriteMemory { addr, data } => {
                self.store(addr, &data);
                Payload::WriteMemoryResponse {
                    status: self.write_status,
                    addr,
                    len: data.len() as u16,
                }
            }
            Payload::FwWriteMemory { mem, addr, data } => {
                self.store(addr, &data);
                Payload::FwWriteMemoryResponse {
                    status: self.write_status,
                    mem,
                    addr,
                    len: data.len() as u16,
                }
            }
            Payload::GetString { query, selector } => Payload::GetStringResponse {
                query,
                unk1: 0,
                selector,
                text: match query {
                    StringQuery::RadioId => format!("{}\0", self.radio_id),
                    StringQuery::Version => "A1.00.05.001\0".to_string(),
                },
            },
            Payload::EnterProgMode { mode } => Payload::EnterProgModeResponse {
                status: 0,
                mode,
                head_data: self.head_data.clone(),
            },
            Payload::LeaveProgMode => Payload::LeaveProgModeResponse,
            Payload::SetMemoryAccess { .. } => Payload::SetMemoryAccessResponse { status: 0x5e },
            other => panic!("simulated radio cannot answer {other:?}"),
        }
    }

    fn store(&mut self, addr: u32, data: &[u8]) {
        if self.write_status == 0 {
            self.memory[addr as usize..addr as usize + data.len()].copy_from_slice(data);
        }
    }

    fn frame_response(&self, seq: u16, payload: &Payload) -> Vec<u8> {
        let body = Request::from_payload(payload).unwrap().pack().unwrap();

        let (mut data, crc_at) = match self.mode {
            ProtocolMode::Cps => {
                let mut frame = Frame::new(FrameKind::Response, flags::DEFAULT, seq, body);
                frame.src = entity::RADIO;
                frame.dest = entity::HOST;
                (frame.pack().unwrap(), 10)
            }
            ProtocolMode::Firmware => (FwFrame::new(body).pack().unwrap(), 2),
        };

        if self.corrupt_crc {
            data[crc_at] ^= 0x5a;
        }

        data
    }
}

impl Transport for SimulatedRadio {
    fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let mut st = self.0.borrow_mut();

        let (seq, request) = match st.mode {
            ProtocolMode::Cps => {
                let frame = Frame::unpack(data).unwrap().value;

                if frame.kind == FrameKind::Command && frame.flags == flags::CONNECT {
                    st.connects += 1;

                    let mut ack =
                        Frame::new(FrameKind::Response, flags::CONNECT_ACK, frame.seq, vec![]);
                    ack.src = entity::RADIO;
                    ack.dest = entity::HOST;
                    st.pending.extend(ack.pack().unwrap());

                    return Ok(());
                }

                (frame.seq, Request::unpack(&frame.payload).unwrap().value)
            }
            ProtocolMode::Firmware => {
                let frame = FwFrame::unpack(data).unwrap().value;

                (0, Request::unpack(&frame.payload).unwrap().value)
            }
        };

        let payload = request.payload(st.mode).unwrap();

        st.requests.push(payload.clone());

        if let Some(n) = st.fail_after {
            if st.requests.len() > n {
                return Err(TransportError::Timeout(timeout));
            }
        }

        let response = st.respond(payload);
        let packed = st.frame_response(seq, &response);

        st.pending.extend(packed);

        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut st = self.0.borrow_mut();

        if st.pending.is_empty() {
            return Err(TransportError::Timeout(timeout));
        }

        let n = buf.len().min(st.max_receive).min(st.pending.len());

        for (dst, src) in buf.iter_mut().zip(st.pending.drain(..n)) {
            *dst = src;
        }

        Ok(n)
    }
}

fn cps_session(mode: OpenMode) -> (SimulatedRadio, Radio<CpsProfile, SimulatedRadio>) {
    let sim = SimulatedRadio::new(ProtocolMode::Cps);
    let radio = Radio::open(sim.clone(), SessionConfig::default(), mode).unwrap();

    (sim, radio)
}

#[test]
fn cps_read_range() {
    let (sim, mut radio) = cps_session(OpenMode::Read);

    let data = radio.read_memory(0x0, 0x350).unwrap();

    assert_eq!(data, sim.state().memory[..0x350].to_vec());
    assert_eq!(radio.head_data(), Some(&[0x48, 0x59, 0x54, 0x01][..]));
    assert_eq!(sim.state().connects, 1);
    assert_eq!(
        sim.requests(),
        vec![
            Payload::EnterProgMode {
                mode: OpenMode::Read
            },
            Payload::ReadMemory { addr: 0x0, len: 0x100 },
            Payload::ReadMemory { addr: 0x100, len: 0x100 },
            Payload::ReadMemory { addr: 0x200, len: 0x100 },
            Payload::ReadMemory { addr: 0x300, len: 0x50 },
        ]
    );
    assert!(radio.checksum_warnings().is_empty());
}

#[test]
fn responses_spanning_several_reads_are_assembled() {
    let sim = SimulatedRadio::new(ProtocolMode::Cps);
    sim.state().max_receive = 7;

    let config = SessionConfig::default().with_read_size(16);
    let mut radio = Radio::<CpsProfile, _>::open(sim.clone(), config, OpenMode::Read).unwrap();

    let data = radio.read_memory(0x1000, 0x100).unwrap();

    assert_eq!(data, sim.state().memory[0x1000..0x1100].to_vec());
}

#[test]
fn operations_outside_their_state() {
    let sim = SimulatedRadio::new(ProtocolMode::Cps);
    let mut radio = Radio::<CpsProfile, _>::new(sim.clone(), SessionConfig::default());

    assert!(matches!(
        radio.read_memory(0, 0x10),
        Err(Error::State(StateError::InvalidOperationForState {
            state: SessionState::Disconnected,
            ..
        }))
    ));
    assert!(matches!(
        radio.enter_program_mode(OpenMode::Read),
        Err(Error::State(_))
    ));

    radio.connect().unwrap();

    assert!(matches!(radio.connect(), Err(Error::State(_))));
    assert!(matches!(
        radio.write_memory(0, &[0; 4]),
        Err(Error::State(StateError::InvalidOperationForState {
            state: SessionState::Connected,
            ..
        }))
    ));

    radio.enter_program_mode(OpenMode::Read).unwrap();

    assert!(matches!(
        radio.write_memory(0, &[0; 4]),
        Err(Error::State(StateError::InvalidOperationForState {
            operation: "write",
            state: SessionState::ProgramMode(OpenMode::Read),
        }))
    ));
    assert!(sim
        .requests()
        .iter()
        .all(|r| !matches!(r, Payload::WriteMemory { .. })));
}

#[test]
fn drop_leaves_program_mode() {
    let (sim, radio) = cps_session(OpenMode::Read);

    drop(radio);

    assert_eq!(sim.requests().last(), Some(&Payload::LeaveProgMode));
}

#[test]
fn close_leaves_once() {
    let (sim, radio) = cps_session(OpenMode::Write);

    radio.close().unwrap();

    let leaves = sim
        .requests()
        .iter()
        .filter(|r| **r == Payload::LeaveProgMode)
        .count();

    assert_eq!(leaves, 1);
}

#[test]
fn leave_returns_to_disconnected() {
    let (_sim, mut radio) = cps_session(OpenMode::Read);

    radio.leave_program_mode().unwrap();

    assert_eq!(radio.state(), SessionState::Disconnected);
    assert!(matches!(radio.leave_program_mode(), Err(Error::State(_))));
}

#[test]
fn timeout_aborts_and_still_attempts_leave() {
    let (sim, mut radio) = cps_session(OpenMode::Read);
    sim.state().fail_after = Some(2);

    let err = radio.read_memory(0x0, 0x300).unwrap_err();

    assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
    assert_eq!(radio.state(), SessionState::ProgramMode(OpenMode::Read));

    drop(radio);

    let requests = sim.requests();

    assert_eq!(requests.len(), 4);
    assert_eq!(requests.last(), Some(&Payload::LeaveProgMode));
}

#[test]
fn write_status_error_is_reported() {
    let (sim, mut radio) = cps_session(OpenMode::Write);
    sim.state().write_status = 0x01;
    let before = sim.state().memory[0x200..0x300].to_vec();

    let err = radio.write_memory(0x200, &[0xaa; 0x100]).unwrap_err();

    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::StatusError {
            type_code: 0x01c8,
            status: 0x01
        })
    ));
    assert_eq!(sim.state().memory[0x200..0x300].to_vec(), before);
}

#[test]
fn address_mismatch_is_reported() {
    let (sim, mut radio) = cps_session(OpenMode::Read);
    sim.state().bad_address = true;

    assert!(matches!(
        radio.read_memory(0x400, 0x10),
        Err(Error::Protocol(ProtocolError::AddressMismatch {
            expected: 0x400,
            found: 0x401
        }))
    ));
}

#[test]
fn checksum_mismatch_is_recorded() {
    let (sim, mut radio) = cps_session(OpenMode::Read);
    sim.state().corrupt_crc = true;

    let data = radio.read_memory(0x0, 0x10).unwrap();

    assert_eq!(data.len(), 0x10);
    assert!(matches!(
        radio.checksum_warnings(),
        [ChecksumError::Crc16Mismatch { .. }]
    ));
}

#[test]
fn strict_checksums_fail() {
    let sim = SimulatedRadio::new(ProtocolMode::Cps);
    let config = SessionConfig::default().with_checksum_policy(ChecksumPolicy::Strict);
    let mut radio = Radio::<CpsProfile, _>::open(sim.clone(), config, OpenMode::Read).unwrap();
    sim.state().corrupt_crc = true;

    assert!(matches!(
        radio.read_memory(0x0, 0x10),
        Err(Error::Checksum(ChecksumError::Crc16Mismatch { .. }))
    ));
    assert!(radio.checksum_warnings().is_empty());
}

#[test]
fn failed_entry_still_leaves_program_mode() {
    let sim = SimulatedRadio::new(ProtocolMode::Cps);
    let config = SessionConfig::default().with_checksum_policy(ChecksumPolicy::Strict);
    sim.state().corrupt_crc = true;

    let mut radio = Radio::<CpsProfile, _>::new(sim.clone(), config);
    radio.connect().unwrap();

    assert!(matches!(
        radio.enter_program_mode(OpenMode::Read),
        Err(Error::Checksum(ChecksumError::Crc16Mismatch { .. }))
    ));
    assert_eq!(radio.state(), SessionState::Disconnected);

    drop(radio);

    assert_eq!(
        sim.requests(),
        vec![
            Payload::EnterProgMode {
                mode: OpenMode::Read
            },
            Payload::LeaveProgMode,
        ]
    );
}

#[test]
fn failed_open_leaves_program_mode() {
    let sim = SimulatedRadio::new(ProtocolMode::Cps);
    sim.state().fail_after = Some(0);

    let err = Radio::<CpsProfile, _>::open(sim.clone(), SessionConfig::default(), OpenMode::Write)
        .err()
        .unwrap();

    assert!(matches!(err, Error::Transport(TransportError::Timeout(_))));
    assert_eq!(sim.requests().last(), Some(&Payload::LeaveProgMode));

    let sim = SimulatedRadio::new(ProtocolMode::Firmware);
    let config = SessionConfig::default().with_checksum_policy(ChecksumPolicy::Strict);
    sim.state().corrupt_crc = true;

    assert!(Radio::<FirmwareProfile, _>::open(sim.clone(), config, OpenMode::Read).is_err());
    assert_eq!(
        sim.requests(),
        vec![
            Payload::SetMemoryAccess { enable: true },
            Payload::SetMemoryAccess { enable: false },
        ]
    );
}

#[test]
fn identity_strings() {
    let (_sim, mut radio) = cps_session(OpenMode::Read);

    assert_eq!(
        radio.get_string(StringQuery::RadioId, 0x00).unwrap(),
        "1234567"
    );
    assert_eq!(
        radio.get_string(StringQuery::Version, 0x12).unwrap(),
        "A1.00.05.001"
    );
}

#[test]
fn firmware_write_session() {
    let sim = SimulatedRadio::new(ProtocolMode::Firmware);
    let mut radio =
        Radio::<FirmwareProfile, _>::open(sim.clone(), SessionConfig::default(), OpenMode::Write)
            .unwrap();

    assert_eq!(radio.head_data(), None);

    let data = vec![0x5a; 0x500];
    radio.write_memory(0x800, &data).unwrap();

    assert!(matches!(
        radio.get_string(StringQuery::RadioId, 0),
        Err(Error::Protocol(ProtocolError::Unsupported(_)))
    ));

    drop(radio);

    assert_eq!(sim.state().memory[0x800..0xd00].to_vec(), data);
    assert_eq!(
        sim.requests(),
        vec![
            Payload::SetMemoryAccess { enable: true },
            Payload::FwWriteMemory {
                mem: FwMemory::Codeplug,
                addr: 0x800,
                data: data[..0x400].to_vec()
            },
            Payload::FwWriteMemory {
                mem: FwMemory::Codeplug,
                addr: 0xc00,
                data: data[0x400..].to_vec()
            },
            Payload::SetMemoryAccess { enable: false },
        ]
    );
    assert_eq!(sim.state().connects, 0);
}

#[test]
fn stream_adapter_reads_to_end_of_codeplug() {
    use std::io::{Read, Seek, SeekFrom};

    let sim = SimulatedRadio::new(ProtocolMode::Firmware);
    let mut radio =
        Radio::<FirmwareProfile, _>::open(sim.clone(), SessionConfig::default(), OpenMode::Read)
            .unwrap();

    radio.seek(SeekFrom::End(-0x500)).unwrap();

    let mut buf = Vec::new();
    radio.read_to_end(&mut buf).unwrap();

    assert_eq!(buf, sim.state().memory[CODEPLUG_SIZE - 0x500..].to_vec());
    assert!(radio.seek(SeekFrom::Current(1)).is_err());
    assert!(radio.seek(SeekFrom::Current(-(CODEPLUG_SIZE as i64) - 1)).is_err());
}

#[test]
fn truncated_replies_give_short_reads() {
    use std::io::Read;

    let (sim, mut radio) = cps_session(OpenMode::Read);
    sim.state().truncate_reads = Some(0x30);
    let memory = sim.state().memory.clone();

    assert_eq!(
        radio.read_memory(0x0, 0x180).unwrap(),
        [&memory[..0x30], &memory[0x100..0x130]].concat()
    );

    let mut buf = [0u8; 0x100];

    assert_eq!(radio.read(&mut buf).unwrap(), 0x30);
    assert_eq!(radio.read(&mut buf).unwrap(), 0x30);
    assert_eq!(buf[..0x30].to_vec(), memory[0x30..0x60].to_vec());
}

#[test]
fn stream_adapter_timeout_kind() {
    use std::io::Read;

    let (sim, mut radio) = cps_session(OpenMode::Read);
    sim.state().fail_after = Some(1);

    let mut buf = [0u8; 0x10];
    let err = radio.read(&mut buf).unwrap_err();

    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}
