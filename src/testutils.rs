//! Register-level MFRC522 simulator for exercising the driver without hardware

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::registers::{Command, Register, CRC_IRQ, FLUSH_BUFFER, IRQ_SET1, START_SEND};
use crate::transport::SpiTransport;

const RX_IRQ: u8 = 0x20;
pub const IDLE_IRQ: u8 = 0x10;
const ERR_IRQ: u8 = 0x02;
pub const TIMER_IRQ: u8 = 0x01;

/// What the simulated card does with a frame sent by the reader
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Answer with full bytes
    Answer(Vec<u8>),
    /// Answer whose last byte only carries `last_bits` valid bits
    Partial(Vec<u8>, u8),
    /// No card answered, the receive timer fires
    Timeout,
    /// The chip never raises a completion interrupt
    Silent,
    /// Reception completed with the given error register value
    Error(u8),
}

pub type Responder = Box<dyn FnMut(&[u8]) -> Reply + Send>;

/// Observations shared with the test after the chip moved into a driver
#[derive(Debug, Default)]
pub struct ChipLog {
    /// Frames transmitted to the card, one per Transceive
    pub sent: Vec<Vec<u8>>,
    pub soft_resets: usize,
    /// Writes to TxControl that changed the antenna bits
    pub antenna_toggles: usize,
    pub crc_requests: usize,
}

pub struct FakeChip {
    regs: [u8; 64],
    fifo: VecDeque<u8>,
    responder: Responder,
    log: Arc<Mutex<ChipLog>>,
    /// The CRC coprocessor never reports completion
    pub crc_stuck: bool,
    /// Every transfer fails as if the bus went away
    pub bus_down: bool,
    /// CommIrq bits raised when a command other than Transceive, Idle or
    /// SoftReset is started. `None` leaves such commands running forever.
    pub command_irq: Option<u8>,
}

impl FakeChip {
    pub fn new(responder: Responder) -> Self {
        Self {
            regs: [0; 64],
            fifo: VecDeque::new(),
            responder,
            log: Arc::new(Mutex::new(ChipLog::default())),
            crc_stuck: false,
            bus_down: false,
            command_irq: None,
        }
    }

    /// A chip with no card in the field
    pub fn empty() -> Self {
        Self::new(Box::new(|_: &[u8]| Reply::Timeout))
    }

    /// A chip with one card holding a 4 or 7 byte `uid`
    pub fn with_card(uid: &[u8]) -> Self {
        Self::new(card(uid))
    }

    pub fn log(&self) -> Arc<Mutex<ChipLog>> {
        self.log.clone()
    }

    pub fn register(&self, register: Register) -> u8 {
        self.regs[register.address() as usize]
    }

    pub fn set_register(&mut self, register: Register, value: u8) {
        self.regs[register.address() as usize] = value;
    }

    fn write(&mut self, address: u8, value: u8) {
        let reg = address as usize;
        match address {
            a if a == Register::Command.address() => {
                self.regs[reg] = value & 0x0F;
                self.run_command(value & 0x0F);
            }
            a if a == Register::CommIrq.address() || a == Register::DivIrq.address() => {
                if value & IRQ_SET1 != 0 {
                    self.regs[reg] |= value & !IRQ_SET1;
                } else {
                    self.regs[reg] &= !value;
                }
            }
            a if a == Register::FifoLevel.address() => {
                if value & FLUSH_BUFFER != 0 {
                    self.fifo.clear();
                }
            }
            a if a == Register::FifoData.address() => self.fifo.push_back(value),
            a if a == Register::TxControl.address() => {
                if (self.regs[reg] ^ value) & 0x03 != 0 {
                    self.lock_log().antenna_toggles += 1;
                }
                self.regs[reg] = value;
            }
            a if a == Register::BitFraming.address() => {
                let starting = value & START_SEND != 0 && self.regs[reg] & START_SEND == 0;
                self.regs[reg] = value;
                let transceiving = self.regs[Register::Command.address() as usize]
                    == Command::Transceive.value();
                if starting && transceiving {
                    self.exchange();
                }
            }
            _ => self.regs[reg] = value,
        }
    }

    fn read(&mut self, address: u8) -> u8 {
        match address {
            a if a == Register::FifoLevel.address() => self.fifo.len() as u8,
            a if a == Register::FifoData.address() => self.fifo.pop_front().unwrap_or(0),
            _ => self.regs[address as usize],
        }
    }

    fn run_command(&mut self, command: u8) {
        if command == Command::SoftReset.value() {
            self.fifo.clear();
            for reg in [Register::CommIrq, Register::DivIrq, Register::Error] {
                self.set_register(reg, 0);
            }
            self.set_register(Register::Command, 0);
            self.lock_log().soft_resets += 1;
        } else if command == Command::CalcCrc.value() {
            let data: Vec<u8> = self.fifo.drain(..).collect();
            let [lsb, msb] = crc_a(&data);
            self.set_register(Register::CrcResultL, lsb);
            self.set_register(Register::CrcResultH, msb);
            if !self.crc_stuck {
                self.regs[Register::DivIrq.address() as usize] |= CRC_IRQ;
            }
            self.lock_log().crc_requests += 1;
        }

        let passive = [Command::Idle, Command::Transceive, Command::SoftReset]
            .iter()
            .any(|c| c.value() == command);
        if let (false, Some(bits)) = (passive, self.command_irq) {
            self.regs[Register::CommIrq.address() as usize] |= bits;
        }
    }

    fn exchange(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        self.lock_log().sent.push(frame.clone());
        self.set_register(Register::Error, 0);
        self.set_register(Register::Control, 0);

        let comm_irq = Register::CommIrq.address() as usize;
        match (self.responder)(&frame) {
            Reply::Answer(bytes) => {
                self.fifo.extend(bytes);
                self.regs[comm_irq] |= RX_IRQ | IDLE_IRQ;
            }
            Reply::Partial(bytes, last_bits) => {
                self.fifo.extend(bytes);
                self.set_register(Register::Control, last_bits & 0x07);
                self.regs[comm_irq] |= RX_IRQ | IDLE_IRQ;
            }
            Reply::Timeout => self.regs[comm_irq] |= TIMER_IRQ,
            Reply::Silent => {}
            Reply::Error(error) => {
                self.set_register(Register::Error, error);
                self.regs[comm_irq] |= RX_IRQ | IDLE_IRQ | ERR_IRQ;
            }
        }
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, ChipLog> {
        self.log.lock().expect("chip log poisoned")
    }
}

impl SpiTransport for FakeChip {
    type Error = String;

    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        if self.bus_down {
            return Err("bus down".into());
        }
        if data.len() != 2 {
            return Err(format!("unexpected frame length {}", data.len()));
        }
        let address = (data[0] >> 1) & 0x3F;
        if data[0] & 0x80 != 0 {
            Ok(vec![0, self.read(address)])
        } else {
            self.write(address, data[1]);
            Ok(vec![0, 0])
        }
    }
}

/// ISO 14443-3 CRC_A, preset 0x6363, returned `[lsb, msb]`
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut b = byte ^ (crc & 0xFF) as u8;
        b ^= b << 4;
        let b = b as u16;
        crc = (crc >> 8) ^ (b << 8) ^ (b << 3) ^ (b >> 4);
    }
    crc.to_le_bytes()
}

pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}

/// Behaviour of a single ISO 14443-3A card with a 4 or 7 byte UID
pub fn card(uid: &[u8]) -> Responder {
    let uid = uid.to_vec();
    Box::new(move |frame: &[u8]| card_reply(&uid, frame))
}

pub fn card_reply(uid: &[u8], frame: &[u8]) -> Reply {
    let double = uid.len() == 7;
    let level1: Vec<u8> = if double {
        vec![0x88, uid[0], uid[1], uid[2]]
    } else {
        uid[..4].to_vec()
    };

    match frame {
        [0x26] => Reply::Answer(if double { vec![0x44, 0x00] } else { vec![0x04, 0x00] }),
        [0x93, 0x20] => {
            let mut answer = level1.clone();
            answer.push(bcc(&level1));
            Reply::Answer(answer)
        }
        [0x93, 0x70, rest @ ..] if double && rest.len() == 7 => {
            if crc_a(&frame[..7]) != [rest[5], rest[6]] {
                return Reply::Timeout;
            }
            let sak = 0x04;
            let crc = crc_a(&[sak]);
            Reply::Answer(vec![sak, crc[0], crc[1]])
        }
        [0x95, 0x20] if double => {
            let mut answer = uid[3..7].to_vec();
            answer.push(bcc(&uid[3..7]));
            Reply::Answer(answer)
        }
        _ => Reply::Timeout,
    }
}
