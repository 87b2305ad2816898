use log::debug;

use crate::config::PollBudget;
use crate::registers::{
    Command, Register, ANTENNA_BITS, ATQA_BITS, CASCADE_TAG, CRC_IRQ, ERROR_MASK, FLUSH_BUFFER,
    IRQ_SET1, MAX_RESPONSE_BYTES, PICC_ANTICOLL, PICC_REQA, PICC_SELECT, PICC_SEL_CL1,
    PICC_SEL_CL2, RX_LAST_BITS, SAK_CASCADE, SHORT_FRAME_BITS, START_SEND, TIMER_IRQ,
};
use crate::transport::SpiTransport;
use crate::types::{bytes_to_hex, ReaderError, Uid};

/// MFRC522 driver: register access, the CRC coprocessor and ISO 14443-3A
/// card discovery on top of a [`SpiTransport`].
pub struct Mfrc522<T: SpiTransport> {
    transport: T,
    antenna_gain: u8,
    budget: PollBudget,
}

impl<T: SpiTransport> Mfrc522<T> {
    const DEFAULT_ANTENNA_GAIN: u8 = 7;
    const MAX_ANTENNA_GAIN: u8 = 7;

    // Timer: TAuto, prescaler 0xD3E gives ~2 kHz, reload 30 is a 15 ms receive timeout
    const TMODE: u8 = 0x8D;
    const TPRESCALER: u8 = 0x3E;
    const TRELOAD_L: u8 = 30;
    const TRELOAD_H: u8 = 0;
    // 100% ASK modulation
    const TX_ASK: u8 = 0x40;
    // CRC preset 0x6363 per ISO 14443-3
    const MODE: u8 = 0x3D;

    /// Create a new driver instance with the default poll budget
    pub fn new(transport: T) -> Self {
        Self::with_budget(transport, PollBudget::default())
    }

    /// Create a new driver instance with an explicit poll budget
    pub fn with_budget(transport: T, budget: PollBudget) -> Self {
        Self {
            transport,
            antenna_gain: Self::DEFAULT_ANTENNA_GAIN,
            budget,
        }
    }

    /// Set the receiver gain (0..=7) programmed into RFCfg by [`init`](Self::init)
    pub fn set_antenna_gain(&mut self, gain: u8) -> Result<(), ReaderError> {
        if gain > Self::MAX_ANTENNA_GAIN {
            return Err(ReaderError::InvalidParameter(format!(
                "Antenna gain too high: {} (maximum: {})",
                gain,
                Self::MAX_ANTENNA_GAIN
            )));
        }
        self.antenna_gain = gain;
        Ok(())
    }

    /// Receiver gain currently programmed on `init`
    pub fn antenna_gain(&self) -> u8 {
        self.antenna_gain
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ------------------------------------------------------------------
    // Register access
    // ------------------------------------------------------------------

    /// Write `value` to `register` in a single two-byte frame
    pub fn write_register(&mut self, register: Register, value: u8) -> Result<(), ReaderError> {
        self.transfer(&[register.write_address(), value]).map(|_| ())
    }

    /// Read `register`. The value is the second byte clocked back in.
    pub fn read_register(&mut self, register: Register) -> Result<u8, ReaderError> {
        let response = self.transfer(&[register.read_address(), 0x00])?;
        response.get(1).copied().ok_or_else(|| {
            ReaderError::Transport(format!("Short transfer reading {:?}", register))
        })
    }

    /// Read-modify-write that sets the bits of `mask`
    pub fn set_bits(&mut self, register: Register, mask: u8) -> Result<(), ReaderError> {
        let current = self.read_register(register)?;
        self.write_register(register, current | mask)
    }

    /// Read-modify-write that clears the bits of `mask`
    pub fn clear_bits(&mut self, register: Register, mask: u8) -> Result<(), ReaderError> {
        let current = self.read_register(register)?;
        self.write_register(register, current & !mask)
    }

    /// Chip version, 0x91 or 0x92 for genuine parts
    pub fn version(&mut self) -> Result<u8, ReaderError> {
        self.read_register(Register::Version)
    }

    // ------------------------------------------------------------------
    // Chip setup
    // ------------------------------------------------------------------

    /// Soft reset, timer and modulation setup, then antenna on.
    ///
    /// Safe to call before every read: the antenna is only switched on when
    /// it is currently off.
    pub fn init(&mut self) -> Result<(), ReaderError> {
        self.write_register(Register::Command, Command::SoftReset.value())?;

        self.write_register(Register::TMode, Self::TMODE)?;
        self.write_register(Register::TPrescaler, Self::TPRESCALER)?;
        self.write_register(Register::TReloadL, Self::TRELOAD_L)?;
        self.write_register(Register::TReloadH, Self::TRELOAD_H)?;

        self.write_register(Register::TxAsk, Self::TX_ASK)?;
        self.write_register(Register::Mode, Self::MODE)?;
        self.write_register(Register::RfCfg, self.antenna_gain << 4)?;

        self.set_antenna(true)
    }

    /// Drive the TX1/TX2 antenna pins on or off
    pub fn set_antenna(&mut self, on: bool) -> Result<(), ReaderError> {
        if on {
            let current = self.read_register(Register::TxControl)?;
            if current & ANTENNA_BITS == 0 {
                self.set_bits(Register::TxControl, ANTENNA_BITS)?;
            }
            Ok(())
        } else {
            self.clear_bits(Register::TxControl, ANTENNA_BITS)
        }
    }

    // ------------------------------------------------------------------
    // Coprocessor and command execution
    // ------------------------------------------------------------------

    /// CRC_A of `data` computed by the chip, returned as `[lsb, msb]`
    pub fn crc16(&mut self, data: &[u8]) -> Result<[u8; 2], ReaderError> {
        // DivIrq bit 7 clear: the marked bits are cleared
        self.write_register(Register::DivIrq, CRC_IRQ)?;
        self.write_register(Register::FifoLevel, FLUSH_BUFFER)?;
        for &byte in data {
            self.write_register(Register::FifoData, byte)?;
        }
        self.write_register(Register::Command, Command::CalcCrc.value())?;

        let mut done = false;
        for _ in 0..self.budget.crc_iterations {
            if self.read_register(Register::DivIrq)? & CRC_IRQ != 0 {
                done = true;
                break;
            }
            self.pause();
        }
        if !done {
            return Err(ReaderError::CrcTimeout);
        }

        let lsb = self.read_register(Register::CrcResultL)?;
        let msb = self.read_register(Register::CrcResultH)?;
        Ok([lsb, msb])
    }

    /// Run `command` with `data` staged in the FIFO.
    ///
    /// For `Transceive` returns the card's answer (at most 16 bytes) and its
    /// exact length in bits. For any other command the response is empty and
    /// the count is the FIFO level in bytes.
    pub fn transceive(
        &mut self,
        command: Command,
        data: &[u8],
    ) -> Result<(Vec<u8>, usize), ReaderError> {
        let (irq_enable, wait_irq) = command.irq_masks();

        self.write_register(Register::CommIEn, irq_enable | IRQ_SET1)?;
        // CommIrq bit 7 clear: every marked flag is cleared
        self.write_register(Register::CommIrq, !IRQ_SET1)?;
        self.write_register(Register::FifoLevel, FLUSH_BUFFER)?;
        self.write_register(Register::Command, Command::Idle.value())?;

        for &byte in data {
            self.write_register(Register::FifoData, byte)?;
        }

        self.write_register(Register::Command, command.value())?;
        if command == Command::Transceive {
            self.set_bits(Register::BitFraming, START_SEND)?;
        }

        let mut irq = None;
        for _ in 0..self.budget.transceive_iterations {
            let value = self.read_register(Register::CommIrq)?;
            if value & (wait_irq | TIMER_IRQ) != 0 {
                irq = Some(value);
                break;
            }
            self.pause();
        }

        self.clear_bits(Register::BitFraming, START_SEND)?;

        let Some(irq) = irq else {
            debug!(
                "{:?} did not complete after {} polls",
                command, self.budget.transceive_iterations
            );
            return Err(ReaderError::NoResponse);
        };

        let error = self.read_register(Register::Error)?;
        if error & ERROR_MASK != 0 {
            return Err(ReaderError::Framing(error));
        }

        // The receive timer fired before anything arrived
        if irq & irq_enable & TIMER_IRQ != 0 {
            return Err(ReaderError::NoResponse);
        }

        let fifo_level = self.read_register(Register::FifoLevel)? as usize;
        if command != Command::Transceive {
            return Ok((Vec::new(), fifo_level));
        }

        let last_bits = (self.read_register(Register::Control)? & RX_LAST_BITS) as usize;
        let bit_count = if last_bits != 0 {
            fifo_level.saturating_sub(1) * 8 + last_bits
        } else {
            fifo_level * 8
        };

        let to_read = fifo_level.min(MAX_RESPONSE_BYTES);
        let mut response = Vec::with_capacity(to_read);
        for _ in 0..to_read {
            response.push(self.read_register(Register::FifoData)?);
        }

        debug!("Received {} bits: {:02X?}", bit_count, response);
        Ok((response, bit_count))
    }

    // ------------------------------------------------------------------
    // Card discovery
    // ------------------------------------------------------------------

    /// Send REQA and check for a 16-bit ATQA.
    ///
    /// Any failure of the exchange itself means no card answered and is
    /// reported as [`ReaderError::NoCardPresent`].
    pub fn request_type_a(&mut self) -> Result<usize, ReaderError> {
        self.write_register(Register::BitFraming, SHORT_FRAME_BITS)?;

        let (_, bits) = self
            .transceive(Command::Transceive, &[PICC_REQA])
            .map_err(|e| {
                debug!("REQA failed: {}", e);
                ReaderError::NoCardPresent
            })?;

        if bits != ATQA_BITS {
            return Err(ReaderError::UnexpectedBitCount(bits));
        }
        Ok(bits)
    }

    /// Resolve the UID of the card that answered REQA, descending into
    /// cascade level 2 for double-size UIDs.
    pub fn anti_collision(&mut self) -> Result<Uid, ReaderError> {
        self.write_register(Register::BitFraming, 0x00)?;

        let level1 = self.anti_collision_round(PICC_SEL_CL1)?;
        if level1[0] != CASCADE_TAG {
            return Ok(Uid::new(level1[..4].to_vec()));
        }

        debug!("Cascade tag in {}, selecting level 1", bytes_to_hex(&level1));

        let mut select = Vec::with_capacity(9);
        select.extend_from_slice(&[PICC_SEL_CL1, PICC_SELECT]);
        select.extend_from_slice(&level1);
        let crc = self.crc16(&select)?;
        select.extend_from_slice(&crc);

        let (sak, _) = self.transceive(Command::Transceive, &select)?;
        match sak.first() {
            Some(&SAK_CASCADE) => {}
            Some(&other) => return Err(ReaderError::UnexpectedSak(other)),
            None => return Err(ReaderError::NoResponse),
        }

        let level2 = self.anti_collision_round(PICC_SEL_CL2)?;

        // Level 1 carries CT uid0 uid1 uid2, level 2 carries uid3..uid6; BCCs dropped
        let mut uid = Vec::with_capacity(7);
        uid.extend_from_slice(&level1[1..4]);
        uid.extend_from_slice(&level2[..4]);
        Ok(Uid::new(uid))
    }

    /// Wake the chip, look for a card and return its UID as lowercase hex
    pub fn read_card_id(&mut self) -> Result<String, ReaderError> {
        self.init()?;
        self.request_type_a()?;
        let uid = self.anti_collision()?;
        debug!("Found UID {}", uid);
        Ok(uid.to_hex())
    }

    /// ANTICOLLISION at one cascade level: 4 UID bytes and their BCC
    fn anti_collision_round(&mut self, cascade_level: u8) -> Result<[u8; 5], ReaderError> {
        let (response, _) =
            self.transceive(Command::Transceive, &[cascade_level, PICC_ANTICOLL])?;

        let answer: [u8; 5] = response
            .as_slice()
            .try_into()
            .map_err(|_| ReaderError::UnexpectedLength(response.len()))?;

        let bcc = answer[..4].iter().fold(0u8, |acc, &b| acc ^ b);
        if bcc != answer[4] {
            return Err(ReaderError::Checksum {
                expected: bcc,
                actual: answer[4],
            });
        }
        Ok(answer)
    }

    fn transfer(&mut self, frame: &[u8]) -> Result<Vec<u8>, ReaderError> {
        self.transport
            .transfer(frame)
            .map_err(|e| ReaderError::Transport(format!("{:?}", e)))
    }

    fn pause(&self) {
        if !self.budget.delay.is_zero() {
            std::thread::sleep(self.budget.delay);
        }
    }
}
