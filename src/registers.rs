//! MFRC522 register map, PCD commands and PICC command bytes.
//!
//! Only the subset the presence detector touches is listed. Addresses follow
//! section 9 of the MFRC522 data sheet.

/// Chip registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Command = 0x01,
    CommIEn = 0x02,
    CommIrq = 0x04,
    DivIrq = 0x05,
    Error = 0x06,
    FifoData = 0x09,
    FifoLevel = 0x0A,
    Control = 0x0C,
    BitFraming = 0x0D,
    Mode = 0x11,
    TxControl = 0x14,
    TxAsk = 0x15,
    CrcResultH = 0x21,
    CrcResultL = 0x22,
    RfCfg = 0x26,
    TMode = 0x2A,
    TPrescaler = 0x2B,
    TReloadH = 0x2C,
    TReloadL = 0x2D,
    Version = 0x37,
}

impl Register {
    pub const fn address(self) -> u8 {
        self as u8
    }

    /// First byte of a write frame: address in bits 6..1, bit 7 clear
    pub const fn write_address(self) -> u8 {
        (self.address() << 1) & 0x7E
    }

    /// First byte of a read frame: address in bits 6..1, bit 7 set
    pub const fn read_address(self) -> u8 {
        self.write_address() | 0x80
    }
}

/// PCD commands written to the Command register (Table 149)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Idle = 0x00,
    CalcCrc = 0x03,
    Transceive = 0x0C,
    MfAuthent = 0x0E,
    SoftReset = 0x0F,
}

impl Command {
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// `(CommIEn value, CommIrq bits that mark completion)`
    pub(crate) const fn irq_masks(self) -> (u8, u8) {
        match self {
            Command::MfAuthent => (0x12, 0x10),
            Command::Transceive => (0x77, 0x30),
            _ => (0x00, 0x00),
        }
    }
}

// CommIrq bits
pub const TIMER_IRQ: u8 = 0x01;
pub const IRQ_SET1: u8 = 0x80;

// DivIrq bits
pub const CRC_IRQ: u8 = 0x04;

// BitFraming bits
pub const START_SEND: u8 = 0x80;
pub const SHORT_FRAME_BITS: u8 = 0x07;

// FifoLevel bits
pub const FLUSH_BUFFER: u8 = 0x80;

/// Error register bits that void a response: BufferOvfl, CollErr, ParityErr, ProtocolErr
pub const ERROR_MASK: u8 = 0x1B;

/// TxControl bits driving the TX1/TX2 antenna pins
pub const ANTENNA_BITS: u8 = 0x03;

/// Control register RxLastBits field
pub const RX_LAST_BITS: u8 = 0x07;

/// The FIFO is 64 bytes deep but no answer this driver waits for exceeds 16
pub const MAX_RESPONSE_BYTES: usize = 16;

// PICC commands
pub const PICC_REQA: u8 = 0x26;
pub const PICC_SEL_CL1: u8 = 0x93;
pub const PICC_SEL_CL2: u8 = 0x95;
pub const PICC_ANTICOLL: u8 = 0x20;
pub const PICC_SELECT: u8 = 0x70;

/// Cascade tag, first UID byte of a double-size UID at cascade level 1
pub const CASCADE_TAG: u8 = 0x88;

/// SAK with the "UID not complete" bit set
pub const SAK_CASCADE: u8 = 0x04;

/// ATQA is two bytes, so a valid answer to REQA is 16 bits long
pub const ATQA_BITS: usize = 16;
