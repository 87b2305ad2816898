//! Tunables for the bus, the register-level polls and the presence debouncer

use std::time::Duration;

/// Where the chip is wired. Defaults match a Raspberry Pi with the reader on
/// SPI0/CE0, RST on BCM 22 and IRQ on BCM 18.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareConfig {
    pub bus: u8,
    pub device: u8,
    pub clock_hz: u32,
    /// Chip reset line, driven high to take the chip out of reset
    pub reset_pin: u8,
    /// Interrupt line. Claimed when set but never read, the driver polls.
    pub irq_pin: Option<u8>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            device: 0,
            clock_hz: 100_000,
            reset_pin: 22,
            irq_pin: Some(18),
        }
    }
}

/// Bounds for the busy-wait loops of the register layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// CommIrq reads while waiting for a command to complete
    pub transceive_iterations: u32,
    /// DivIrq reads while waiting for the CRC coprocessor
    pub crc_iterations: u32,
    /// Pause between two reads, zero for a pure busy-wait
    pub delay: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            transceive_iterations: 2000,
            crc_iterations: 255,
            delay: Duration::ZERO,
        }
    }
}

/// Debouncer and event channel settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Time between two card reads
    pub poll_interval: Duration,
    /// Identical consecutive reads needed before a change is reported
    pub confirmations: u32,
    /// Extra pause after an activation before reading again
    pub activation_settle: Duration,
    /// Event channel capacity. The poller blocks when the channel is full.
    pub channel_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(150),
            confirmations: 4,
            activation_settle: Duration::from_millis(1000),
            channel_capacity: 10,
        }
    }
}
