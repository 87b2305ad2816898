//! Raspberry Pi SPI transport using rppal

use log::debug;
use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::spi::{BitOrder, Bus, Mode, SlaveSelect, Spi};

use crate::config::HardwareConfig;
use crate::transport::SpiTransport;
use crate::types::ReaderError;

pub struct SpidevTransport {
    spi: Spi,
    // Held high for as long as the transport lives
    _reset: OutputPin,
    // Claimed so nothing else drives it, never read
    _irq: Option<InputPin>,
}

impl SpidevTransport {
    /// Open `/dev/spidev<bus>.<device>` and take the chip out of reset
    pub fn new(config: &HardwareConfig) -> Result<Self, ReaderError> {
        let spi = Spi::new(
            Self::bus(config.bus)?,
            Self::slave_select(config.device)?,
            config.clock_hz,
            Mode::Mode0,
        )
        .map_err(|e| ReaderError::Transport(e.to_string()))?;
        spi.set_bit_order(BitOrder::MsbFirst)
            .map_err(|e| ReaderError::Transport(e.to_string()))?;
        spi.set_bits_per_word(8)
            .map_err(|e| ReaderError::Transport(e.to_string()))?;

        let gpio = Gpio::new().map_err(|e| ReaderError::Gpio(e.to_string()))?;
        let mut reset = gpio
            .get(config.reset_pin)
            .map_err(|e| ReaderError::Gpio(format!("reset pin {}: {}", config.reset_pin, e)))?
            .into_output();
        reset.set_high();

        let irq = config
            .irq_pin
            .map(|pin| {
                gpio.get(pin)
                    .map(|p| p.into_input())
                    .map_err(|e| ReaderError::Gpio(format!("irq pin {}: {}", pin, e)))
            })
            .transpose()?;

        debug!(
            "Opened spidev{}.{} at {} Hz, reset on {}",
            config.bus, config.device, config.clock_hz, config.reset_pin
        );

        Ok(Self {
            spi,
            _reset: reset,
            _irq: irq,
        })
    }

    fn bus(index: u8) -> Result<Bus, ReaderError> {
        match index {
            0 => Ok(Bus::Spi0),
            1 => Ok(Bus::Spi1),
            2 => Ok(Bus::Spi2),
            3 => Ok(Bus::Spi3),
            4 => Ok(Bus::Spi4),
            5 => Ok(Bus::Spi5),
            6 => Ok(Bus::Spi6),
            _ => Err(ReaderError::InvalidParameter(format!("Unknown SPI bus: {}", index))),
        }
    }

    fn slave_select(index: u8) -> Result<SlaveSelect, ReaderError> {
        match index {
            0 => Ok(SlaveSelect::Ss0),
            1 => Ok(SlaveSelect::Ss1),
            2 => Ok(SlaveSelect::Ss2),
            _ => Err(ReaderError::InvalidParameter(format!(
                "Unknown SPI device: {}",
                index
            ))),
        }
    }
}

impl SpiTransport for SpidevTransport {
    type Error = rppal::spi::Error;

    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let mut read = vec![0u8; data.len()];
        self.spi.transfer(&mut read, data)?;
        Ok(read)
    }
}
