//! MFRC522 card presence detector.
//!
//! Polls an MFRC522 for ISO 14443-3A cards and turns the noisy per-poll UID
//! reads into debounced "card on" / "card off" events delivered over a
//! bounded async channel.
//!
//! # Features
//!
//! - `rpi` - SPI/GPIO transport for the Raspberry Pi using the rppal crate
//!
//! # Example
//!
//! ```ignore
//! use rc522_presence::{CardState, HardwareConfig, ReaderConfig, ReaderRegistry};
//!
//! let registry = ReaderRegistry::new();
//! let mut reader = registry.open_hardware(&HardwareConfig::default(), ReaderConfig::default())?;
//!
//! while let Some(event) = reader.events().recv().await {
//!     match event.state() {
//!         CardState::Activated => println!("card {} on", event.card_id()),
//!         CardState::Deactivated => println!("card off"),
//!     }
//! }
//! reader.close()?;
//! ```

mod config;
mod debounce;
mod lifecycle;
mod mfrc522;
pub mod registers;
mod source;
mod transport;
mod types;

#[cfg(feature = "rpi")]
mod spidev;

#[cfg(test)]
mod testutils;

// Re-exports
pub use config::{HardwareConfig, PollBudget, ReaderConfig};
pub use debounce::Debouncer;
pub use lifecycle::{ReaderHandle, ReaderRegistry};
pub use mfrc522::Mfrc522;
pub use source::{CardSource, SimulatedCard};
pub use transport::SpiTransport;
pub use types::{CardEvent, CardState, ReaderError, Uid};

#[cfg(feature = "rpi")]
pub use spidev::SpidevTransport;
