//! Where the poller gets its per-tick card reads from

use std::time::{Duration, Instant};

use crate::mfrc522::Mfrc522;
use crate::transport::SpiTransport;
use crate::types::ReaderError;

/// A reader that can be asked, once per tick, which card is on it.
pub trait CardSource {
    /// Lowercase hex UID of the card in the field.
    ///
    /// Errors only mean "no id this tick", the poller never stops on them.
    fn read_card_id(&mut self) -> Result<String, ReaderError>;

    /// Called once when the poller exits, before the source is dropped
    fn shutdown(&mut self) -> Result<(), ReaderError> {
        Ok(())
    }
}

impl<T: SpiTransport> CardSource for Mfrc522<T> {
    fn read_card_id(&mut self) -> Result<String, ReaderError> {
        Mfrc522::read_card_id(self)
    }

    fn shutdown(&mut self) -> Result<(), ReaderError> {
        self.set_antenna(false)
    }
}

/// Stand-in for hosts without a reader: one card that keeps coming and going.
#[derive(Debug, Clone)]
pub struct SimulatedCard {
    card_id: String,
    present: Duration,
    absent: Duration,
    started: Instant,
}

impl SimulatedCard {
    /// `card_id` is on the reader for `present`, then off for `absent`, repeating
    pub fn new(card_id: impl Into<String>, present: Duration, absent: Duration) -> Self {
        Self {
            card_id: card_id.into(),
            present,
            absent,
            started: Instant::now(),
        }
    }

    fn in_field(&self) -> bool {
        let cycle = (self.present + self.absent).as_nanos();
        if cycle == 0 {
            return true;
        }
        self.started.elapsed().as_nanos() % cycle < self.present.as_nanos()
    }
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new("666", Duration::from_secs(30), Duration::from_secs(10))
    }
}

impl CardSource for SimulatedCard {
    fn read_card_id(&mut self) -> Result<String, ReaderError> {
        if self.in_field() {
            Ok(self.card_id.clone())
        } else {
            Err(ReaderError::NoCardPresent)
        }
    }
}
