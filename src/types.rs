//! Types shared by the driver, the debouncer and the reader lifecycle

use std::fmt;

use thiserror::Error;

/// Whether a card has just arrived on, or left, the antenna
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Activated,
    Deactivated,
}

/// A confirmed presence transition.
///
/// An `Activated` event always carries the card id, a `Deactivated` event
/// never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardEvent {
    card_id: String,
    state: CardState,
}

impl CardEvent {
    pub(crate) fn activated(card_id: String) -> Self {
        debug_assert!(!card_id.is_empty());
        Self {
            card_id,
            state: CardState::Activated,
        }
    }

    pub(crate) fn deactivated() -> Self {
        Self {
            card_id: String::new(),
            state: CardState::Deactivated,
        }
    }

    /// Lowercase hex UID of the card, empty for `Deactivated`
    pub fn card_id(&self) -> &str {
        &self.card_id
    }

    pub fn state(&self) -> CardState {
        self.state
    }
}

/// UID reported by a card during anti-collision, 4 or 7 bytes long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uid {
    bytes: Vec<u8>,
}

impl Uid {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() == 4 || bytes.len() == 7);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex rendering without separators, as handed to consumers
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.bytes)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Errors that can occur while talking to the reader
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    /// The bus could not be opened or rejected a transfer
    #[error("transport error: {0}")]
    Transport(String),
    /// The reset or interrupt line could not be claimed
    #[error("gpio error: {0}")]
    Gpio(String),
    /// No card answered REQA
    #[error("no card present")]
    NoCardPresent,
    /// The answer to REQA was not exactly 16 bits long
    #[error("unexpected answer length of {0} bits")]
    UnexpectedBitCount(usize),
    /// An anti-collision answer was not 5 bytes long
    #[error("anti-collision answer has {0} bytes, expected 5")]
    UnexpectedLength(usize),
    /// The block check character of an anti-collision answer did not match
    #[error("UID checksum mismatch, computed {expected:#04x} but card sent {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    /// The cascade-level select was not acknowledged with "UID incomplete"
    #[error("unexpected SAK {0:#04x}")]
    UnexpectedSak(u8),
    /// The error register flagged a buffer overflow, collision, parity or protocol error
    #[error("framing error, error register {0:#04x}")]
    Framing(u8),
    /// The command did not complete within the poll budget
    #[error("no response from card")]
    NoResponse,
    /// The CRC coprocessor did not finish within the poll budget
    #[error("CRC calculation timed out")]
    CrcTimeout,
    /// Another reader is already open in this registry
    #[error("reader already in use")]
    AlreadyActive,
    /// Invalid parameter passed to a function
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ReaderError {
    /// True for the per-tick outcomes the debouncer folds into "no card".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReaderError::NoCardPresent
                | ReaderError::UnexpectedBitCount(_)
                | ReaderError::UnexpectedLength(_)
                | ReaderError::Checksum { .. }
                | ReaderError::UnexpectedSak(_)
                | ReaderError::Framing(_)
                | ReaderError::NoResponse
                | ReaderError::CrcTimeout
        )
    }
}

/// Convert bytes to lowercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_hex_is_lowercase_without_separators() {
        let uid = Uid::new(vec![0xAA, 0x0B, 0xCC, 0x01]);
        assert_eq!(uid.to_hex(), "aa0bcc01");
        assert_eq!(uid.to_string(), "aa0bcc01");
    }

    #[test]
    fn test_event_invariants() {
        let on = CardEvent::activated("04a1b2c3".into());
        assert_eq!(on.state(), CardState::Activated);
        assert_eq!(on.card_id(), "04a1b2c3");

        let off = CardEvent::deactivated();
        assert_eq!(off.state(), CardState::Deactivated);
        assert!(off.card_id().is_empty());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ReaderError::NoCardPresent.is_transient());
        assert!(ReaderError::Checksum { expected: 1, actual: 2 }.is_transient());
        assert!(ReaderError::CrcTimeout.is_transient());
        assert!(!ReaderError::Transport("boom".into()).is_transient());
        assert!(!ReaderError::AlreadyActive.is_transient());
    }
}
