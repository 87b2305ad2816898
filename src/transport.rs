/// Trait for the synchronous serial bus the MFRC522 sits on.
/// Implement this trait for different buses (Raspberry Pi spidev, test fakes, etc.)
pub trait SpiTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Clock `data` out MSB first, 8 bits per word, and return the bytes
    /// clocked in during the same transfer. The result has the same length
    /// as `data`.
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, Self::Error>;
}
