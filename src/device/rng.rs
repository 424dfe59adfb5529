//! Random numbers for sequence numbers and short address selection.

use core::fmt::Debug;

/// Source of random numbers supplied by the caller.
pub trait Rng {
    #[cfg(feature = "defmt")]
    #[allow(missing_docs)]
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    #[allow(missing_docs)]
    type Error: Debug;

    /// Next random word.
    fn next_u32(&mut self) -> Result<u32, Self::Error>;

    /// Random byte, e.g. for a fresh sequence number.
    fn next_u8(&mut self) -> Result<u8, Self::Error> {
        Ok(self.next_u32()? as u8)
    }

    /// Random 16-bit short address, never 0x0000 and never the broadcast address.
    fn next_short_address(&mut self) -> Result<u16, Self::Error> {
        loop {
            let addr = self.next_u32()? as u16;
            if addr != 0 && addr != 0xFFFF {
                return Ok(addr);
            }
        }
    }
}
