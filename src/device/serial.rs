//! Byte transport towards the host tool.

use core::fmt::Debug;

/// Non-blocking serial link. Both directions may transfer fewer bytes than asked for.
pub trait SerialPort {
    #[cfg(feature = "defmt")]
    #[allow(missing_docs)]
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    #[allow(missing_docs)]
    type Error: Debug;

    /// Copy up to `buf.len()` pending bytes into `buf`. Returns the number copied, possibly zero.
    fn rx(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Queue bytes for transmission. Returns how many were accepted; the caller retries the rest.
    fn tx(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
}
