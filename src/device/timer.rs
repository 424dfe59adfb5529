//! Free-running clock used for timeouts and test duration measurement.

use core::fmt::Debug;

/// Monotonic microsecond clock. The counter is 32 bits wide and wraps.
pub trait Timer: Sized {
    #[cfg(feature = "defmt")]
    #[allow(missing_docs)]
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    #[allow(missing_docs)]
    type Error: Debug;

    /// Current time in microseconds.
    fn now_us(&mut self) -> Result<u32, Self::Error>;
}

/// Microseconds elapsed from `start` to `now` on a wrapping 32-bit clock.
pub(crate) fn elapsed_us(start: u32, now: u32) -> u32 {
    now.wrapping_sub(start)
}
