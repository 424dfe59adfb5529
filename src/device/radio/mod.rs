//! Radio driver interface implemented by the caller.

pub mod types;
use core::fmt::Debug;
use types::*;

/// Transceiver abstraction for a dual front-end IEEE 802.15.4 radio.
///
/// Every call returns immediately. Completion of [`Radio::transmit`] and
/// [`Radio::start_ed_scan`] is reported back by the caller through
/// `PerformanceAnalyzer::tx_frame_done` and `PerformanceAnalyzer::ed_scan_done`.
pub trait Radio: Sized {
    #[cfg(feature = "defmt")]
    #[allow(missing_docs)]
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    #[allow(missing_docs)]
    type Error: Debug;

    /// Start sending `mpdu` (without FCS). Fails if the driver cannot accept the frame.
    fn transmit(
        &mut self,
        trx: TransceiverId,
        mpdu: &[u8],
        csma: CsmaMode,
        retry: bool,
    ) -> Result<(), Self::Error>;

    /// Write a PIB attribute.
    fn set_pib(&mut self, trx: TransceiverId, value: PibValue) -> Result<(), Self::Error>;

    /// Read a PIB attribute.
    fn pib(&mut self, trx: TransceiverId, attribute: PibAttribute) -> Result<PibValue, Self::Error>;

    /// Start an energy detect measurement on the current channel.
    fn start_ed_scan(&mut self, trx: TransceiverId, scan_duration: u8) -> Result<(), Self::Error>;

    /// Move the transceiver to `state`. `Sleep` is handled by [`Radio::sleep`].
    fn set_trx_state(&mut self, trx: TransceiverId, state: TrxState) -> Result<(), Self::Error>;

    /// Current transceiver state.
    fn trx_state(&mut self, trx: TransceiverId) -> Result<TrxState, Self::Error>;

    /// Enter deep sleep.
    fn sleep(&mut self, trx: TransceiverId) -> Result<(), Self::Error>;

    /// Leave deep sleep.
    fn wakeup(&mut self, trx: TransceiverId) -> Result<(), Self::Error>;

    /// Reset the front end and restore default PIB values.
    fn reset(&mut self, trx: TransceiverId) -> Result<(), Self::Error>;

    /// Receiver desensitization level, 0 disables it.
    fn set_rx_sensitivity(&mut self, trx: TransceiverId, level: u8) -> Result<(), Self::Error>;

    /// In promiscuous mode frames with a bad FCS are delivered as well.
    fn set_promiscuous_mode(&mut self, trx: TransceiverId, enabled: bool) -> Result<(), Self::Error>;

    /// Whether promiscuous mode is on.
    fn promiscuous_mode(&mut self, trx: TransceiverId) -> Result<bool, Self::Error>;

    /// Current value of the power amplifier register.
    fn tx_power_reg(&mut self, trx: TransceiverId) -> Result<u8, Self::Error>;

    /// Output power in dBm for a power amplifier register value.
    fn reg_to_dbm(&mut self, trx: TransceiverId, reg: u8) -> Result<i8, Self::Error>;

    /// Symbol duration of the active PHY in microseconds.
    fn symbol_duration_us(&mut self, trx: TransceiverId) -> Result<u32, Self::Error>;

    /// Start a continuous test transmission.
    fn start_continuous_tx(
        &mut self,
        trx: TransceiverId,
        mode: ContinuousTxMode,
    ) -> Result<(), Self::Error>;

    /// Stop a continuous test transmission.
    fn stop_continuous_tx(&mut self, trx: TransceiverId) -> Result<(), Self::Error>;

    /// Raw register read.
    fn read_register(&mut self, addr: u16) -> Result<u8, Self::Error>;

    /// Raw register write.
    fn write_register(&mut self, addr: u16, value: u8) -> Result<(), Self::Error>;

    /// Read the registers `start..=end` into `out`, which holds exactly that many bytes.
    fn dump_registers(&mut self, start: u16, end: u16, out: &mut [u8]) -> Result<(), Self::Error> {
        for (addr, slot) in (start..=end).zip(out.iter_mut()) {
            *slot = self.read_register(addr)?;
        }
        Ok(())
    }
}
