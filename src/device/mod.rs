//! Wrapper for all hardware functionality implemented by calling code.

pub mod radio;
pub mod radio_buffer;
pub mod rng;
pub mod serial;
pub mod timer;

use radio::types::TransceiverId;
use radio::Radio;
use rng::Rng;
use serial::SerialPort;
use timer::Timer;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error<D>
where
    D: Device,
{
    Timer(<<D as Device>::Timer as Timer>::Error),
    Radio(<<D as Device>::Radio as Radio>::Error),
    Rng(<<D as Device>::Rng as Rng>::Error),
    Serial(<<D as Device>::Serial as SerialPort>::Error),
}
impl<D> From<Error<D>> for super::Error<D>
where
    D: Device,
{
    fn from(value: Error<D>) -> Self {
        Self::Device(value)
    }
}

/// Static identity of the board, reported to the host and to a paired peer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardInfo {
    /// Transceiver IC type code.
    pub ic_type: u8,
    /// Name of the host microcontroller.
    pub mcu_name: &'static str,
    /// Name of the board.
    pub board_name: &'static str,
}

impl BoardInfo {
    /// Name of the radio front end as shown to the host tool.
    pub fn trx_name(trx: TransceiverId) -> &'static str {
        match trx {
            TransceiverId::Rf09 => "AT86RF215-RF09",
            TransceiverId::Rf24 => "AT86RF215-RF24",
        }
    }
}

/// Indications the engine raises for board LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedEvent {
    /// The radio is looking for a peer.
    PeerSearch,
    /// A peer has been paired.
    PeerFound,
    /// The peer asked this node to identify itself.
    Identify,
    /// Back to idle.
    Idle,
}

/// Specification of board-specific functionality provided by the caller.
pub trait Device {
    /// Clock provided by the calling code.
    type Timer: Timer;
    /// Dual-band radio driver provided by the calling code.
    type Radio: Radio;
    /// Random number generator provided by calling code.
    type Rng: Rng;
    /// Host link provided by calling code, one port per transceiver.
    type Serial: SerialPort;

    /// Get the caller-supplied clock implementation.
    fn timer(&mut self) -> &mut Self::Timer;
    /// Get the caller-supplied radio driver.
    fn radio(&mut self) -> &mut Self::Radio;
    /// Get the caller-supllied random number generator implementation.
    fn rng(&mut self) -> &mut Self::Rng;
    /// Get the serial port carrying host traffic for `trx`.
    fn serial(&mut self, trx: TransceiverId) -> &mut Self::Serial;
    /// Get the board identity.
    fn board_info() -> BoardInfo;

    /// Edge-triggered user button assigned to `trx`. Each press must be reported once.
    fn button_pressed(&mut self, _trx: TransceiverId) -> bool {
        false
    }
    /// Drive the board LEDs.
    fn led_event(&mut self, _trx: TransceiverId, _event: LedEvent) {
        // default do nothing
    }
    /// Battery voltage in volts, if the board can measure it.
    fn battery_voltage(&mut self) -> f32 {
        0.0
    }
    /// Temperature in degrees Celsius, if the board can measure it.
    fn temperature(&mut self) -> f32 {
        0.0
    }
}
